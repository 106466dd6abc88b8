//! Adapter that exposes `pulldown_cmark` events as chatmark [`Event`]s.
//!
//! The adapter materializes the event stream and normalizes it to the chat
//! dialect: raw HTML is demoted to escaped text, adjacent text fragments are
//! joined so inline scans see whole strings, and autolinks that look like
//! emoji references are restored to their literal source form.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use pulldown_cmark::{self as cmark, CowStr, Options, Parser};
use regex::Regex;

use crate::event::{Alignment, CodeBlockKind, Event, HeadingLevel, LinkType, Tag, TagEnd};

/// CommonMark treats `<party:123456>` as an autolink with scheme `party`,
/// which would hide the emoji syntax from the media-reference scan.
static EMOJI_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+:\d+$").unwrap());

/// Parses the input and returns the normalized event sequence.
pub fn parse_events(input: &str) -> Vec<Event<'_>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = EventBuilder::default();
    for event in Parser::new_ext(input, options) {
        builder.push(event);
    }
    coalesce_text(restore_emoji_autolinks(builder.events))
}

#[derive(Default)]
struct EventBuilder<'a> {
    events: Vec<Event<'a>>,
    html_break_pending: bool,
}

impl<'a> EventBuilder<'a> {
    fn push(&mut self, event: cmark::Event<'a>) {
        match event {
            cmark::Event::Start(tag) => self.start_tag(tag),
            cmark::Event::End(end) => self.end_tag(end),
            cmark::Event::Text(text) => self.events.push(Event::Text(cow(text))),
            cmark::Event::Code(text) => self.events.push(Event::Code(cow(text))),
            // Raw HTML never passes through; it renders as escaped text.
            cmark::Event::Html(html) => self.push_html_lines(cow(html)),
            cmark::Event::InlineHtml(html) => self.events.push(Event::Text(cow(html))),
            cmark::Event::SoftBreak => self.events.push(Event::SoftBreak),
            cmark::Event::HardBreak => self.events.push(Event::HardBreak),
            cmark::Event::Rule => self.events.push(Event::Rule),
            // Footnotes, math and task markers are never produced with the
            // options used here.
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: cmark::Tag<'a>) {
        let mapped = match tag {
            cmark::Tag::Paragraph => Tag::Paragraph,
            cmark::Tag::Heading { level, .. } => Tag::Heading {
                level: HeadingLevel::try_from(level as usize).unwrap_or(HeadingLevel::H6),
            },
            cmark::Tag::BlockQuote { .. } => Tag::BlockQuote,
            cmark::Tag::CodeBlock(kind) => Tag::CodeBlock(match kind {
                cmark::CodeBlockKind::Indented => CodeBlockKind::Indented,
                cmark::CodeBlockKind::Fenced(info) => CodeBlockKind::Fenced(cow(info)),
            }),
            cmark::Tag::List(start) => Tag::List(start),
            cmark::Tag::Item => Tag::Item,
            cmark::Tag::Table(alignments) => {
                Tag::Table(alignments.iter().map(alignment).collect())
            }
            cmark::Tag::TableHead => Tag::TableHead,
            cmark::Tag::TableRow => Tag::TableRow,
            cmark::Tag::TableCell => Tag::TableCell,
            cmark::Tag::Emphasis => Tag::Emphasis,
            cmark::Tag::Strong => Tag::Strong,
            cmark::Tag::Strikethrough => Tag::Strikethrough,
            cmark::Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            } => Tag::Link {
                link_type: self::link_type(link_type),
                dest_url: cow(dest_url),
                title: cow(title),
            },
            cmark::Tag::Image {
                dest_url, title, ..
            } => Tag::Image {
                dest_url: cow(dest_url),
                title: cow(title),
                original: None,
            },
            // A raw HTML block becomes a paragraph of escaped text.
            cmark::Tag::HtmlBlock => {
                self.html_break_pending = false;
                Tag::Paragraph
            }
            // Constructs outside the chat dialect are skipped.
            _ => return,
        };
        self.events.push(Event::Start(mapped));
    }

    fn end_tag(&mut self, end: cmark::TagEnd) {
        let mapped = match end {
            cmark::TagEnd::Paragraph => TagEnd::Paragraph,
            cmark::TagEnd::Heading(level) => TagEnd::Heading(
                HeadingLevel::try_from(level as usize).unwrap_or(HeadingLevel::H6),
            ),
            cmark::TagEnd::BlockQuote { .. } => TagEnd::BlockQuote,
            cmark::TagEnd::CodeBlock => TagEnd::CodeBlock,
            cmark::TagEnd::List(ordered) => TagEnd::List(ordered),
            cmark::TagEnd::Item => TagEnd::Item,
            cmark::TagEnd::Table => TagEnd::Table,
            cmark::TagEnd::TableHead => TagEnd::TableHead,
            cmark::TagEnd::TableRow => TagEnd::TableRow,
            cmark::TagEnd::TableCell => TagEnd::TableCell,
            cmark::TagEnd::Emphasis => TagEnd::Emphasis,
            cmark::TagEnd::Strong => TagEnd::Strong,
            cmark::TagEnd::Strikethrough => TagEnd::Strikethrough,
            cmark::TagEnd::Link => TagEnd::Link,
            cmark::TagEnd::Image => TagEnd::Image,
            cmark::TagEnd::HtmlBlock => {
                self.html_break_pending = false;
                TagEnd::Paragraph
            }
            _ => return,
        };
        self.events.push(Event::End(mapped));
    }

    /// Splits a raw HTML chunk into text lines joined by soft breaks. A
    /// trailing newline only becomes a break once more content follows, so
    /// block boundaries do not grow a stray `<br>`.
    fn push_html_lines(&mut self, html: Cow<'a, str>) {
        match html {
            Cow::Borrowed(s) => {
                for (idx, line) in s.split('\n').enumerate() {
                    self.push_html_line(idx, Cow::Borrowed(line));
                }
            }
            Cow::Owned(s) => {
                for (idx, line) in s.split('\n').enumerate() {
                    self.push_html_line(idx, Cow::Owned(line.to_owned()));
                }
            }
        }
    }

    fn push_html_line(&mut self, idx: usize, line: Cow<'a, str>) {
        if idx > 0 {
            self.html_break_pending = true;
        }
        if line.is_empty() {
            return;
        }
        if self.html_break_pending {
            self.events.push(Event::SoftBreak);
            self.html_break_pending = false;
        }
        self.events.push(Event::Text(line));
    }
}

/// Re-materializes autolinks whose destination has the `name:digits` shape as
/// literal `<name:digits>` text, so the media-reference rewrite sees them.
fn restore_emoji_autolinks(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut i = 0;
    while i < events.len() {
        let restorable = matches!(
            &events[i],
            Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url,
                ..
            }) if EMOJI_SHAPED.is_match(dest_url)
        ) && matches!(events.get(i + 1), Some(Event::Text(_)))
            && matches!(events.get(i + 2), Some(Event::End(TagEnd::Link)));

        if restorable {
            if let Event::Start(Tag::Link { dest_url, .. }) = &events[i] {
                out.push(Event::Text(Cow::Owned(format!("<{dest_url}>"))));
            }
            i += 3;
        } else {
            out.push(events[i].clone());
            i += 1;
        }
    }
    out
}

/// Joins adjacent text events. The parser splits text around bracket and
/// angle-bracket boundaries; the media-reference scan needs the joined view.
fn coalesce_text(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out: Vec<Event<'_>> = Vec::with_capacity(events.len());
    for event in events {
        match event {
            Event::Text(text) => {
                if let Some(Event::Text(prev)) = out.last_mut() {
                    prev.to_mut().push_str(&text);
                } else {
                    out.push(Event::Text(text));
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn cow(s: CowStr<'_>) -> Cow<'_, str> {
    match s {
        CowStr::Borrowed(b) => Cow::Borrowed(b),
        other => Cow::Owned(other.into_string()),
    }
}

fn alignment(align: &cmark::Alignment) -> Alignment {
    match align {
        cmark::Alignment::None => Alignment::None,
        cmark::Alignment::Left => Alignment::Left,
        cmark::Alignment::Center => Alignment::Center,
        cmark::Alignment::Right => Alignment::Right,
    }
}

fn link_type(link_type: cmark::LinkType) -> LinkType {
    match link_type {
        cmark::LinkType::Inline => LinkType::Inline,
        cmark::LinkType::Reference => LinkType::Reference,
        cmark::LinkType::ReferenceUnknown => LinkType::ReferenceUnknown,
        cmark::LinkType::Collapsed => LinkType::Collapsed,
        cmark::LinkType::CollapsedUnknown => LinkType::CollapsedUnknown,
        cmark::LinkType::Shortcut => LinkType::Shortcut,
        cmark::LinkType::ShortcutUnknown => LinkType::ShortcutUnknown,
        cmark::LinkType::Autolink => LinkType::Autolink,
        cmark::LinkType::Email => LinkType::Email,
        _ => LinkType::Inline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn paragraph_with_inline_markup() {
        let events = parse_events("hello *world*");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Paragraph),
                Event::Text("hello ".into()),
                Event::Start(Tag::Emphasis),
                Event::Text("world".into()),
                Event::End(TagEnd::Emphasis),
                Event::End(TagEnd::Paragraph),
            ]
        );
    }

    #[test]
    fn inline_html_is_demoted_to_text() {
        let events = parse_events("a <b>bold</b> move");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Paragraph),
                Event::Text("a <b>bold</b> move".into()),
                Event::End(TagEnd::Paragraph),
            ]
        );
    }

    #[test]
    fn html_block_becomes_paragraph_text() {
        let events = parse_events("<div>\nhi\n</div>");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Paragraph),
                Event::Text("<div>".into()),
                Event::SoftBreak,
                Event::Text("hi".into()),
                Event::SoftBreak,
                Event::Text("</div>".into()),
                Event::End(TagEnd::Paragraph),
            ]
        );
    }

    #[test]
    fn bracket_fragments_are_joined() {
        let events = parse_events("see [file: report.pdf] now");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Paragraph),
                Event::Text("see [file: report.pdf] now".into()),
                Event::End(TagEnd::Paragraph),
            ]
        );
    }

    #[test]
    fn emoji_shaped_autolink_is_restored() {
        let events = parse_events("hi <party:123456>!");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Paragraph),
                Event::Text("hi <party:123456>!".into()),
                Event::End(TagEnd::Paragraph),
            ]
        );
    }

    #[test]
    fn http_autolink_is_kept() {
        let events = parse_events("<https://example.com>");
        assert!(events.iter().any(|event| matches!(
            event,
            Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                ..
            })
        )));
    }

    #[test]
    fn strikethrough_and_tables_are_enabled() {
        let events = parse_events("~~gone~~");
        assert!(
            events
                .iter()
                .any(|event| matches!(event, Event::Start(Tag::Strikethrough)))
        );

        let events = parse_events("| a |\n| - |\n| b |");
        assert!(
            events
                .iter()
                .any(|event| matches!(event, Event::Start(Tag::Table(_))))
        );
    }
}
