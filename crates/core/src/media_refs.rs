//! Embedded-media reference detection and token rewriting.
//!
//! Chat messages carry two mini-syntaxes inside plain text: attachment
//! references (`[label: value]`) and custom emoji references
//! (`<name:digits>` / `<a:name:digits>`, `a:` marking the animated variant).
//! The rewrite pass scans text events for them and splices in image events
//! so the rest of the pipeline treats them like ordinary images.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::{Event, Tag, TagEnd};

/// Attachment form: label and value are non-`]` runs separated by a colon and
/// a single space; the value must not start with a second space. Both sides
/// match lazily, so `[a: b: c]` splits into label `a` and value `b: c`.
pub static ATTACHMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+?): ([^\] ][^\]]*?)\]").unwrap());

/// Emoji form: `<name:digits>` with an optional `a:` animation prefix. The
/// prefix is its own group so `<abc:123>` stays a plain emoji named `abc`.
pub static EMOJI_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(a:)?(\w+):(\d+)>").unwrap());

/// Both forms combined, used to locate matches before classifying them.
pub static MEDIA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]+?: [^\] ][^\]]*?\]|<(?:a:)?\w+:\d+>").unwrap());

const EMOJI_CDN: &str = "https://cdn.discordapp.com/emojis";

/// A single embedded-media match inside a text event.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef<'a> {
    /// The exact matched source text, kept for `data-original`.
    pub original: &'a str,
    /// Display label: the attachment label or the emoji name.
    pub label: &'a str,
    pub kind: MediaRefKind<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaRefKind<'a> {
    Attachment { value: &'a str },
    Emoji { id: &'a str, animated: bool },
}

impl<'a> MediaRef<'a> {
    /// Classifies a slice already located by [`MEDIA_PATTERN`].
    ///
    /// Panics if the slice satisfies neither sub-pattern; the combined
    /// pattern is built from the sub-patterns, so that state is a pattern
    /// definition bug, not an input condition.
    pub fn parse(original: &'a str) -> MediaRef<'a> {
        if let Some(caps) = ATTACHMENT_PATTERN.captures(original) {
            return MediaRef {
                original,
                label: caps.get(1).map_or("", |m| m.as_str()),
                kind: MediaRefKind::Attachment {
                    value: caps.get(2).map_or("", |m| m.as_str()),
                },
            };
        }
        if let Some(caps) = EMOJI_PATTERN.captures(original) {
            return MediaRef {
                original,
                label: caps.get(2).map_or("", |m| m.as_str()),
                kind: MediaRefKind::Emoji {
                    id: caps.get(3).map_or("", |m| m.as_str()),
                    animated: caps.get(1).is_some(),
                },
            };
        }
        unreachable!("embedded-media match satisfied neither sub-pattern");
    }

    /// The image source this reference resolves to.
    pub fn src(&self) -> Cow<'a, str> {
        match self.kind {
            MediaRefKind::Attachment { value } => Cow::Borrowed(value),
            MediaRefKind::Emoji { id, animated } => {
                let ext = if animated { "gif" } else { "webp" };
                Cow::Owned(format!("{EMOJI_CDN}/{id}.{ext}?size=24&quality=lossless"))
            }
        }
    }
}

/// Rewrites text events containing media references into alternating text and
/// image events. The output is a fresh sequence; events without references
/// pass through untouched. Text inside code blocks and image alt content is
/// never scanned.
pub fn rewrite_media_references(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut code_depth = 0usize;
    let mut image_depth = 0usize;

    for event in events {
        match &event {
            Event::Start(Tag::CodeBlock(_)) => code_depth += 1,
            Event::End(TagEnd::CodeBlock) => code_depth = code_depth.saturating_sub(1),
            Event::Start(Tag::Image { .. }) => image_depth += 1,
            Event::End(TagEnd::Image) => image_depth = image_depth.saturating_sub(1),
            _ => {}
        }
        match event {
            Event::Text(text) if code_depth == 0 && image_depth == 0 => {
                split_text(text, &mut out);
            }
            other => out.push(other),
        }
    }
    out
}

fn split_text<'a>(text: Cow<'a, str>, out: &mut Vec<Event<'a>>) {
    if !MEDIA_PATTERN.is_match(&text) {
        out.push(Event::Text(text));
        return;
    }
    match text {
        Cow::Borrowed(s) => split_into(s, out, Cow::Borrowed),
        Cow::Owned(s) => split_into(&s, out, |piece: &str| Cow::Owned(piece.to_owned())),
    }
}

fn split_into<'s, 'a>(
    content: &'s str,
    out: &mut Vec<Event<'a>>,
    own: impl Fn(&'s str) -> Cow<'a, str>,
) {
    let found: Vec<regex::Match<'_>> = MEDIA_PATTERN.find_iter(content).collect();
    let last = found.len() - 1;
    let mut previous_end = 0;

    for (index, m) in found.iter().enumerate() {
        let media = MediaRef::parse(m.as_str());
        out.push(Event::Text(strip_references(
            &content[previous_end..m.start()],
            &own,
        )));

        let dest_url = match media.src() {
            Cow::Borrowed(b) => own(b),
            Cow::Owned(o) => Cow::Owned(o),
        };
        out.push(Event::Start(Tag::Image {
            dest_url,
            title: Cow::Borrowed(""),
            original: Some(own(media.original)),
        }));
        out.push(Event::Text(own(media.label)));
        out.push(Event::End(TagEnd::Image));

        previous_end = m.end();
        if index == last {
            out.push(Event::Text(own(&content[m.end()..])));
        }
    }
}

/// Safety net for malformed nesting: unmatched spans are emitted with any
/// residual pattern occurrences removed.
fn strip_references<'s, 'a>(
    span: &'s str,
    own: &impl Fn(&'s str) -> Cow<'a, str>,
) -> Cow<'a, str> {
    match MEDIA_PATTERN.replace_all(span, "") {
        Cow::Borrowed(_) => own(span),
        Cow::Owned(stripped) => Cow::Owned(stripped),
    }
}
