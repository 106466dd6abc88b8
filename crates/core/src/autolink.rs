//! Turns bare URLs and @mentions in rendered HTML into anchors.
//!
//! Runs as a streaming pass over already-serialized HTML. Text inside
//! existing links and code is left alone.

use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;

use lol_html::html_content::{ContentType, Element, TextChunk};
use lol_html::{RewriteStrSettings, Selector, doc_text, element, rewrite_str};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RenderError;

static LINK_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>]+|@\w+").unwrap());

pub fn rewrite_autolinks(html: &str) -> Result<String, RenderError> {
    let skip_depth = Rc::new(Cell::new(0usize));
    let text_depth = Rc::clone(&skip_depth);
    let mut pending = String::new();

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                skip_region_handler("a", Rc::clone(&skip_depth)),
                skip_region_handler("code", Rc::clone(&skip_depth)),
                skip_region_handler("pre", Rc::clone(&skip_depth)),
            ],
            document_content_handlers: vec![doc_text!(move |chunk| {
                if text_depth.get() == 0 {
                    process_chunk(chunk, &mut pending);
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?;

    Ok(output)
}

fn skip_region_handler(
    selector: &str,
    depth: Rc<Cell<usize>>,
) -> (
    Cow<'static, Selector>,
    lol_html::ElementContentHandlers<'static>,
) {
    element!(selector, move |el: &mut Element| {
        depth.set(depth.get() + 1);
        let on_close = Rc::clone(&depth);
        // None only for void elements, which none of the skipped tags are.
        if let Some(handlers) = el.end_tag_handlers() {
            handlers.push(Box::new(move |_| {
                on_close.set(on_close.get().saturating_sub(1));
                Ok(())
            }));
        }
        Ok(())
    })
}

/// Text nodes can arrive split across several chunks, so chunks are buffered
/// until the final one and the node is linkified as a whole.
fn process_chunk(chunk: &mut TextChunk<'_>, pending: &mut String) {
    if !chunk.last_in_text_node() {
        pending.push_str(chunk.as_str());
        chunk.remove();
        return;
    }

    let buffered = !pending.is_empty();
    let mut text = std::mem::take(pending);
    text.push_str(chunk.as_str());

    match linkified_html(&text) {
        Some(html) => chunk.replace(&html, ContentType::Html),
        None if buffered => chunk.replace(&text, ContentType::Html),
        None => {}
    }
}

/// Takes entity-encoded text and returns it with anchors spliced in, or
/// `None` when nothing in it links.
fn linkified_html(encoded: &str) -> Option<String> {
    if !encoded.contains("http://") && !encoded.contains("https://") && !encoded.contains('@') {
        return None;
    }
    linkify(&decode_entities(encoded))
}

fn linkify(text: &str) -> Option<String> {
    let mut out = String::new();
    let mut cursor = 0;
    let mut changed = false;

    for m in LINK_CANDIDATE.find_iter(text) {
        let candidate = m.as_str();

        if let Some(name) = candidate.strip_prefix('@') {
            // A mention has to start at a word boundary, otherwise it is
            // the tail of an email address or similar.
            let preceded_by_word = text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if preceded_by_word {
                continue;
            }

            escape_into(&text[cursor..m.start()], &mut out);
            out.push_str("<a href=\"#/users/");
            escape_into(name, &mut out);
            out.push_str("\">");
            escape_into(candidate, &mut out);
            out.push_str("</a>");
            cursor = m.end();
            changed = true;
        } else {
            let url = trim_url(candidate);
            let scheme_len = if candidate.starts_with("https") { 8 } else { 7 };
            if url.len() <= scheme_len {
                continue;
            }

            escape_into(&text[cursor..m.start()], &mut out);
            out.push_str("<a href=\"");
            escape_into(url, &mut out);
            out.push_str("\">");
            escape_into(url, &mut out);
            out.push_str("</a>");
            cursor = m.start() + url.len();
            changed = true;
        }
    }

    if !changed {
        return None;
    }

    escape_into(&text[cursor..], &mut out);
    Some(out)
}

/// Drops punctuation that trails a URL in prose. A closing paren stays when
/// the URL itself opened it.
fn trim_url(candidate: &str) -> &str {
    let mut url = candidate;
    loop {
        let Some(last) = url.chars().next_back() else {
            break;
        };
        let trim = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' => true,
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !trim {
            break;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
    url
}

// The serializer only ever emits these entities; `&amp;` has to decode last.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url_becomes_anchor() {
        let html = rewrite_autolinks("<p>see https://example.com now</p>").unwrap();
        assert!(html.contains(r#"<a href="https://example.com">https://example.com</a>"#));
        assert!(html.contains("see "));
        assert!(html.contains(" now"));
    }

    #[test]
    fn trailing_punctuation_stays_outside_the_link() {
        let html = rewrite_autolinks("<p>read https://example.com/a. Then reply.</p>").unwrap();
        assert!(html.contains(r#"<a href="https://example.com/a">https://example.com/a</a>. Then"#));
    }

    #[test]
    fn balanced_parens_stay_in_the_link() {
        let html =
            rewrite_autolinks("<p>(see https://en.wikipedia.org/wiki/Rust_(film))</p>").unwrap();
        assert!(html.contains(r#"href="https://en.wikipedia.org/wiki/Rust_(film)""#));
        assert!(html.contains("</a>)"));
    }

    #[test]
    fn existing_anchors_are_not_relinked() {
        let input = r#"<p><a href="https://x.com">https://x.com</a></p>"#;
        let html = rewrite_autolinks(input).unwrap();
        assert_eq!(html.matches("<a ").count(), 1);
    }

    #[test]
    fn code_is_left_alone() {
        let html = rewrite_autolinks("<p><code>https://x.com</code></p>").unwrap();
        assert!(!html.contains("<a "));
        let html = rewrite_autolinks("<pre><code>https://x.com</code></pre>").unwrap();
        assert!(!html.contains("<a "));
    }

    #[test]
    fn text_after_a_skipped_region_links_again() {
        let html =
            rewrite_autolinks("<p><code>ssh</code> docs at https://example.com/ssh</p>").unwrap();
        assert!(html.contains(r#"<a href="https://example.com/ssh">"#));
        let html = rewrite_autolinks(
            r#"<p><a href="https://x.com">x</a> or https://example.com/alt</p>"#,
        )
        .unwrap();
        assert!(html.contains(r#"<a href="https://example.com/alt">"#));
    }

    #[test]
    fn mention_links_to_the_user_route() {
        let html = rewrite_autolinks("<p>hi @sam!</p>").unwrap();
        assert!(html.contains(r##"<a href="#/users/sam">@sam</a>!"##));
    }

    #[test]
    fn email_addresses_are_not_mentions() {
        let html = rewrite_autolinks("<p>mail user@example.com</p>").unwrap();
        assert!(!html.contains("#/users/"));
        assert!(html.contains("user@example.com"));
    }

    #[test]
    fn entities_in_urls_survive_one_round() {
        let html = rewrite_autolinks("<p>https://x.com/?a=1&amp;b=2</p>").unwrap();
        assert!(html.contains(r#"href="https://x.com/?a=1&amp;b=2""#));
        assert!(!html.contains("&amp;amp;"));
    }

    #[test]
    fn top_level_text_is_linkified() {
        let html = rewrite_autolinks("see https://x.com/a").unwrap();
        assert!(html.contains(r#"<a href="https://x.com/a">"#));
    }
}
