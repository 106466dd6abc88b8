//! Allow-list filtering for rendered images.
//!
//! Classifies every `<img>` first, then applies the decisions, so the tree
//! is never mutated while it is being scanned.

use kuchikiki::{Attributes, NodeRef};

use crate::RenderOptions;
use crate::dom;

enum ImageAction {
    /// Replace the image with a `<span>` holding its source syntax.
    Strip { text: String },
    /// Detach the image and re-append it at the end of the body.
    Float,
    /// Leave the image in place with the `inline-block` class.
    Mark,
}

pub(crate) fn filter_images(body: &NodeRef, options: &RenderOptions) {
    let mut decisions = Vec::new();
    for img in body.select("img").unwrap() {
        let action = classify(&img.attributes.borrow(), options);
        decisions.push((img.as_node().clone(), action));
    }

    let mut stripped = 0usize;
    let mut marked = 0usize;
    let mut floats = Vec::new();
    for (node, action) in decisions {
        match action {
            ImageAction::Strip { text } => {
                let span = dom::new_element("span", vec![]);
                span.append(NodeRef::new_text(text));
                node.insert_after(span);
                node.detach();
                stripped += 1;
            }
            ImageAction::Float => floats.push(node),
            ImageAction::Mark => {
                if let Some(element) = node.as_element() {
                    let mut attrs = element.attributes.borrow_mut();
                    let classes = attrs.get("class").unwrap_or("");
                    if !classes.split_ascii_whitespace().any(|class| class == "inline-block") {
                        let updated = if classes.is_empty() {
                            "inline-block".to_owned()
                        } else {
                            format!("{classes} inline-block")
                        };
                        attrs.insert("class", updated);
                    }
                }
                marked += 1;
            }
        }
    }

    tracing::debug!(stripped, floated = floats.len(), marked, "filtered images");

    for node in floats {
        node.detach();
        body.append(node);
    }
}

fn classify(attrs: &Attributes, options: &RenderOptions) -> ImageAction {
    let src = attrs.get("src").unwrap_or("");
    let trusted = options.any_image_host
        || options
            .image_hosts
            .iter()
            .any(|host| src.starts_with(host.as_str()));

    if !options.images || !trusted {
        let text = match attrs.get("data-original") {
            Some(original) => original.to_owned(),
            None => format!("![{}]({})", attrs.get("alt").unwrap_or(""), src),
        };
        return ImageAction::Strip { text };
    }

    // Only attachment references (original syntax not starting with `<`)
    // move out of the text flow; emoji and standard images stay inline.
    // Floating is a block-level layout move, so inline fragments mark too.
    match attrs.get("data-original") {
        Some(original) if !original.starts_with('<') && !options.inline => ImageAction::Float,
        _ => ImageAction::Mark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{body_of, inner_html, parse_document};

    const EMOJI_IMG: &str = r#"<img src="https://cdn.discordapp.com/emojis/1.webp" alt="party" data-original="&lt;party:1&gt;">"#;
    const ATTACHMENT_IMG: &str = r#"<img src="https://u.cubeupload.com/shot.png" alt="shot" data-original="[shot: https://u.cubeupload.com/shot.png]">"#;

    fn filtered(html: &str, options: &RenderOptions) -> String {
        let document = parse_document(html);
        let body = body_of(&document).unwrap();
        filter_images(&body, options);
        inner_html(&body).unwrap()
    }

    #[test]
    fn untrusted_image_strips_to_its_source_syntax() {
        let html = filtered(
            r#"<p>see <img src="report.pdf" alt="file" data-original="[file: report.pdf]"></p>"#,
            &RenderOptions::default(),
        );
        assert!(!html.contains("<img"));
        assert!(html.contains("<span>[file: report.pdf]</span>"));
    }

    #[test]
    fn untrusted_image_without_source_syntax_reconstructs_markdown() {
        let html = filtered(
            r#"<p><img src="https://elsewhere.example/cat.png" alt="cat"></p>"#,
            &RenderOptions::default(),
        );
        assert!(html.contains("<span>![cat](https://elsewhere.example/cat.png)</span>"));
    }

    #[test]
    fn disabling_images_strips_even_trusted_ones() {
        let options = RenderOptions {
            images: false,
            ..RenderOptions::default()
        };
        let html = filtered(&format!("<p>{EMOJI_IMG}</p>"), &options);
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;party:1&gt;"));
    }

    #[test]
    fn any_image_host_bypasses_the_allow_list() {
        let options = RenderOptions {
            any_image_host: true,
            ..RenderOptions::default()
        };
        let html = filtered(
            r#"<p><img src="https://elsewhere.example/cat.png" alt="cat"></p>"#,
            &options,
        );
        assert!(html.contains("<img"));
    }

    #[test]
    fn attachment_image_floats_to_the_end_of_the_body() {
        let html = filtered(
            &format!("<p>a {ATTACHMENT_IMG} b</p>"),
            &RenderOptions::default(),
        );
        assert!(html.contains("<p>a  b</p>"));
        let paragraph_end = html.find("</p>").unwrap();
        let image = html.find("<img").unwrap();
        assert!(image > paragraph_end);
    }

    #[test]
    fn emoji_image_stays_inline() {
        let html = filtered(
            &format!("<p>a {EMOJI_IMG} b</p>"),
            &RenderOptions::default(),
        );
        let paragraph_end = html.find("</p>").unwrap();
        let image = html.find("<img").unwrap();
        assert!(image < paragraph_end);
        assert!(html.contains(r#"class="inline-block""#));
    }

    #[test]
    fn inline_mode_keeps_attachment_images_in_place() {
        let options = RenderOptions {
            inline: true,
            ..RenderOptions::default()
        };
        let html = filtered(&format!("a {ATTACHMENT_IMG} b"), &options);
        assert!(html.starts_with("a <img"));
        assert!(html.contains(r#"class="inline-block""#));
    }

    #[test]
    fn standard_image_is_marked_for_inline_display() {
        let html = filtered(
            r#"<p><img src="https://cdn.discordapp.com/emojis/1.webp" alt="a"></p>"#,
            &RenderOptions::default(),
        );
        assert!(html.contains(r#"class="inline-block""#));
        assert!(html.contains("<p>"));
    }

    #[test]
    fn filtering_is_idempotent() {
        let input = format!(
            r#"<p>a {ATTACHMENT_IMG} {EMOJI_IMG} <img src="x.png" alt="x"> <img src="https://cdn.discordapp.com/emojis/2.webp" alt="b"></p>"#
        );
        let once = filtered(&input, &RenderOptions::default());
        let twice = filtered(&once, &RenderOptions::default());
        assert_eq!(once, twice);
    }
}
