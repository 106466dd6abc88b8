//! Markdown rendering for chat messages.
//!
//! A message runs through a fixed pipeline: Markdown is parsed into
//! [`event::Event`]s, embedded-media references in plain text are spliced in
//! as image events, the events render to HTML, and the document passes
//! (image allow-listing, autolinking, project-embed buttons, media-type
//! upgrade) mutate the parsed tree before it is handed back.

pub mod error;
pub mod event;
pub mod html_renderer;
pub mod markdown_adapter;
pub mod media_refs;

mod autolink;
mod dom;
mod highlight;
mod image_filter;
mod media_probe;
mod project_embeds;

use kuchikiki::NodeRef;
use serde::Deserialize;

pub use crate::error::RenderError;
pub use crate::event::{Event, Tag, TagEnd};

/// URL prefixes images may load from unless [`RenderOptions::any_image_host`]
/// is set.
pub const DEFAULT_IMAGE_HOSTS: &[&str] = &[
    "https://cdn.discordapp.com/emojis/",
    "https://cdn.scratch.mit.edu/",
    "https://cdn2.scratch.mit.edu/",
    "https://uploads.scratch.mit.edu/",
    "https://u.cubeupload.com/",
];

/// Options for one rendering pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Render without paragraph wrappers and without block-level extras
    /// (floated images, project-embed buttons).
    pub inline: bool,
    /// Master toggle for images. When off, every image renders as its source
    /// syntax in a `<span>`.
    pub images: bool,
    /// Trust every image host instead of checking the allow-list.
    pub any_image_host: bool,
    /// Label for project-embed buttons; the project id is appended as
    /// ` (<id>)`.
    pub load_project_text: String,
    /// URL prefixes images may load from.
    pub image_hosts: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            inline: false,
            images: true,
            any_image_host: false,
            load_project_text: "Load project".to_owned(),
            image_hosts: DEFAULT_IMAGE_HOSTS
                .iter()
                .map(|host| (*host).to_owned())
                .collect(),
        }
    }
}

/// Renders Markdown to an HTML string with embedded-media references already
/// spliced in. This is the synchronous half of the pipeline; the document
/// passes in [`render_document`] build on its output.
pub fn render_html(markdown: &str, inline: bool) -> Result<String, RenderError> {
    let events = media_refs::rewrite_media_references(markdown_adapter::parse_events(markdown));
    let html = html_renderer::HtmlRenderer::new(Vec::new(), inline).render(events)?;
    Ok(String::from_utf8(html)?)
}

/// The processed message body. The tree can keep changing after it is
/// returned while media probes finish.
pub struct ProcessedDocument {
    body: NodeRef,
}

impl ProcessedDocument {
    pub fn body(&self) -> &NodeRef {
        &self.body
    }

    /// Serializes the body's current contents.
    pub fn html(&self) -> Result<String, RenderError> {
        dom::inner_html(&self.body)
    }
}

/// Runs the full pipeline on one message.
///
/// The body comes back once the synchronous passes are done. Media probes
/// are spawned onto the current [`tokio::task::LocalSet`] and upgrade
/// matching images in the background, so callers must tolerate the tree
/// mutating after the return.
pub fn render_document(
    markdown: &str,
    options: &RenderOptions,
) -> Result<ProcessedDocument, RenderError> {
    let html = render_html(markdown, options.inline)?;
    tracing::trace!(bytes = html.len(), inline = options.inline, "rendered message html");

    let document = dom::parse_document(&html);
    let body = dom::body_of(&document)?;
    image_filter::filter_images(&body, options);

    let linked = autolink::rewrite_autolinks(&dom::inner_html(&body)?)?;
    let document = dom::parse_document(&linked);
    let body = dom::body_of(&document)?;

    if !options.inline {
        project_embeds::append_project_buttons(&body, &options.load_project_text);
    }
    media_probe::spawn_media_probes(&body);

    Ok(ProcessedDocument { body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_allow_the_emoji_cdn() {
        let options = RenderOptions::default();
        assert!(options.images);
        assert!(!options.inline);
        assert!(!options.any_image_host);
        assert!(
            options
                .image_hosts
                .iter()
                .any(|host| host.starts_with("https://cdn.discordapp.com/emojis"))
        );
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"anyImageHost": true, "loadProjectText": "Open"}"#).unwrap();
        assert!(options.any_image_host);
        assert_eq!(options.load_project_text, "Open");
        assert!(options.images);
    }

    #[test]
    fn render_html_handles_plain_markdown() {
        let html = render_html("# Hello, World!", false).unwrap();
        assert!(html.contains("<h1>Hello, World!</h1>"));

        let html = render_html("* Item 1\n* Item 2", false).unwrap();
        assert!(html.contains("<ul>"));
        assert!(html.contains("<li>Item 1</li>"));
    }

    #[test]
    fn render_document_strips_untrusted_images() {
        let doc = render_document("see [file: report.pdf]", &RenderOptions::default()).unwrap();
        let html = doc.html().unwrap();
        assert!(html.contains("<span>[file: report.pdf]</span>"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn render_document_passes_plain_text_through() {
        let doc = render_document("just words", &RenderOptions::default()).unwrap();
        assert_eq!(doc.html().unwrap(), "<p>just words</p>\n");
    }
}
