use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Errors surfaced while turning a message into display HTML.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("link rewriting failed: {0}")]
    Autolink(#[from] lol_html::errors::RewritingError),

    #[error("serializing the document failed: {0}")]
    Serialize(#[from] io::Error),

    #[error("document serialized to invalid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("parsed document has no body element")]
    MissingBody,
}
