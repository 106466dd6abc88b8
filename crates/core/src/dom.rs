//! Small helpers around the kuchikiki document tree.

use kuchikiki::traits::TendrilSink;
use kuchikiki::{Attribute, ExpandedName, NodeRef};
use markup5ever::{namespace_url, ns, LocalName, QualName};

use crate::error::RenderError;

pub(crate) fn parse_document(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

/// The tree builder always synthesizes a `<body>`, so a miss here means the
/// input was not a document node.
pub(crate) fn body_of(document: &NodeRef) -> Result<NodeRef, RenderError> {
    document
        .select_first("body")
        .map(|body| body.as_node().clone())
        .map_err(|()| RenderError::MissingBody)
}

/// Serializes the markup inside `node`, without `node`'s own tags.
pub(crate) fn inner_html(node: &NodeRef) -> Result<String, RenderError> {
    let mut buf = Vec::new();
    for child in node.children() {
        child.serialize(&mut buf)?;
    }
    Ok(String::from_utf8(buf)?)
}

pub(crate) fn new_element(name: &str, attrs: Vec<(&str, String)>) -> NodeRef {
    NodeRef::new_element(
        QualName::new(None, ns!(html), LocalName::from(name)),
        attrs.into_iter().map(|(attr_name, value)| {
            (
                ExpandedName::new("", attr_name),
                Attribute {
                    prefix: None,
                    value,
                },
            )
        }),
    )
}
