//! Click-to-load embed buttons for links to hosted projects.

use std::collections::HashSet;

use kuchikiki::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom;

static PROJECT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(http(s)?://)?(scratch.mit.edu/projects|turbowarp.org)/(?P<id>\d+)/?").unwrap()
});

const EMBED_WIDTH: &str = "485";
const EMBED_HEIGHT: &str = "402";

/// Scans bare autolinked URLs for project links and appends one button per
/// distinct project id. The anchors themselves stay in the text.
pub(crate) fn append_project_buttons(body: &NodeRef, load_project_text: &str) {
    let mut seen = HashSet::new();
    let mut buttons = Vec::new();

    for anchor in body.select("a").unwrap() {
        let attrs = anchor.attributes.borrow();
        let Some(href) = attrs.get("href") else {
            continue;
        };
        if anchor.as_node().text_contents() != href {
            continue;
        }
        let Some(caps) = PROJECT_PATTERN.captures(href) else {
            continue;
        };

        let id = caps["id"].to_owned();
        if !seen.insert(id.clone()) {
            continue;
        }

        let embed_src = format!("https://{}/{}/embed", &caps[3], id);
        let button = dom::new_element(
            "button",
            vec![
                ("class", "bg-accent text-accent-text px-2 py-1 rounded-xl".to_owned()),
                ("data-project-id", id.clone()),
                ("data-embed-src", embed_src),
                ("data-embed-width", EMBED_WIDTH.to_owned()),
                ("data-embed-height", EMBED_HEIGHT.to_owned()),
            ],
        );
        button.append(NodeRef::new_text(format!("{load_project_text} ({id})")));
        buttons.push(button);
    }

    if buttons.is_empty() {
        return;
    }

    let container = dom::new_element("div", vec![("class", "flex gap-2 flex-wrap".to_owned())]);
    for button in buttons {
        container.append(button);
    }
    body.append(container);
}
