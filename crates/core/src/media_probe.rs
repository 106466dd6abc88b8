//! Background upgrade of images whose source is really audio or video.

use kuchikiki::NodeRef;
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;

use crate::dom;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Audio,
    Video,
}

/// Spawns one fire-and-forget probe per image onto the current
/// [`tokio::task::LocalSet`]. Each probe fetches the image source and, when
/// the response says audio or video, swaps the element for a player. Probes
/// are independent; one failing leaves the others and its own image alone.
pub(crate) fn spawn_media_probes(body: &NodeRef) {
    for img in body.select("img").unwrap() {
        let Some(src) = img.attributes.borrow().get("src").map(str::to_owned) else {
            continue;
        };
        let node = img.as_node().clone();
        tokio::task::spawn_local(async move {
            if let Some(kind) = probe(&src).await {
                upgrade_to_player(&node, kind, &src);
            }
        });
    }
}

async fn probe(src: &str) -> Option<MediaKind> {
    let response = match CLIENT.get(src).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(url = src, error = %err, "media probe failed");
            return None;
        }
    };
    if response.status().as_u16() != 200 {
        return None;
    }
    let content_type = response.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    media_kind(content_type)
}

fn media_kind(content_type: &str) -> Option<MediaKind> {
    if content_type.starts_with("audio/") {
        Some(MediaKind::Audio)
    } else if content_type.starts_with("video/") {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn upgrade_to_player(img: &NodeRef, kind: MediaKind, src: &str) {
    let tag = match kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
    };
    let player = dom::new_element(
        tag,
        vec![("src", src.to_owned()), ("controls", String::new())],
    );
    img.insert_after(player);
    img.detach();
}
