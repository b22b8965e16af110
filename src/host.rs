//! Page hosts.
//!
//! A [`PageHost`] bundles the document tree the engine reads subtitles from
//! with the page's media element and current location. Two hosts ship here:
//! [`StaticPage`] keeps an in-memory document that callers mutate directly,
//! and [`SnapshotFilePage`] mirrors a JSON snapshot file, re-reading it
//! whenever it changes on disk.

use crate::dom::{Document, DocumentTree, NodeSpec};
use crate::playback::{MediaElement, MediaState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// A page the engine can track
pub trait PageHost: Send + 'static {
    type Tree: DocumentTree;

    /// Bring the host's view of the page up to date before it is read
    fn refresh(&mut self) {}

    /// The current document tree
    fn document(&self) -> &Self::Tree;

    /// The page's media element, if it has one
    fn media(&self) -> Option<&dyn MediaElement>;

    fn media_mut(&mut self) -> Option<&mut dyn MediaElement>;

    /// Write the video volume to the media element. Returns whether the page
    /// had one.
    fn set_video_volume(&mut self, volume: f32) -> bool {
        match self.media_mut() {
            Some(media) => {
                media.set_volume(volume);
                true
            }
            None => false,
        }
    }

    /// Current page location; a change counts as navigation
    fn location(&self) -> Option<&str> {
        None
    }
}

/// Errors loading a page snapshot
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized page: location, media state and body nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub media: Option<MediaState>,

    #[serde(default)]
    pub body: Vec<NodeSpec>,
}

impl PageSnapshot {
    pub fn from_json(json: &str) -> Result<Self, HostError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// In-memory page
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    document: Document,
    media: Option<MediaState>,
    url: Option<String>,
}

impl StaticPage {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            media: None,
            url: None,
        }
    }

    pub fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        Self {
            document: Document::from_nodes(&snapshot.body),
            media: snapshot.media,
            url: snapshot.url.clone(),
        }
    }

    pub fn with_media(mut self, media: MediaState) -> Self {
        self.media = Some(media);
        self
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn replace_document(&mut self, document: Document) {
        self.document = document;
    }

    pub fn set_media(&mut self, media: Option<MediaState>) {
        self.media = media;
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }
}

impl PageHost for StaticPage {
    type Tree = Document;

    fn document(&self) -> &Document {
        &self.document
    }

    fn media(&self) -> Option<&dyn MediaElement> {
        self.media.as_ref().map(|m| m as &dyn MediaElement)
    }

    fn media_mut(&mut self) -> Option<&mut dyn MediaElement> {
        self.media.as_mut().map(|m| m as &mut dyn MediaElement)
    }

    fn location(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// Page mirrored from a JSON snapshot file.
///
/// A volume set on the media element survives reloads of the file.
pub struct SnapshotFilePage {
    path: PathBuf,
    page: StaticPage,
    modified: Option<SystemTime>,
    video_volume: Option<f32>,
    /// Last reload failure, logged once until it changes
    last_error: Option<String>,
}

impl SnapshotFilePage {
    /// Load the snapshot at `path`; fails if it cannot be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        let (page, modified) = read_snapshot(&path)?;
        info!("Loaded page snapshot from {:?}", path);
        Ok(Self {
            path,
            page,
            modified,
            video_volume: None,
            last_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The most recent reload failure, until a reload succeeds
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Re-read the file if it changed since the last read.
    ///
    /// Returns whether the page was reloaded. A broken update is logged and
    /// the previous page is kept.
    pub fn reload_if_changed(&mut self) -> bool {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if modified.is_some() && modified == self.modified {
            return false;
        }

        match read_snapshot(&self.path) {
            Ok((mut page, modified)) => {
                debug!("Page snapshot {:?} changed, reloaded", self.path);
                if let Some(volume) = self.video_volume {
                    page.set_video_volume(volume);
                }
                if self.last_error.take().is_some() {
                    info!("Page snapshot {:?} readable again", self.path);
                }
                self.page = page;
                self.modified = modified;
                true
            }
            Err(e) => {
                let message = e.to_string();
                if self.last_error.as_deref() == Some(message.as_str()) {
                    trace!("Page snapshot {:?} still unreadable", self.path);
                } else {
                    warn!("Keeping previous page, failed to reload {:?}: {}", self.path, message);
                    self.last_error = Some(message);
                }
                false
            }
        }
    }
}

fn read_snapshot(path: &Path) -> Result<(StaticPage, Option<SystemTime>), HostError> {
    let modified = std::fs::metadata(path)?.modified().ok();
    let contents = std::fs::read_to_string(path)?;
    let snapshot = PageSnapshot::from_json(&contents)?;
    Ok((StaticPage::from_snapshot(&snapshot), modified))
}

impl PageHost for SnapshotFilePage {
    type Tree = Document;

    fn refresh(&mut self) {
        self.reload_if_changed();
    }

    fn document(&self) -> &Document {
        self.page.document()
    }

    fn media(&self) -> Option<&dyn MediaElement> {
        self.page.media()
    }

    fn media_mut(&mut self) -> Option<&mut dyn MediaElement> {
        self.page.media_mut()
    }

    fn set_video_volume(&mut self, volume: f32) -> bool {
        self.video_volume = Some(volume);
        self.page.set_video_volume(volume)
    }

    fn location(&self) -> Option<&str> {
        self.page.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator;

    const PAGE: &str = r#"{
        "url": "https://www.youtube.com/watch?v=abc",
        "media": {"paused": false},
        "body": [
            {"class": "caption-window", "children": [
                {"tag": "span", "class": "sub-line", "text": "Hello"},
                {"tag": "span", "class": "sub-line", "text": "World"}
            ]}
        ]
    }"#;

    #[test]
    fn test_static_page_from_snapshot() {
        let snapshot = PageSnapshot::from_json(PAGE).unwrap();
        let page = StaticPage::from_snapshot(&snapshot);

        assert_eq!(page.location(), Some("https://www.youtube.com/watch?v=abc"));
        assert!(!page.media().unwrap().paused());
        assert_eq!(locator::snapshot(page.document(), ".sub-line").text, "Hello World");
    }

    #[test]
    fn test_invalid_snapshot() {
        assert!(PageSnapshot::from_json("{\"body\": 5}").is_err());
    }

    #[test]
    fn test_snapshot_file_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        std::fs::write(&path, PAGE).unwrap();

        let mut page = SnapshotFilePage::load(&path).unwrap();
        assert_eq!(locator::snapshot(page.document(), ".sub-line").text, "Hello World");

        // Force a different modification time regardless of clock granularity
        page.modified = None;
        std::fs::write(
            &path,
            r#"{"body": [{"class": "sub-line", "text": "Goodbye"}]}"#,
        )
        .unwrap();
        assert!(page.reload_if_changed());
        assert_eq!(locator::snapshot(page.document(), ".sub-line").text, "Goodbye");
        assert!(page.media().is_none());

        // Unchanged file is not reloaded
        assert!(!page.reload_if_changed());
    }

    #[test]
    fn test_broken_update_keeps_previous_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        std::fs::write(&path, PAGE).unwrap();

        let mut page = SnapshotFilePage::load(&path).unwrap();
        page.modified = None;
        std::fs::write(&path, "{ not json").unwrap();

        assert!(!page.reload_if_changed());
        assert_eq!(locator::snapshot(page.document(), ".sub-line").text, "Hello World");
    }

    #[test]
    fn test_deleted_file_failure_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        std::fs::write(&path, PAGE).unwrap();

        let mut page = SnapshotFilePage::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(!page.reload_if_changed());
        let first = page.last_error().map(str::to_string);
        assert!(first.is_some());
        assert!(!page.reload_if_changed());
        assert_eq!(page.last_error().map(str::to_string), first);
        assert_eq!(locator::snapshot(page.document(), ".sub-line").text, "Hello World");

        std::fs::write(&path, PAGE).unwrap();
        page.modified = None;
        assert!(page.reload_if_changed());
        assert!(page.last_error().is_none());
    }

    #[test]
    fn test_video_volume_applies_to_media() {
        let mut page = StaticPage::default();
        assert!(!page.set_video_volume(0.4));

        page.set_media(Some(MediaState::playing()));
        assert!(page.set_video_volume(0.4));
        assert_eq!(page.media().unwrap().volume(), 0.4);
    }

    #[test]
    fn test_video_volume_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        std::fs::write(&path, PAGE).unwrap();

        let mut page = SnapshotFilePage::load(&path).unwrap();
        assert_eq!(page.media().unwrap().volume(), 1.0);
        assert!(page.set_video_volume(0.2));

        page.modified = None;
        assert!(page.reload_if_changed());
        assert_eq!(page.media().unwrap().volume(), 0.2);
    }

    #[test]
    fn test_missing_file() {
        assert!(SnapshotFilePage::load("/nonexistent/page.json").is_err());
    }
}
