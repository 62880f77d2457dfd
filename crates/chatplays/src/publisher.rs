//! Availability Publisher
//!
//! Tracks the list of commands the plugin currently displays and persists the
//! subset that is enabled. Bursts of recompute requests collapse into at most
//! one write in flight plus one pending follow-up.
//!
//! The publisher itself does no I/O. [`AvailabilityPublisher::request`] and
//! [`AvailabilityPublisher::complete`] tell the owner when to start a write;
//! the owner renders with [`render_snapshot`] and hands the text to a
//! [`SnapshotSink`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::commands::CommandRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Coalescing state machine
// ─────────────────────────────────────────────────────────────────────────────

/// Displayable list plus write coalescing flags
#[derive(Debug, Default)]
pub struct AvailabilityPublisher {
    displayable: Vec<String>,
    writing: bool,
    pending: bool,
}

impl AvailabilityPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayable list
    pub fn declare<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.displayable = ids.into_iter().map(Into::into).collect();
    }

    pub fn clear(&mut self) {
        self.displayable.clear();
    }

    /// Ask for a recompute
    ///
    /// Returns `true` when the caller should start a write now. While a write
    /// is in flight the request is folded into the pending flag.
    pub fn request(&mut self) -> bool {
        if self.writing {
            self.pending = true;
            false
        } else {
            self.writing = true;
            true
        }
    }

    /// Mark the in-flight write finished
    ///
    /// Returns `true` when a follow-up write should start immediately.
    pub fn complete(&mut self) -> bool {
        if std::mem::take(&mut self.pending) {
            true
        } else {
            self.writing = false;
            false
        }
    }

    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Displayable ids that are currently enabled, in displayable order
    pub fn available(&self, registry: &CommandRegistry) -> Vec<String> {
        self.displayable
            .iter()
            .filter(|id| registry.is_enabled(id))
            .cloned()
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

const UNGROUPED: &str = "OTHER";

/// Render the snapshot file contents
///
/// Flat form is `a, b, c`. Grouped form has one `GROUP: a, b` line per group
/// in order of first appearance, each id filed under the first group (by
/// creation order) that contains it, and ungrouped ids under `OTHER`.
pub fn render_snapshot(available: &[String], registry: &CommandRegistry, grouped: bool) -> String {
    if !grouped {
        return available.join(", ");
    }

    let mut lines: Vec<(String, Vec<&str>)> = Vec::new();
    for id in available {
        let label = registry
            .first_group_of(id)
            .map(str::to_uppercase)
            .unwrap_or_else(|| UNGROUPED.to_string());

        match lines.iter_mut().find(|(name, _)| *name == label) {
            Some((_, ids)) => ids.push(id),
            None => lines.push((label, vec![id])),
        }
    }

    lines
        .iter()
        .map(|(name, ids)| format!("{name}: {}", ids.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Destination of rendered snapshots
#[async_trait]
pub trait SnapshotSink: Send + Sync + 'static {
    async fn write(&self, contents: String) -> std::io::Result<()>;
}

/// Writes the snapshot to a file, replacing its contents
#[derive(Debug, Clone)]
pub struct FileSnapshotSink {
    path: PathBuf,
}

impl FileSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty snapshot file if none exists
    pub async fn ensure_exists(&self) -> std::io::Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, "").await
    }
}

#[async_trait]
impl SnapshotSink for FileSnapshotSink {
    async fn write(&self, contents: String) -> std::io::Result<()> {
        tokio::fs::write(&self.path, contents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for id in ["lopen", "ropen", "cams", "stage", "boop"] {
            registry.register(id, None);
            registry.set_enabled(id, Some(true));
        }
        registry.add_to_group("doors", ["lopen", "ropen"]);
        registry.add_to_group("cams", ["cams", "stage"]);
        registry.add_to_group("all", ["lopen", "cams"]);
        registry
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_available_intersects_in_displayable_order() {
        let mut registry = registry();
        registry.set_enabled("ropen", Some(false));

        let mut publisher = AvailabilityPublisher::new();
        publisher.declare(["stage", "ropen", "lopen", "ghost"]);

        assert_eq!(publisher.available(&registry), ids(&["stage", "lopen"]));
    }

    #[test]
    fn test_burst_coalesces_to_two_writes() {
        let mut publisher = AvailabilityPublisher::new();
        let mut writes = 0;

        if publisher.request() {
            writes += 1;
        }
        for _ in 0..10 {
            if publisher.request() {
                writes += 1;
            }
        }
        assert!(publisher.is_pending());

        while publisher.complete() {
            writes += 1;
        }

        assert_eq!(writes, 2);
        assert!(!publisher.is_writing());
        assert!(!publisher.is_pending());
    }

    #[test]
    fn test_request_when_idle_writes_once() {
        let mut publisher = AvailabilityPublisher::new();
        assert!(publisher.request());
        assert!(!publisher.complete());
        assert!(publisher.request());
    }

    #[test]
    fn test_render_flat() {
        let registry = registry();
        let rendered = render_snapshot(&ids(&["lopen", "boop", "cams"]), &registry, false);
        assert_eq!(rendered, "lopen, boop, cams");
        assert_eq!(render_snapshot(&[], &registry, false), "");
    }

    #[test]
    fn test_render_grouped() {
        let registry = registry();
        let rendered = render_snapshot(
            &ids(&["boop", "cams", "lopen", "stage", "ropen"]),
            &registry,
            true,
        );
        assert_eq!(rendered, "OTHER: boop\nCAMS: cams, stage\nDOORS: lopen, ropen");
    }

    #[tokio::test]
    async fn test_file_sink_creates_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSnapshotSink::new(dir.path().join("out").join("available.txt"));

        sink.ensure_exists().await.unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");

        sink.write("lopen, ropen".into()).await.unwrap();
        sink.ensure_exists().await.unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "lopen, ropen");
    }
}
