//! Re-sync the registry when the skills directory changes on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::{debug, info, warn};

use crate::engine::SkillEngine;
use crate::tools::SkillStore;

/// Quiet period before a burst of file events triggers one re-sync.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch the store's directory and re-sync `engine` after each burst of
/// changes.  The watch stops when the returned handle is dropped.
pub fn watch_store(
    engine: Arc<SkillEngine>,
    store: SkillStore,
) -> anyhow::Result<Debouncer<RecommendedWatcher>> {
    let dir: PathBuf = store
        .root()
        .context("cannot watch skills: no skills directory is configured")?
        .to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating skills dir {}", dir.display()))?;

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) if events.is_empty() => {}
        Ok(events) => {
            debug!(events = events.len(), "skills directory changed");
            match store.resync(&engine) {
                Ok(count) => info!(count, "skills re-synced from disk"),
                Err(e) => warn!(error = %e, "skills re-sync failed"),
            }
        }
        Err(e) => warn!(error = ?e, "skills watcher error"),
    })
    .context("starting skills watcher")?;

    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", dir.display()))?;
    info!(dir = %dir.display(), "watching skills directory");
    Ok(debouncer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_store_cannot_be_watched() {
        let engine = Arc::new(SkillEngine::default());
        assert!(watch_store(engine, SkillStore::unconfigured()).is_err());
    }
}
