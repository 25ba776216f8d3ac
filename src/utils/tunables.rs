//! Hot-reloadable retrieval tunables (§9 design note: "expose thresholds
//! as configuration, not hardcoded constants, and provide a diagnostic
//! mode").
//!
//! Grounded on the teacher's `AresConfigManager` hot-reload idiom
//! (`ArcSwap` snapshot + `notify` file watcher, debounced reload), scoped
//! down from a full agent/tool/workflow TOML tree to the handful of
//! numbers an operator plausibly wants to tune without a redeploy:
//! similarity threshold, quality drop threshold, and default top-K.
//! Everything else in [`RagConfig`](super::config::RagConfig) is read
//! once at startup and left alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::types::{AppError, Result};

/// Retrieval knobs an operator can adjust at runtime by editing the
/// tunables file, without restarting the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tunables {
    /// Minimum cosine similarity a retrieved chunk must clear.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Below this quality score a chunk is dropped at ingestion time (C8).
    #[serde(default = "default_quality_drop_threshold")]
    pub quality_drop_threshold: f32,
    /// Default number of chunks retrieved per query, absent an explicit `top_k`.
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
}

fn default_similarity_threshold() -> f32 {
    0.35
}

fn default_quality_drop_threshold() -> f32 {
    0.2
}

fn default_top_k() -> usize {
    5
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            quality_drop_threshold: default_quality_drop_threshold(),
            top_k_default: default_top_k(),
        }
    }
}

impl Tunables {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Configuration(format!("reading {path:?}: {e}")))?;
        toml::from_str(&raw).map_err(|e| AppError::Configuration(format!("parsing {path:?}: {e}")))
    }
}

/// Thread-safe holder for the current [`Tunables`] snapshot, optionally
/// watching its backing file for changes.
pub struct TunablesManager {
    current: Arc<ArcSwap<Tunables>>,
    path: Option<PathBuf>,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl TunablesManager {
    /// Start from the built-in defaults, with no backing file.
    pub fn in_memory(initial: Tunables) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            path: None,
            watcher: RwLock::new(None),
        }
    }

    /// Load from a TOML file on disk. Missing file falls back to defaults
    /// with a warning rather than a fatal error, since thresholds are
    /// operational tuning, not required configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let initial = match Tunables::load(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!("tunables file {:?} not usable ({e}), using defaults", path);
                Tunables::default()
            }
        };
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            path: Some(path),
            watcher: RwLock::new(None),
        }
    }

    /// Current snapshot (lock-free read).
    pub fn get(&self) -> Arc<Tunables> {
        self.current.load_full()
    }

    /// Begin watching the backing file for changes, reloading on write
    /// events with a short debounce. A no-op for an in-memory manager.
    pub fn start_watching(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let current = Arc::clone(&self.current);

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => error!("tunables watcher error: {e}"),
            }
        })
        .map_err(|e| AppError::Configuration(format!("starting watcher: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            watcher
                .watch(parent, RecursiveMode::NonRecursive)
                .map_err(|e| AppError::Configuration(format!("watching {parent:?}: {e}")))?;
        }
        *self.watcher.write() = Some(watcher);

        let reload_path = path.clone();
        tokio::spawn(async move {
            let mut last_reload = std::time::Instant::now();
            let debounce = Duration::from_millis(500);
            while rx.recv().await.is_some() {
                if last_reload.elapsed() < debounce {
                    continue;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                match Tunables::load(&reload_path) {
                    Ok(updated) => {
                        current.store(Arc::new(updated));
                        info!("tunables reloaded from {:?}", reload_path);
                        last_reload = std::time::Instant::now();
                    }
                    Err(e) => warn!("failed to reload tunables from {:?}: {e}", reload_path),
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_valid_ranges() {
        let t = Tunables::default();
        assert!((0.0..=1.0).contains(&t.similarity_threshold));
        assert!((0.0..=1.0).contains(&t.quality_drop_threshold));
        assert!(t.top_k_default > 0);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let manager = TunablesManager::load_or_default("/nonexistent/path/tunables.toml");
        assert_eq!(*manager.get(), Tunables::default());
    }

    #[test]
    fn parses_partial_toml_with_field_defaults() {
        let dir = std::env::temp_dir().join(format!(
            "ticobot-rag-tunables-test-{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tunables.toml");
        std::fs::write(&path, "similarity_threshold = 0.5\n").unwrap();

        let manager = TunablesManager::load_or_default(&path);
        let snapshot = manager.get();
        assert_eq!(snapshot.similarity_threshold, 0.5);
        assert_eq!(snapshot.top_k_default, default_top_k());

        std::fs::remove_dir_all(&dir).ok();
    }
}
