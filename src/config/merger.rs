//! Layered configuration with hot reload.
//!
//! Sources are merged forward, in registration order, into one live tree. The tree only
//! ever moves forward: a source change is merged over the current tree, so keys a source
//! stops providing keep their last value. Every effective change publishes a fresh
//! [`Configuration`] snapshot and runs the registered listeners.

use crate::config::loader::{ConfigSource, SourceNotifier, SourceWatch};
use crate::config::resolved::Configuration;
use crate::error::ConfigError;
use crate::merge::deep_merge;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Called with the new snapshot after every effective configuration change.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, config: &Arc<Configuration>);

    /// A closed listener is dropped from the merger at the next subscribe or merge.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> ChangeListener for F
where
    F: Fn(&Arc<Configuration>) + Send + Sync,
{
    fn on_change(&self, config: &Arc<Configuration>) {
        self(config)
    }
}

pub struct ConfigMerger {
    sources: Vec<Arc<dyn ConfigSource>>,
    live: ArcSwap<Configuration>,
    writer: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

/// Keeps source watchers and the reload task alive. Dropping it stops hot reload.
pub struct ConfigWatch {
    _watches: Vec<SourceWatch>,
    task: JoinHandle<()>,
}

impl Drop for ConfigWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ConfigMerger {
    /// Sources are given lowest precedence first.
    pub fn new(sources: Vec<Arc<dyn ConfigSource>>) -> Self {
        Self {
            sources,
            live: ArcSwap::from_pointee(Configuration::default()),
            writer: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Add a source above all existing ones.
    pub fn with_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Current snapshot. Readers keep the `Arc` they loaded for as long as they need it.
    pub fn snapshot(&self) -> Arc<Configuration> {
        self.live.load_full()
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        let mut listeners = self.write_listeners();
        listeners.retain(|l| !l.is_closed());
        listeners.push(listener);
    }

    /// Live listeners, closed ones excluded.
    pub fn listener_count(&self) -> usize {
        self.read_listeners().iter().filter(|l| !l.is_closed()).count()
    }

    /// Initial retrieval: load every source in order and merge what loads. A failing source
    /// is logged and skipped. Listeners are not invoked.
    pub async fn retrieve(&self) -> Arc<Configuration> {
        let mut loaded = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.load().await {
                Ok(value) => loaded.push(value),
                Err(e) => tracing::error!(source = %source.name(), error = %e, "config source failed; continuing without it"),
            }
        }
        let _guard = self.lock_writer();
        let mut tree = self.live.load().tree().clone();
        for value in loaded {
            deep_merge(&mut tree, value);
        }
        let config = Arc::new(Configuration::resolve(tree));
        self.live.store(config.clone());
        tracing::info!(mode = %config.mode(), port = config.port(), debug = config.debug(), "configuration retrieved");
        config
    }

    /// Merge `value` forward into the live tree. Returns the new snapshot, or `None` when the
    /// merge changed nothing (listeners are then not invoked).
    pub fn merge(&self, value: Value) -> Option<Arc<Configuration>> {
        let config = {
            let _guard = self.lock_writer();
            let current = self.live.load_full();
            let mut tree = current.tree().clone();
            deep_merge(&mut tree, value);
            if &tree == current.tree() {
                return None;
            }
            let config = Arc::new(Configuration::resolve(tree));
            self.live.store(config.clone());
            config
        };
        let listeners: Vec<Arc<dyn ChangeListener>> = {
            let mut listeners = self.write_listeners();
            listeners.retain(|l| !l.is_closed());
            listeners.clone()
        };
        for listener in listeners {
            listener.on_change(&config);
        }
        Some(config)
    }

    /// Start watching every source. Each notification reloads that source and merges it.
    pub fn listen(self: &Arc<Self>) -> Result<ConfigWatch, ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
        let mut watches = Vec::new();
        for (index, source) in self.sources.iter().enumerate() {
            if let Some(watch) = source.watch(SourceNotifier::new(index, tx.clone()))? {
                watches.push(watch);
            }
        }
        let merger = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(index) = rx.recv().await {
                let Some(source) = merger.sources.get(index) else {
                    continue;
                };
                match source.load().await {
                    Ok(value) => {
                        if let Some(config) = merger.merge(value) {
                            tracing::info!(source = %source.name(), mode = %config.mode(), port = config.port(), "configuration changed");
                        }
                    }
                    Err(e) => tracing::warn!(source = %source.name(), error = %e, "config reload failed; keeping current configuration"),
                }
            }
        });
        Ok(ConfigWatch {
            _watches: watches,
            task,
        })
    }

    fn read_listeners(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn ChangeListener>>> {
        match self.listeners.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_listeners(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn ChangeListener>>> {
        match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
