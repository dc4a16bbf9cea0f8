//! Configuration sources: files, process environment, `-D` properties, and in-memory overrides.
//! Each source yields a JSON object; changes are signalled through a [`SourceNotifier`].

use crate::error::ConfigError;
use async_trait::async_trait;
use ::config::{Config, Environment, File, Source};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Prefix of environment variables read into the configuration (`APP_PORT`, `APP_STORE__URL`).
pub const ENV_PREFIX: &str = "APP";
/// Nesting separator inside environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Handle a source uses to announce that it should be reloaded.
#[derive(Clone, Debug)]
pub struct SourceNotifier {
    index: usize,
    tx: mpsc::UnboundedSender<usize>,
}

impl SourceNotifier {
    pub(crate) fn new(index: usize, tx: mpsc::UnboundedSender<usize>) -> Self {
        Self { index, tx }
    }

    pub fn notify(&self) {
        let _ = self.tx.send(self.index);
    }
}

/// Keeps a source's change feed alive; dropping it stops watching.
pub struct SourceWatch {
    _guard: Box<dyn Send>,
}

impl SourceWatch {
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self { _guard: Box::new(guard) }
    }
}

#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;

    /// Current content as a JSON object. An absent optional source yields `{}`.
    async fn load(&self) -> Result<Value, ConfigError>;

    /// Start pushing change notifications. `None` when the source never changes.
    fn watch(&self, _notifier: SourceNotifier) -> Result<Option<SourceWatch>, ConfigError> {
        Ok(None)
    }
}

fn empty() -> Value {
    Value::Object(Map::new())
}

/// Build a one-source [`Config`] and read it back as a JSON tree.
fn collect<S>(name: &str, source: S) -> Result<Value, ConfigError>
where
    S: Source + Send + Sync + 'static,
{
    let load_error = |e: ::config::ConfigError| ConfigError::Load {
        source_name: name.to_string(),
        message: e.to_string(),
    };
    let value: Value = Config::builder()
        .add_source(source)
        .build()
        .map_err(load_error)?
        .try_deserialize()
        .map_err(load_error)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(empty()),
        _ => Err(ConfigError::NotAnObject(name.to_string())),
    }
}

/// A configuration file; the format (TOML, JSON, ...) follows the extension.
pub struct FileSource {
    name: String,
    path: PathBuf,
    optional: bool,
}

impl FileSource {
    pub fn required(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            optional: false,
        }
    }

    /// Missing file reads as `{}`.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            optional: true,
            ..Self::required(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        if self.optional && !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "optional config file absent");
            return Ok(empty());
        }
        collect(&self.name, File::from(self.path.clone()).required(!self.optional))
    }

    fn watch(&self, notifier: SourceNotifier) -> Result<Option<SourceWatch>, ConfigError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "config directory absent; not watching");
            return Ok(None);
        }
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        notifier.notify();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "config watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "config watcher started");
        Ok(Some(SourceWatch::new(watcher)))
    }
}

/// Process environment (or an injected variable set). `APP_STORE__URL=x` becomes
/// `{"store": {"url": "x"}}`; values are parsed as bool/number when possible.
pub struct EnvSource {
    prefix: String,
    vars: Option<::config::Map<String, String>>,
}

impl EnvSource {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Fixed variable set instead of the process environment.
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        let env = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(self.vars.clone());
        collect(self.name(), env)
    }
}

/// `key.path=value` pairs from the command line.
#[derive(Debug, Default)]
pub struct PropertiesSource {
    pairs: ::config::Map<String, String>,
}

impl PropertiesSource {
    pub fn parse<S: AsRef<str>>(pairs: &[S]) -> Result<Self, ConfigError> {
        let mut parsed = ::config::Map::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidProperty(pair.to_string()))?;
            let key = key.trim();
            if key.split('.').any(str::is_empty) {
                return Err(ConfigError::InvalidProperty(pair.to_string()));
            }
            parsed.insert(key.to_string(), raw.to_string());
        }
        Ok(Self { pairs: parsed })
    }
}

#[async_trait]
impl ConfigSource for PropertiesSource {
    fn name(&self) -> &str {
        "properties"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        if self.pairs.is_empty() {
            return Ok(empty());
        }
        let props = Environment::default().try_parsing(true).source(Some(self.pairs.clone()));
        collect(self.name(), props)
    }
}

/// Programmatic overrides. [`MemorySource::set`] replaces the content and announces the change.
#[derive(Default)]
pub struct MemorySource {
    value: Mutex<Value>,
    notifier: Mutex<Option<SourceNotifier>>,
}

impl MemorySource {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value),
            notifier: Mutex::new(None),
        })
    }

    pub fn set(&self, value: Value) {
        *lock(&self.value) = value;
        if let Some(notifier) = lock(&self.notifier).as_ref() {
            notifier.notify();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        let value = lock(&self.value).clone();
        match value {
            Value::Object(_) => Ok(value),
            Value::Null => Ok(empty()),
            _ => Err(ConfigError::NotAnObject("memory".into())),
        }
    }

    fn watch(&self, notifier: SourceNotifier) -> Result<Option<SourceWatch>, ConfigError> {
        *lock(&self.notifier) = Some(notifier);
        Ok(None)
    }
}

/// `<dir>/<name>.toml`, or `<dir>/<name>.json` when only that one exists.
pub fn config_file(dir: &Path, name: &str) -> PathBuf {
    let toml = dir.join(format!("{}.toml", name));
    let json = dir.join(format!("{}.json", name));
    if !toml.exists() && json.exists() {
        json
    } else {
        toml
    }
}

/// Standard layering, lowest precedence first: config file, secrets file, environment,
/// command-line properties.
pub fn default_sources(dir: &Path, name: &str, properties: PropertiesSource) -> Vec<Arc<dyn ConfigSource>> {
    vec![
        Arc::new(FileSource::optional(config_file(dir, name))),
        Arc::new(FileSource::optional(config_file(dir, &format!("{}-secrets", name)))),
        Arc::new(EnvSource::with_prefix(ENV_PREFIX)),
        Arc::new(properties),
    ]
}
