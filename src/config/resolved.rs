//! Immutable configuration snapshot: the merged tree plus its resolved effective view.

use crate::config::types::*;
use crate::error::ConfigError;
use crate::merge::deep_merge;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// One configuration generation. Built once per merge and shared as `Arc<Configuration>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    tree: Value,
    effective: Value,
    mode: Mode,
    port: u16,
    host: String,
    debug: bool,
    body_limit: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::resolve(Value::Object(Map::new()))
    }
}

fn mode_of(tree: &Value) -> Mode {
    match tree.get(MODE_KEY) {
        None | Some(Value::Null) => Mode::default(),
        Some(Value::String(s)) => s.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, fallback = %Mode::default(), "invalid mode in configuration");
            Mode::default()
        }),
        Some(other) => {
            tracing::warn!(value = %other, fallback = %Mode::default(), "mode must be a string");
            Mode::default()
        }
    }
}

fn port_of(effective: &Value) -> u16 {
    let parsed = match effective.get(PORT_KEY) {
        None | Some(Value::Null) => return DEFAULT_PORT,
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(value = ?effective.get(PORT_KEY), default = DEFAULT_PORT, "invalid port in configuration");
        DEFAULT_PORT
    })
}

fn flag_of(effective: &Value, key: &str) -> bool {
    match effective.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl Configuration {
    /// Resolve a merged tree. The block named after the active mode, if any, is deep-merged
    /// over the top level to form the effective view.
    pub fn resolve(tree: Value) -> Self {
        let tree = match tree {
            Value::Object(_) => tree,
            _ => Value::Object(Map::new()),
        };
        let mode = mode_of(&tree);
        let mut effective = tree.clone();
        if let Some(block) = tree.get(mode.as_str()).filter(|b| b.is_object()) {
            deep_merge(&mut effective, block.clone());
        }
        let port = port_of(&effective);
        let host = effective
            .get(HOST_KEY)
            .and_then(Value::as_str)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();
        let debug = flag_of(&effective, DEBUG_KEY);
        let body_limit = effective
            .get(BODY_LIMIT_KEY)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_BODY_LIMIT);
        Self {
            tree,
            effective,
            mode,
            port,
            host,
            debug,
            body_limit,
        }
    }

    /// The merged tree as produced by the sources, before the mode override.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn effective(&self) -> &Value {
        &self.effective
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Look up a dotted key path (`store.url`) in the effective view.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|s| !s.is_empty())
            .try_fold(&self.effective, |node, segment| node.get(segment))
    }

    /// Deserialize the section at `path`; `None` when absent or null.
    pub fn section<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ConfigError::Section {
                    key: path.to_string(),
                    message: e.to_string(),
                }),
        }
    }
}
