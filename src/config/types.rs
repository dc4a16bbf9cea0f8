//! Recognized configuration keys and the deployment mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PORT_KEY: &str = "port";
pub const HOST_KEY: &str = "host";
pub const MODE_KEY: &str = "mode";
pub const DEBUG_KEY: &str = "debug";
pub const BODY_LIMIT_KEY: &str = "body_limit";

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Deployment mode. Selects the per-mode override block of the configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    #[default]
    Dev,
    Test,
    Uat,
    Prod,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Local, Mode::Dev, Mode::Test, Mode::Uat, Mode::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Dev => "dev",
            Mode::Test => "test",
            Mode::Uat => "uat",
            Mode::Prod => "prod",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mode '{}'", s))
    }
}
