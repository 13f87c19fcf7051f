//! Config tables handed over by scripts, validated once at registration.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use scriptbind_value::Node;

use crate::error::GlueError;

/// Projects a script config table onto a typed config struct.
///
/// `hint` names the registration surface being configured and ends up in
/// the error the script sees.
pub(crate) fn parse_config<T: DeserializeOwned>(
    node: &Node,
    hint: &'static str,
) -> Result<T, GlueError> {
    let json = node.to_json()?;
    serde_json::from_value(json).map_err(|source| GlueError::ConfigSchema { hint, source })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub uid: String,
    /// Public API name; defaults to `uid`.
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    /// Remote URI; when set the API is imported instead of created.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub export: Option<String>,
}

impl ApiConfig {
    pub(crate) fn api_name(&self) -> &str {
        self.api.as_deref().unwrap_or(&self.uid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerbConfig {
    pub uid: String,
    /// Wire verb name; defaults to `uid`.
    #[serde(default)]
    pub verb: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

impl VerbConfig {
    pub(crate) fn verb_name(&self) -> &str {
        self.verb.as_deref().unwrap_or(&self.uid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    pub uid: String,
    /// Tick period in milliseconds.
    pub period: u32,
    /// Number of ticks; 0 runs until released.
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    pub uid: String,
    /// Event-name pattern; a trailing `*` matches any suffix.
    pub pattern: String,
}
