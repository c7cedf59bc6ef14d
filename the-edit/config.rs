use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid editor config: {0}")]
  Toml(#[from] toml::de::Error),
}

/// Editor tuning knobs, usually embedded as a table in a host's config file.
///
/// ```toml
/// log-capacity = 65536
/// notify-on-replay = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
  /// Initial byte capacity of the event buffer.
  pub log_capacity:     usize,
  /// Initial number of events the offset index can hold.
  pub event_capacity:   usize,
  /// Fire observer callbacks while undoing and redoing.
  pub notify_on_replay: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_capacity:     4096,
      event_capacity:   256,
      notify_on_replay: true,
    }
  }
}

impl Config {
  pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(source)?)
  }
}
