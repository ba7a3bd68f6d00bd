//! Settings that shape the attributes produced when a window closes.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Setting key: maximum number of samples kept for list-based geometry.
pub const SUBSAMPLE_COUNT: &str = "subsample-count";

/// Default for [`SUBSAMPLE_COUNT`].
pub const DEFAULT_SUBSAMPLE_COUNT: usize = 50;

/// String-keyed settings passed to [`Pipeline::finish`](super::Pipeline::finish).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowConfig {
    settings: BTreeMap<String, String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::empty().with(SUBSAMPLE_COUNT, DEFAULT_SUBSAMPLE_COUNT)
    }
}

impl WindowConfig {
    /// A configuration without any setting.
    pub fn empty() -> Self {
        Self {
            settings: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.settings.insert(key.to_string(), value.to_string());
    }

    /// Parse the setting `key`; `None` when it is absent or malformed.
    pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        self.settings.get(key).and_then(|v| v.parse().ok())
    }

    pub fn subsample_count(&self) -> Option<usize> {
        self.get(SUBSAMPLE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        assert_eq!(WindowConfig::default().subsample_count(), Some(DEFAULT_SUBSAMPLE_COUNT));
        assert_eq!(WindowConfig::empty().subsample_count(), None);
        assert_eq!(WindowConfig::empty().with(SUBSAMPLE_COUNT, 3).subsample_count(), Some(3));
        assert_eq!(WindowConfig::empty().with(SUBSAMPLE_COUNT, "x").subsample_count(), None);
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: WindowConfig = serde_json::from_str(r#"{"subsample-count": "7"}"#).unwrap();
        assert_eq!(config.subsample_count(), Some(7));
    }
}
