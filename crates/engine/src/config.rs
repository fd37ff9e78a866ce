use serde::Deserialize;

use prefsync_core::BUNDLE_FORMAT_VERSION;

use crate::error::EngineError;
use crate::reset::CONFIRMATION_PHRASE;

/// Per-session settings for the editing engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Format version written to exports and checked on import.
    pub bundle_version: String,
    /// Literal the operator must type to unlock a reset. Case-sensitive, not trimmed.
    pub confirmation_phrase: String,
    /// Drop a pending change once it equals the baseline value again.
    pub prune_unchanged: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bundle_version: BUNDLE_FORMAT_VERSION.to_string(),
            confirmation_phrase: CONFIRMATION_PHRASE.to_string(),
            prune_unchanged: true,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: SessionConfig =
            toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.confirmation_phrase.is_empty() {
            return Err(EngineError::Config("confirmation_phrase must not be empty".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = SessionConfig::from_toml_str("prune_unchanged = false").unwrap();
        assert!(!config.prune_unchanged);
        assert_eq!(config.bundle_version, BUNDLE_FORMAT_VERSION);
        assert_eq!(config.confirmation_phrase, CONFIRMATION_PHRASE);
    }

    #[test]
    fn empty_phrase_rejected() {
        let err = SessionConfig::from_toml_str(r#"confirmation_phrase = """#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn bad_types_rejected() {
        assert!(SessionConfig::from_toml_str("prune_unchanged = \"yes\"").is_err());
    }
}
