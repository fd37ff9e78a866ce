use crate::bundle::BundleSection;
use crate::value::{PrefMap, PrefValue};

/// Local-only display settings of the web UI.
///
/// These never go through the pending-change overlay: every write applies
/// immediately. They have no remote side, so there is nothing to stage.
#[derive(Debug, Clone, PartialEq)]
pub struct WebUiSettings {
    values: PrefMap,
}

impl Default for WebUiSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl WebUiSettings {
    /// Hardcoded local defaults, also the target of a reset.
    pub fn defaults() -> Self {
        let values: PrefMap = [
            ("lang", PrefValue::from("en")),
            ("darkMode", PrefValue::Bool(false)),
            ("refreshInterval", PrefValue::Int(2000)),
            ("paginationSize", PrefValue::Int(15)),
            ("dateFormat", PrefValue::from("DD/MM/YYYY, HH:mm:ss")),
            ("useBitSpeed", PrefValue::Bool(false)),
            ("useBinarySize", PrefValue::Bool(false)),
            ("showFreeSpace", PrefValue::Bool(true)),
            ("showSpeedInTitle", PrefValue::Bool(false)),
            ("openSideBarOnStart", PrefValue::Bool(true)),
            ("isDrawerRight", PrefValue::Bool(false)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { values }
    }

    pub fn from_map(values: PrefMap) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: PrefValue) {
        self.values.insert(key.into(), value);
    }

    /// Write every key of the section. Returns the number of keys written.
    pub fn merge(&mut self, section: &BundleSection) -> usize {
        for (key, value) in section.iter() {
            self.values.insert(key.to_string(), value.clone());
        }
        section.len()
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Self::defaults();
    }

    pub fn as_map(&self) -> &PrefMap {
        &self.values
    }
}
