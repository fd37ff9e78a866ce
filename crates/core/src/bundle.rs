//! Settings bundle file format.
//!
//! A bundle is a UTF-8 JSON document holding up to two key/value sections
//! (`preferences` and `webUISettings`) plus optional export metadata.
//! Sections keep the key order of the document they were read from.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::value::{PrefMap, PrefValue};

/// Format version written into exported bundles.
pub const BUNDLE_FORMAT_VERSION: &str = "1.0";

/// Insertion-ordered key/value section of a bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleSection {
    entries: Vec<(String, PrefValue)>,
}

impl BundleSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key. An overwritten key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: PrefValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PrefValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &PrefValue) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn to_map(&self) -> PrefMap {
        self.entries.iter().cloned().collect()
    }
}

impl FromIterator<(String, PrefValue)> for BundleSection {
    fn from_iter<I: IntoIterator<Item = (String, PrefValue)>>(iter: I) -> Self {
        let mut section = BundleSection::new();
        for (key, value) in iter {
            section.insert(key, value);
        }
        section
    }
}

impl From<&PrefMap> for BundleSection {
    fn from(map: &PrefMap) -> Self {
        Self {
            entries: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

impl IntoIterator for BundleSection {
    type Item = (String, PrefValue);
    type IntoIter = std::vec::IntoIter<(String, PrefValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for BundleSection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BundleSection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SectionVisitor;

        impl<'de> Visitor<'de> for SectionVisitor {
            type Value = BundleSection;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of setting keys to values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut section = BundleSection::new();
                while let Some((key, value)) = access.next_entry::<String, PrefValue>()? {
                    section.insert(key, value);
                }
                Ok(section)
            }
        }

        deserializer.deserialize_map(SectionVisitor)
    }
}

/// Which parts of the current state go into an exported bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_preferences: bool,
    pub include_web_ui_settings: bool,
    pub include_metadata: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_preferences: true,
            include_web_ui_settings: true,
            include_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<BundleSection>,
    #[serde(rename = "webUISettings", default, skip_serializing_if = "Option::is_none")]
    pub web_ui_settings: Option<BundleSection>,
    #[serde(rename = "exportedAt", default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Non-fatal findings from parsing a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleWarning {
    VersionMismatch { found: String, supported: String },
}

impl fmt::Display for BundleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleWarning::VersionMismatch { found, supported } => write!(
                f,
                "bundle was exported with format version {found}, this build supports {supported}; some settings may not apply"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedBundle {
    pub bundle: ImportBundle,
    pub warnings: Vec<BundleWarning>,
}

impl ImportBundle {
    /// Build an export bundle from the given state.
    pub fn export(
        options: ExportOptions,
        preferences: &PrefMap,
        web_ui_settings: &PrefMap,
        version: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut bundle = ImportBundle::default();
        if options.include_preferences {
            bundle.preferences = Some(BundleSection::from(preferences));
        }
        if options.include_web_ui_settings {
            bundle.web_ui_settings = Some(BundleSection::from(web_ui_settings));
        }
        if options.include_metadata {
            bundle.exported_at = Some(format_timestamp(now));
            bundle.version = Some(version.to_string());
        }
        bundle
    }

    pub fn has_any_section(&self) -> bool {
        self.preferences.is_some() || self.web_ui_settings.is_some()
    }

    /// Two-space indented JSON, fields in declaration order, absent fields omitted.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Parse raw bundle text. Structural failures are fatal; version skew is a warning.
    pub fn parse(raw: &str, supported_version: &str) -> Result<ParsedBundle, CoreError> {
        let bundle: ImportBundle =
            serde_json::from_str(raw).map_err(|e| CoreError::MalformedBundle(e.to_string()))?;

        if !bundle.has_any_section() {
            return Err(CoreError::MalformedBundle(
                "bundle contains neither preferences nor webUISettings".into(),
            ));
        }

        let mut warnings = Vec::new();
        if let Some(found) = &bundle.version
            && found != supported_version
        {
            warnings.push(BundleWarning::VersionMismatch {
                found: found.clone(),
                supported: supported_version.to_string(),
            });
        }

        Ok(ParsedBundle { bundle, warnings })
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-03-01T12:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
