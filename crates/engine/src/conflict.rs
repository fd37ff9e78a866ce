use std::collections::{BTreeSet, HashSet};

use prefsync_core::{BundleSection, BundleWarning, ImportBundle, PrefMap, PrefValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictSection {
    Preferences,
    WebUiSettings,
}

impl ConflictSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::WebUiSettings => "webUISettings",
        }
    }
}

/// A key whose imported value differs from the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictItem {
    pub key: String,
    pub section: ConflictSection,
    pub current_value: PrefValue,
    pub import_value: PrefValue,
    pub description: String,
}

/// Which parts of a bundle survive into the applied merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub import_preferences: bool,
    pub import_web_ui_settings: bool,
    pub overwrite_all_conflicts: bool,
    /// Conflicted keys to overwrite when `overwrite_all_conflicts` is off.
    pub selected_conflict_keys: BTreeSet<String>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::keep_current()
    }
}

impl ResolutionPolicy {
    /// Import both sections, overwriting every conflict.
    pub fn overwrite_all() -> Self {
        Self {
            import_preferences: true,
            import_web_ui_settings: true,
            overwrite_all_conflicts: true,
            selected_conflict_keys: BTreeSet::new(),
        }
    }

    /// Import both sections, keeping current values on every conflict.
    pub fn keep_current() -> Self {
        Self {
            import_preferences: true,
            import_web_ui_settings: true,
            overwrite_all_conflicts: false,
            selected_conflict_keys: BTreeSet::new(),
        }
    }

    /// Keep current values except for the listed conflicted keys.
    pub fn overwrite_selected<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_conflict_keys: keys.into_iter().map(Into::into).collect(),
            ..Self::keep_current()
        }
    }

    fn overwrites(&self, key: &str) -> bool {
        self.overwrite_all_conflicts || self.selected_conflict_keys.contains(key)
    }
}

/// A parsed bundle with its conflicts against the state it was checked against.
#[derive(Debug, Clone)]
pub struct ImportPreview {
    pub bundle: ImportBundle,
    pub conflicts: Vec<ConflictItem>,
    pub warnings: Vec<BundleWarning>,
}

impl ImportPreview {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub applied_preferences: usize,
    pub applied_web_ui_settings: usize,
    pub skipped_conflicts: usize,
}

/// Every key present in both the bundle and the current state with a different value.
///
/// Keys only in the bundle are new and never conflict. Output follows the
/// bundle's key order, preferences first.
pub fn detect_conflicts(
    bundle: &ImportBundle,
    current_preferences: &PrefMap,
    current_web_ui_settings: &PrefMap,
) -> Vec<ConflictItem> {
    let mut conflicts = Vec::new();
    if let Some(section) = &bundle.preferences {
        section_conflicts(ConflictSection::Preferences, section, current_preferences, &mut conflicts);
    }
    if let Some(section) = &bundle.web_ui_settings {
        section_conflicts(ConflictSection::WebUiSettings, section, current_web_ui_settings, &mut conflicts);
    }
    conflicts
}

fn section_conflicts(
    section: ConflictSection,
    incoming: &BundleSection,
    current: &PrefMap,
    out: &mut Vec<ConflictItem>,
) {
    for (key, import_value) in incoming.iter() {
        let Some(current_value) = current.get(key) else {
            continue;
        };
        if current_value == import_value {
            continue;
        }
        out.push(ConflictItem {
            key: key.to_string(),
            section,
            current_value: current_value.clone(),
            import_value: import_value.clone(),
            description: format!(
                "{} '{}' is {} now, bundle sets {}",
                section.as_str(),
                key,
                current_value,
                import_value
            ),
        });
    }
}

/// Restrict a bundle to what the policy lets through.
///
/// Non-conflicted keys of an imported section always pass; conflicted keys
/// pass only when overwritten by the policy.
pub fn resolve(bundle: &ImportBundle, conflicts: &[ConflictItem], policy: &ResolutionPolicy) -> ImportBundle {
    ImportBundle {
        preferences: bundle
            .preferences
            .as_ref()
            .filter(|_| policy.import_preferences)
            .map(|s| filter_section(ConflictSection::Preferences, s, conflicts, policy)),
        web_ui_settings: bundle
            .web_ui_settings
            .as_ref()
            .filter(|_| policy.import_web_ui_settings)
            .map(|s| filter_section(ConflictSection::WebUiSettings, s, conflicts, policy)),
        exported_at: bundle.exported_at.clone(),
        version: bundle.version.clone(),
    }
}

fn filter_section(
    section: ConflictSection,
    incoming: &BundleSection,
    conflicts: &[ConflictItem],
    policy: &ResolutionPolicy,
) -> BundleSection {
    let conflicted: HashSet<&str> = conflicts
        .iter()
        .filter(|c| c.section == section)
        .map(|c| c.key.as_str())
        .collect();
    let mut kept = incoming.clone();
    kept.retain(|key, _| !conflicted.contains(key) || policy.overwrites(key));
    kept
}

/// Conflicts whose import value did not make it into the filtered bundle.
pub fn count_skipped(conflicts: &[ConflictItem], filtered: &ImportBundle) -> usize {
    conflicts
        .iter()
        .filter(|c| {
            let section = match c.section {
                ConflictSection::Preferences => filtered.preferences.as_ref(),
                ConflictSection::WebUiSettings => filtered.web_ui_settings.as_ref(),
            };
            !section.is_some_and(|s| s.contains_key(&c.key))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, PrefValue)]) -> PrefMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn section(entries: &[(&str, PrefValue)]) -> BundleSection {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn sample_bundle() -> ImportBundle {
        ImportBundle {
            preferences: Some(section(&[
                ("dht", PrefValue::Bool(true)),
                ("web_ui_port", PrefValue::Int(8080)),
                ("new_key", PrefValue::Int(1)),
                ("pex", PrefValue::Bool(false)),
            ])),
            web_ui_settings: Some(section(&[("lang", PrefValue::from("de"))])),
            exported_at: None,
            version: None,
        }
    }

    #[test]
    fn conflicts_only_for_differing_shared_keys() {
        let current = map(&[
            ("dht", PrefValue::Bool(false)),
            ("web_ui_port", PrefValue::Int(8080)),
            ("pex", PrefValue::Bool(true)),
        ]);
        let web_ui = map(&[("lang", PrefValue::from("en"))]);

        let conflicts = detect_conflicts(&sample_bundle(), &current, &web_ui);
        let keys: Vec<(&str, ConflictSection)> = conflicts.iter().map(|c| (c.key.as_str(), c.section)).collect();
        assert_eq!(
            keys,
            vec![
                ("dht", ConflictSection::Preferences),
                ("pex", ConflictSection::Preferences),
                ("lang", ConflictSection::WebUiSettings),
            ]
        );
        assert_eq!(conflicts[0].current_value, PrefValue::Bool(false));
        assert_eq!(conflicts[0].import_value, PrefValue::Bool(true));
        assert_eq!(conflicts[0].description, "preferences 'dht' is false now, bundle sets true");
    }

    #[test]
    fn absent_current_key_never_conflicts() {
        let conflicts = detect_conflicts(&sample_bundle(), &PrefMap::new(), &PrefMap::new());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn keep_current_drops_conflicted_keys_only() {
        let bundle = sample_bundle();
        let current = map(&[("dht", PrefValue::Bool(false))]);
        let conflicts = detect_conflicts(&bundle, &current, &PrefMap::new());

        let filtered = resolve(&bundle, &conflicts, &ResolutionPolicy::keep_current());
        let keys: Vec<&str> = filtered.preferences.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["web_ui_port", "new_key", "pex"]);
        assert_eq!(count_skipped(&conflicts, &filtered), 1);
    }

    #[test]
    fn selected_keys_overwrite() {
        let bundle = sample_bundle();
        let current = map(&[("dht", PrefValue::Bool(false)), ("pex", PrefValue::Bool(true))]);
        let conflicts = detect_conflicts(&bundle, &current, &PrefMap::new());

        let filtered = resolve(&bundle, &conflicts, &ResolutionPolicy::overwrite_selected(["pex"]));
        let prefs = filtered.preferences.unwrap();
        assert!(!prefs.contains_key("dht"));
        assert_eq!(prefs.get("pex"), Some(&PrefValue::Bool(false)));
    }

    #[test]
    fn overwrite_all_keeps_everything() {
        let bundle = sample_bundle();
        let current = map(&[("dht", PrefValue::Bool(false))]);
        let conflicts = detect_conflicts(&bundle, &current, &map(&[("lang", PrefValue::from("en"))]));

        let filtered = resolve(&bundle, &conflicts, &ResolutionPolicy::overwrite_all());
        assert_eq!(filtered.preferences, bundle.preferences);
        assert_eq!(filtered.web_ui_settings, bundle.web_ui_settings);
        assert_eq!(count_skipped(&conflicts, &filtered), 0);
    }

    #[test]
    fn excluded_scope_is_dropped() {
        let bundle = sample_bundle();
        let policy = ResolutionPolicy {
            import_web_ui_settings: false,
            ..ResolutionPolicy::overwrite_all()
        };
        let conflicts = detect_conflicts(&bundle, &PrefMap::new(), &map(&[("lang", PrefValue::from("en"))]));
        let filtered = resolve(&bundle, &conflicts, &policy);
        assert!(filtered.preferences.is_some());
        assert!(filtered.web_ui_settings.is_none());
        assert_eq!(count_skipped(&conflicts, &filtered), 1);
    }
}
