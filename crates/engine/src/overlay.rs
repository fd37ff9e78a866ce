use prefsync_core::{PrefMap, PrefValue};
use tracing::debug;

use crate::validation::{ValidationError, Validator};

/// Read-only view of baseline with the pending overlay on top.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveView<'a> {
    baseline: &'a PrefMap,
    pending: &'a PrefMap,
}

impl<'a> EffectiveView<'a> {
    pub fn new(baseline: &'a PrefMap, pending: &'a PrefMap) -> Self {
        Self { baseline, pending }
    }

    /// Pending value if present, else baseline.
    pub fn get(&self, key: &str) -> Option<&'a PrefValue> {
        self.pending.get(key).or_else(|| self.baseline.get(key))
    }
}

/// Result of asking the overlay whether it can be saved.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStage {
    Empty,
    Blocked(Vec<ValidationError>),
    Ready(PrefMap),
}

/// Last confirmed server state plus the operator's unsaved edits.
///
/// The pending set always wins over the baseline. Replacing the baseline
/// never touches pending edits. Validation is rerun in full after every
/// change to either side, and the error list is empty whenever nothing
/// is pending.
pub struct OverlayStore {
    baseline: PrefMap,
    pending: PrefMap,
    errors: Vec<ValidationError>,
    validator: Validator,
    prune_unchanged: bool,
}

impl OverlayStore {
    pub fn new(validator: Validator, prune_unchanged: bool) -> Self {
        Self {
            baseline: PrefMap::new(),
            pending: PrefMap::new(),
            errors: Vec::new(),
            validator,
            prune_unchanged,
        }
    }

    pub fn baseline(&self) -> &PrefMap {
        &self.baseline
    }

    pub fn pending(&self) -> &PrefMap {
        &self.pending
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn view(&self) -> EffectiveView<'_> {
        EffectiveView::new(&self.baseline, &self.pending)
    }

    pub fn get_effective(&self, key: &str) -> Option<&PrefValue> {
        self.view().get(key)
    }

    /// Baseline with every pending change folded in.
    pub fn effective_state(&self) -> PrefMap {
        let mut state = self.baseline.clone();
        state.extend(self.pending.iter().map(|(k, v)| (k.clone(), v.clone())));
        state
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn pending_value(&self, key: &str) -> Option<&PrefValue> {
        self.pending.get(key)
    }

    pub fn set_pending_change(&mut self, key: impl Into<String>, value: PrefValue) {
        let key = key.into();
        if self.prune_unchanged && self.baseline.get(&key) == Some(&value) {
            self.pending.remove(&key);
        } else {
            self.pending.insert(key.clone(), value);
        }
        self.revalidate();
        debug!(key = %key, pending = self.pending.len(), errors = self.errors.len(), "pending change set");
    }

    /// Drop a single key from the overlay. Returns whether it was pending.
    pub fn revert_key(&mut self, key: &str) -> bool {
        let removed = self.pending.remove(key).is_some();
        if removed {
            self.revalidate();
        }
        removed
    }

    pub fn discard(&mut self) {
        self.pending.clear();
        self.errors.clear();
    }

    pub fn replace_baseline(&mut self, baseline: PrefMap) {
        self.baseline = baseline;
        self.revalidate();
    }

    pub fn stage_save(&self) -> SaveStage {
        if self.pending.is_empty() {
            return SaveStage::Empty;
        }
        if !self.errors.is_empty() {
            return SaveStage::Blocked(self.errors.clone());
        }
        SaveStage::Ready(self.pending.clone())
    }

    /// Fold a persisted change set into the baseline.
    ///
    /// A key leaves the overlay only if its pending value is still the one
    /// that was persisted; an edit made after the save started stays pending.
    pub fn commit(&mut self, submitted: &PrefMap) {
        for (key, value) in submitted {
            self.baseline.insert(key.clone(), value.clone());
            if self.pending.get(key) == Some(value) {
                self.pending.remove(key);
            }
        }
        self.revalidate();
    }

    /// Errors are only reported against an overlay; with nothing pending
    /// there is nothing to block.
    fn revalidate(&mut self) {
        if self.pending.is_empty() {
            self.errors.clear();
            return;
        }
        self.errors = self.validator.validate(&EffectiveView::new(&self.baseline, &self.pending));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, PrefValue)]) -> PrefMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn store_with(baseline: PrefMap, prune: bool) -> OverlayStore {
        let mut store = OverlayStore::new(Validator::standard(), prune);
        store.replace_baseline(baseline);
        store
    }

    #[test]
    fn pending_wins_over_baseline() {
        let mut store = store_with(map(&[("dht", PrefValue::Bool(true)), ("pex", PrefValue::Bool(true))]), true);
        store.set_pending_change("dht", PrefValue::Bool(false));

        assert_eq!(store.get_effective("dht"), Some(&PrefValue::Bool(false)));
        assert_eq!(store.get_effective("pex"), Some(&PrefValue::Bool(true)));
        assert_eq!(store.get_effective("missing"), None);
        assert!(store.is_dirty());
    }

    #[test]
    fn baseline_replacement_keeps_overlay() {
        let mut store = store_with(map(&[("dht", PrefValue::Bool(true))]), true);
        store.set_pending_change("dht", PrefValue::Bool(false));
        store.replace_baseline(map(&[("dht", PrefValue::Bool(true)), ("pex", PrefValue::Bool(false))]));

        assert_eq!(store.pending(), &map(&[("dht", PrefValue::Bool(false))]));
        assert_eq!(store.get_effective("dht"), Some(&PrefValue::Bool(false)));
        assert_eq!(store.get_effective("pex"), Some(&PrefValue::Bool(false)));
    }

    #[test]
    fn prune_toggle_controls_equal_to_baseline_edits() {
        let baseline = map(&[("web_ui_port", PrefValue::Int(8080))]);

        let mut pruning = store_with(baseline.clone(), true);
        pruning.set_pending_change("web_ui_port", PrefValue::Int(9090));
        pruning.set_pending_change("web_ui_port", PrefValue::Int(8080));
        assert!(!pruning.is_dirty());

        let mut keeping = store_with(baseline, false);
        keeping.set_pending_change("web_ui_port", PrefValue::Int(8080));
        assert!(keeping.is_dirty());
        assert_eq!(keeping.get_effective("web_ui_port"), Some(&PrefValue::Int(8080)));
    }

    #[test]
    fn effective_state_folds_pending() {
        let mut store = store_with(map(&[("a", PrefValue::Int(1)), ("b", PrefValue::Int(2))]), true);
        store.set_pending_change("b", PrefValue::Int(3));
        store.set_pending_change("c", PrefValue::Int(4));
        assert_eq!(
            store.effective_state(),
            map(&[("a", PrefValue::Int(1)), ("b", PrefValue::Int(3)), ("c", PrefValue::Int(4))])
        );
    }

    #[test]
    fn commit_keeps_edits_made_after_submit() {
        let mut store = store_with(map(&[("dl_limit", PrefValue::Int(0))]), true);
        store.set_pending_change("dl_limit", PrefValue::Int(100));
        let SaveStage::Ready(submitted) = store.stage_save() else {
            panic!("expected ready stage");
        };

        store.set_pending_change("dl_limit", PrefValue::Int(200));
        store.commit(&submitted);

        assert_eq!(store.baseline().get("dl_limit"), Some(&PrefValue::Int(100)));
        assert_eq!(store.pending().get("dl_limit"), Some(&PrefValue::Int(200)));
    }

    #[test]
    fn errors_block_staging_and_clear_on_discard() {
        let mut store = store_with(map(&[("web_ui_port", PrefValue::Int(8080))]), true);
        store.set_pending_change("web_ui_port", PrefValue::Int(0));
        assert!(matches!(store.stage_save(), SaveStage::Blocked(ref e) if e.len() == 1));

        store.discard();
        assert!(store.errors().is_empty());
        assert_eq!(store.stage_save(), SaveStage::Empty);
    }

    #[test]
    fn revert_key_revalidates() {
        let mut store = store_with(map(&[("web_ui_port", PrefValue::Int(8080))]), true);
        store.set_pending_change("web_ui_port", PrefValue::Int(70000));
        assert_eq!(store.errors().len(), 1);

        assert!(store.revert_key("web_ui_port"));
        assert!(store.errors().is_empty());
        assert!(!store.revert_key("web_ui_port"));
    }

    #[test]
    fn errors_follow_baseline_with_nothing_pending() {
        let mut store = store_with(
            map(&[("web_ui_port", PrefValue::Int(0)), ("dht", PrefValue::Bool(true))]),
            true,
        );
        store.set_pending_change("dht", PrefValue::Bool(false));
        assert_eq!(store.errors().len(), 1);

        // Edit pruned back to baseline.
        store.set_pending_change("dht", PrefValue::Bool(true));
        assert!(!store.is_dirty());
        assert!(store.errors().is_empty());

        store.replace_baseline(map(&[
            ("web_ui_port", PrefValue::Int(8080)),
            ("dht", PrefValue::Bool(true)),
        ]));
        assert!(store.errors().is_empty());
        assert_eq!(store.stage_save(), SaveStage::Empty);
    }

    #[test]
    fn refreshed_baseline_can_clear_errors() {
        let mut store = store_with(
            map(&[
                ("scheduler_enabled", PrefValue::Bool(false)),
                ("schedule_from_hour", PrefValue::Int(8)),
                ("schedule_to_hour", PrefValue::Int(8)),
            ]),
            true,
        );
        store.set_pending_change("scheduler_enabled", PrefValue::Bool(true));
        assert_eq!(store.errors().len(), 1);

        store.replace_baseline(map(&[
            ("scheduler_enabled", PrefValue::Bool(false)),
            ("schedule_from_hour", PrefValue::Int(8)),
            ("schedule_to_hour", PrefValue::Int(20)),
        ]));
        assert!(store.errors().is_empty());
        assert!(matches!(store.stage_save(), SaveStage::Ready(_)));
    }

    #[test]
    fn pending_lookup_by_key() {
        let mut store = store_with(map(&[("dht", PrefValue::Bool(true))]), true);
        store.set_pending_change("save_path", PrefValue::from("/data"));
        store.set_pending_change("dht", PrefValue::Bool(false));

        assert_eq!(store.pending_keys().collect::<Vec<_>>(), vec!["dht", "save_path"]);
        assert_eq!(store.pending_value("dht"), Some(&PrefValue::Bool(false)));
        assert_eq!(store.pending_value("pex"), None);
    }
}
