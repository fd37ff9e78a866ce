pub mod config;
pub mod conflict;
pub mod error;
pub mod notice;
pub mod overlay;
pub mod reset;
pub mod validation;

pub use config::SessionConfig;
pub use conflict::{
    ConflictItem, ConflictSection, ImportOutcome, ImportPreview, ResolutionPolicy, detect_conflicts, resolve,
};
pub use error::EngineError;
pub use notice::{Notice, NoticeLevel};
pub use overlay::{EffectiveView, OverlayStore, SaveStage};
pub use reset::{CONFIRMATION_PHRASE, ResetBackup, ResetFlow, ResetOutcome, ResetPhase, ResetScopes};
pub use validation::{ValidationError, ValidationRule, Validator};

use chrono::Utc;
use tracing::{debug, info, warn};

use prefsync_core::{CoreError, ExportOptions, ImportBundle, PrefMap, PrefValue, WebUiSettings};
use prefsync_storage::{PreferenceRepository, StorageError};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { keys: usize },
    NoChanges,
    /// Validation errors exist; nothing was sent.
    ValidationBlocked(Vec<ValidationError>),
}

/// A change set handed to the repository and awaiting its response.
///
/// Hand it back through `finish_save` or `abandon_save`; until then the
/// session reports a save in flight.
#[derive(Debug)]
#[must_use = "a started save stays in flight until finished or abandoned"]
pub struct SaveRequest {
    changes: PrefMap,
}

impl SaveRequest {
    pub fn changes(&self) -> &PrefMap {
        &self.changes
    }
}

#[derive(Debug)]
pub enum SaveStart {
    Ready(SaveRequest),
    Finished(SaveOutcome),
}

/// One operator's editing session over the daemon's preferences.
///
/// Owns the overlay, the validator (inside the overlay), the reset flow
/// and the local web UI settings. Build one per session and pass it to
/// every consumer.
///
/// Preferences are transactional (edit, validate, save). Web UI settings
/// are local-only and every write to them applies at once.
pub struct SettingsSession<R: PreferenceRepository> {
    repository: R,
    config: SessionConfig,
    overlay: OverlayStore,
    web_ui: WebUiSettings,
    reset: ResetFlow,
    saves_in_flight: usize,
    notice: Option<Notice>,
}

impl<R: PreferenceRepository> SettingsSession<R> {
    pub fn new(repository: R, validator: Validator, config: SessionConfig) -> Self {
        debug!(
            rules = validator.rule_count(),
            prune_unchanged = config.prune_unchanged,
            "settings session created"
        );
        Self {
            overlay: OverlayStore::new(validator, config.prune_unchanged),
            reset: ResetFlow::new(config.confirmation_phrase.clone()),
            web_ui: WebUiSettings::defaults(),
            repository,
            config,
            saves_in_flight: 0,
            notice: None,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn overlay(&self) -> &OverlayStore {
        &self.overlay
    }

    // ========================================================================
    // Overlay
    // ========================================================================

    pub fn effective(&self, key: &str) -> Option<&PrefValue> {
        self.overlay.get_effective(key)
    }

    pub fn effective_state(&self) -> PrefMap {
        self.overlay.effective_state()
    }

    pub fn baseline(&self) -> &PrefMap {
        self.overlay.baseline()
    }

    pub fn pending(&self) -> &PrefMap {
        self.overlay.pending()
    }

    pub fn set_pending_change(&mut self, key: impl Into<String>, value: PrefValue) {
        self.overlay.set_pending_change(key, value);
    }

    pub fn revert_key(&mut self, key: &str) -> bool {
        self.overlay.revert_key(key)
    }

    pub fn discard_changes(&mut self) {
        self.overlay.discard();
    }

    pub fn is_dirty(&self) -> bool {
        self.overlay.is_dirty()
    }

    pub fn is_saving(&self) -> bool {
        self.saves_in_flight > 0
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        self.overlay.errors()
    }

    // ========================================================================
    // Save / Refresh
    // ========================================================================

    /// Validate and persist the pending set in one repository call.
    ///
    /// Dropping the returned future before it resolves abandons the save:
    /// the pending set is kept and `is_saving` goes back to false.
    pub async fn save_changes(&mut self) -> Result<SaveOutcome, EngineError> {
        let request = match self.begin_save() {
            SaveStart::Ready(request) => request,
            SaveStart::Finished(outcome) => return Ok(outcome),
        };
        let result = {
            let _in_flight = SaveInFlight(&mut self.saves_in_flight);
            self.repository.write(request.changes()).await
        };
        self.settle_save(request, result)
    }

    /// First half of a save for callers that drive the repository call themselves.
    /// Concurrent saves are not deduplicated.
    pub fn begin_save(&mut self) -> SaveStart {
        let changes = match self.overlay.stage_save() {
            SaveStage::Empty => return SaveStart::Finished(SaveOutcome::NoChanges),
            SaveStage::Blocked(errors) => {
                info!(errors = errors.len(), "save blocked by validation");
                return SaveStart::Finished(SaveOutcome::ValidationBlocked(errors));
            }
            SaveStage::Ready(changes) => changes,
        };
        if self.is_saving() {
            warn!("save started while another save is in flight");
        }
        self.saves_in_flight += 1;
        SaveStart::Ready(SaveRequest { changes })
    }

    /// Second half of a save. On failure the pending set is left untouched.
    pub fn finish_save(
        &mut self,
        request: SaveRequest,
        result: Result<(), StorageError>,
    ) -> Result<SaveOutcome, EngineError> {
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);
        self.settle_save(request, result)
    }

    /// Give up on a started save without an answer from the repository.
    pub fn abandon_save(&mut self, request: SaveRequest) {
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);
        warn!(keys = request.changes.len(), "save abandoned, edits stay pending");
    }

    fn settle_save(
        &mut self,
        request: SaveRequest,
        result: Result<(), StorageError>,
    ) -> Result<SaveOutcome, EngineError> {
        match result {
            Ok(()) => {
                let keys = request.changes.len();
                self.overlay.commit(&request.changes);
                info!(keys, "preferences saved");
                self.notice = Some(Notice::info(format!("Saved {keys} setting(s)")));
                Ok(SaveOutcome::Saved { keys })
            }
            Err(e) => {
                warn!(error = %e, pending = self.overlay.pending().len(), "saving preferences failed");
                self.notice = Some(Notice::error(format!("Failed to save preferences: {e}")));
                Err(e.into())
            }
        }
    }

    /// Fetch the daemon's state as the new baseline. Pending edits stay on top.
    pub async fn refresh_baseline(&mut self) -> Result<(), EngineError> {
        match self.repository.fetch().await {
            Ok(baseline) => {
                self.apply_baseline(baseline);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "fetching preferences failed");
                self.notice = Some(Notice::error(format!("Failed to load preferences: {e}")));
                Err(e.into())
            }
        }
    }

    /// Install a baseline fetched outside the session.
    pub fn apply_baseline(&mut self, baseline: PrefMap) {
        info!(keys = baseline.len(), pending = self.overlay.pending().len(), "baseline replaced");
        self.overlay.replace_baseline(baseline);
    }

    // ========================================================================
    // Web UI settings (immediate)
    // ========================================================================

    pub fn web_ui(&self) -> &WebUiSettings {
        &self.web_ui
    }

    pub fn set_web_ui_setting(&mut self, key: impl Into<String>, value: PrefValue) {
        self.web_ui.set(key, value);
    }

    // ========================================================================
    // Import / Export
    // ========================================================================

    /// Serialize the effective state, unsaved edits included.
    pub fn export_bundle(&self, options: ExportOptions) -> Result<String, EngineError> {
        let bundle = ImportBundle::export(
            options,
            &self.overlay.effective_state(),
            self.web_ui.as_map(),
            &self.config.bundle_version,
            Utc::now(),
        );
        Ok(bundle.to_json()?)
    }

    /// Parse a bundle and list its conflicts with the current effective state.
    /// Nothing is modified.
    pub fn preview_import(&mut self, raw: &str) -> Result<ImportPreview, EngineError> {
        let parsed = ImportBundle::parse(raw, &self.config.bundle_version).map_err(|e| match e {
            CoreError::MalformedBundle(reason) => EngineError::MalformedBundle(reason),
            other => EngineError::Core(other),
        })?;

        for warning in &parsed.warnings {
            warn!(warning = %warning, "bundle compatibility warning");
        }
        if let Some(first) = parsed.warnings.first() {
            self.notice = Some(Notice::warning(first.to_string()));
        }

        let conflicts = detect_conflicts(&parsed.bundle, &self.overlay.effective_state(), self.web_ui.as_map());
        info!(conflicts = conflicts.len(), "import previewed");
        Ok(ImportPreview {
            bundle: parsed.bundle,
            conflicts,
            warnings: parsed.warnings,
        })
    }

    /// Apply a previewed bundle under `policy`.
    ///
    /// Preferences become pending changes and still need validation and a
    /// save. Web UI settings apply immediately.
    pub fn apply_import(&mut self, preview: ImportPreview, policy: &ResolutionPolicy) -> ImportOutcome {
        let filtered = resolve(&preview.bundle, &preview.conflicts, policy);
        let skipped_conflicts = conflict::count_skipped(&preview.conflicts, &filtered);

        let mut outcome = ImportOutcome {
            skipped_conflicts,
            ..ImportOutcome::default()
        };
        if let Some(preferences) = filtered.preferences {
            for (key, value) in preferences {
                self.overlay.set_pending_change(key.clone(), value);
                // Values equal to the baseline may have been pruned.
                if self.overlay.pending_value(&key).is_some() {
                    outcome.applied_preferences += 1;
                }
            }
        }
        if let Some(web_ui) = &filtered.web_ui_settings {
            outcome.applied_web_ui_settings = self.web_ui.merge(web_ui);
        }

        info!(
            preferences = outcome.applied_preferences,
            web_ui_settings = outcome.applied_web_ui_settings,
            skipped = outcome.skipped_conflicts,
            "import applied"
        );
        outcome
    }

    // ========================================================================
    // Reset
    // ========================================================================

    pub fn reset_phase(&self) -> ResetPhase {
        self.reset.phase()
    }

    pub fn request_reset(&mut self, scopes: ResetScopes, create_backup: bool) -> Result<(), EngineError> {
        self.reset.request(scopes, create_backup)
    }

    /// Whether `input` unlocks the destructive action right now.
    pub fn reset_unlocked(&self, input: &str) -> bool {
        self.reset.is_unlocked(input)
    }

    pub fn cancel_reset(&mut self) -> Result<(), EngineError> {
        self.reset.cancel()
    }

    /// Run the confirmed reset.
    ///
    /// With a backup requested, `emit_backup` receives it before the
    /// repository is called. A failed reset leaves local state unchanged,
    /// and so does dropping the future while the repository call is out;
    /// either way the flow returns to idle.
    pub async fn confirm_reset(
        &mut self,
        input: &str,
        emit_backup: impl FnOnce(ResetBackup),
    ) -> Result<ResetOutcome, EngineError> {
        if self.reset.phase() != ResetPhase::AwaitingConfirmation {
            return Err(EngineError::InvalidResetTransition(format!(
                "confirm while {}",
                self.reset.phase().as_str()
            )));
        }
        if !self.reset.is_unlocked(input) {
            return Ok(ResetOutcome::Locked);
        }

        let scopes = self.reset.scopes();
        let backup_emitted = self.reset.create_backup();
        if backup_emitted {
            let backup = match self.snapshot_for_reset(scopes) {
                Ok(backup) => backup,
                Err(e) => {
                    self.reset.finish();
                    return Err(e);
                }
            };
            self.reset.mark_backup_emitted()?;
            info!(backup_id = %backup.backup_id, "reset backup emitted");
            emit_backup(backup);
        }

        self.reset.begin_reset()?;
        if scopes.preferences {
            let result = {
                let _in_flight = ResetInFlight(&mut self.reset);
                self.repository.reset_to_defaults().await
            };
            match result {
                Ok(defaults) => {
                    self.overlay.discard();
                    self.overlay.replace_baseline(defaults);
                }
                Err(e) => {
                    warn!(error = %e, backup_emitted, "reset failed, nothing was reset");
                    self.notice = Some(Notice::error(format!("Failed to reset preferences: {e}")));
                    return Err(e.into());
                }
            }
        }
        if scopes.web_ui_settings {
            self.web_ui.reset_to_defaults();
        }
        self.reset.finish();

        info!(
            preferences = scopes.preferences,
            web_ui_settings = scopes.web_ui_settings,
            backup_emitted,
            "settings reset"
        );
        self.notice = Some(Notice::info("Settings restored to defaults"));
        Ok(ResetOutcome::Completed { scopes, backup_emitted })
    }

    fn snapshot_for_reset(&self, scopes: ResetScopes) -> Result<ResetBackup, EngineError> {
        let options = ExportOptions {
            include_preferences: scopes.preferences,
            include_web_ui_settings: scopes.web_ui_settings,
            include_metadata: true,
        };
        let contents = self.export_bundle(options)?;
        Ok(ResetBackup::new(scopes, contents, Utc::now()))
    }

    // ========================================================================
    // Notices
    // ========================================================================

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }
}

/// Releases the in-flight save count when the repository call ends, even if the future is dropped.
struct SaveInFlight<'a>(&'a mut usize);

impl Drop for SaveInFlight<'_> {
    fn drop(&mut self) {
        *self.0 = self.0.saturating_sub(1);
    }
}

/// Puts the reset flow back to idle once the repository call is over or abandoned.
struct ResetInFlight<'a>(&'a mut ResetFlow);

impl Drop for ResetInFlight<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}
