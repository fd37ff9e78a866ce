//! Destructive "restore defaults" flow.
//!
//! `Idle -> AwaitingConfirmation -> [BackupEmitted] -> Resetting -> Idle`.
//! The confirmation literal is a friction gate against accidental resets,
//! not an authorization check.
//!
//! A backup is handed to the caller before the destructive call is issued.
//! If the reset then fails, the backup exists but nothing was reset.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;

pub const CONFIRMATION_PHRASE: &str = "RESET ALL SETTINGS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetScopes {
    pub preferences: bool,
    pub web_ui_settings: bool,
}

impl ResetScopes {
    pub fn all() -> Self {
        Self { preferences: true, web_ui_settings: true }
    }

    pub fn preferences_only() -> Self {
        Self { preferences: true, web_ui_settings: false }
    }

    pub fn web_ui_only() -> Self {
        Self { preferences: false, web_ui_settings: true }
    }

    pub fn is_empty(&self) -> bool {
        !self.preferences && !self.web_ui_settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPhase {
    Idle,
    AwaitingConfirmation,
    BackupEmitted,
    Resetting,
}

impl ResetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingConfirmation => "awaiting-confirmation",
            Self::BackupEmitted => "backup-emitted",
            Self::Resetting => "resetting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Input did not match the confirmation literal. Nothing happened.
    Locked,
    Completed { scopes: ResetScopes, backup_emitted: bool },
}

/// Point-in-time export taken right before a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetBackup {
    pub backup_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scopes: ResetScopes,
    /// Bundle JSON, importable as-is.
    pub contents: String,
    /// blake3 of `contents`, hex.
    pub checksum: String,
}

impl ResetBackup {
    pub fn new(scopes: ResetScopes, contents: String, created_at: DateTime<Utc>) -> Self {
        let checksum = blake3::hash(contents.as_bytes()).to_hex().to_string();
        Self {
            backup_id: Uuid::now_v7(),
            created_at,
            scopes,
            contents,
            checksum,
        }
    }

    pub fn verify(&self) -> bool {
        blake3::hash(self.contents.as_bytes()).to_hex().as_str() == self.checksum
    }
}

pub struct ResetFlow {
    phase: ResetPhase,
    scopes: ResetScopes,
    create_backup: bool,
    phrase: String,
}

impl ResetFlow {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phase: ResetPhase::Idle,
            scopes: ResetScopes::default(),
            create_backup: false,
            phrase: phrase.into(),
        }
    }

    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    pub fn scopes(&self) -> ResetScopes {
        self.scopes
    }

    pub fn create_backup(&self) -> bool {
        self.create_backup
    }

    /// Open (or re-open with new options) the confirmation step.
    pub fn request(&mut self, scopes: ResetScopes, create_backup: bool) -> Result<(), EngineError> {
        if scopes.is_empty() {
            return Err(EngineError::InvalidResetTransition("no reset scope selected".into()));
        }
        self.check_transition(&[ResetPhase::Idle, ResetPhase::AwaitingConfirmation], ResetPhase::AwaitingConfirmation)?;
        self.scopes = scopes;
        self.create_backup = create_backup;
        self.phase = ResetPhase::AwaitingConfirmation;
        Ok(())
    }

    /// Exact, case-sensitive match; no trimming.
    pub fn is_unlocked(&self, input: &str) -> bool {
        self.phase == ResetPhase::AwaitingConfirmation && input == self.phrase
    }

    pub fn cancel(&mut self) -> Result<(), EngineError> {
        self.check_transition(&[ResetPhase::Idle, ResetPhase::AwaitingConfirmation], ResetPhase::Idle)?;
        self.phase = ResetPhase::Idle;
        Ok(())
    }

    pub fn mark_backup_emitted(&mut self) -> Result<(), EngineError> {
        self.check_transition(&[ResetPhase::AwaitingConfirmation], ResetPhase::BackupEmitted)?;
        self.phase = ResetPhase::BackupEmitted;
        Ok(())
    }

    pub fn begin_reset(&mut self) -> Result<(), EngineError> {
        self.check_transition(
            &[ResetPhase::AwaitingConfirmation, ResetPhase::BackupEmitted],
            ResetPhase::Resetting,
        )?;
        self.phase = ResetPhase::Resetting;
        Ok(())
    }

    /// Back to idle after the reset finished or failed.
    pub fn finish(&mut self) {
        self.phase = ResetPhase::Idle;
        self.create_backup = false;
    }

    fn check_transition(&self, allowed: &[ResetPhase], to: ResetPhase) -> Result<(), EngineError> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(EngineError::InvalidResetTransition(format!(
            "{} -> {}",
            self.phase.as_str(),
            to.as_str()
        )))
    }
}
