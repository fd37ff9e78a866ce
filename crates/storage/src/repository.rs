use prefsync_core::PrefMap;

use crate::error::StorageError;

/// Read/write access to the daemon's preference set.
///
/// Every call is a single request with no retry; failures leave the
/// remote state as it was before the call.
#[allow(async_fn_in_trait)]
pub trait PreferenceRepository {
    /// Full current preference set.
    async fn fetch(&self) -> Result<PrefMap, StorageError>;

    /// Persist a partial set. Keys not in `changes` are left alone.
    async fn write(&self, changes: &PrefMap) -> Result<(), StorageError>;

    /// Restore daemon defaults and return the resulting full set.
    async fn reset_to_defaults(&self) -> Result<PrefMap, StorageError>;
}
