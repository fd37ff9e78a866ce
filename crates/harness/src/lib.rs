pub mod daemon;

pub use daemon::TestDaemon;

use prefsync_core::{PrefMap, PrefValue};
use prefsync_engine::{SessionConfig, SettingsSession, Validator};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn prefs(entries: &[(&str, PrefValue)]) -> PrefMap {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Factory settings the test daemon resets to.
pub fn daemon_defaults() -> PrefMap {
    prefs(&[
        ("dht", PrefValue::Bool(true)),
        ("pex", PrefValue::Bool(true)),
        ("web_ui_port", PrefValue::Int(8080)),
        ("listen_port", PrefValue::Int(6881)),
        ("save_path", PrefValue::from("/downloads")),
        ("scheduler_enabled", PrefValue::Bool(false)),
        ("schedule_from_hour", PrefValue::Int(8)),
        ("schedule_to_hour", PrefValue::Int(20)),
    ])
}

/// A session over a daemon holding `preferences`, with the baseline already loaded.
pub async fn loaded_session(
    preferences: &PrefMap,
) -> Result<SettingsSession<TestDaemon>, Box<dyn std::error::Error>> {
    loaded_session_with(preferences, SessionConfig::default()).await
}

pub async fn loaded_session_with(
    preferences: &PrefMap,
    config: SessionConfig,
) -> Result<SettingsSession<TestDaemon>, Box<dyn std::error::Error>> {
    init_tracing();
    let daemon = TestDaemon::with_state(preferences, &daemon_defaults())?;
    let mut session = SettingsSession::new(daemon, Validator::standard(), config);
    session.refresh_baseline().await?;
    session.repository().clear_counters();
    Ok(session)
}
