//! User-tunable behavior, persisted as `settings.json` in the store
//! directory. The daemon reads these at startup; the `config` command
//! rewrites them. Unknown future fields are dropped on rewrite, missing ones
//! fall back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    daemon::monitor::MonitorConfig,
    stats::RangeKind,
    store::{StoreDir, StoreError, entities::TrackerId, read_json_or, write_json},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds without user input after which every running session is
    /// stopped.
    pub idle_threshold_secs: u32,
    /// Whether the daemon watches for idleness at all.
    pub monitor_enabled: bool,
    /// Hard cap on a single stretch of tracking, off by default.
    pub auto_stop_enabled: bool,
    pub auto_stop_minutes: u32,
    /// Filters last picked on the reporting commands, restored as defaults
    /// next time.
    pub last_tracker: Option<TrackerId>,
    pub last_range: Option<RangeKind>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            idle_threshold_secs: 60,
            monitor_enabled: true,
            auto_stop_enabled: false,
            auto_stop_minutes: 60,
            last_tracker: None,
            last_range: None,
        }
    }
}

impl Settings {
    pub async fn load(store: &StoreDir) -> Result<Settings, StoreError> {
        let lock = store.lock_shared().await?;
        let settings = read_json_or(&store.settings_path(), Settings::default).await?;
        lock.release().await?;
        Ok(settings)
    }

    /// Reads without taking the store lock. Saves replace the file in one
    /// rename, so a lockless read never sees a torn document. The daemon
    /// polls settings with this, keeping its monitor task the only lock
    /// holder in that process.
    pub async fn load_unlocked(store: &StoreDir) -> Result<Settings, StoreError> {
        read_json_or(&store.settings_path(), Settings::default).await
    }

    pub async fn save(&self, store: &StoreDir) -> Result<(), StoreError> {
        let lock = store.lock_exclusive().await?;
        write_json(&store.settings_path(), self).await?;
        lock.release().await?;
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            idle_threshold: Duration::from_secs(self.idle_threshold_secs as u64),
            monitor_enabled: self.monitor_enabled,
            auto_stop: self
                .auto_stop_enabled
                .then(|| Duration::from_secs(self.auto_stop_minutes as u64 * 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_watch_idleness_but_never_cap_sessions() {
        let settings = Settings::default();
        assert_eq!(settings.idle_threshold_secs, 60);
        assert!(settings.monitor_enabled);
        assert!(!settings.auto_stop_enabled);
        assert_eq!(settings.auto_stop_minutes, 60);
        assert_eq!(settings.monitor_config().auto_stop, None);
    }

    #[test]
    fn monitor_config_maps_enabled_auto_stop() {
        let settings = Settings {
            auto_stop_enabled: true,
            auto_stop_minutes: 90,
            ..Settings::default()
        };
        let config = settings.monitor_config();
        assert_eq!(config.idle_threshold, Duration::from_secs(60));
        assert_eq!(config.auto_stop, Some(Duration::from_secs(90 * 60)));
    }

    #[tokio::test]
    async fn settings_round_trip_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(Settings::load(&store).await.unwrap(), Settings::default());

        let settings = Settings {
            idle_threshold_secs: 120,
            last_range: Some(RangeKind::Month),
            last_tracker: Some(TrackerId(2)),
            ..Settings::default()
        };
        settings.save(&store).await.unwrap();
        assert_eq!(Settings::load(&store).await.unwrap(), settings);
        assert_eq!(Settings::load_unlocked(&store).await.unwrap(), settings);
    }
}
