use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use monitor::{DEFAULT_POLL_INTERVAL, MonitorConfig, MonitorHandle, MonitorModule};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    engine::{SessionControl, TrackerEngine},
    settings::Settings,
    store::StoreDir,
    system::{GenericIdleProbe, IdleProbe},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod monitor;
pub mod shutdown;

const SETTINGS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let store = StoreDir::new(dir)?;
    let settings = match Settings::load_unlocked(&store).await {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Could not read settings, running with defaults: {e}");
            Settings::default()
        }
    };
    let config = settings.monitor_config();
    let engine = Arc::new(TrackerEngine::new(store.clone()));
    let probe = GenericIdleProbe::new()?;

    let shutdown_token = CancellationToken::new();

    let (monitor, handle) =
        create_monitor(engine, probe, config.clone(), &shutdown_token, DefaultClock);

    let (_, monitor_result, refresh_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        monitor.run(),
        refresh_settings(store, handle, config, shutdown_token, DefaultClock),
    );

    if let Err(monitor_result) = monitor_result {
        error!("Monitor module got an error {:?}", monitor_result);
    }

    if let Err(refresh_result) = refresh_result {
        error!("Settings refresh got an error {:?}", refresh_result);
    }

    Ok(())
}

fn create_monitor(
    sessions: Arc<dyn SessionControl>,
    probe: impl IdleProbe + 'static,
    config: MonitorConfig,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> (MonitorModule, MonitorHandle) {
    MonitorModule::new(
        sessions,
        Box::new(probe),
        config,
        DEFAULT_POLL_INTERVAL,
        shutdown_token.clone(),
        Box::new(clock),
    )
}

/// Commands edit `settings.json` from their own process, so the daemon has to
/// re-read it to notice. Changed values are pushed to the monitor through its
/// handle. Reads stay off the store lock, the monitor task is this process's
/// only lock holder.
async fn refresh_settings(
    store: StoreDir,
    handle: MonitorHandle,
    mut current: MonitorConfig,
    shutdown: CancellationToken,
    clock: impl Clock,
) -> Result<()> {
    let mut refresh_point = clock.instant() + SETTINGS_REFRESH_INTERVAL;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = clock.sleep_until(refresh_point) => (),
        }
        refresh_point += SETTINGS_REFRESH_INTERVAL;
        match Settings::load_unlocked(&store).await {
            Ok(settings) => {
                let config = settings.monitor_config();
                if config != current {
                    info!("Settings changed on disk, updating the monitor");
                    handle.update_config(config.clone());
                    current = config;
                }
            }
            Err(e) => warn!("Could not re-read settings: {e}"),
        }
    }
}

#[cfg(test)]
mod daemon_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        engine::{MockSessionControl, StopAllOutcome},
        store::entities::{ActiveSession, NewTracker, Session, TrackerId},
        system::MockIdleProbe,
        utils::logging::TEST_LOGGING,
    };

    use super::*;

    fn sample_tracker() -> NewTracker {
        NewTracker {
            name: "deep work".into(),
            target_hours: 4.0,
            work_days: None,
            description: None,
        }
    }

    /// End to end: a running session, an idle user, and the monitor cleaning
    /// up through the real engine.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let engine = Arc::new(TrackerEngine::new(StoreDir::new(dir.path().to_path_buf())?));
        let tracker = engine.create_tracker(sample_tracker()).await?;
        engine.start_session(tracker.id).await?;

        let mut probe = MockIdleProbe::new();
        probe.expect_idle_millis().returning(|| Ok(120_000));

        let shutdown_token = CancellationToken::new();
        let (monitor, _handle) = create_monitor(
            engine.clone(),
            probe,
            MonitorConfig::default(),
            &shutdown_token,
            DefaultClock,
        );
        let task = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown_token.cancel();
        task.await??;

        assert!(engine.active_sessions().await?.is_empty());
        assert_eq!(engine.completed_sessions(tracker.id, None).await?.len(), 1);
        Ok(())
    }

    /// The session cap is switched on through `settings.json` while the
    /// monitor runs, the way the `config` command flips it from another
    /// process.
    #[tokio::test(start_paused = true)]
    async fn settings_edit_reaches_a_running_monitor() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = StoreDir::new(dir.path().to_path_buf())?;

        let start = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let mut control = MockSessionControl::new();
        control.expect_active_sessions().returning(move || {
            Ok([(
                TrackerId(1),
                ActiveSession {
                    tracker_id: TrackerId(1),
                    start_time: start,
                },
            )]
            .into())
        });
        let counter = stop_calls.clone();
        control.expect_stop_all().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StopAllOutcome {
                stopped: vec![Session {
                    tracker_id: TrackerId(1),
                    start_time: start,
                    end_time: start + chrono::TimeDelta::minutes(1),
                    duration_minutes: 1,
                }],
                failed: vec![],
            })
        });

        let settings = Settings {
            monitor_enabled: false,
            ..Settings::default()
        };
        settings.save(&store).await?;
        let config = settings.monitor_config();

        let shutdown_token = CancellationToken::new();
        let (monitor, handle) = create_monitor(
            Arc::new(control),
            MockIdleProbe::new(),
            config.clone(),
            &shutdown_token,
            DefaultClock,
        );
        let mut events = handle.subscribe();
        let monitor_task = tokio::spawn(monitor.run());
        let refresh_task = tokio::spawn(refresh_settings(
            store.clone(),
            handle,
            config,
            shutdown_token.clone(),
            DefaultClock,
        ));

        // Flip the one minute cap on from "outside" shortly after startup.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let settings = Settings {
            monitor_enabled: false,
            auto_stop_enabled: true,
            auto_stop_minutes: 1,
            ..Settings::default()
        };
        settings.save(&store).await?;

        // Refresh at 15s, cap armed by 20s, expired by 80s.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);

        shutdown_token.cancel();
        monitor_task.await??;
        refresh_task.await??;

        let mut expiries = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, monitor::MonitorEvent::AutoStopExpired) {
                expiries += 1;
            }
        }
        assert_eq!(expiries, 1);
        Ok(())
    }
}
