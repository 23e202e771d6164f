pub mod daemon_cmd;
pub mod print;
pub mod range;

use std::{future::Future, path::PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use range::RangeArgs;
use tracing::{level_filters::LevelFilter, warn};

use crate::{
    daemon::start_daemon,
    engine::{EngineResult, TrackerEngine},
    settings::Settings,
    stats::RangeKind,
    store::{
        StoreDir,
        entities::{NewTracker, TrackerId, TrackerPatch, WorkDays},
    },
    utils::{
        dir::create_application_default_path,
        logging::{CLI_PREFIX, enable_logging},
        percentage::Percentage,
    },
};

#[derive(Parser, Debug)]
#[command(name = "stint", version, long_about = None)]
#[command(about = "Track work sessions and how far ahead or behind target you are")]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        help = "Store directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Create a tracker")]
    Add {
        name: String,
        #[arg(help = "Hours expected on each work day")]
        target_hours: f64,
        #[arg(
            long = "days",
            help = "Work days as weekday indices, 0 is Sunday. Example: 1,2,3,4,5. Monday through Friday when omitted"
        )]
        work_days: Option<WorkDays>,
        #[arg(long, short)]
        description: Option<String>,
    },
    #[command(about = "Change tracker fields, unset ones keep their value")]
    Edit {
        id: TrackerId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "target", help = "Hours expected on each work day")]
        target_hours: Option<f64>,
        #[arg(long = "days", help = "Work days as weekday indices, 0 is Sunday")]
        work_days: Option<WorkDays>,
        #[arg(long, short, help = "New description. An empty string clears it")]
        description: Option<String>,
    },
    #[command(about = "Hide a tracker from lists and stop its running session")]
    Archive { id: TrackerId },
    Unarchive { id: TrackerId },
    #[command(about = "Delete a tracker and its whole session history")]
    Delete { id: TrackerId },
    #[command(about = "Show trackers")]
    List {
        #[arg(long, help = "Include archived trackers")]
        archived: bool,
    },
    #[command(about = "Start tracking time on a tracker")]
    Start { id: TrackerId },
    #[command(about = "Stop a running session")]
    Stop {
        #[arg(required_unless_present = "all")]
        id: Option<TrackerId>,
        #[arg(long, conflicts_with = "id", help = "Stop every running session")]
        all: bool,
    },
    #[command(about = "Show running sessions")]
    Active,
    #[command(about = "Show completed sessions of a tracker")]
    Log {
        #[arg(help = "Tracker id. Repeats the last used one when omitted")]
        id: Option<TrackerId>,
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Work debt and advance of a tracker against its target")]
    Stats {
        #[arg(help = "Tracker id. Repeats the last used one when omitted")]
        id: Option<TrackerId>,
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Progress against today's target")]
    Today {
        #[arg(long, help = "Single tracker instead of all live ones")]
        tracker: Option<TrackerId>,
    },
    #[command(about = "Logged minutes per day")]
    Daily {
        #[arg(long, help = "Single tracker instead of all")]
        tracker: Option<TrackerId>,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, help = "Count running sessions up to now")]
        live: bool,
    },
    #[command(about = "Total hours logged in a range")]
    Total {
        #[arg(long, help = "Single tracker instead of all")]
        tracker: Option<TrackerId>,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, help = "Count running sessions up to now")]
        live: bool,
    },
    #[command(about = "Per-day percentage of target met")]
    Trend {
        #[arg(long, help = "Single tracker instead of all live ones")]
        tracker: Option<TrackerId>,
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "How logged time splits between trackers")]
    Share {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(
            short = 'p',
            long = "percentage",
            help = "Filter trackers to have at least specified percentage",
            default_value_t = Percentage::new_opt(1.).unwrap()
        )]
        min_percentage: Percentage,
    },
    #[command(about = "Show or change daemon behavior")]
    Config {
        #[command(flatten)]
        set: ConfigArgs,
    },
    #[command(subcommand, about = "Control the background daemon")]
    Daemon(DaemonCommands),
}

#[derive(Debug, clap::Args)]
struct ConfigArgs {
    #[arg(
        long = "idle-threshold",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Seconds of idleness after which every running session is stopped"
    )]
    idle_threshold: Option<u32>,
    #[arg(
        long,
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Watch for idleness at all (on/off)"
    )]
    monitor: Option<bool>,
    #[arg(
        long = "auto-stop",
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Cap how long a session may run (on/off)"
    )]
    auto_stop: Option<bool>,
    #[arg(
        long = "auto-stop-minutes",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Minutes until a capped session is stopped"
    )]
    auto_stop_minutes: Option<u32>,
}

impl ConfigArgs {
    fn is_empty(&self) -> bool {
        self.idle_threshold.is_none()
            && self.monitor.is_none()
            && self.auto_stop.is_none()
            && self.auto_stop_minutes.is_none()
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(secs) = self.idle_threshold {
            settings.idle_threshold_secs = secs;
        }
        if let Some(enabled) = self.monitor {
            settings.monitor_enabled = enabled;
        }
        if let Some(enabled) = self.auto_stop {
            settings.auto_stop_enabled = enabled;
        }
        if let Some(minutes) = self.auto_stop_minutes {
            settings.auto_stop_minutes = minutes;
        }
    }
}

#[derive(Subcommand, Debug)]
enum DaemonCommands {
    #[command(about = "Start the background daemon, replacing a running one")]
    Init,
    #[command(
        about = "Run the daemon directly in the current console. Used for creating a daemon internally and for debugging"
    )]
    Serve,
    #[command(about = "Stop the running daemon")]
    Stop,
    #[command(about = "Check whether the daemon is running")]
    Status,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, Ok)?;
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Daemon(DaemonCommands::Init) => daemon_cmd::launch_daemon(args.dir.as_deref()),
        Commands::Daemon(DaemonCommands::Serve) => start_daemon(app_dir).await,
        Commands::Daemon(DaemonCommands::Stop) => daemon_cmd::stop_daemon(),
        Commands::Daemon(DaemonCommands::Status) => daemon_cmd::daemon_status(),
        commands => {
            let engine = TrackerEngine::new(StoreDir::new(app_dir)?);
            run_tracker_command(commands, engine).await
        }
    }
}

async fn run_tracker_command(commands: Commands, engine: TrackerEngine) -> Result<()> {
    match commands {
        Commands::Add {
            name,
            target_hours,
            work_days,
            description,
        } => {
            let tracker = retry_once(|| {
                engine.create_tracker(NewTracker {
                    name: name.clone(),
                    target_hours,
                    work_days,
                    description: description.clone(),
                })
            })
            .await?;
            println!(
                "Created tracker {}: {} at {}h/day on {}",
                tracker.id,
                tracker.name,
                tracker.target_hours,
                print::format_work_days(tracker.work_days),
            );
        }
        Commands::Edit {
            id,
            name,
            target_hours,
            work_days,
            description,
        } => {
            let tracker = retry_once(|| {
                engine.update_tracker(
                    id,
                    TrackerPatch {
                        name: name.clone(),
                        target_hours,
                        work_days,
                        description: description.clone(),
                    },
                )
            })
            .await?;
            println!("Updated tracker {}: {}", tracker.id, tracker.name);
        }
        Commands::Archive { id } => {
            let tracker = retry_once(|| engine.archive_tracker(id)).await?;
            println!("Archived tracker {}: {}", tracker.id, tracker.name);
        }
        Commands::Unarchive { id } => {
            let tracker = retry_once(|| engine.unarchive_tracker(id)).await?;
            println!("Unarchived tracker {}: {}", tracker.id, tracker.name);
        }
        Commands::Delete { id } => {
            retry_once(|| engine.delete_tracker(id)).await?;
            println!("Deleted tracker {id} and its sessions");
        }
        Commands::List { archived } => {
            let trackers = retry_once(|| engine.list_trackers(archived)).await?;
            print::print_trackers(&trackers);
        }
        Commands::Start { id } => {
            let session = retry_once(|| engine.start_session(id)).await?;
            println!(
                "Started tracker {id} at {}",
                session
                    .start_time
                    .with_timezone(&chrono::Local)
                    .format("%H:%M")
            );
        }
        Commands::Stop { id: Some(id), .. } => {
            let session = retry_once(|| engine.stop_session(id)).await?;
            println!(
                "Stopped tracker {id} after {}",
                print::format_minutes(session.duration_minutes)
            );
        }
        Commands::Stop { id: None, .. } => {
            let outcome = retry_once(|| engine.stop_all()).await?;
            print::print_stopped(&outcome);
        }
        Commands::Active => {
            let active = retry_once(|| engine.active_sessions()).await?;
            let trackers = retry_once(|| engine.list_trackers(true)).await?;
            print::print_active(&active, &trackers);
        }
        Commands::Log { id, range } => {
            let (settings, id) = tracked_target(&engine, id).await?;
            let selection = range.resolve(settings.last_range)?;
            let sessions =
                retry_once(|| engine.completed_sessions(id, Some(&selection.range))).await?;
            print::print_sessions(&sessions);
            remember(&engine, Some(id), selection.named).await;
        }
        Commands::Stats { id, range } => {
            let (settings, id) = tracked_target(&engine, id).await?;
            let selection = range.resolve(settings.last_range)?;
            let stats = retry_once(|| engine.work_stats(id, &selection.range)).await?;
            print::print_work_stats(&stats);
            remember(&engine, Some(id), selection.named).await;
        }
        Commands::Today { tracker } => {
            let stats = retry_once(|| engine.today_stats(tracker)).await?;
            print::print_today(&stats);
            remember(&engine, tracker, None).await;
        }
        Commands::Daily {
            tracker,
            range,
            live,
        } => {
            let settings = Settings::load(engine.store()).await?;
            let selection = range.resolve(settings.last_range)?;
            let totals =
                retry_once(|| engine.daily_totals(tracker, &selection.range, live)).await?;
            print::print_daily(&totals);
            remember(&engine, tracker, selection.named).await;
        }
        Commands::Total {
            tracker,
            range,
            live,
        } => {
            let settings = Settings::load(engine.store()).await?;
            let selection = range.resolve(settings.last_range)?;
            let hours = retry_once(|| engine.total_hours(tracker, &selection.range, live)).await?;
            println!("{hours}h");
            remember(&engine, tracker, selection.named).await;
        }
        Commands::Trend { tracker, range } => {
            let settings = Settings::load(engine.store()).await?;
            let selection = range.resolve(settings.last_range)?;
            let points =
                retry_once(|| engine.productivity_trend(tracker, &selection.range)).await?;
            print::print_trend(&points);
            remember(&engine, tracker, selection.named).await;
        }
        Commands::Share {
            range,
            min_percentage,
        } => {
            let settings = Settings::load(engine.store()).await?;
            let selection = range.resolve(settings.last_range)?;
            let shares = retry_once(|| engine.task_distribution(&selection.range)).await?;
            print::print_distribution(&shares, min_percentage);
            remember(&engine, None, selection.named).await;
        }
        Commands::Config { set } => {
            if set.is_empty() {
                let settings = Settings::load(engine.store()).await?;
                print::print_settings(&settings);
            } else {
                let mut settings = Settings::load(engine.store()).await?;
                set.apply(&mut settings);
                settings.save(engine.store()).await?;
                print::print_settings(&settings);
                println!("The daemon picks changes up within half a minute.");
            }
        }
        Commands::Daemon(_) => unreachable!("handled before the engine is opened"),
    }
    Ok(())
}

/// Picks the tracker a reporting command is about: the explicit id, or the
/// one remembered from last time.
async fn tracked_target(
    engine: &TrackerEngine,
    id: Option<TrackerId>,
) -> Result<(Settings, TrackerId)> {
    let settings = Settings::load(engine.store()).await?;
    match id.or(settings.last_tracker) {
        Some(id) => Ok((settings, id)),
        None => Err(Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "No tracker given and none remembered from a previous run",
            )
            .into()),
    }
}

/// Stores the filters a reporting command used, to repeat them next time.
/// Preference bookkeeping never fails a command that already printed its
/// answer.
async fn remember(engine: &TrackerEngine, tracker: Option<TrackerId>, range: Option<RangeKind>) {
    if tracker.is_none() && range.is_none() {
        return;
    }
    let result = async {
        let mut settings = Settings::load(engine.store()).await?;
        if let Some(tracker) = tracker {
            settings.last_tracker = Some(tracker);
        }
        if let Some(range) = range {
            settings.last_range = Some(range);
        }
        settings.save(engine.store()).await
    }
    .await;
    if let Err(e) = result {
        warn!("Could not remember the last used filters: {e}");
    }
}

/// Runs an engine call again, once, when it failed on store I/O. Input and
/// state errors are final and surface immediately.
async fn retry_once<T, F, Fut>(op: F) -> EngineResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!("Transient store failure, retrying once: {e}");
            op().await
        }
        other => other,
    }
}
