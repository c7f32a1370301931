//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `timeboard_core` linkage and print its version.
//! - Run a deterministic simulated-clock walkthrough of the calendar core.
//! - With `--run`, drive a persisted session on the wall clock.
//!
//! Usage: `timeboard_cli [config.toml] [--run <seconds>]`

use chrono::{NaiveDateTime, TimeDelta};
use log::info;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use timeboard_core::{
    init_logging_from_config, open_db, CalendarSnapshotRepository, CalendarView, CoreConfig,
    ManualRealTime, Planner, SharedPlanner, SqliteSnapshotRepository, SystemRealTime, TimeFilter,
    VirtualClock,
};

const WALKTHROUGH_START: &str = "2025-01-01T08:00:00";
/// Real minutes between two walkthrough steps.
const WALKTHROUGH_TICK_MINUTES: i64 = 1;
const WALKTHROUGH_MAX_TICKS: u32 = 120;

struct Args {
    config_path: Option<String>,
    run_for: Option<Duration>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config_path: None,
        run_for: None,
    };
    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        if arg == "--run" {
            let seconds = raw
                .next()
                .ok_or("--run needs a number of seconds")?
                .parse::<u64>()
                .map_err(|err| format!("--run: {err}"))?;
            args.run_for = Some(Duration::from_secs(seconds));
        } else if args.config_path.is_none() {
            args.config_path = Some(arg);
        } else {
            return Err(format!("unexpected argument `{arg}`"));
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    println!("timeboard_core ping={}", timeboard_core::ping());
    println!("timeboard_core version={}", timeboard_core::core_version());

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("usage error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let config = match args.config_path.as_deref().map(CoreConfig::load) {
        Some(Ok(config)) => config,
        Some(Err(err)) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
        None => CoreConfig::default(),
    };
    if let Err(err) = init_logging_from_config(&config.logging) {
        eprintln!("logging disabled: {err}");
    }

    let outcome = match args.run_for {
        Some(duration) => run_session(&config, duration),
        None => walkthrough(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("timeboard failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn walkthrough(config: &CoreConfig) -> Result<(), Box<dyn Error>> {
    let start = NaiveDateTime::parse_from_str(WALKTHROUGH_START, "%Y-%m-%dT%H:%M:%S")?;
    let real = ManualRealTime::new(start);
    let clock = Arc::new(VirtualClock::new(real.clone()));
    config.apply_to_clock(&clock)?;
    let now = clock.now();

    let mut planner = Planner::new("demo", clock.clone());
    let calendar = planner.add_calendar("work")?;
    calendar.create_event("standup", now + TimeDelta::minutes(30), now + TimeDelta::minutes(45))?;
    calendar.create_event("review", now + TimeDelta::hours(2), now + TimeDelta::hours(3))?;
    calendar.tag_event("standup", "team")?;
    calendar.tag_event("review", "team")?;

    let reminders = planner.schedule_recurring_alert(
        "work",
        "standup",
        "reminder",
        now + TimeDelta::minutes(10),
        now + TimeDelta::minutes(30),
        TimeDelta::minutes(10),
    )?;
    println!("scheduled reminders={}", reminders.len());

    info!(
        "event=walkthrough module=cli status=start speed={}",
        clock.speed()
    );
    let horizon = now + TimeDelta::hours(1);
    for tick in 1..=WALKTHROUGH_MAX_TICKS {
        real.advance(TimeDelta::minutes(WALKTHROUGH_TICK_MINUTES));
        for alert in planner.drain_due_alerts() {
            println!("tick={tick} now={} alert={alert}", clock.now());
        }
        if clock.now() >= horizon {
            break;
        }
    }

    let mut merged = planner.merged_view();
    for (label, filter) in [
        ("past", TimeFilter::Past),
        ("ongoing", TimeFilter::Ongoing),
        ("future", TimeFilter::Future),
    ] {
        let names: Vec<String> = merged
            .events(filter)
            .iter()
            .map(|event| event.to_string())
            .collect();
        println!("{label}=[{}]", names.join(", "));
    }
    println!("tags={:?}", merged.all_tags());
    Ok(())
}

/// Loads every saved calendar, rings alerts on the wall clock for
/// `duration`, then saves the calendars back.
fn run_session(config: &CoreConfig, duration: Duration) -> Result<(), Box<dyn Error>> {
    let clock = Arc::new(config.open_clock(SystemRealTime)?);
    let conn = open_db(&config.storage.db_path)?;
    let repo = SqliteSnapshotRepository::new(&conn);

    let mut planner = Planner::new("session", clock.clone());
    for name in repo.list_names()? {
        planner.insert_calendar(repo.load_calendar(&name, clock.clone())?)?;
    }
    println!(
        "session now={} speed={} calendars={:?} pending_alerts={}",
        clock.now(),
        clock.speed(),
        planner.calendar_names(),
        planner.alarm().len()
    );

    let shared = SharedPlanner::new(planner);
    let poller = shared.spawn_alarm_poller(config.poll_interval(), |alert| {
        println!("alert={alert}");
    })?;
    std::thread::sleep(duration);
    poller.stop();

    shared.with(|planner| -> Result<(), Box<dyn Error>> {
        for name in planner.calendar_names() {
            if let Some(calendar) = planner.calendar(&name) {
                repo.save_calendar(calendar)?;
            }
        }
        Ok(())
    })?;
    info!(
        "event=session module=cli status=ok seconds={} now={}",
        duration.as_secs(),
        clock.now()
    );
    Ok(())
}
