use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use shutdown_at::clock::ManualClock;
use shutdown_at::events::ScheduleEvent;
use shutdown_at::power::{
    CommandLine, CommandOutput, CommandRunner, PowerMode, PowerPlan, SystemPowerController,
};
use shutdown_at::scheduler::{
    RunOutcome, SchedulerPhase, SchedulerSettings, ShutdownScheduler, TickOutcome, run,
};
use shutdown_at::time::TimeOfDay;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct RecordingRunner {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        let key = command.to_string();
        self.calls.lock().unwrap().push(key.clone());
        match key.as_str() {
            "systemctl poweroff" | "systemctl hibernate" => Ok(CommandOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
            other => Err(anyhow!("unexpected command '{other}'")),
        }
    }
}

fn t(hour: u32, minute: u32) -> TimeOfDay {
    TimeOfDay::new(hour, minute).expect("valid time")
}

fn controller(runner: RecordingRunner) -> SystemPowerController<RecordingRunner> {
    let plan = PowerPlan {
        primary_script: Some("/nonexistent/store-and-shutdown.sh".into()),
        shutdown_command: vec!["systemctl".into(), "poweroff".into()],
        hibernate_command: vec!["systemctl".into(), "hibernate".into()],
        command_timeout: None,
        dry_run: false,
    };
    SystemPowerController::with_runner(plan, runner).expect("valid plan")
}

#[tokio::test]
async fn minute_by_minute_countdown_warns_once_and_fires_once() {
    let clock = ManualClock::new(t(9, 57));
    let runner = RecordingRunner::default();
    let (tx, mut rx) = mpsc::channel(32);
    let mut scheduler = ShutdownScheduler::new(
        clock.clone(),
        controller(runner.clone()),
        SchedulerSettings::default(),
    )
    .with_events(tx);
    scheduler.arm(t(10, 0), PowerMode::Shutdown).unwrap();

    let mut warnings = Vec::new();
    let mut fired = Vec::new();
    for _ in 0..4 {
        // A few ticks per simulated minute, like a 1s ticker would produce.
        for _ in 0..3 {
            match scheduler.tick().await {
                TickOutcome::Warned { warning_at } => warnings.push(warning_at),
                TickOutcome::Fired(result) => fired.push(result),
                _ => {}
            }
        }
        clock.advance_minutes(1);
    }

    assert_eq!(warnings, vec![t(9, 58)]);
    assert_eq!(fired.len(), 1);
    assert!(fired[0].succeeded);
    assert!(fired[0].used_fallback);
    assert_eq!(scheduler.phase(), SchedulerPhase::Fired);
    assert_eq!(runner.calls(), vec!["systemctl poweroff".to_string()]);

    let mut warning_events = 0;
    let mut about_to_act = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ScheduleEvent::Warning { lead_minutes, .. } => {
                assert_eq!(lead_minutes, 2);
                warning_events += 1;
            }
            ScheduleEvent::AboutToAct { mode } => {
                assert_eq!(mode, PowerMode::Shutdown);
                about_to_act += 1;
            }
            _ => {}
        }
    }
    assert_eq!(warning_events, 1);
    assert_eq!(about_to_act, 1);
}

#[tokio::test]
async fn custom_warning_lead_is_honoured() {
    let clock = ManualClock::new(t(21, 55));
    let settings = SchedulerSettings {
        warning_lead_minutes: 5,
        ..SchedulerSettings::default()
    };
    let mut scheduler =
        ShutdownScheduler::new(clock.clone(), controller(RecordingRunner::default()), settings);
    scheduler.arm(t(22, 0), PowerMode::Hibernate).unwrap();

    assert!(matches!(
        scheduler.tick().await,
        TickOutcome::Warned { warning_at } if warning_at == t(21, 55)
    ));
}

#[tokio::test]
async fn run_loop_fires_when_the_clock_reaches_the_target() {
    let clock = ManualClock::new(t(22, 58));
    let runner = RecordingRunner::default();
    let settings = SchedulerSettings {
        tick_interval: Duration::from_millis(5),
        ..SchedulerSettings::default()
    };
    let mut scheduler = ShutdownScheduler::new(clock.clone(), controller(runner.clone()), settings);
    scheduler.arm(t(23, 0), PowerMode::Hibernate).unwrap();

    let advance = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        clock.set(t(22, 59));
        tokio::time::sleep(Duration::from_millis(30)).await;
        clock.set(t(23, 0));
    };
    let driver = tokio::time::timeout(
        Duration::from_secs(2),
        run(&mut scheduler, CancellationToken::new()),
    );
    let (outcome, ()) = tokio::join!(driver, advance);

    match outcome.expect("run loop finished in time") {
        RunOutcome::Completed(result) => {
            assert_eq!(result.mode, PowerMode::Hibernate);
            assert!(result.succeeded);
            assert!(!result.used_fallback);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(runner.calls(), vec!["systemctl hibernate".to_string()]);

    // Fired is terminal: further ticks never reach the runner again.
    assert!(matches!(scheduler.tick().await, TickOutcome::Finished));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn cancelling_the_run_loop_never_powers_down() {
    let clock = ManualClock::new(t(8, 0));
    let runner = RecordingRunner::default();
    let settings = SchedulerSettings {
        tick_interval: Duration::from_millis(5),
        ..SchedulerSettings::default()
    };
    let mut scheduler = ShutdownScheduler::new(clock, controller(runner.clone()), settings);
    scheduler.arm(t(9, 0), PowerMode::Shutdown).unwrap();

    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            cancel.cancel();
        }
    };
    let (outcome, ()) = tokio::join!(run(&mut scheduler, cancel), trigger);

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    assert!(runner.calls().is_empty());
}
