//! Polling state machine that warns ahead of the target time and then runs
//! the power action exactly once.
//!
//! ```text
//! Idle --arm--> Armed --lead reached--> Warned --target reached--> Fired
//!                 \_____________target reached_____________________/
//! ```
//!
//! `Fired` is terminal. Cancelling before it returns the scheduler to `Idle`.

use std::time::Duration;

use config_model::{ShutdownConfig, UrgencyConfig};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ScheduleError;
use crate::events::ScheduleEvent;
use crate::power::{PowerActionResult, PowerController, PowerMode};
use crate::time::{TimeOfDay, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub warning_lead_minutes: u32,
    pub urgency: UrgencyConfig,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &ShutdownConfig) -> Self {
        Self {
            tick_interval: cfg.tick_interval,
            warning_lead_minutes: cfg.warning_lead_minutes,
            urgency: cfg.urgency,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&ShutdownConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
    pub target: TimeOfDay,
    pub mode: PowerMode,
    pub warning_issued: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Armed,
    Warned,
    Fired,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Nothing is armed.
    Idle,
    Pending {
        remaining_minutes: u32,
    },
    Warned {
        warning_at: TimeOfDay,
    },
    Fired(PowerActionResult),
    /// The action already ran on an earlier tick.
    Finished,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Active(ScheduleState),
    Fired,
}

pub struct ShutdownScheduler<C, P> {
    clock: C,
    power: P,
    settings: SchedulerSettings,
    phase: Phase,
    events: Option<mpsc::Sender<ScheduleEvent>>,
}

impl<C: Clock, P: PowerController> ShutdownScheduler<C, P> {
    pub fn new(clock: C, power: P, settings: SchedulerSettings) -> Self {
        Self {
            clock,
            power,
            settings,
            phase: Phase::Idle,
            events: None,
        }
    }

    /// Routes [`ScheduleEvent`]s to `events`. Delivery never blocks a tick;
    /// events are dropped when the channel is full or closed.
    pub fn with_events(mut self, events: mpsc::Sender<ScheduleEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn phase(&self) -> SchedulerPhase {
        match &self.phase {
            Phase::Idle => SchedulerPhase::Idle,
            Phase::Active(state) if state.warning_issued => SchedulerPhase::Warned,
            Phase::Active(_) => SchedulerPhase::Armed,
            Phase::Fired => SchedulerPhase::Fired,
        }
    }

    pub fn state(&self) -> Option<&ScheduleState> {
        match &self.phase {
            Phase::Active(state) => Some(state),
            Phase::Idle | Phase::Fired => None,
        }
    }

    /// Arms (or re-arms) the schedule. A fired scheduler cannot be re-armed.
    pub fn arm(&mut self, target: TimeOfDay, mode: PowerMode) -> Result<(), ScheduleError> {
        if matches!(self.phase, Phase::Fired) {
            return Err(ScheduleError::AlreadyFired);
        }
        info!(target_time = %target, %mode, "schedule armed");
        self.phase = Phase::Active(ScheduleState {
            target,
            mode,
            warning_issued: false,
        });
        self.emit(ScheduleEvent::Armed { target, mode });
        Ok(())
    }

    /// Drops the active schedule. Returns `false` when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        match self.phase {
            Phase::Active(state) => {
                info!(target_time = %state.target, mode = %state.mode, "schedule cancelled");
                self.phase = Phase::Idle;
                self.emit(ScheduleEvent::Cancelled);
                true
            }
            Phase::Idle | Phase::Fired => false,
        }
    }

    /// Evaluates the schedule against the current time once.
    pub async fn tick(&mut self) -> TickOutcome {
        let state = match &self.phase {
            Phase::Idle => return TickOutcome::Idle,
            Phase::Fired => return TickOutcome::Finished,
            Phase::Active(state) => *state,
        };

        let now = self.clock.now();

        // Plain time-of-day comparison: a target earlier than `now` counts as
        // reached even if it was meant for after midnight.
        if now >= state.target {
            info!(%now, target_time = %state.target, mode = %state.mode, "target reached");
            self.phase = Phase::Fired;
            self.emit(ScheduleEvent::AboutToAct { mode: state.mode });
            let result = self.power.execute(state.mode).await;
            if result.succeeded {
                info!(
                    mode = %result.mode,
                    used_fallback = result.used_fallback,
                    "power action dispatched"
                );
            } else {
                warn!(
                    mode = %result.mode,
                    error = result.error_detail.as_deref().unwrap_or("unknown"),
                    "power action failed"
                );
            }
            self.emit(ScheduleEvent::ActionFinished(result.clone()));
            return TickOutcome::Fired(result);
        }

        let lead = self.settings.warning_lead_minutes;
        let warning_at = state.target.minus_minutes(lead);
        if !state.warning_issued && now == warning_at {
            info!(%now, target_time = %state.target, lead, "issuing warning");
            self.phase = Phase::Active(ScheduleState {
                warning_issued: true,
                ..state
            });
            self.emit(ScheduleEvent::Warning {
                target: state.target,
                lead_minutes: lead,
                mode: state.mode,
            });
            return TickOutcome::Warned { warning_at };
        }

        let remaining_minutes = now.minutes_until(state.target);
        self.emit(ScheduleEvent::Countdown {
            target: state.target,
            remaining_minutes,
            urgency: Urgency::from_remaining(remaining_minutes, &self.settings.urgency),
        });
        TickOutcome::Pending { remaining_minutes }
    }

    fn emit(&self, event: ScheduleEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.try_send(event) {
            debug!(error = %err, "dropping schedule event");
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(PowerActionResult),
    Cancelled,
    /// The scheduler was idle or had already fired when the loop started.
    NothingScheduled,
}

/// Ticks `scheduler` immediately and then every `tick_interval` until the
/// power action ran or `cancel` fires.
///
/// Cancellation is only observed between ticks; a running power action is
/// never interrupted.
pub async fn run<C: Clock, P: PowerController>(
    scheduler: &mut ShutdownScheduler<C, P>,
    cancel: CancellationToken,
) -> RunOutcome {
    let mut ticker = interval(scheduler.settings().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                scheduler.cancel();
                return RunOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        match scheduler.tick().await {
            TickOutcome::Fired(result) => return RunOutcome::Completed(result),
            TickOutcome::Idle | TickOutcome::Finished => return RunOutcome::NothingScheduled,
            TickOutcome::Pending { .. } | TickOutcome::Warned { .. } => {}
        }
    }
}
