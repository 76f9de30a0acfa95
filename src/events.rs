use crate::power::{PowerActionResult, PowerMode};
use crate::time::{TimeOfDay, Urgency};

/// Notifications from the scheduler to whatever presents it.
#[derive(Debug, Clone)]
pub enum ScheduleEvent {
    Armed {
        target: TimeOfDay,
        mode: PowerMode,
    },
    /// Emitted on every tick that neither warns nor fires.
    Countdown {
        target: TimeOfDay,
        remaining_minutes: u32,
        urgency: Urgency,
    },
    /// Sent once, `lead_minutes` before the target.
    Warning {
        target: TimeOfDay,
        lead_minutes: u32,
        mode: PowerMode,
    },
    /// The target was reached; the power action starts right after this.
    AboutToAct {
        mode: PowerMode,
    },
    ActionFinished(PowerActionResult),
    Cancelled,
}
