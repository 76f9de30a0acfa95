//! Terminal front end: the target time prompt and the countdown printer.

use std::io::{self, Write};

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::events::ScheduleEvent;
use crate::power::{PowerActionResult, PowerMode};
use crate::time::{TimeOfDay, Urgency, format_remaining};

/// Asks for a target time until a valid `HH.MM` is entered.
///
/// An empty line accepts `default`. End of input returns `None`, which the
/// caller treats as a cancel.
pub async fn prompt_target<R, W>(
    input: &mut R,
    output: &mut W,
    default: TimeOfDay,
) -> Result<Option<TimeOfDay>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        output
            .write_all(format!("Power down at (HH.MM) [{default}]: ").as_bytes())
            .await?;
        output.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let entry = line.trim_end_matches(['\r', '\n']);
        if entry.is_empty() {
            return Ok(Some(default));
        }
        match TimeOfDay::parse(entry) {
            Ok(target) => return Ok(Some(target)),
            Err(err) => {
                debug!(input = entry, issue = %err.issue(), "rejected target time");
                output.write_all(format!("{err}\n").as_bytes()).await?;
            }
        }
    }
}

/// Prints schedule events as they arrive.
///
/// Countdown lines are only written when the minute count changes.
pub struct Console<W> {
    out: W,
    mode: Option<PowerMode>,
    last_remaining: Option<u32>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mode: None,
            last_remaining: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn handle(&mut self, event: &ScheduleEvent) -> io::Result<()> {
        match event {
            ScheduleEvent::Armed { target, mode } => {
                self.mode = Some(*mode);
                self.last_remaining = None;
                writeln!(
                    self.out,
                    "{} scheduled at {target}. Press Ctrl-C to cancel.",
                    capitalized(*mode)
                )?;
            }
            ScheduleEvent::Countdown {
                remaining_minutes,
                urgency,
                ..
            } => {
                if self.last_remaining == Some(*remaining_minutes) {
                    return Ok(());
                }
                self.last_remaining = Some(*remaining_minutes);
                let mode = self.mode.map_or("power down".to_string(), |m| m.to_string());
                write!(self.out, "{mode} in {}", format_remaining(*remaining_minutes))?;
                match urgency_label(*urgency) {
                    Some(label) => writeln!(self.out, " [{label}]")?,
                    None => writeln!(self.out)?,
                }
            }
            ScheduleEvent::Warning {
                target,
                lead_minutes,
                mode,
            } => {
                writeln!(
                    self.out,
                    "WARNING: {mode} in {lead_minutes} minute{} (at {target})",
                    if *lead_minutes == 1 { "" } else { "s" }
                )?;
            }
            ScheduleEvent::AboutToAct { mode } => {
                writeln!(self.out, "Target reached, starting {mode} now.")?;
            }
            ScheduleEvent::ActionFinished(result) => self.finished(result)?,
            ScheduleEvent::Cancelled => {
                writeln!(self.out, "Cancelled.")?;
            }
        }
        self.out.flush()
    }

    fn finished(&mut self, result: &PowerActionResult) -> io::Result<()> {
        if result.succeeded {
            let via = if result.used_fallback {
                " (via the OS command)"
            } else {
                ""
            };
            writeln!(self.out, "{} dispatched{via}.", capitalized(result.mode))
        } else {
            writeln!(
                self.out,
                "ERROR: {} failed: {}",
                result.mode,
                result.error_detail.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

fn capitalized(mode: PowerMode) -> &'static str {
    match mode {
        PowerMode::Shutdown => "Shutdown",
        PowerMode::Hibernate => "Hibernate",
    }
}

fn urgency_label(urgency: Urgency) -> Option<&'static str> {
    match urgency {
        Urgency::Normal => None,
        Urgency::Soon => Some("soon"),
        Urgency::Near => Some("near"),
        Urgency::Imminent => Some("imminent"),
    }
}
