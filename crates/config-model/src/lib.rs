use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub use power::PowerConfig;
pub use urgency::UrgencyConfig;

/// Minutes in one day; time-of-day arithmetic wraps at this bound.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ShutdownConfig {
    /// Interval between two evaluations of the schedule.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Minutes before the target at which the one-time warning fires.
    pub warning_lead_minutes: u32,
    /// Offset used to prefill the target time prompt.
    pub default_delay_minutes: u32,
    /// Upper bound for each external power command. Unbounded when absent.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
    /// Log power commands instead of running them.
    pub dry_run: bool,
    pub power: PowerConfig,
    pub urgency: UrgencyConfig,
}

impl ShutdownConfig {
    const fn default_tick_interval() -> Duration {
        Duration::from_secs(1)
    }

    const fn default_warning_lead_minutes() -> u32 {
        2
    }

    const fn default_delay_minutes() -> u32 {
        80
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let cfg: ShutdownConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        Ok(cfg)
    }

    /// Loads `path` when given, otherwise falls back to built-in defaults.
    pub fn load_or_default(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.tick_interval.is_zero(),
            "tick-interval must be greater than zero"
        );
        ensure!(
            self.warning_lead_minutes < MINUTES_PER_DAY,
            "warning-lead-minutes must be less than {MINUTES_PER_DAY}"
        );
        ensure!(
            self.default_delay_minutes < MINUTES_PER_DAY,
            "default-delay-minutes must be less than {MINUTES_PER_DAY}"
        );
        if let Some(timeout) = self.command_timeout {
            ensure!(!timeout.is_zero(), "command-timeout must be positive");
        }
        self.power.validate()?;
        self.urgency.validate()?;
        Ok(self)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            tick_interval: Self::default_tick_interval(),
            warning_lead_minutes: Self::default_warning_lead_minutes(),
            default_delay_minutes: Self::default_delay_minutes(),
            command_timeout: None,
            dry_run: false,
            power: PowerConfig::default(),
            urgency: UrgencyConfig::default(),
        }
    }
}

mod power {
    use super::*;

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "kebab-case", default)]
    pub struct PowerConfig {
        /// Preferred shutdown helper; the OS command is used when it is absent or fails.
        pub primary_script: Option<PathBuf>,
        pub shutdown_command: Vec<String>,
        pub hibernate_command: Vec<String>,
    }

    impl PowerConfig {
        #[cfg(windows)]
        fn default_shutdown_command() -> Vec<String> {
            vec!["shutdown".into(), "/s".into(), "/t".into(), "0".into()]
        }

        #[cfg(not(windows))]
        fn default_shutdown_command() -> Vec<String> {
            vec!["systemctl".into(), "poweroff".into()]
        }

        #[cfg(windows)]
        fn default_hibernate_command() -> Vec<String> {
            vec![
                "rundll32.exe".into(),
                "powrprof.dll,SetSuspendState".into(),
                "0,1,0".into(),
            ]
        }

        #[cfg(not(windows))]
        fn default_hibernate_command() -> Vec<String> {
            vec!["systemctl".into(), "hibernate".into()]
        }

        pub(super) fn validate(&self) -> Result<()> {
            for (field, command) in [
                ("shutdown-command", &self.shutdown_command),
                ("hibernate-command", &self.hibernate_command),
            ] {
                ensure!(
                    command.first().is_some_and(|program| !program.trim().is_empty()),
                    "power.{field} must name a program"
                );
            }
            if let Some(script) = &self.primary_script {
                ensure!(
                    !script.as_os_str().is_empty(),
                    "power.primary-script must not be blank when provided"
                );
            }
            Ok(())
        }
    }

    impl Default for PowerConfig {
        fn default() -> Self {
            Self {
                primary_script: None,
                shutdown_command: Self::default_shutdown_command(),
                hibernate_command: Self::default_hibernate_command(),
            }
        }
    }
}

mod urgency {
    use super::*;

    /// Countdown bands, in minutes remaining before the target.
    #[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "kebab-case", default)]
    pub struct UrgencyConfig {
        pub imminent_minutes: u32,
        pub near_minutes: u32,
        pub soon_minutes: u32,
    }

    impl UrgencyConfig {
        pub(super) fn validate(&self) -> Result<()> {
            ensure!(
                self.imminent_minutes <= self.near_minutes
                    && self.near_minutes <= self.soon_minutes,
                "urgency thresholds must satisfy imminent <= near <= soon"
            );
            Ok(())
        }
    }

    impl Default for UrgencyConfig {
        fn default() -> Self {
            Self {
                imminent_minutes: 2,
                near_minutes: 5,
                soon_minutes: 10,
            }
        }
    }
}
