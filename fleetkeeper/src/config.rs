use crate::core::{FleetError, FleetSpec, Result};
use crate::notify::{ConsoleNotifier, LogNotifier, Notifier};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub fleets: Vec<FleetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub interval_min_secs: u64,
    pub interval_max_secs: u64,
    /// Check every fleet right away instead of after the first interval
    pub run_on_start: bool,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_min_secs: 60,
            interval_max_secs: 120,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-node connect/command timeout (milliseconds)
    pub command_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_ms: 5000,
        }
    }
}

impl TimeoutConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub sink: NotifySink,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifySink {
    #[default]
    Console,
    Log,
}

impl NotifyConfig {
    pub fn build(&self) -> Arc<dyn Notifier> {
        match self.sink {
            NotifySink::Console => Arc::new(ConsoleNotifier),
            NotifySink::Log => Arc::new(LogNotifier),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: MonitorConfig =
            serde_yaml::from_str(content).map_err(|e| FleetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        if monitor.interval_min_secs == 0 {
            return Err(FleetError::Config(
                "monitor.interval_min_secs must be positive".to_string(),
            ));
        }
        if monitor.interval_max_secs < monitor.interval_min_secs {
            return Err(FleetError::Config(format!(
                "monitor.interval_max_secs ({}) is below interval_min_secs ({})",
                monitor.interval_max_secs, monitor.interval_min_secs
            )));
        }
        if self.timeouts.command_ms == 0 {
            return Err(FleetError::Config(
                "timeouts.command_ms must be positive".to_string(),
            ));
        }

        for fleet in &self.fleets {
            if fleet.addresses().is_empty() {
                return Err(FleetError::Config(format!(
                    "{} fleet {} lists no addresses",
                    fleet.kind(),
                    fleet.app_name()
                )));
            }
        }
        Ok(())
    }
}
