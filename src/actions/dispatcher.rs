use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::executor::{CommandExecutor, CommandOutcome};
use super::parsers;
use super::registry::CommandRegistry;
use super::Action;
use crate::error::ControlError;
use crate::permissions::{Capability, PermissionSet};

/// Typed result of a dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionOutput {
    Done(CommandOutcome),
    Percent(f64),
    Uptime(String),
    VolumeLevel(u32),
    Muted(bool),
}

/// CPU, RAM and uptime; each field absent when its command or parse failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsReport {
    pub cpu_usage: Option<f64>,
    pub ram_usage: Option<f64>,
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeStatus {
    pub level: Option<u32>,
    pub muted: Option<bool>,
}

/// Checks capability, resolves, executes and parses host actions.
#[derive(Clone)]
pub struct ActionDispatcher {
    registry: CommandRegistry,
    executor: Arc<dyn CommandExecutor>,
}

impl ActionDispatcher {
    pub fn new(registry: CommandRegistry, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn invoke(
        &self,
        action: Action,
        permissions: &PermissionSet,
        param: Option<i64>,
    ) -> Result<ActionOutput, ControlError> {
        let required = action.required_capability();
        if !permissions.allows(required) {
            return Err(ControlError::Forbidden(required));
        }

        if action == Action::SetVolume {
            match param {
                Some(level) if (0..=100).contains(&level) => {}
                Some(level) => {
                    return Err(ControlError::InvalidParameter(format!(
                        "volume level must be between 0 and 100, got {level}"
                    )))
                }
                None => {
                    return Err(ControlError::InvalidParameter(
                        "volume level is required".into(),
                    ))
                }
            }
        }

        let template = self.registry.resolve(action.key())?;
        let outcome = self
            .executor
            .run(&template, param, action.success_phrase());
        if !outcome.success {
            return Err(ControlError::ExecutionFailure(outcome.message));
        }
        info!(action = action.key(), "action completed");

        let output = match action {
            Action::GetCpuUsage => ActionOutput::Percent(parsers::parse_cpu_usage(&outcome.output)?),
            Action::GetRamUsage => ActionOutput::Percent(parsers::parse_ram_usage(&outcome.output)?),
            Action::GetUptime => ActionOutput::Uptime(parsers::parse_uptime(&outcome.output)?),
            Action::GetVolume => {
                ActionOutput::VolumeLevel(parsers::parse_volume_level(&outcome.output)?)
            }
            Action::GetMuteStatus => {
                ActionOutput::Muted(parsers::parse_mute_status(&outcome.output)?)
            }
            _ => ActionOutput::Done(outcome),
        };
        Ok(output)
    }

    /// Collect host metrics. Individual failures leave their field empty.
    pub fn metrics(&self, permissions: &PermissionSet) -> Result<MetricsReport, ControlError> {
        if !permissions.allows(Capability::SystemMetrics) {
            return Err(ControlError::Forbidden(Capability::SystemMetrics));
        }
        let mut report = MetricsReport::default();
        if let Some(ActionOutput::Percent(v)) = self.field(Action::GetCpuUsage, permissions) {
            report.cpu_usage = Some(v);
        }
        if let Some(ActionOutput::Percent(v)) = self.field(Action::GetRamUsage, permissions) {
            report.ram_usage = Some(v);
        }
        if let Some(ActionOutput::Uptime(v)) = self.field(Action::GetUptime, permissions) {
            report.uptime = Some(v);
        }
        Ok(report)
    }

    /// Current volume level and mute flag, each optional.
    pub fn volume_status(&self, permissions: &PermissionSet) -> Result<VolumeStatus, ControlError> {
        if !permissions.allows(Capability::Volume) {
            return Err(ControlError::Forbidden(Capability::Volume));
        }
        let mut status = VolumeStatus::default();
        if let Some(ActionOutput::VolumeLevel(v)) = self.field(Action::GetVolume, permissions) {
            status.level = Some(v);
        }
        if let Some(ActionOutput::Muted(v)) = self.field(Action::GetMuteStatus, permissions) {
            status.muted = Some(v);
        }
        Ok(status)
    }

    fn field(&self, action: Action, permissions: &PermissionSet) -> Option<ActionOutput> {
        match self.invoke(action, permissions, None) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(action = action.key(), error = %e, "metric unavailable");
                None
            }
        }
    }
}
