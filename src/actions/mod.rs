//! Host actions: command templates, execution and output parsing.

pub mod dispatcher;
pub mod executor;
pub mod parsers;
pub mod registry;

use serde::Serialize;

use crate::permissions::Capability;

pub use dispatcher::{ActionDispatcher, ActionOutput, MetricsReport, VolumeStatus};
pub use executor::{CommandExecutor, CommandOutcome, ShellExecutor};
pub use registry::CommandRegistry;

/// Every host action the panel can bind to a command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Shutdown,
    Restart,
    Lock,
    PlayPause,
    MediaNext,
    MediaPrevious,
    SetVolume,
    GetVolume,
    VolumeMute,
    GetCpuUsage,
    GetRamUsage,
    GetUptime,
    GetMuteStatus,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Shutdown,
        Action::Restart,
        Action::Lock,
        Action::PlayPause,
        Action::MediaNext,
        Action::MediaPrevious,
        Action::SetVolume,
        Action::GetVolume,
        Action::VolumeMute,
        Action::GetCpuUsage,
        Action::GetRamUsage,
        Action::GetUptime,
        Action::GetMuteStatus,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Action::Shutdown => "shutdown",
            Action::Restart => "restart",
            Action::Lock => "lock",
            Action::PlayPause => "play_pause",
            Action::MediaNext => "media_next",
            Action::MediaPrevious => "media_previous",
            Action::SetVolume => "set_volume",
            Action::GetVolume => "get_volume",
            Action::VolumeMute => "volume_mute",
            Action::GetCpuUsage => "get_cpu_usage",
            Action::GetRamUsage => "get_ram_usage",
            Action::GetUptime => "get_uptime",
            Action::GetMuteStatus => "get_mute_status",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.key() == key)
    }

    /// Capability the caller must hold to run this action.
    pub fn required_capability(self) -> Capability {
        match self {
            Action::Shutdown => Capability::Shutdown,
            Action::Restart => Capability::Restart,
            Action::Lock => Capability::Lock,
            Action::PlayPause => Capability::PlayPause,
            Action::MediaNext => Capability::MediaNext,
            Action::MediaPrevious => Capability::MediaPrevious,
            Action::SetVolume | Action::GetVolume | Action::GetMuteStatus => Capability::Volume,
            Action::VolumeMute => Capability::VolumeMute,
            Action::GetCpuUsage | Action::GetRamUsage | Action::GetUptime => {
                Capability::SystemMetrics
            }
        }
    }

    /// Reported when the command succeeds without printing anything.
    pub fn success_phrase(self) -> &'static str {
        match self {
            Action::Shutdown => "Shutdown command executed successfully.",
            Action::Restart => "Restart command executed successfully.",
            Action::Lock => "Lock session command executed successfully.",
            Action::PlayPause => "Play/Pause command executed successfully.",
            Action::MediaNext => "Media next command executed successfully.",
            Action::MediaPrevious => "Media previous command executed successfully.",
            Action::SetVolume => "Set volume command executed successfully.",
            Action::GetVolume => "Get volume command executed successfully.",
            Action::VolumeMute => "Mute command executed successfully.",
            Action::GetCpuUsage => "Get CPU usage command executed successfully.",
            Action::GetRamUsage => "Get RAM usage command executed successfully.",
            Action::GetUptime => "Get uptime command executed successfully.",
            Action::GetMuteStatus => "Get mute status command executed successfully.",
        }
    }

    /// Fire-and-forget actions exposed as direct triggers.
    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            Action::Shutdown
                | Action::Restart
                | Action::Lock
                | Action::PlayPause
                | Action::MediaNext
                | Action::MediaPrevious
                | Action::VolumeMute
        )
    }
}

/// Host platform, selecting the built-in default command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Other,
}

const LINUX_DEFAULTS: &[(&str, &str)] = &[
    ("shutdown", "sudo systemctl poweroff"),
    ("restart", "sudo systemctl reboot"),
    ("lock", "gnome-screensaver-command -l || loginctl lock-session"),
    ("play_pause", "playerctl play-pause"),
    ("media_next", "playerctl next"),
    ("media_previous", "playerctl previous"),
    ("set_volume", "pactl set-sink-volume @DEFAULT_SINK@ {}%"),
    (
        "get_volume",
        "pactl get-sink-volume @DEFAULT_SINK@ || amixer get Master",
    ),
    (
        "volume_mute",
        "pactl set-sink-mute @DEFAULT_SINK@ toggle || amixer -D pulse sset Master toggle",
    ),
    (
        "get_cpu_usage",
        "grep 'cpu ' /proc/stat | awk '{usage=($2+$4)*100/($2+$4+$5)} END {print usage}'",
    ),
    (
        "get_ram_usage",
        "free -m | awk 'NR==2{printf \"%.0f\", $3*100/$2 }'",
    ),
    ("get_uptime", "uptime -p | sed 's/^up //'"),
    (
        "get_mute_status",
        "pactl get-sink-mute @DEFAULT_SINK@ || amixer get Master",
    ),
];

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }

    /// Built-in templates, or `None` where actions are not supported.
    pub fn default_commands(self) -> Option<&'static [(&'static str, &'static str)]> {
        match self {
            Platform::Linux => Some(LINUX_DEFAULTS),
            Platform::Windows | Platform::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_keys_roundtrip() {
        for action in Action::ALL {
            assert_eq!(Action::from_key(action.key()), Some(action));
        }
        assert_eq!(Action::from_key("self_destruct"), None);
    }

    #[test]
    fn test_linux_table_covers_every_action() {
        let table = Platform::Linux.default_commands().unwrap();
        for action in Action::ALL {
            assert!(
                table.iter().any(|(k, _)| *k == action.key()),
                "missing default for {}",
                action.key()
            );
        }
        assert_eq!(table.len(), Action::ALL.len());
    }

    #[test]
    fn test_only_set_volume_has_placeholder() {
        let table = Platform::Linux.default_commands().unwrap();
        for (key, template) in table {
            assert_eq!(template.contains("{}"), *key == "set_volume", "{key}");
        }
    }

    #[test]
    fn test_unsupported_platforms_have_no_table() {
        assert!(Platform::Windows.default_commands().is_none());
        assert!(Platform::Other.default_commands().is_none());
    }

    #[test]
    fn test_required_capabilities() {
        assert_eq!(
            Action::SetVolume.required_capability(),
            Capability::Volume
        );
        assert_eq!(
            Action::GetUptime.required_capability(),
            Capability::SystemMetrics
        );
        assert_eq!(
            Action::VolumeMute.required_capability(),
            Capability::VolumeMute
        );
    }
}
