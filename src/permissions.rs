//! Per-account capability flags.
//!
//! A [`PermissionSet`] is a closed record: every capability is always present
//! and defaults to `false`. Partial updates arrive as loose JSON objects and are
//! merged field by field, keeping only recognized keys with boolean values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single capability an account may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Shutdown,
    Restart,
    Lock,
    PlayPause,
    MediaNext,
    MediaPrevious,
    Volume,
    VolumeMute,
    SystemMetrics,
    ModifyCommands,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Shutdown,
        Capability::Restart,
        Capability::Lock,
        Capability::PlayPause,
        Capability::MediaNext,
        Capability::MediaPrevious,
        Capability::Volume,
        Capability::VolumeMute,
        Capability::SystemMetrics,
        Capability::ModifyCommands,
        Capability::ManageUsers,
    ];

    /// Wire name, as used in JSON payloads and stored records.
    pub fn key(self) -> &'static str {
        match self {
            Capability::Shutdown => "shutdown",
            Capability::Restart => "restart",
            Capability::Lock => "lock",
            Capability::PlayPause => "play_pause",
            Capability::MediaNext => "media_next",
            Capability::MediaPrevious => "media_previous",
            Capability::Volume => "volume",
            Capability::VolumeMute => "volume_mute",
            Capability::SystemMetrics => "system_metrics",
            Capability::ModifyCommands => "modify_commands",
            Capability::ManageUsers => "manage_users",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

/// Fully enumerated capability flags for one account.
///
/// Deserialization is strict (`deny_unknown_fields`, no per-field defaults) so a
/// snapshot of a different shape never compares as equal to a stored set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionSet {
    pub shutdown: bool,
    pub restart: bool,
    pub lock: bool,
    pub play_pause: bool,
    pub media_next: bool,
    pub media_previous: bool,
    pub volume: bool,
    pub volume_mute: bool,
    pub system_metrics: bool,
    pub modify_commands: bool,
    pub manage_users: bool,
}

impl PermissionSet {
    /// Every capability granted. Used for the bootstrap administrator.
    pub fn all() -> Self {
        let mut set = Self::default();
        for cap in Capability::ALL {
            set.set(cap, true);
        }
        set
    }

    pub fn allows(&self, cap: Capability) -> bool {
        match cap {
            Capability::Shutdown => self.shutdown,
            Capability::Restart => self.restart,
            Capability::Lock => self.lock,
            Capability::PlayPause => self.play_pause,
            Capability::MediaNext => self.media_next,
            Capability::MediaPrevious => self.media_previous,
            Capability::Volume => self.volume,
            Capability::VolumeMute => self.volume_mute,
            Capability::SystemMetrics => self.system_metrics,
            Capability::ModifyCommands => self.modify_commands,
            Capability::ManageUsers => self.manage_users,
        }
    }

    pub fn set(&mut self, cap: Capability, value: bool) {
        let slot = match cap {
            Capability::Shutdown => &mut self.shutdown,
            Capability::Restart => &mut self.restart,
            Capability::Lock => &mut self.lock,
            Capability::PlayPause => &mut self.play_pause,
            Capability::MediaNext => &mut self.media_next,
            Capability::MediaPrevious => &mut self.media_previous,
            Capability::Volume => &mut self.volume,
            Capability::VolumeMute => &mut self.volume_mute,
            Capability::SystemMetrics => &mut self.system_metrics,
            Capability::ModifyCommands => &mut self.modify_commands,
            Capability::ManageUsers => &mut self.manage_users,
        };
        *slot = value;
    }

    /// Merge a loose JSON object into this set.
    ///
    /// Unknown keys and non-boolean values are dropped without error.
    pub fn merge_partial(&mut self, partial: &Map<String, Value>) {
        for (key, value) in partial {
            if let (Some(cap), Some(flag)) = (Capability::from_key(key), value.as_bool()) {
                self.set(cap, flag);
            }
        }
    }

    /// Build a set from a loose JSON object, missing keys `false`.
    pub fn from_partial(partial: &Map<String, Value>) -> Self {
        let mut set = Self::default();
        set.merge_partial(partial);
        set
    }

    /// Capabilities currently granted, in declaration order.
    pub fn granted(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.allows(*c))
            .collect()
    }
}
