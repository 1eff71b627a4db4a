//! Wire types exchanged with the profile server.
//!
//! Outbound frames are `Command`s, inbound frames are `ServerMessage`s. Both
//! derive serde so the codec can stay a thin layer; field names and variant
//! tags match what the server expects byte for byte.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Number of pads/sensors on the controller.
pub const SENSOR_COUNT: usize = 4;

/// Highest raw reading a sensor reports (10-bit ADC).
pub const SENSOR_MAX: i32 = 1023;

/// One sample of all four sensors, each in `0..=SENSOR_MAX`.
pub type SensorValues = [u16; SENSOR_COUNT];

/// Per-pad activation thresholds as stored by the server.
pub type Thresholds = [i32; SENSOR_COUNT];

/// A category of server-pushed message the client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CommandResponse,
    SensorStream,
    ActivePlayerBroadcast,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 3] = [
        EventType::CommandResponse,
        EventType::SensorStream,
        EventType::ActivePlayerBroadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CommandResponse => "command_response",
            EventType::SensorStream => "sensor_stream",
            EventType::ActivePlayerBroadcast => "active_player_broadcast",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{s}'"))
    }
}

/// A client-to-server instruction.
///
/// Serialized externally tagged: `{"ChangeProfile":{"name":"Alice"}}`. Unit
/// variants go out as `{"StartSensorStream":null}` (see `codec`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Subscribe {
        event_types: Vec<EventType>,
    },
    Unsubscribe {
        event_types: Vec<EventType>,
    },
    ChangeProfile {
        name: String,
    },
    AddProfile {
        name: String,
        thresholds: Thresholds,
    },
    RemoveProfile {
        name: String,
    },
    UpdateThreshold {
        profile_name: String,
        threshold_index: usize,
        value: i32,
    },
    ChangePlayer {
        name: String,
    },
    SetDefaultProfile {
        name: String,
    },
    GetCurrentThresholds,
    /// Superseded by the sensor stream; the server answers with a hint.
    GetSensorValues,
    StartSensorStream,
    StopSensorStream,
}

impl Command {
    /// The variant tag as it appears on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Subscribe { .. } => "Subscribe",
            Command::Unsubscribe { .. } => "Unsubscribe",
            Command::ChangeProfile { .. } => "ChangeProfile",
            Command::AddProfile { .. } => "AddProfile",
            Command::RemoveProfile { .. } => "RemoveProfile",
            Command::UpdateThreshold { .. } => "UpdateThreshold",
            Command::ChangePlayer { .. } => "ChangePlayer",
            Command::SetDefaultProfile { .. } => "SetDefaultProfile",
            Command::GetCurrentThresholds => "GetCurrentThresholds",
            Command::GetSensorValues => "GetSensorValues",
            Command::StartSensorStream => "StartSensorStream",
            Command::StopSensorStream => "StopSensorStream",
        }
    }

    /// True for commands that start or stop the sensor stream.
    pub fn is_stream_control(&self) -> bool {
        matches!(
            self,
            Command::StartSensorStream | Command::StopSensorStream
        )
    }

    pub fn subscribe(event_types: impl IntoIterator<Item = EventType>) -> Self {
        Command::Subscribe {
            event_types: event_types.into_iter().collect(),
        }
    }

    pub fn unsubscribe(event_types: impl IntoIterator<Item = EventType>) -> Self {
        Command::Unsubscribe {
            event_types: event_types.into_iter().collect(),
        }
    }
}

/// Kind of an inbound frame, as labelled by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    CommandResponse,
    SensorStream,
    StreamStopped,
    ActivePlayerBroadcast,
    /// Any label this client does not know about.
    #[serde(other)]
    Other,
}

/// Stored thresholds for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub thresholds: Thresholds,
}

/// A known player and the profile they last used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub profile: String,
}

/// Server-side profile state attached to command responses and broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfilesSnapshot {
    pub profiles: BTreeMap<String, Profile>,
    pub current_profile: String,
    #[serde(default)]
    pub default_profile: String,
    #[serde(default)]
    pub players: BTreeMap<String, Player>,
    #[serde(default)]
    pub current_player: String,
}

impl ProfilesSnapshot {
    /// Thresholds of the currently selected profile, if it exists.
    pub fn current_thresholds(&self) -> Option<Thresholds> {
        self.profiles
            .get(&self.current_profile)
            .map(|profile| profile.thresholds)
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub data: Option<ProfilesSnapshot>,
    #[serde(default)]
    pub sensor_values: Option<[i32; SENSOR_COUNT]>,
}

impl ServerMessage {
    /// Sensor readings converted to `SensorValues`.
    ///
    /// Returns `None` when the frame has no readings or any reading lies
    /// outside `0..=SENSOR_MAX`.
    pub fn sensor_values(&self) -> Option<SensorValues> {
        let raw = self.sensor_values?;
        let mut values = [0u16; SENSOR_COUNT];
        for (slot, reading) in values.iter_mut().zip(raw) {
            if !(0..=SENSOR_MAX).contains(&reading) {
                return None;
            }
            *slot = u16::try_from(reading).ok()?;
        }
        Some(values)
    }
}
