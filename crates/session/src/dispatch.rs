//! Routing of decoded frames to application handlers.
//!
//! Every valid frame is classified once into a `Route`; the session then hands
//! it to at most one of the three registered handlers. Handlers run on the
//! driver task, so they must be `Send` and should return quickly.

use std::fmt;

use super::message::{ResponseType, SensorValues, ServerMessage};

/// Handler for sensor samples.
pub type SensorHandler = Box<dyn FnMut(SensorValues) + Send>;

/// Handler for profile state and presence messages.
pub type MessageHandler = Box<dyn FnMut(&ServerMessage) + Send>;

/// Where a decoded frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A sensor sample with valid readings.
    Sensor(SensorValues),
    /// Command responses, stream-stopped notices and untyped replies.
    Profiles,
    /// Active-player broadcasts.
    Presence,
    /// Nothing consumes it; logged and dropped.
    Unrouted,
}

/// Picks the handler a frame belongs to.
pub fn classify(message: &ServerMessage) -> Route {
    match message.response_type {
        Some(ResponseType::SensorStream) => message
            .sensor_values()
            .map_or(Route::Unrouted, Route::Sensor),
        Some(ResponseType::ActivePlayerBroadcast) => Route::Presence,
        Some(ResponseType::CommandResponse) | Some(ResponseType::StreamStopped) => Route::Profiles,
        // older servers answer GetSensorValues without a response type
        None => message
            .sensor_values()
            .map_or(Route::Profiles, Route::Sensor),
        Some(ResponseType::Other) => Route::Unrouted,
    }
}

/// The registered handlers. Absent handlers drop their frames silently.
#[derive(Default)]
pub struct Handlers {
    sensor: Option<SensorHandler>,
    profiles: Option<MessageHandler>,
    presence: Option<MessageHandler>,
}

impl Handlers {
    pub fn set_sensor(&mut self, handler: SensorHandler) {
        self.sensor = Some(handler);
    }

    pub fn set_profiles(&mut self, handler: MessageHandler) {
        self.profiles = Some(handler);
    }

    pub fn set_presence(&mut self, handler: MessageHandler) {
        self.presence = Some(handler);
    }

    /// Invokes the handler for `route`. Returns true if one was registered.
    pub fn dispatch(&mut self, route: Route, message: &ServerMessage) -> bool {
        match route {
            Route::Sensor(values) => match self.sensor.as_mut() {
                Some(handler) => {
                    handler(values);
                    true
                }
                None => false,
            },
            Route::Profiles => Self::call(self.profiles.as_mut(), message),
            Route::Presence => Self::call(self.presence.as_mut(), message),
            Route::Unrouted => false,
        }
    }

    fn call(handler: Option<&mut MessageHandler>, message: &ServerMessage) -> bool {
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("sensor", &self.sensor.is_some())
            .field("profiles", &self.profiles.is_some())
            .field("presence", &self.presence.is_some())
            .finish()
    }
}
