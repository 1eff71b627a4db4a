//! Client-side record of which event types the server should push.
//!
//! The registry is the desired set, not a mirror of the server. It is updated
//! optimistically when the caller submits `Subscribe`/`Unsubscribe`, and again
//! from the server's acknowledgement text. On every open the whole set is
//! re-sent as one `Subscribe` so a restarted server catches up.
//!
//! Acknowledgements are plain messages such as
//! `"Subscribed to: sensor_stream, command_response"` or
//! `"Unsubscribed from: sensor_stream"`. Unknown names in the list are skipped.

use std::collections::BTreeSet;

use super::message::EventType;

const SUBSCRIBED_PREFIX: &str = "Subscribed to:";
const UNSUBSCRIBED_PREFIX: &str = "Unsubscribed from:";

/// A parsed subscription acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Subscribed(Vec<EventType>),
    Unsubscribed(Vec<EventType>),
}

/// Extracts an acknowledgement from a server message, if it carries one.
pub fn parse_ack(message: &str) -> Option<Ack> {
    // "Unsubscribed from:" first, so the longer marker always wins
    if let Some((_, list)) = message.split_once(UNSUBSCRIBED_PREFIX) {
        return Some(Ack::Unsubscribed(parse_list(list)));
    }
    message
        .split_once(SUBSCRIBED_PREFIX)
        .map(|(_, list)| Ack::Subscribed(parse_list(list)))
}

fn parse_list(list: &str) -> Vec<EventType> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| name.parse().ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    subscribed: BTreeSet<EventType>,
}

impl SubscriptionRegistry {
    pub fn new(initial: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            subscribed: initial.into_iter().collect(),
        }
    }

    /// The set to resync on open, in a stable order.
    pub fn desired(&self) -> Vec<EventType> {
        self.subscribed.iter().copied().collect()
    }

    pub fn contains(&self, event: EventType) -> bool {
        self.subscribed.contains(&event)
    }

    pub fn len(&self) -> usize {
        self.subscribed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribed.is_empty()
    }

    /// Adds types. Returns true if the set changed.
    pub fn subscribe(&mut self, events: &[EventType]) -> bool {
        events
            .iter()
            .fold(false, |changed, event| self.subscribed.insert(*event) || changed)
    }

    /// Removes types. Returns true if the set changed.
    pub fn unsubscribe(&mut self, events: &[EventType]) -> bool {
        events
            .iter()
            .fold(false, |changed, event| self.subscribed.remove(event) || changed)
    }

    /// Folds a server acknowledgement into the set.
    ///
    /// Messages that are not acknowledgements are ignored. Returns true if
    /// the set changed.
    pub fn apply(&mut self, message: &str) -> bool {
        match parse_ack(message) {
            Some(Ack::Subscribed(events)) => self.subscribe(&events),
            Some(Ack::Unsubscribed(events)) => self.unsubscribe(&events),
            None => false,
        }
    }
}

impl Default for SubscriptionRegistry {
    /// Subscribed to every event type.
    fn default() -> Self {
        Self::new(EventType::ALL)
    }
}
