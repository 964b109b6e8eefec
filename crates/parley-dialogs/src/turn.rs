//! Turn context - the incoming activity, recorded replies and turn-scoped caches
//!
//! A [`TurnContext`] lives for exactly one request/response cycle. Anything
//! that must survive to the next turn goes through bot state and storage;
//! everything in [`TurnState`] is dropped with the turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Channel id used by [`Activity::message`] when none is given
pub const DEFAULT_CHANNEL_ID: &str = "test";

/// Conversation id used by [`Activity::message`] when none is given
pub const DEFAULT_CONVERSATION_ID: &str = "conversation";

/// Sender id used by [`Activity::message`] when none is given
pub const DEFAULT_USER_ID: &str = "user";

/// Sender id stamped on replies
pub const BOT_ID: &str = "bot";

/// Kind of activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    /// A user or bot message
    #[default]
    Message,
    /// A named programmatic event
    Event,
    /// Members joined or left the conversation
    ConversationUpdate,
    /// The conversation is over
    EndOfConversation,
}

/// Minimal activity: just enough addressing to key bot state and drive dialogs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity kind
    #[serde(rename = "type")]
    pub activity_type: ActivityType,

    /// Optional activity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Channel the activity arrived on
    pub channel_id: String,

    /// Conversation the activity belongs to
    pub conversation_id: String,

    /// Sender id
    pub from_id: String,

    /// Message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Activity {
    /// Create a message activity on the default channel and conversation
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Message,
            id: None,
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
            conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            from_id: DEFAULT_USER_ID.to_string(),
            text: Some(text.into()),
            name: None,
            value: None,
        }
    }

    /// Create an event activity
    pub fn event(name: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            activity_type: ActivityType::Event,
            text: None,
            name: Some(name.into()),
            value,
            ..Self::message("")
        }
    }

    /// Set the channel id
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Set the conversation id
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    /// Set the sender id
    pub fn with_from(mut self, from_id: impl Into<String>) -> Self {
        self.from_id = from_id.into();
        self
    }

    /// Check if this is a message activity
    pub fn is_message(&self) -> bool {
        self.activity_type == ActivityType::Message
    }

    /// Build a message reply addressed to the same conversation
    pub fn create_reply(&self, text: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Message,
            id: None,
            channel_id: self.channel_id.clone(),
            conversation_id: self.conversation_id.clone(),
            from_id: BOT_ID.to_string(),
            text: Some(text.into()),
            name: None,
            value: None,
        }
    }
}

/// Turn-scoped cache keyed by string, holding values of any type
#[derive(Default)]
pub struct TurnState {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl TurnState {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Get a value if present and of type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| (**v).downcast_ref::<T>())
    }

    /// Get a mutable value if present and of type `T`
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|v| (**v).downcast_mut::<T>())
    }

    /// Get a value, creating it on first access.
    ///
    /// An entry of another type under the same key is replaced.
    pub fn get_or_insert_with<T, F>(&mut self, key: &str, init: F) -> &mut T
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                let slot = entry.into_mut();
                if !(**slot).is::<T>() {
                    *slot = Box::new(init());
                }
                slot
            }
            Entry::Vacant(entry) => entry.insert(Box::new(init())),
        };

        match (**slot).downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("turn state slot '{}' was just set to the requested type", key),
        }
    }

    /// Remove a value, returning whether it existed
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Check if a key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl std::fmt::Debug for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnState")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One request/response cycle of a conversation
#[derive(Debug)]
pub struct TurnContext {
    /// The incoming activity
    activity: Activity,

    /// Replies sent during this turn, in order
    responses: Vec<Activity>,

    /// Turn-scoped caches (bot state, memory configuration, turn memory)
    turn_state: TurnState,
}

impl TurnContext {
    /// Create a turn for an incoming activity
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            responses: Vec::new(),
            turn_state: TurnState::new(),
        }
    }

    /// The incoming activity
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Send a text reply
    pub fn send_activity(&mut self, text: impl Into<String>) {
        let reply = self.activity.create_reply(text);
        self.send(reply);
    }

    /// Send a fully formed activity
    pub fn send(&mut self, activity: Activity) {
        tracing::debug!(
            conversation_id = %activity.conversation_id,
            text = ?activity.text,
            "Sending activity"
        );
        self.responses.push(activity);
    }

    /// Replies sent so far
    pub fn responses(&self) -> &[Activity] {
        &self.responses
    }

    /// Drain the replies sent so far
    pub fn take_responses(&mut self) -> Vec<Activity> {
        std::mem::take(&mut self.responses)
    }

    /// Whether anything was sent this turn
    pub fn responded(&self) -> bool {
        !self.responses.is_empty()
    }

    /// Turn-scoped caches
    pub fn turn_state(&self) -> &TurnState {
        &self.turn_state
    }

    /// Mutable turn-scoped caches
    pub fn turn_state_mut(&mut self) -> &mut TurnState {
        &mut self.turn_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_state_typed_access() {
        let mut state = TurnState::new();
        state.insert("count", 41u64);

        assert_eq!(state.get::<u64>("count"), Some(&41));
        assert!(state.get::<String>("count").is_none());

        *state.get_mut::<u64>("count").unwrap() += 1;
        assert_eq!(state.get::<u64>("count"), Some(&42));

        assert!(state.remove("count"));
        assert!(!state.contains_key("count"));
    }

    #[test]
    fn test_get_or_insert_with_replaces_wrong_type() {
        let mut state = TurnState::new();
        state.insert("slot", "text".to_string());

        let value = state.get_or_insert_with("slot", || 7i64);
        assert_eq!(*value, 7);

        // Second access keeps the existing value
        *state.get_or_insert_with("slot", || 0i64) += 1;
        assert_eq!(state.get::<i64>("slot"), Some(&8));
    }

    #[test]
    fn test_replies_address_same_conversation() {
        let incoming = Activity::message("hi")
            .with_channel("web")
            .with_conversation("c1")
            .with_from("alice");
        let mut turn = TurnContext::new(incoming);

        turn.send_activity("hello alice");

        let replies = turn.take_responses();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].channel_id, "web");
        assert_eq!(replies[0].conversation_id, "c1");
        assert_eq!(replies[0].from_id, BOT_ID);
        assert_eq!(replies[0].text.as_deref(), Some("hello alice"));
        assert!(!turn.responded());
    }

    #[test]
    fn test_activity_wire_shape() {
        let activity = Activity::event("cancel", Some(json!({"reason": "user"})));
        let value = serde_json::to_value(&activity).unwrap();

        assert_eq!(value["type"], "event");
        assert_eq!(value["name"], "cancel");
        assert_eq!(value["channelId"], DEFAULT_CHANNEL_ID);
        assert!(value.get("text").is_none());
    }
}
