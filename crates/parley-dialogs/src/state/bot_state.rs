//! Bot state - per-conversation and per-user documents cached for a turn
//!
//! A [`BotState`] loads one storage document into the turn state on first use,
//! hands out the cached copy to memory scopes and property accessors, and
//! writes it back only when its content changed.

use super::accessor::StatePropertyAccessor;
use crate::error::{DialogError, DialogResult};
use crate::storage::Storage;
use crate::turn::TurnContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Which slice of state a [`BotState`] manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotStateKind {
    /// One document per conversation
    Conversation,
    /// One document per user
    User,
}

impl BotStateKind {
    /// Name of the state, also the turn-state key of its cache
    pub fn name(&self) -> &'static str {
        match self {
            Self::Conversation => "ConversationState",
            Self::User => "UserState",
        }
    }

    /// Turn-state key under which the owning [`BotState`] is registered
    pub fn registration_key(&self) -> &'static str {
        match self {
            Self::Conversation => "parley.bot_state.conversation",
            Self::User => "parley.bot_state.user",
        }
    }
}

/// Turn-local copy of a state document plus the hash it was loaded with
#[derive(Debug, Clone, Default)]
pub struct CachedBotState {
    state: Map<String, Value>,
    hash: String,
}

impl CachedBotState {
    fn loaded(state: Map<String, Value>) -> Self {
        let hash = compute_hash(&state);
        Self { state, hash }
    }

    /// The cached document
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// The cached document, mutable
    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    /// Replace the cached document
    pub fn replace(&mut self, state: Map<String, Value>) {
        self.state = state;
    }

    /// Whether the document differs from what was loaded or last saved
    pub fn is_changed(&self) -> bool {
        compute_hash(&self.state) != self.hash
    }
}

fn compute_hash(state: &Map<String, Value>) -> String {
    serde_json::to_string(state).unwrap_or_default()
}

/// Conversation or user state backed by a [`Storage`]
pub struct BotState {
    kind: BotStateKind,
    storage: Arc<dyn Storage>,
}

impl BotState {
    /// State keyed by `{channel}/conversations/{conversation}`
    pub fn conversation(storage: Arc<dyn Storage>) -> Self {
        Self {
            kind: BotStateKind::Conversation,
            storage,
        }
    }

    /// State keyed by `{channel}/users/{user}`
    pub fn user(storage: Arc<dyn Storage>) -> Self {
        Self {
            kind: BotStateKind::User,
            storage,
        }
    }

    /// Kind of this state
    pub fn kind(&self) -> BotStateKind {
        self.kind
    }

    /// Name of this state
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Storage key for the current turn
    pub fn storage_key(&self, turn: &TurnContext) -> DialogResult<String> {
        let activity = turn.activity();
        if activity.channel_id.is_empty() {
            return Err(DialogError::invalid_argument(
                "activity.channel_id",
                "missing channel id",
            ));
        }

        match self.kind {
            BotStateKind::Conversation => {
                if activity.conversation_id.is_empty() {
                    return Err(DialogError::invalid_argument(
                        "activity.conversation_id",
                        "missing conversation id",
                    ));
                }
                Ok(format!(
                    "{}/conversations/{}",
                    activity.channel_id, activity.conversation_id
                ))
            }
            BotStateKind::User => {
                if activity.from_id.is_empty() {
                    return Err(DialogError::invalid_argument(
                        "activity.from_id",
                        "missing user id",
                    ));
                }
                Ok(format!("{}/users/{}", activity.channel_id, activity.from_id))
            }
        }
    }

    /// Make this state discoverable by memory scopes for the turn
    pub fn register(self: &Arc<Self>, turn: &mut TurnContext) {
        turn.turn_state_mut()
            .insert(self.kind.registration_key(), Arc::clone(self));
    }

    /// The state of `kind` registered for the turn, if any
    pub fn registered(turn: &TurnContext, kind: BotStateKind) -> Option<Arc<BotState>> {
        turn.turn_state()
            .get::<Arc<BotState>>(kind.registration_key())
            .cloned()
    }

    /// Read the document into the turn cache unless it is already cached
    pub async fn load(&self, turn: &mut TurnContext, force: bool) -> DialogResult<()> {
        let cached = turn
            .turn_state()
            .get::<CachedBotState>(self.name())
            .is_some();
        if cached && !force {
            return Ok(());
        }

        let key = self.storage_key(turn)?;
        let mut items = self.storage.read(std::slice::from_ref(&key)).await?;

        let state = match items.remove(&key) {
            Some(Value::Object(map)) => map,
            Some(other) => {
                tracing::warn!(
                    state = self.name(),
                    key = %key,
                    found = ?other,
                    "Stored state is not an object, starting empty"
                );
                Map::new()
            }
            None => Map::new(),
        };

        tracing::debug!(state = self.name(), key = %key, "Loaded bot state");
        turn.turn_state_mut()
            .insert(self.name(), CachedBotState::loaded(state));
        Ok(())
    }

    /// Write the cached document if it changed (or always with `force`)
    pub async fn save_changes(&self, turn: &mut TurnContext, force: bool) -> DialogResult<()> {
        let snapshot = match turn.turn_state().get::<CachedBotState>(self.name()) {
            Some(cached) if force || cached.is_changed() => cached.state.clone(),
            _ => return Ok(()),
        };

        let key = self.storage_key(turn)?;
        let mut changes = HashMap::new();
        changes.insert(key.clone(), Value::Object(snapshot.clone()));
        self.storage.write(changes).await?;

        if let Some(cached) = turn.turn_state_mut().get_mut::<CachedBotState>(self.name()) {
            cached.hash = compute_hash(&snapshot);
        }

        tracing::debug!(state = self.name(), key = %key, "Saved bot state");
        Ok(())
    }

    /// Drop the cached document and delete it from storage
    pub async fn delete(&self, turn: &mut TurnContext) -> DialogResult<()> {
        turn.turn_state_mut().remove(self.name());
        let key = self.storage_key(turn)?;
        self.storage.delete(std::slice::from_ref(&key)).await
    }

    /// Reset the cached document to empty; the next save writes it
    pub fn clear_state(&self, turn: &mut TurnContext) {
        turn.turn_state_mut()
            .insert(self.name(), CachedBotState::default());
    }

    /// The cached document, if loaded
    pub fn cached_state<'t>(&self, turn: &'t TurnContext) -> Option<&'t CachedBotState> {
        turn.turn_state().get::<CachedBotState>(self.name())
    }

    /// The cached document, created empty when nothing was loaded
    pub fn cached_state_mut<'t>(&self, turn: &'t mut TurnContext) -> &'t mut CachedBotState {
        turn.turn_state_mut()
            .get_or_insert_with(self.name(), CachedBotState::default)
    }

    /// Read a property of the cached document
    pub fn get_property<T: DeserializeOwned>(
        &self,
        turn: &TurnContext,
        name: &str,
    ) -> DialogResult<Option<T>> {
        match self
            .cached_state(turn)
            .and_then(|cached| cached.state.get(name))
        {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Write a property of the cached document
    pub fn set_property<T: Serialize + ?Sized>(
        &self,
        turn: &mut TurnContext,
        name: &str,
        value: &T,
    ) -> DialogResult<()> {
        let value = serde_json::to_value(value)?;
        self.cached_state_mut(turn)
            .state
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Remove a property of the cached document
    pub fn delete_property(&self, turn: &mut TurnContext, name: &str) {
        if let Some(cached) = turn.turn_state_mut().get_mut::<CachedBotState>(self.name()) {
            cached.state.remove(name);
        }
    }

    /// Typed accessor for one property of this state
    pub fn create_property<T>(self: &Arc<Self>, name: impl Into<String>) -> StatePropertyAccessor<T> {
        StatePropertyAccessor::new(Arc::clone(self), name)
    }
}

impl std::fmt::Debug for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotState").field("kind", &self.kind).finish()
    }
}
