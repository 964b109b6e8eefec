//! Typed accessor for a single bot-state property

use super::bot_state::BotState;
use crate::error::DialogResult;
use crate::turn::TurnContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reads and writes one named property of a [`BotState`] as `T`.
///
/// Every call loads the owning state first, so an accessor works on a fresh
/// turn without any explicit setup.
pub struct StatePropertyAccessor<T> {
    state: Arc<BotState>,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StatePropertyAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for StatePropertyAccessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePropertyAccessor")
            .field("state", &self.state.name())
            .field("name", &self.name)
            .finish()
    }
}

impl<T> StatePropertyAccessor<T> {
    pub(crate) fn new(state: Arc<BotState>, name: impl Into<String>) -> Self {
        Self {
            state,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning bot state
    pub fn bot_state(&self) -> &Arc<BotState> {
        &self.state
    }
}

impl<T> StatePropertyAccessor<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Get the property, storing and returning `default()` when it is missing
    pub async fn get<F>(&self, turn: &mut TurnContext, default: F) -> DialogResult<T>
    where
        F: FnOnce() -> T,
    {
        self.state.load(turn, false).await?;

        if let Some(value) = self.state.get_property::<T>(turn, &self.name)? {
            return Ok(value);
        }

        let value = default();
        self.state.set_property(turn, &self.name, &value)?;
        Ok(value)
    }

    /// Get the property if it is present
    pub async fn try_get(&self, turn: &mut TurnContext) -> DialogResult<Option<T>> {
        self.state.load(turn, false).await?;
        self.state.get_property::<T>(turn, &self.name)
    }

    /// Set the property
    pub async fn set(&self, turn: &mut TurnContext, value: &T) -> DialogResult<()> {
        self.state.load(turn, false).await?;
        self.state.set_property(turn, &self.name, value)
    }

    /// Remove the property
    pub async fn delete(&self, turn: &mut TurnContext) -> DialogResult<()> {
        self.state.load(turn, false).await?;
        self.state.delete_property(turn, &self.name);
        Ok(())
    }
}
