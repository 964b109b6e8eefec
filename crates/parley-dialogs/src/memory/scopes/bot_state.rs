//! `conversation` and `user` - scopes backed by bot state

use super::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use crate::error::{DialogError, DialogResult};
use crate::state::{BotState, BotStateKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Delegates to the [`BotState`] of one kind registered for the turn
#[derive(Debug, Clone, Copy)]
pub struct BotStateMemoryScope {
    kind: BotStateKind,
    name: &'static str,
}

impl BotStateMemoryScope {
    /// The `conversation` scope
    pub fn conversation() -> Self {
        Self {
            kind: BotStateKind::Conversation,
            name: scope_path::CONVERSATION,
        }
    }

    /// The `user` scope
    pub fn user() -> Self {
        Self {
            kind: BotStateKind::User,
            name: scope_path::USER,
        }
    }

    fn bot_state(&self, dc: &DialogContext) -> Option<Arc<BotState>> {
        BotState::registered(dc.context(), self.kind)
    }
}

#[async_trait]
impl MemoryScope for BotStateMemoryScope {
    fn name(&self) -> &str {
        self.name
    }

    fn include_in_snapshot(&self) -> bool {
        true
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let state = self.bot_state(dc)?;
        state
            .cached_state(dc.context())
            .map(|cached| Value::Object(cached.state().clone()))
    }

    fn memory_mut<'a>(
        &self,
        dc: &'a mut DialogContext,
    ) -> DialogResult<&'a mut Map<String, Value>> {
        let state = self.bot_state(dc).ok_or_else(|| {
            DialogError::invalid_state(format!(
                "no {} is registered for this turn",
                self.kind.name()
            ))
        })?;
        Ok(state.cached_state_mut(dc.context_mut()).state_mut())
    }

    async fn load(&self, dc: &mut DialogContext, force: bool) -> DialogResult<()> {
        match self.bot_state(dc) {
            Some(state) => state.load(dc.context_mut(), force).await,
            None => Ok(()),
        }
    }

    async fn save_changes(&self, dc: &mut DialogContext, force: bool) -> DialogResult<()> {
        match self.bot_state(dc) {
            Some(state) => state.save_changes(dc.context_mut(), force).await,
            None => Ok(()),
        }
    }

    async fn delete(&self, dc: &mut DialogContext) -> DialogResult<()> {
        match self.bot_state(dc) {
            Some(state) => state.delete(dc.context_mut()).await,
            None => Ok(()),
        }
    }
}
