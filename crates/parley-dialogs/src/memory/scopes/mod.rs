//! # Memory Scopes
//!
//! A memory scope binds a name (`turn`, `dialog`, `conversation`, ...) to a
//! region of memory for the current dialog context. Scopes are stateless
//! and shared behind `Arc`; the memory itself lives in the dialog stack,
//! the turn state or bot state.

pub mod bot_state;
pub mod class;
pub mod dialog;
pub mod dialog_class;
pub mod dialog_context;
pub mod settings;
pub mod this;
pub mod turn;

pub use bot_state::BotStateMemoryScope;
pub use class::ClassMemoryScope;
pub use dialog::DialogMemoryScope;
pub use dialog_class::DialogClassMemoryScope;
pub use dialog_context::DialogContextMemoryScope;
pub use settings::SettingsMemoryScope;
pub use this::ThisMemoryScope;
pub use turn::TurnMemoryScope;

use crate::dialogs::DialogContext;
use crate::error::{DialogError, DialogResult};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Names of the built-in scopes
pub mod scope_path {
    pub const TURN: &str = "turn";
    pub const SETTINGS: &str = "settings";
    pub const DIALOG: &str = "dialog";
    pub const DIALOG_CONTEXT: &str = "dialogcontext";
    pub const DIALOG_CLASS: &str = "dialogclass";
    pub const CLASS: &str = "class";
    pub const THIS: &str = "this";
    pub const CONVERSATION: &str = "conversation";
    pub const USER: &str = "user";
}

/// A named region of memory reachable from a dialog context
#[async_trait]
pub trait MemoryScope: Send + Sync {
    /// Scope name, matched case-insensitively
    fn name(&self) -> &str;

    /// Whether the scope appears in memory snapshots
    fn include_in_snapshot(&self) -> bool;

    /// Copy of the scope's memory, if it is bound
    fn get_memory(&self, dc: &DialogContext) -> Option<Value>;

    /// The live memory for writes; read-only scopes return `Unsupported`
    fn memory_mut<'a>(
        &self,
        _dc: &'a mut DialogContext,
    ) -> DialogResult<&'a mut Map<String, Value>> {
        Err(read_only(self.name()))
    }

    /// Replace the scope's memory with an object
    fn set_memory(&self, dc: &mut DialogContext, memory: Value) -> DialogResult<()> {
        let target = self.memory_mut(dc)?;
        match memory {
            Value::Object(map) => {
                *target = map;
                Ok(())
            }
            other => Err(DialogError::invalid_argument(
                "memory",
                format!("scope memory must be an object, found {}", other),
            )),
        }
    }

    /// Bring the scope's memory into the turn
    async fn load(&self, _dc: &mut DialogContext, _force: bool) -> DialogResult<()> {
        Ok(())
    }

    /// Persist changes made during the turn
    async fn save_changes(&self, _dc: &mut DialogContext, _force: bool) -> DialogResult<()> {
        Ok(())
    }

    /// Delete the scope's backing memory
    async fn delete(&self, _dc: &mut DialogContext) -> DialogResult<()> {
        Ok(())
    }
}

pub(crate) fn read_only(scope: &str) -> DialogError {
    DialogError::unsupported(format!("the '{}' memory scope is read-only", scope))
}

/// Which frame the `dialog` and `dialogclass` scopes bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DialogBinding {
    /// The active dialog of the current stack
    Current,
    /// The active dialog of the parent stack
    Parent,
}

/// Active container first, then the parent's active dialog, then the active dialog
pub(crate) fn dialog_binding(dc: &DialogContext) -> Option<DialogBinding> {
    if let Some(active) = dc.active_dialog() {
        let is_container = dc
            .find_dialog(&active.id)
            .map_or(false, |dialog| dialog.child_dialogs().is_some());
        if is_container {
            return Some(DialogBinding::Current);
        }
    }

    if dc.parent_active_dialog().is_some() {
        return Some(DialogBinding::Parent);
    }

    dc.active_dialog().map(|_| DialogBinding::Current)
}
