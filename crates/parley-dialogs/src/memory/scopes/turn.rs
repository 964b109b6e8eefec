//! `turn` - memory that lives for the current turn only

use super::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use crate::error::DialogResult;
use crate::turn::TurnContext;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Turn-state key of the turn memory map
pub const TURN_MEMORY_KEY: &str = "parley.turn_memory";

/// Property of turn memory holding the result of the last ended dialog
pub const LAST_RESULT: &str = "lastresult";

pub(crate) fn turn_memory_mut(turn: &mut TurnContext) -> &mut Map<String, Value> {
    turn.turn_state_mut()
        .get_or_insert_with(TURN_MEMORY_KEY, Map::new)
}

pub(crate) fn set_last_result(turn: &mut TurnContext, result: Value) {
    turn_memory_mut(turn).insert(LAST_RESULT.to_string(), result);
}

/// Scope over a map kept in the turn state, created on first access
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnMemoryScope;

#[async_trait]
impl MemoryScope for TurnMemoryScope {
    fn name(&self) -> &str {
        scope_path::TURN
    }

    fn include_in_snapshot(&self) -> bool {
        true
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let memory = dc
            .context()
            .turn_state()
            .get::<Map<String, Value>>(TURN_MEMORY_KEY)
            .cloned()
            .unwrap_or_default();
        Some(Value::Object(memory))
    }

    fn memory_mut<'a>(
        &self,
        dc: &'a mut DialogContext,
    ) -> DialogResult<&'a mut Map<String, Value>> {
        Ok(turn_memory_mut(dc.context_mut()))
    }
}
