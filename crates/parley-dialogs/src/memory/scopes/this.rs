//! `this` - the active dialog's own state

use super::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use async_trait::async_trait;
use serde_json::Value;

/// Read-only view of the active frame's state, without parent fallback
#[derive(Debug, Default, Clone, Copy)]
pub struct ThisMemoryScope;

#[async_trait]
impl MemoryScope for ThisMemoryScope {
    fn name(&self) -> &str {
        scope_path::THIS
    }

    fn include_in_snapshot(&self) -> bool {
        true
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        dc.active_dialog()
            .map(|instance| Value::Object(instance.state.clone()))
    }
}
