//! `class` - definition of the active dialog

use super::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use async_trait::async_trait;
use serde_json::Value;

/// Read-only [`Dialog::properties`](crate::dialogs::Dialog::properties) of the active dialog
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassMemoryScope;

#[async_trait]
impl MemoryScope for ClassMemoryScope {
    fn name(&self) -> &str {
        scope_path::CLASS
    }

    fn include_in_snapshot(&self) -> bool {
        false
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let active = dc.active_dialog()?;
        dc.find_dialog(&active.id).map(|dialog| dialog.properties())
    }
}
