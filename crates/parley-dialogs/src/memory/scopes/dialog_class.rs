//! `dialogclass` - definition of the dialog the `dialog` scope binds to

use super::{dialog_binding, scope_path, DialogBinding, MemoryScope};
use crate::dialogs::DialogContext;
use async_trait::async_trait;
use serde_json::Value;

/// Read-only properties of the active container, the parent's active
/// dialog, or the active dialog, in that order
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogClassMemoryScope;

#[async_trait]
impl MemoryScope for DialogClassMemoryScope {
    fn name(&self) -> &str {
        scope_path::DIALOG_CLASS
    }

    fn include_in_snapshot(&self) -> bool {
        false
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let dialog = match dialog_binding(dc)? {
            DialogBinding::Current => dc.find_dialog(&dc.active_dialog()?.id),
            DialogBinding::Parent => dc.find_parent_dialog(&dc.parent_active_dialog()?.id),
        }?;
        Some(dialog.properties())
    }
}
