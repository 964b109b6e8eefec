//! `dialog` - state of the dialog that owns the current stack

use super::{dialog_binding, scope_path, DialogBinding, MemoryScope};
use crate::dialogs::DialogContext;
use crate::error::{DialogError, DialogResult};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Binds to the active dialog when it is a container, otherwise to the
/// parent stack's active dialog, otherwise to the active dialog itself.
///
/// Inside a component this makes `dialog.x` shared by every step of every
/// child dialog.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogMemoryScope;

#[async_trait]
impl MemoryScope for DialogMemoryScope {
    fn name(&self) -> &str {
        scope_path::DIALOG
    }

    fn include_in_snapshot(&self) -> bool {
        true
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let instance = match dialog_binding(dc)? {
            DialogBinding::Current => dc.active_dialog(),
            DialogBinding::Parent => dc.parent_active_dialog(),
        }?;
        Some(Value::Object(instance.state.clone()))
    }

    fn memory_mut<'a>(
        &self,
        dc: &'a mut DialogContext,
    ) -> DialogResult<&'a mut Map<String, Value>> {
        let instance = match dialog_binding(dc) {
            Some(DialogBinding::Current) => dc.active_dialog_mut(),
            Some(DialogBinding::Parent) => dc.parent_active_dialog_mut(),
            None => None,
        };

        instance
            .map(|instance| &mut instance.state)
            .ok_or_else(|| DialogError::invalid_state("no active dialog for the 'dialog' scope"))
    }
}
