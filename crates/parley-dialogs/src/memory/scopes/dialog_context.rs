//! `dialogcontext` - synthetic view of the dialog stack

use super::{scope_path, MemoryScope};
use crate::dialogs::context::CHILD_STATE_KEY;
use crate::dialogs::{DialogContext, DialogInstance, DialogState};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Prefix of action-scope frames listed in `dialogcontext.stack`
pub const ACTION_SCOPE_PREFIX: &str = "ActionScope[";

/// Read-only `{ stack, activeDialog, parent }` built from the live frames
/// and the inner stacks persisted below them
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogContextMemoryScope;

impl DialogContextMemoryScope {
    /// Every stack from the deepest persisted child up to the root
    fn stacks_from_leaf(dc: &DialogContext) -> Vec<Vec<DialogInstance>> {
        let mut levels: Vec<Vec<DialogInstance>> = dc
            .frame_stacks()
            .into_iter()
            .map(|stack| stack.to_vec())
            .collect();

        // Follow the inner stacks persisted in container state
        loop {
            let Some(active) = levels.last().and_then(|stack| stack.last()) else {
                break;
            };
            if !active.state.contains_key(CHILD_STATE_KEY) {
                break;
            }
            let child = DialogState::from_instance_state(&active.state, CHILD_STATE_KEY);
            if child.is_empty() {
                break;
            }
            levels.push(child.dialog_stack);
        }

        levels.reverse();
        levels
    }
}

#[async_trait]
impl MemoryScope for DialogContextMemoryScope {
    fn name(&self) -> &str {
        scope_path::DIALOG_CONTEXT
    }

    fn include_in_snapshot(&self) -> bool {
        false
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let stack: Vec<String> = Self::stacks_from_leaf(dc)
            .iter()
            .flat_map(|level| level.iter().rev())
            .filter(|instance| instance.id.starts_with(ACTION_SCOPE_PREFIX))
            .map(|instance| instance.id.clone())
            .collect();

        Some(json!({
            "stack": stack,
            "activeDialog": dc.active_dialog().map(|instance| instance.id.clone()),
            "parent": dc.parent_active_dialog().map(|instance| instance.id.clone()),
        }))
    }
}
