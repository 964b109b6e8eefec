//! Component dialog - a dialog that runs its own inner dialog set

use super::context::{DialogContext, CHILD_STATE_KEY};
use super::dialog::{Dialog, DialogReason, DialogTurnResult, DialogTurnStatus};
use super::instance::{DialogInstance, DialogState};
use super::set::DialogSet;
use crate::error::{DialogError, DialogResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Groups dialogs behind a single id.
///
/// The inner stack is persisted inside the component's own instance state
/// under `dialogs`, so the outer stack only ever sees the component.
#[derive(Debug, Clone)]
pub struct ComponentDialog {
    id: String,
    initial_dialog_id: Option<String>,
    dialogs: Arc<DialogSet>,
}

impl ComponentDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial_dialog_id: None,
            dialogs: Arc::new(DialogSet::new()),
        }
    }

    /// Add an inner dialog; the first one added becomes the initial dialog
    pub fn add_dialog<D: Dialog + 'static>(mut self, dialog: D) -> DialogResult<Self> {
        let dialog_id = dialog.id().to_string();
        Arc::make_mut(&mut self.dialogs).add(dialog)?;
        if self.initial_dialog_id.is_none() {
            self.initial_dialog_id = Some(dialog_id);
        }
        Ok(self)
    }

    /// Start with `dialog_id` instead of the first dialog added
    pub fn with_initial_dialog(mut self, dialog_id: impl Into<String>) -> Self {
        self.initial_dialog_id = Some(dialog_id.into());
        self
    }

    pub fn initial_dialog_id(&self) -> Option<&str> {
        self.initial_dialog_id.as_deref()
    }

    fn inner_state(instance: Option<&DialogInstance>) -> DialogState {
        instance
            .map(|instance| DialogState::from_instance_state(&instance.state, CHILD_STATE_KEY))
            .unwrap_or_default()
    }

    /// Leave the inner stack and decide whether the component ends too
    async fn finish_inner(
        &self,
        dc: &mut DialogContext,
        outcome: DialogResult<DialogTurnResult>,
    ) -> DialogResult<DialogTurnResult> {
        let inner = dc.pop_child();
        let turn_result = outcome?;

        let Some(inner) = inner else {
            // Something above the inner stack already ended this component
            return Ok(DialogTurnResult {
                parent_ended: true,
                ..turn_result
            });
        };
        if turn_result.parent_ended {
            return Ok(turn_result);
        }

        dc.store_child_state(&inner)?;
        if turn_result.status == DialogTurnStatus::Waiting {
            return Ok(DialogTurnResult::end_of_turn());
        }

        debug!(dialog_id = %self.id, status = ?turn_result.status, "Inner dialogs finished");
        dc.end_dialog(turn_result.result).await
    }
}

#[async_trait]
impl Dialog for ComponentDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let initial = self.initial_dialog_id.clone().ok_or_else(|| {
            DialogError::invalid_state(format!("component '{}' has no dialogs", self.id))
        })?;

        dc.push_child(Arc::clone(&self.dialogs), DialogState::new());
        let outcome = dc.begin_dialog(&initial, options).await;
        self.finish_inner(dc, outcome).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        let state = Self::inner_state(dc.active_dialog());
        dc.push_child(Arc::clone(&self.dialogs), state);
        let outcome = dc.continue_dialog().await;
        self.finish_inner(dc, outcome).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        // A dialog pushed onto the outer stack by an inner dialog returned;
        // re-prompt the inner stack and keep waiting.
        let instance = dc
            .active_dialog()
            .cloned()
            .ok_or_else(|| DialogError::invalid_state("component resumed without an instance"))?;
        self.reprompt_dialog(dc, &instance).await?;
        Ok(DialogTurnResult::end_of_turn())
    }

    async fn reprompt_dialog(
        &self,
        dc: &mut DialogContext,
        instance: &DialogInstance,
    ) -> DialogResult<()> {
        dc.push_child(Arc::clone(&self.dialogs), Self::inner_state(Some(instance)));
        let outcome = dc.reprompt_dialog().await;
        if let Some(inner) = dc.pop_child() {
            dc.store_child_state(&inner)?;
        }
        outcome
    }

    async fn end_dialog(
        &self,
        dc: &mut DialogContext,
        instance: &DialogInstance,
        reason: DialogReason,
    ) -> DialogResult<()> {
        if reason != DialogReason::CancelCalled {
            return Ok(());
        }

        let state = Self::inner_state(Some(instance));
        if state.is_empty() {
            return Ok(());
        }
        dc.push_child(Arc::clone(&self.dialogs), state);
        let outcome = dc.cancel_all_dialogs().await;
        dc.pop_child();
        outcome.map(|_| ())
    }

    fn child_dialogs(&self) -> Option<Arc<DialogSet>> {
        Some(Arc::clone(&self.dialogs))
    }

    fn properties(&self) -> Value {
        json!({
            "id": self.id,
            "initialDialogId": self.initial_dialog_id,
            "dialogs": self.dialogs.ids(),
        })
    }
}
