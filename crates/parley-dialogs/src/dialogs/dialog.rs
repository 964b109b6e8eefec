//! The [`Dialog`] trait and the values exchanged with the dialog stack

use super::context::DialogContext;
use super::instance::DialogInstance;
use super::set::DialogSet;
use crate::error::DialogResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Well-known dialog event names
pub mod dialog_events {
    /// Emitted to the next active dialog while the stack is being cancelled
    pub const CANCEL_DIALOG: &str = "cancelDialog";
    /// A dialog is being started
    pub const BEGIN_DIALOG: &str = "beginDialog";
    /// The active dialog should re-prompt
    pub const REPROMPT_DIALOG: &str = "repromptDialog";
    /// An activity reached the dialog stack
    pub const ACTIVITY_RECEIVED: &str = "activityReceived";
}

/// Outcome of a dialog turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogTurnStatus {
    /// The stack was empty; nothing ran
    Empty,
    /// The active dialog is waiting for the next turn
    Waiting,
    /// The last dialog on the stack completed
    Complete,
    /// The stack was cancelled
    Cancelled,
}

/// Result returned by every stack transition
#[derive(Debug, Clone, PartialEq)]
pub struct DialogTurnResult {
    /// Turn outcome
    pub status: DialogTurnStatus,

    /// Result of a completed dialog
    pub result: Option<Value>,

    /// Set when a cancellation reached past the current dialog set
    pub parent_ended: bool,
}

impl DialogTurnResult {
    /// Create a result with a status and no value
    pub fn new(status: DialogTurnStatus) -> Self {
        Self {
            status,
            result: None,
            parent_ended: false,
        }
    }

    /// Nothing ran
    pub fn empty() -> Self {
        Self::new(DialogTurnStatus::Empty)
    }

    /// Suspend until the next turn
    pub fn end_of_turn() -> Self {
        Self::new(DialogTurnStatus::Waiting)
    }

    /// The stack completed with an optional value
    pub fn complete(result: Option<Value>) -> Self {
        Self {
            result,
            ..Self::new(DialogTurnStatus::Complete)
        }
    }

    /// The stack was cancelled
    pub fn cancelled() -> Self {
        Self::new(DialogTurnStatus::Cancelled)
    }

    /// Check if the dialog is waiting for input
    pub fn is_waiting(&self) -> bool {
        self.status == DialogTurnStatus::Waiting
    }
}

/// Why a dialog is being started, resumed or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogReason {
    /// `begin_dialog` pushed the dialog
    BeginCalled,
    /// `continue_dialog` resumed the dialog with a new turn
    ContinueCalled,
    /// The dialog or a child ended normally
    EndCalled,
    /// The dialog is being replaced
    ReplaceCalled,
    /// The dialog is being cancelled
    CancelCalled,
    /// A waterfall step advanced with `next`
    NextCalled,
}

/// Event routed through the active dialogs of a stack
#[derive(Debug, Clone, PartialEq)]
pub struct DialogEvent {
    /// Event name
    pub name: String,

    /// Event payload
    pub value: Option<Value>,

    /// Whether unhandled events travel to the parent dialog set
    pub bubble: bool,
}

impl DialogEvent {
    /// Create an event
    pub fn new(name: impl Into<String>, value: Option<Value>, bubble: bool) -> Self {
        Self {
            name: name.into(),
            value,
            bubble,
        }
    }
}

/// A unit of conversational logic living on the dialog stack.
///
/// Implementations are stateless definitions shared behind `Arc`; everything
/// that must survive between turns goes into the [`DialogInstance`] state of
/// the active frame.
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Unique id within the owning [`DialogSet`]
    fn id(&self) -> &str;

    /// Called when the dialog is pushed onto the stack
    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult>;

    /// Called when a new turn arrives while this dialog is active
    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(None).await
    }

    /// Called when a child dialog ended and this dialog is active again
    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(result).await
    }

    /// Ask the dialog to re-prompt the user
    async fn reprompt_dialog(
        &self,
        _dc: &mut DialogContext,
        _instance: &DialogInstance,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Hook invoked just before the dialog's frame is popped
    async fn end_dialog(
        &self,
        _dc: &mut DialogContext,
        _instance: &DialogInstance,
        _reason: DialogReason,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Route an event: pre-bubble, then the parent dialog set, then post-bubble
    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        let mut handled = self.on_pre_bubble_event(dc, event).await?;

        if !handled && event.bubble {
            handled = dc.emit_to_parent(event).await?;
        }

        if !handled {
            handled = self.on_post_bubble_event(dc, event).await?;
        }

        Ok(handled)
    }

    /// Handle an event before the parent sees it
    async fn on_pre_bubble_event(
        &self,
        _dc: &mut DialogContext,
        _event: &DialogEvent,
    ) -> DialogResult<bool> {
        Ok(false)
    }

    /// Handle an event the parent did not handle
    async fn on_post_bubble_event(
        &self,
        _dc: &mut DialogContext,
        _event: &DialogEvent,
    ) -> DialogResult<bool> {
        Ok(false)
    }

    /// Child dialogs of a container dialog; `None` for leaf dialogs
    fn child_dialogs(&self) -> Option<Arc<DialogSet>> {
        None
    }

    /// Definition exposed through the `class` and `dialogclass` scopes
    fn properties(&self) -> Value {
        json!({ "id": self.id() })
    }
}
