//! Dialog context - the live dialog stack for one turn
//!
//! A [`DialogContext`] owns the turn and an arena of stack frames. The root
//! frame holds the persisted conversation stack; container dialogs push a
//! child frame for their inner stack while they run and pop it afterwards.
//! Every operation acts on the last (deepest) frame, and the frame before it
//! is the parent context.

use super::dialog::{dialog_events, Dialog, DialogEvent, DialogReason, DialogTurnResult};
use super::instance::{DialogInstance, DialogState};
use super::set::DialogSet;
use crate::error::{DialogError, DialogResult};
use crate::memory::scopes::turn as turn_memory;
use crate::memory::DialogStateManager;
use crate::state::StatePropertyAccessor;
use crate::telemetry::{BotTelemetryClient, NullTelemetryClient};
use crate::turn::TurnContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key under which a container persists its inner stack in its instance state
pub const CHILD_STATE_KEY: &str = "dialogs";

struct DialogFrame {
    dialogs: Arc<DialogSet>,
    stack: Vec<DialogInstance>,
    /// The container owning this frame ended while the frame was detached
    orphaned: bool,
}

impl DialogFrame {
    fn new(dialogs: Arc<DialogSet>, state: DialogState) -> Self {
        Self {
            dialogs,
            stack: state.dialog_stack,
            orphaned: false,
        }
    }
}

/// A child frame temporarily removed while its parent handles an operation
struct DetachedFrame {
    frame: DialogFrame,
    parent_depth: usize,
    parent_top: Option<String>,
}

/// The dialog stack for the current turn
pub struct DialogContext {
    turn: TurnContext,
    root: DialogFrame,
    children: Vec<DialogFrame>,
    telemetry: Arc<dyn BotTelemetryClient>,
}

impl DialogContext {
    /// Wrap a rehydrated stack for this turn
    pub fn new(dialogs: Arc<DialogSet>, turn: TurnContext, state: DialogState) -> Self {
        Self {
            turn,
            root: DialogFrame::new(dialogs, state),
            children: Vec::new(),
            telemetry: Arc::new(NullTelemetryClient),
        }
    }

    /// Report dialog telemetry to `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<dyn BotTelemetryClient>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Telemetry sink for the whole stack
    pub fn telemetry(&self) -> &Arc<dyn BotTelemetryClient> {
        &self.telemetry
    }

    /// Record a telemetry event
    pub fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        self.telemetry.track_event(name, properties);
    }

    /// The turn
    pub fn context(&self) -> &TurnContext {
        &self.turn
    }

    /// The turn, mutable
    pub fn context_mut(&mut self) -> &mut TurnContext {
        &mut self.turn
    }

    /// Path-addressed access to every memory scope
    pub fn state(&mut self) -> DialogStateManager<'_> {
        DialogStateManager::new(self)
    }

    fn current(&self) -> &DialogFrame {
        self.children.last().unwrap_or(&self.root)
    }

    fn current_mut(&mut self) -> &mut DialogFrame {
        match self.children.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    fn parent(&self) -> Option<&DialogFrame> {
        match self.children.len() {
            0 => None,
            1 => Some(&self.root),
            n => self.children.get(n - 2),
        }
    }

    fn parent_mut(&mut self) -> Option<&mut DialogFrame> {
        match self.children.len() {
            0 => None,
            1 => Some(&mut self.root),
            n => self.children.get_mut(n - 2),
        }
    }

    /// Frames from the current one up to the root
    fn frames_rev(&self) -> impl Iterator<Item = &DialogFrame> {
        self.children.iter().rev().chain(std::iter::once(&self.root))
    }

    /// Dialogs registered for the current frame
    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.current().dialogs
    }

    /// Frames of the current stack, bottom first
    pub fn stack(&self) -> &[DialogInstance] {
        &self.current().stack
    }

    /// Stacks of every live frame, root first
    pub fn frame_stacks(&self) -> Vec<&[DialogInstance]> {
        std::iter::once(&self.root)
            .chain(self.children.iter())
            .map(|frame| frame.stack.as_slice())
            .collect()
    }

    /// Number of live frames (1 when no container is running)
    pub fn depth(&self) -> usize {
        self.children.len() + 1
    }

    /// Whether a container's frame is the parent of the current one
    pub fn has_parent(&self) -> bool {
        !self.children.is_empty()
    }

    /// The active (top) frame
    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.current().stack.last()
    }

    /// The active frame, mutable
    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.current_mut().stack.last_mut()
    }

    /// The active frame of the parent context
    pub fn parent_active_dialog(&self) -> Option<&DialogInstance> {
        self.parent().and_then(|frame| frame.stack.last())
    }

    /// The active frame of the parent context, mutable
    pub fn parent_active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.parent_mut().and_then(|frame| frame.stack.last_mut())
    }

    /// Find a dialog in the current set, then in the parent sets
    pub fn find_dialog(&self, dialog_id: &str) -> Option<Arc<dyn Dialog>> {
        self.frames_rev()
            .find_map(|frame| frame.dialogs.find(dialog_id))
    }

    /// Find a dialog starting at the parent's set
    pub fn find_parent_dialog(&self, dialog_id: &str) -> Option<Arc<dyn Dialog>> {
        self.frames_rev()
            .skip(1)
            .find_map(|frame| frame.dialogs.find(dialog_id))
    }

    /// Copy of the root stack, ready to persist
    pub fn dialog_state(&self) -> DialogState {
        DialogState::with_stack(self.root.stack.clone())
    }

    /// Write the root stack back through `accessor`
    pub async fn save_dialog_state(
        &mut self,
        accessor: &StatePropertyAccessor<DialogState>,
    ) -> DialogResult<()> {
        let state = self.dialog_state();
        accessor.set(&mut self.turn, &state).await
    }

    /// Give back the turn and the root stack
    pub fn into_parts(self) -> (TurnContext, DialogState) {
        let state = DialogState::with_stack(self.root.stack);
        (self.turn, state)
    }

    /// Push a new dialog onto the stack and start it
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        if dialog_id.is_empty() {
            return Err(DialogError::invalid_argument(
                "dialog_id",
                "dialog id must not be empty",
            ));
        }

        let dialog = self.find_dialog(dialog_id).ok_or_else(|| {
            DialogError::dialog_not_found(
                dialog_id,
                "not registered in the current or any parent dialog set",
            )
        })?;

        debug!(dialog_id, depth = self.depth(), "Beginning dialog");
        self.current_mut().stack.push(DialogInstance::new(dialog_id));
        dialog.begin_dialog(self, options).await
    }

    /// Resume the active dialog with the current turn
    pub async fn continue_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        let Some(dialog_id) = self.active_dialog().map(|instance| instance.id.clone()) else {
            return Ok(DialogTurnResult::empty());
        };

        let dialog = self.find_dialog(&dialog_id).ok_or_else(|| {
            DialogError::dialog_not_found(&dialog_id, "failed to continue the active dialog")
        })?;
        dialog.continue_dialog(self).await
    }

    /// End the active dialog and resume its caller with `result`
    pub async fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.end_active_dialog(DialogReason::EndCalled, result.clone())
            .await?;

        let Some(dialog_id) = self.active_dialog().map(|instance| instance.id.clone()) else {
            return Ok(DialogTurnResult::complete(result));
        };

        let dialog = self.find_dialog(&dialog_id).ok_or_else(|| {
            DialogError::dialog_not_found(&dialog_id, "failed to resume the parent dialog")
        })?;
        dialog
            .resume_dialog(self, DialogReason::EndCalled, result)
            .await
    }

    /// Cancel every dialog on the current stack
    pub async fn cancel_all_dialogs(&mut self) -> DialogResult<DialogTurnResult> {
        self.cancel_all_dialogs_with(false, None, None).await
    }

    /// Cancel dialogs top-down, optionally continuing into the parent stacks.
    ///
    /// Before every pop after the first, `event_name` (default
    /// `cancelDialog`) is emitted to the dialog about to be cancelled; a
    /// dialog that handles it stops the cancellation.
    pub async fn cancel_all_dialogs_with(
        &mut self,
        cancel_parents: bool,
        event_name: Option<&str>,
        event_value: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        if self.stack().is_empty() && !self.has_parent() {
            return Ok(DialogTurnResult::empty());
        }

        let event_name = event_name.unwrap_or(dialog_events::CANCEL_DIALOG);
        let mut detached = Vec::new();
        let outcome = self
            .cancel_frames(cancel_parents, event_name, event_value, &mut detached)
            .await;

        let parent_ended = !detached.is_empty();
        while let Some(frame) = detached.pop() {
            self.reattach(frame);
        }
        outcome?;

        debug!(parent_ended, "Cancelled dialogs");
        Ok(DialogTurnResult {
            parent_ended,
            ..DialogTurnResult::cancelled()
        })
    }

    async fn cancel_frames(
        &mut self,
        cancel_parents: bool,
        event_name: &str,
        event_value: Option<Value>,
        detached: &mut Vec<DetachedFrame>,
    ) -> DialogResult<()> {
        let mut notify = false;
        loop {
            if !self.stack().is_empty() {
                if notify {
                    let handled = self
                        .emit_event(event_name, event_value.clone(), false, false)
                        .await?;
                    if handled {
                        break;
                    }
                }
                self.end_active_dialog(DialogReason::CancelCalled, None)
                    .await?;
            } else if cancel_parents {
                match self.detach_current_frame() {
                    Some(frame) => detached.push(frame),
                    None => break,
                }
            } else {
                break;
            }
            notify = true;
        }
        Ok(())
    }

    /// End the active dialog and start another one in its place
    pub async fn replace_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.end_active_dialog(DialogReason::ReplaceCalled, None)
            .await?;
        self.begin_dialog(dialog_id, options).await
    }

    /// Ask the active dialog to re-prompt
    pub async fn reprompt_dialog(&mut self) -> DialogResult<()> {
        let Some(instance) = self.active_dialog().cloned() else {
            return Ok(());
        };

        let dialog = self.find_dialog(&instance.id).ok_or_else(|| {
            DialogError::dialog_not_found(&instance.id, "failed to reprompt the active dialog")
        })?;
        dialog.reprompt_dialog(self, &instance).await
    }

    /// Emit an event to the active dialog, optionally starting at the
    /// deepest persisted child stack. Returns whether it was handled.
    pub async fn emit_event(
        &mut self,
        name: &str,
        value: Option<Value>,
        bubble: bool,
        from_leaf: bool,
    ) -> DialogResult<bool> {
        let event = DialogEvent::new(name, value, bubble);

        let mut pushed = 0;
        if from_leaf {
            while let Some((dialogs, state)) = self.persisted_child() {
                self.push_child(dialogs, state);
                pushed += 1;
            }
        }

        let outcome = self.dispatch_event(&event).await;

        for _ in 0..pushed {
            if let Some(state) = self.pop_child() {
                self.store_child_state(&state)?;
            }
        }
        outcome
    }

    /// Route an event to the parent context's active dialog
    pub(crate) async fn emit_to_parent(&mut self, event: &DialogEvent) -> DialogResult<bool> {
        let Some(frame) = self.detach_current_frame() else {
            return Ok(false);
        };

        let bubbled = DialogEvent::new(event.name.clone(), event.value.clone(), true);
        let outcome = self.dispatch_event(&bubbled).await;
        self.reattach(frame);
        outcome
    }

    async fn dispatch_event(&mut self, event: &DialogEvent) -> DialogResult<bool> {
        let Some(dialog_id) = self.active_dialog().map(|instance| instance.id.clone()) else {
            return Ok(false);
        };

        match self.find_dialog(&dialog_id) {
            Some(dialog) => dialog.on_dialog_event(self, event).await,
            None => Ok(false),
        }
    }

    async fn end_active_dialog(
        &mut self,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<()> {
        let Some(instance) = self.active_dialog().cloned() else {
            return Ok(());
        };

        if let Some(dialog) = self.find_dialog(&instance.id) {
            dialog.end_dialog(self, &instance, reason).await?;
        }

        self.current_mut().stack.pop();
        debug!(dialog_id = %instance.id, ?reason, "Dialog ended");

        turn_memory::set_last_result(&mut self.turn, result.unwrap_or(Value::Null));
        Ok(())
    }

    /// Run the next operations against a container's inner stack
    pub(crate) fn push_child(&mut self, dialogs: Arc<DialogSet>, state: DialogState) {
        self.children.push(DialogFrame::new(dialogs, state));
    }

    /// Leave the inner stack pushed by [`push_child`](Self::push_child).
    ///
    /// Returns `None` when the container owning the frame already ended.
    pub(crate) fn pop_child(&mut self) -> Option<DialogState> {
        let frame = self.children.pop()?;
        if frame.orphaned {
            None
        } else {
            Some(DialogState::with_stack(frame.stack))
        }
    }

    /// Persist `state` as the inner stack of the active container
    pub(crate) fn store_child_state(&mut self, state: &DialogState) -> DialogResult<()> {
        let value = serde_json::to_value(state)?;
        if let Some(active) = self.active_dialog_mut() {
            active.state.insert(CHILD_STATE_KEY.to_string(), value);
        }
        Ok(())
    }

    /// Inner stack persisted by the active dialog, if it is a container
    fn persisted_child(&self) -> Option<(Arc<DialogSet>, DialogState)> {
        let active = self.active_dialog()?;
        let dialogs = self.find_dialog(&active.id)?.child_dialogs()?;
        let state = DialogState::from_instance_state(&active.state, CHILD_STATE_KEY);
        if state.is_empty() {
            None
        } else {
            Some((dialogs, state))
        }
    }

    fn sync_child_state(&mut self) {
        let Some(frame) = self.children.last() else {
            return;
        };
        if frame.orphaned {
            return;
        }

        let state = DialogState::with_stack(frame.stack.clone());
        match serde_json::to_value(&state) {
            Ok(value) => {
                if let Some(parent) = self.parent_active_dialog_mut() {
                    parent.state.insert(CHILD_STATE_KEY.to_string(), value);
                }
            }
            Err(err) => warn!(error = %err, "Failed to persist inner dialog stack"),
        }
    }

    fn detach_current_frame(&mut self) -> Option<DetachedFrame> {
        self.sync_child_state();
        let frame = self.children.pop()?;
        let parent = self.current();
        Some(DetachedFrame {
            parent_depth: parent.stack.len(),
            parent_top: parent.stack.last().map(|instance| instance.id.clone()),
            frame,
        })
    }

    fn reattach(&mut self, detached: DetachedFrame) {
        let DetachedFrame {
            mut frame,
            parent_depth,
            parent_top,
        } = detached;

        let parent = self.current();
        let unchanged = !parent.orphaned
            && parent.stack.len() == parent_depth
            && parent.stack.last().map(|instance| &instance.id) == parent_top.as_ref();
        if !unchanged {
            frame.orphaned = true;
        }
        self.children.push(frame);
    }
}

impl std::fmt::Debug for DialogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogContext")
            .field("depth", &self.depth())
            .field("stack", &self.stack())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::DialogTurnStatus;
    use crate::turn::Activity;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Waits for one turn, then ends with the message text
    struct AskOnce {
        id: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Dialog for AskOnce {
        fn id(&self) -> &str {
            self.id
        }

        async fn begin_dialog(
            &self,
            dc: &mut DialogContext,
            _options: Option<Value>,
        ) -> DialogResult<DialogTurnResult> {
            dc.context_mut().send_activity(format!("{}?", self.id));
            Ok(DialogTurnResult::end_of_turn())
        }

        async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
            let text = dc.context().activity().text.clone();
            dc.end_dialog(text.map(Value::String)).await
        }

        async fn resume_dialog(
            &self,
            _dc: &mut DialogContext,
            _reason: DialogReason,
            result: Option<Value>,
        ) -> DialogResult<DialogTurnResult> {
            self.log
                .lock()
                .push(format!("{} resumed with {:?}", self.id, result));
            Ok(DialogTurnResult::end_of_turn())
        }

        async fn end_dialog(
            &self,
            _dc: &mut DialogContext,
            _instance: &DialogInstance,
            reason: DialogReason,
        ) -> DialogResult<()> {
            self.log.lock().push(format!("{} {:?}", self.id, reason));
            Ok(())
        }
    }

    fn dialogs(log: &Arc<Mutex<Vec<String>>>) -> Arc<DialogSet> {
        let mut set = DialogSet::new();
        for id in ["outer", "inner"] {
            set.add(AskOnce {
                id,
                log: log.clone(),
            })
            .unwrap();
        }
        Arc::new(set)
    }

    fn context(dialogs: Arc<DialogSet>, text: &str, state: DialogState) -> DialogContext {
        DialogContext::new(dialogs, TurnContext::new(Activity::message(text)), state)
    }

    #[tokio::test]
    async fn test_continue_on_empty_stack() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dc = context(dialogs(&log), "hi", DialogState::new());

        let result = dc.continue_dialog().await.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Empty);
    }

    #[tokio::test]
    async fn test_begin_unknown_dialog() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dc = context(dialogs(&log), "hi", DialogState::new());

        let err = dc.begin_dialog("missing", None).await.unwrap_err();
        assert!(matches!(err, DialogError::DialogNotFound { .. }));
        assert!(dc.begin_dialog("", None).await.unwrap_err().is_invalid_argument());
        assert!(dc.stack().is_empty());
    }

    #[tokio::test]
    async fn test_end_resumes_caller_and_sets_last_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = dialogs(&log);

        let mut dc = context(set.clone(), "hi", DialogState::new());
        dc.begin_dialog("outer", None).await.unwrap();
        dc.begin_dialog("inner", None).await.unwrap();
        let (_, state) = dc.into_parts();
        assert_eq!(state.dialog_stack.len(), 2);

        // Next turn: inner ends with the text, outer resumes
        let mut dc = context(set, "blue", state);
        let result = dc.continue_dialog().await.unwrap();
        assert!(result.is_waiting());
        assert_eq!(dc.stack().len(), 1);
        assert_eq!(dc.active_dialog().map(|i| i.id.as_str()), Some("outer"));

        let last: Option<String> = dc.state().try_get_value("turn.lastresult").unwrap();
        assert_eq!(last.as_deref(), Some("blue"));
        assert_eq!(
            *log.lock(),
            vec![
                "inner EndCalled".to_string(),
                "outer resumed with Some(String(\"blue\"))".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_all_runs_cancel_hooks_top_down() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dc = context(dialogs(&log), "hi", DialogState::new());
        dc.begin_dialog("outer", None).await.unwrap();
        dc.begin_dialog("inner", None).await.unwrap();

        let result = dc.cancel_all_dialogs().await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Cancelled);
        assert!(!result.parent_ended);
        assert!(dc.stack().is_empty());
        assert_eq!(
            *log.lock(),
            vec!["inner CancelCalled".to_string(), "outer CancelCalled".to_string()]
        );

        let again = dc.cancel_all_dialogs().await.unwrap();
        assert_eq!(again.status, DialogTurnStatus::Empty);
    }

    /// Handles every `cancelDialog` that reaches it
    struct Guard;

    #[async_trait]
    impl Dialog for Guard {
        fn id(&self) -> &str {
            "guard"
        }

        async fn begin_dialog(
            &self,
            _dc: &mut DialogContext,
            _options: Option<Value>,
        ) -> DialogResult<DialogTurnResult> {
            Ok(DialogTurnResult::end_of_turn())
        }

        async fn on_pre_bubble_event(
            &self,
            _dc: &mut DialogContext,
            event: &DialogEvent,
        ) -> DialogResult<bool> {
            Ok(event.name == dialog_events::CANCEL_DIALOG)
        }
    }

    #[tokio::test]
    async fn test_handled_cancel_event_stops_cancellation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = DialogSet::new();
        set.add(Guard).unwrap();
        set.add(AskOnce {
            id: "inner",
            log: log.clone(),
        })
        .unwrap();
        let state = DialogState::with_stack(vec![
            DialogInstance::new("guard"),
            DialogInstance::new("inner"),
        ]);
        let mut dc = context(Arc::new(set), "stop", state);

        let result = dc.cancel_all_dialogs_with(true, None, None).await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Cancelled);
        assert!(!result.parent_ended);
        assert_eq!(*log.lock(), vec!["inner CancelCalled".to_string()]);
        assert_eq!(dc.stack().len(), 1);
        assert_eq!(dc.active_dialog().map(|i| i.id.as_str()), Some("guard"));
    }

    #[tokio::test]
    async fn test_replace_dialog() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dc = context(dialogs(&log), "hi", DialogState::new());
        dc.begin_dialog("outer", None).await.unwrap();

        dc.replace_dialog("inner", None).await.unwrap();

        assert_eq!(dc.stack().len(), 1);
        assert_eq!(dc.active_dialog().map(|i| i.id.as_str()), Some("inner"));
        assert_eq!(*log.lock(), vec!["outer ReplaceCalled".to_string()]);
        assert_eq!(dc.context().responses().len(), 2);
    }

    #[tokio::test]
    async fn test_unhandled_event_returns_false() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dc = context(dialogs(&log), "hi", DialogState::new());
        assert!(!dc.emit_event("custom", None, true, false).await.unwrap());

        dc.begin_dialog("outer", None).await.unwrap();
        let handled = dc
            .emit_event("custom", Some(json!(1)), true, true)
            .await
            .unwrap();
        assert!(!handled);
    }
}
