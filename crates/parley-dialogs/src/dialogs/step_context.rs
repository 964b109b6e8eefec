//! Context handed to each waterfall step

use super::context::DialogContext;
use super::dialog::{Dialog, DialogReason, DialogTurnResult};
use super::waterfall::{WaterfallDialog, PERSISTED_VALUES};
use crate::error::{DialogError, DialogResult};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// A dialog context plus the position of the running step.
///
/// Dereferences to [`DialogContext`], so a step can begin child dialogs,
/// end the waterfall or cancel the stack directly.
pub struct WaterfallStepContext<'a> {
    dc: &'a mut DialogContext,
    waterfall: &'a WaterfallDialog,
    index: usize,
    reason: DialogReason,
    result: Option<Value>,
    options: Option<Value>,
    next_called: bool,
}

impl<'a> WaterfallStepContext<'a> {
    pub(crate) fn new(
        dc: &'a mut DialogContext,
        waterfall: &'a WaterfallDialog,
        index: usize,
        reason: DialogReason,
        result: Option<Value>,
        options: Option<Value>,
    ) -> Self {
        Self {
            dc,
            waterfall,
            index,
            reason,
            result,
            options,
            next_called: false,
        }
    }

    /// Zero-based index of the running step
    pub fn index(&self) -> usize {
        self.index
    }

    /// Why the step is running
    pub fn reason(&self) -> DialogReason {
        self.reason
    }

    /// Result of the previous step, child dialog, or user message
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Options the waterfall was started with
    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref()
    }

    /// Telemetry name of the running step
    pub fn step_name(&self) -> String {
        self.waterfall.step_name(self.index)
    }

    /// Values shared by every step of this waterfall run
    pub fn values(&self) -> Option<&Map<String, Value>> {
        self.dc
            .active_dialog()
            .and_then(|instance| instance.state.get(PERSISTED_VALUES))
            .and_then(Value::as_object)
    }

    /// Values shared by every step, mutable
    pub fn values_mut(&mut self) -> DialogResult<&mut Map<String, Value>> {
        let instance = self
            .dc
            .active_dialog_mut()
            .ok_or_else(|| DialogError::invalid_state("waterfall step without an active dialog"))?;

        let values = instance
            .state
            .entry(PERSISTED_VALUES)
            .or_insert_with(|| Value::Object(Map::new()));
        if !values.is_object() {
            *values = Value::Object(Map::new());
        }
        match values {
            Value::Object(map) => Ok(map),
            _ => Err(DialogError::invalid_state("waterfall values are not an object")),
        }
    }

    /// Skip waiting for input and run the next step with `result`
    pub async fn next(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        if self.next_called {
            return Err(DialogError::invalid_state(format!(
                "next() already called for step '{}[{}]'",
                self.waterfall.id(),
                self.index
            )));
        }

        self.next_called = true;
        self.waterfall
            .resume_dialog(&mut *self.dc, DialogReason::NextCalled, result)
            .await
    }
}

impl Deref for WaterfallStepContext<'_> {
    type Target = DialogContext;

    fn deref(&self) -> &DialogContext {
        &*self.dc
    }
}

impl DerefMut for WaterfallStepContext<'_> {
    fn deref_mut(&mut self) -> &mut DialogContext {
        &mut *self.dc
    }
}
