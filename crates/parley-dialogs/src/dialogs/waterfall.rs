//! Waterfall dialog - an ordered list of steps, one per turn
//!
//! Each step either waits for the next turn
//! ([`DialogTurnResult::end_of_turn`]), moves on immediately
//! ([`WaterfallStepContext::next`]), or ends or cancels the dialog. The
//! index of the running step is persisted in the dialog's state as
//! `stepIndex`, so a waterfall resumes where it left off on the next turn.
//!
//! ```rust,no_run
//! use parley_dialogs::dialogs::{DialogTurnResult, WaterfallDialog, WaterfallStep};
//!
//! let greet = WaterfallDialog::new(
//!     "greet",
//!     vec![
//!         WaterfallStep::new(|step| {
//!             Box::pin(async move {
//!                 step.context_mut().send_activity("What's your name?");
//!                 Ok(DialogTurnResult::end_of_turn())
//!             })
//!         }),
//!         WaterfallStep::new(|step| {
//!             Box::pin(async move {
//!                 let name = step.result().and_then(|v| v.as_str()).unwrap_or("friend").to_string();
//!                 step.context_mut().send_activity(format!("Hello {name}"));
//!                 step.end_dialog(None).await
//!             })
//!         }),
//!     ],
//! )?;
//! # Ok::<(), parley_dialogs::DialogError>(())
//! ```

use super::context::DialogContext;
use super::dialog::{Dialog, DialogReason, DialogTurnResult};
use super::instance::DialogInstance;
use super::step_context::WaterfallStepContext;
use crate::error::{DialogError, DialogResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// State key of the options the waterfall was started with
pub const PERSISTED_OPTIONS: &str = "options";
/// State key of the values shared between steps
pub const PERSISTED_VALUES: &str = "values";
/// State key of the running step's index
pub const STEP_INDEX: &str = "stepIndex";
/// State key of the per-run instance id
pub const PERSISTED_INSTANCE_ID: &str = "instanceId";

/// Future returned by a step
pub type StepFuture<'s> = BoxFuture<'s, DialogResult<DialogTurnResult>>;

type StepFn = dyn for<'s, 'a> Fn(&'s mut WaterfallStepContext<'a>) -> StepFuture<'s> + Send + Sync;

/// One step of a waterfall
#[derive(Clone)]
pub struct WaterfallStep {
    name: Option<String>,
    func: Arc<StepFn>,
}

impl WaterfallStep {
    /// A step reported as `Step<i>of<N>`
    pub fn new<F>(func: F) -> Self
    where
        F: for<'s, 'a> Fn(&'s mut WaterfallStepContext<'a>) -> StepFuture<'s>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
        }
    }

    /// A step reported under its own name
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: for<'s, 'a> Fn(&'s mut WaterfallStepContext<'a>) -> StepFuture<'s>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Some(name.into()),
            func: Arc::new(func),
        }
    }

    /// Explicit step name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl std::fmt::Debug for WaterfallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterfallStep")
            .field("name", &self.name)
            .finish()
    }
}

/// A dialog that runs its steps in order across turns
#[derive(Debug, Clone)]
pub struct WaterfallDialog {
    id: String,
    steps: Vec<WaterfallStep>,
}

impl WaterfallDialog {
    /// Create a waterfall; the id must not be empty
    pub fn new(id: impl Into<String>, steps: Vec<WaterfallStep>) -> DialogResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DialogError::invalid_argument(
                "dialog_id",
                "waterfall dialog id must not be empty",
            ));
        }
        Ok(Self { id, steps })
    }

    /// Append a step
    pub fn add_step(mut self, step: WaterfallStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Telemetry name of step `index`
    pub fn step_name(&self, index: usize) -> String {
        match self.steps.get(index).and_then(WaterfallStep::name) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("Step{}of{}", index + 1, self.steps.len()),
        }
    }

    fn properties_for(&self, instance_id: &str, step: Option<usize>) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        properties.insert("DialogId".to_string(), self.id.clone());
        if let Some(index) = step {
            properties.insert("StepName".to_string(), self.step_name(index));
        }
        properties.insert("InstanceId".to_string(), instance_id.to_string());
        properties
    }

    async fn run_step(
        &self,
        dc: &mut DialogContext,
        index: usize,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let Some(step) = self.steps.get(index) else {
            // Past the last step: hand the result to the caller
            return dc.end_dialog(result).await;
        };

        let active = dc.active_dialog_mut().ok_or_else(|| {
            DialogError::invalid_state("waterfall step without an active dialog")
        })?;
        active.state.insert(STEP_INDEX.to_string(), json!(index));
        let options = active
            .state
            .get(PERSISTED_OPTIONS)
            .filter(|options| !options.is_null())
            .cloned();
        let instance_id = instance_id(&active.state);

        debug!(dialog_id = %self.id, step = index, ?reason, "Running waterfall step");
        dc.track_event("WaterfallStep", &self.properties_for(&instance_id, Some(index)));

        let mut step_context = WaterfallStepContext::new(dc, self, index, reason, result, options);
        (step.func)(&mut step_context).await
    }
}

fn instance_id(state: &Map<String, Value>) -> String {
    state
        .get(PERSISTED_INSTANCE_ID)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Dialog for WaterfallDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let instance_id = Uuid::new_v4().to_string();

        let active = dc.active_dialog_mut().ok_or_else(|| {
            DialogError::invalid_state("waterfall started without an active dialog")
        })?;
        active.state.insert(
            PERSISTED_OPTIONS.to_string(),
            options.unwrap_or(Value::Null),
        );
        active
            .state
            .insert(PERSISTED_VALUES.to_string(), Value::Object(Map::new()));
        active.state.insert(
            PERSISTED_INSTANCE_ID.to_string(),
            Value::String(instance_id.clone()),
        );

        dc.track_event("WaterfallStart", &self.properties_for(&instance_id, None));
        self.run_step(dc, 0, DialogReason::BeginCalled, None).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        // Only messages advance a waterfall
        if !dc.context().activity().is_message() {
            return Ok(DialogTurnResult::end_of_turn());
        }

        let text = dc.context().activity().text.clone().map(Value::String);
        self.resume_dialog(dc, DialogReason::ContinueCalled, text)
            .await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let index = dc
            .active_dialog()
            .and_then(|instance| instance.state.get(STEP_INDEX))
            .and_then(Value::as_u64)
            .ok_or_else(|| DialogError::invalid_state("waterfall state has no step index"))?;

        self.run_step(dc, index as usize + 1, reason, result).await
    }

    async fn end_dialog(
        &self,
        dc: &mut DialogContext,
        instance: &DialogInstance,
        reason: DialogReason,
    ) -> DialogResult<()> {
        let instance_id = instance_id(&instance.state);
        match reason {
            DialogReason::CancelCalled => {
                let index = instance
                    .state
                    .get(STEP_INDEX)
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                dc.track_event(
                    "WaterfallCancel",
                    &self.properties_for(&instance_id, Some(index)),
                );
            }
            DialogReason::EndCalled => {
                dc.track_event("WaterfallComplete", &self.properties_for(&instance_id, None));
            }
            _ => {}
        }
        Ok(())
    }

    fn properties(&self) -> Value {
        let steps: Vec<String> = (0..self.steps.len())
            .map(|index| self.step_name(index))
            .collect();
        json!({ "id": self.id, "steps": steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::{DialogSet, DialogState, DialogTurnStatus};
    use crate::telemetry::BotTelemetryClient;
    use crate::turn::{Activity, TurnContext};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTelemetry {
        events: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    impl BotTelemetryClient for RecordingTelemetry {
        fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
            self.events
                .lock()
                .push((name.to_string(), properties.clone()));
        }
    }

    impl RecordingTelemetry {
        fn names(&self) -> Vec<String> {
            self.events.lock().iter().map(|(name, _)| name.clone()).collect()
        }
    }

    fn reply(text: &'static str) -> WaterfallStep {
        WaterfallStep::new(move |step| {
            Box::pin(async move {
                step.context_mut().send_activity(text);
                Ok(DialogTurnResult::end_of_turn())
            })
        })
    }

    async fn run_turn(
        dialogs: &Arc<DialogSet>,
        telemetry: &Arc<RecordingTelemetry>,
        activity: Activity,
        state: DialogState,
    ) -> (DialogResult<DialogTurnResult>, TurnContext, DialogState) {
        let mut dc = DialogContext::new(dialogs.clone(), TurnContext::new(activity), state)
            .with_telemetry(telemetry.clone());
        let mut result = dc.continue_dialog().await;
        if matches!(&result, Ok(r) if r.status == DialogTurnStatus::Empty) {
            result = dc.begin_dialog("test", Some(json!({"topic": "weather"}))).await;
        }
        let (turn, state) = dc.into_parts();
        (result, turn, state)
    }

    #[test]
    fn test_empty_id_is_invalid_argument() {
        let err = WaterfallDialog::new("  ", vec![]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_step_names() {
        let waterfall = WaterfallDialog::new("w", vec![reply("a"), reply("b")])
            .unwrap()
            .add_step(WaterfallStep::named("confirm", |_step| {
                Box::pin(async { Ok(DialogTurnResult::end_of_turn()) })
            }));

        assert_eq!(waterfall.step_count(), 3);
        assert_eq!(waterfall.step_name(0), "Step1of3");
        assert_eq!(waterfall.step_name(1), "Step2of3");
        assert_eq!(waterfall.step_name(2), "confirm");
        assert_eq!(
            waterfall.properties(),
            json!({"id": "w", "steps": ["Step1of3", "Step2of3", "confirm"]})
        );
    }

    #[tokio::test]
    async fn test_values_and_options_survive_turns() {
        let waterfall = WaterfallDialog::new(
            "test",
            vec![
                WaterfallStep::new(|step| {
                    Box::pin(async move {
                        let topic = step.options().and_then(|o| o["topic"].as_str()).map(String::from);
                        step.values_mut()?.insert("topic".to_string(), json!(topic));
                        Ok(DialogTurnResult::end_of_turn())
                    })
                }),
                WaterfallStep::new(|step| {
                    Box::pin(async move {
                        let topic = step
                            .values()
                            .and_then(|values| values.get("topic"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let answer = step.result().and_then(Value::as_str).unwrap_or_default().to_string();
                        step.context_mut().send_activity(format!("{topic}: {answer}"));
                        step.end_dialog(Some(json!(answer))).await
                    })
                }),
            ],
        )
        .unwrap();
        let dialogs = Arc::new(DialogSet::new().with_dialog(waterfall).unwrap());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let (_, _, state) = run_turn(&dialogs, &telemetry, Activity::message("hi"), DialogState::new()).await;
        let (result, turn, state) = run_turn(&dialogs, &telemetry, Activity::message("sunny"), state).await;

        let result = result.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(result.result, Some(json!("sunny")));
        assert_eq!(turn.responses()[0].text.as_deref(), Some("weather: sunny"));
        assert!(state.is_empty());
        assert_eq!(
            telemetry.names(),
            vec!["WaterfallStart", "WaterfallStep", "WaterfallStep", "WaterfallComplete"]
        );
    }

    #[tokio::test]
    async fn test_non_message_activity_waits() {
        let waterfall = WaterfallDialog::new("test", vec![reply("one"), reply("two")]).unwrap();
        let dialogs = Arc::new(DialogSet::new().with_dialog(waterfall).unwrap());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let (_, _, state) = run_turn(&dialogs, &telemetry, Activity::message("hi"), DialogState::new()).await;
        let (result, turn, state) =
            run_turn(&dialogs, &telemetry, Activity::event("typing", None), state).await;

        assert!(result.unwrap().is_waiting());
        assert!(!turn.responded());
        assert_eq!(state.dialog_stack[0].state[STEP_INDEX], json!(0));
    }

    #[tokio::test]
    async fn test_next_twice_is_invalid_state() {
        let waterfall = WaterfallDialog::new(
            "test",
            vec![
                WaterfallStep::new(|step| {
                    Box::pin(async move {
                        step.next(None).await?;
                        step.next(None).await
                    })
                }),
                reply("two"),
                reply("three"),
            ],
        )
        .unwrap();
        let dialogs = Arc::new(DialogSet::new().with_dialog(waterfall).unwrap());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let (result, _, _) = run_turn(&dialogs, &telemetry, Activity::message("hi"), DialogState::new()).await;
        assert!(matches!(result, Err(DialogError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_instance_id_is_shared_by_events() {
        let waterfall = WaterfallDialog::new("test", vec![reply("one")]).unwrap();
        let dialogs = Arc::new(DialogSet::new().with_dialog(waterfall).unwrap());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let (_, _, state) = run_turn(&dialogs, &telemetry, Activity::message("hi"), DialogState::new()).await;
        run_turn(&dialogs, &telemetry, Activity::message("done"), state).await.0.unwrap();

        let events = telemetry.events.lock();
        let ids: Vec<&String> = events.iter().map(|(_, props)| &props["InstanceId"]).collect();
        assert_eq!(events.len(), 3);
        assert!(!ids[0].is_empty());
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(events[1].1["StepName"], "Step1of1");
    }
}
