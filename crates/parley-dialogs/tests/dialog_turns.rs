use async_trait::async_trait;
use parking_lot::Mutex;
use parley_dialogs::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("parley_dialogs=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl BotTelemetryClient for RecordingTelemetry {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        self.events.lock().push((name.to_string(), properties.clone()));
    }
}

impl RecordingTelemetry {
    fn named(&self, name: &str) -> Vec<HashMap<String, String>> {
        self.events
            .lock()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, properties)| properties.clone())
            .collect()
    }
}

/// Storage that can be told to fail reads or writes
#[derive(Default)]
struct FlakyStorage {
    inner: InMemoryStorage,
    fail_reads: bool,
    fail_writes: bool,
    writes: AtomicUsize,
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn read(&self, keys: &[String]) -> DialogResult<HashMap<String, Value>> {
        if self.fail_reads {
            return Err(DialogError::storage("read", "backend unavailable"));
        }
        self.inner.read(keys).await
    }

    async fn write(&self, changes: HashMap<String, Value>) -> DialogResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(DialogError::storage("write", "backend unavailable"));
        }
        self.inner.write(changes).await
    }

    async fn delete(&self, keys: &[String]) -> DialogResult<()> {
        self.inner.delete(keys).await
    }
}

fn say(text: &'static str) -> WaterfallStep {
    WaterfallStep::new(move |step| {
        Box::pin(async move {
            step.context_mut().send_activity(text);
            Ok(DialogTurnResult::end_of_turn())
        })
    })
}

fn three_steps(last: WaterfallStep) -> WaterfallDialog {
    WaterfallDialog::new("test", vec![say("step1"), say("step2"), last]).unwrap()
}

fn texts(result: &DialogManagerResult) -> Vec<String> {
    result
        .turn
        .responses()
        .iter()
        .filter_map(|activity| activity.text.clone())
        .collect()
}

async fn send(manager: &DialogManager, text: &str) -> DialogManagerResult {
    manager
        .on_turn(TurnContext::new(Activity::message(text)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_waterfall_runs_one_step_per_turn() {
    init_tracing();
    let telemetry = Arc::new(RecordingTelemetry::default());
    let storage = Arc::new(InMemoryStorage::new());
    let last = WaterfallStep::new(|step| {
        Box::pin(async move {
            step.context_mut().send_activity("step3");
            step.next(None).await
        })
    });
    let manager = DialogManager::new(three_steps(last), Arc::new(BotState::conversation(storage)))
        .unwrap()
        .with_telemetry(telemetry.clone());

    assert_eq!(texts(&send(&manager, "hello").await), vec!["step1"]);
    assert_eq!(texts(&send(&manager, "hello").await), vec!["step2"]);

    let last_turn = send(&manager, "hello").await;
    assert_eq!(texts(&last_turn), vec!["step3"]);
    assert_eq!(last_turn.turn_result.status, DialogTurnStatus::Complete);

    let complete = telemetry.named("WaterfallComplete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["DialogId"], "test");
    assert!(telemetry.named("WaterfallCancel").is_empty());

    let steps: Vec<String> = telemetry
        .named("WaterfallStep")
        .into_iter()
        .map(|properties| properties["StepName"].clone())
        .collect();
    assert_eq!(steps, vec!["Step1of3", "Step2of3", "Step3of3"]);
}

#[tokio::test]
async fn test_cancel_in_last_step_reports_step_name() {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let storage = Arc::new(InMemoryStorage::new());
    let last = WaterfallStep::new(|step| {
        Box::pin(async move {
            step.context_mut().send_activity("step3");
            step.cancel_all_dialogs().await
        })
    });
    let manager = DialogManager::new(three_steps(last), Arc::new(BotState::conversation(storage)))
        .unwrap()
        .with_telemetry(telemetry.clone());

    send(&manager, "hello").await;
    send(&manager, "hello").await;
    let last_turn = send(&manager, "hello").await;

    assert_eq!(last_turn.turn_result.status, DialogTurnStatus::Cancelled);
    let cancel = telemetry.named("WaterfallCancel");
    assert_eq!(cancel.len(), 1);
    assert_eq!(cancel[0]["StepName"], "Step3of3");
    assert_eq!(cancel[0]["DialogId"], "test");
    assert!(telemetry.named("WaterfallComplete").is_empty());
}

#[tokio::test]
async fn test_memory_survives_turns_through_scopes() {
    let storage = Arc::new(InMemoryStorage::new());
    let dialog = WaterfallDialog::new(
        "profile",
        vec![
            WaterfallStep::new(|step| {
                Box::pin(async move {
                    step.state().set_value("$attempts", &1)?;
                    step.context_mut().send_activity("name?");
                    Ok(DialogTurnResult::end_of_turn())
                })
            }),
            WaterfallStep::new(|step| {
                Box::pin(async move {
                    let name = step.result().cloned().unwrap_or(Value::Null);
                    let attempts: i64 = step.state().get_value("dialog.attempts", 0)?;
                    step.state().set_value("user.profile.name", &name)?;
                    step.state().set_value("conversation.attempts", &attempts)?;
                    step.end_dialog(Some(name)).await
                })
            }),
        ],
    )
    .unwrap();
    let manager = DialogManager::new(dialog, Arc::new(BotState::conversation(storage.clone())))
        .unwrap()
        .with_user_state(Arc::new(BotState::user(storage.clone())));

    send(&manager, "hi").await;
    let done = send(&manager, "Ada").await;

    assert_eq!(done.turn_result.result, Some(json!("Ada")));
    assert!(done.failures.is_empty());
    assert_eq!(
        storage.get("test/users/user").unwrap()["profile"]["name"],
        json!("Ada")
    );
    assert_eq!(
        storage.get("test/conversations/conversation").unwrap()["attempts"],
        json!(1)
    );
}

#[tokio::test]
async fn test_scope_failures_do_not_abort_the_turn() {
    init_tracing();
    let conversation = Arc::new(InMemoryStorage::new());
    let user_storage = Arc::new(FlakyStorage {
        fail_reads: true,
        fail_writes: true,
        ..FlakyStorage::default()
    });
    let dialog = WaterfallDialog::new(
        "remember",
        vec![WaterfallStep::new(|step| {
            Box::pin(async move {
                step.state().set_value("user.seen", &true)?;
                step.context_mut().send_activity("noted");
                step.end_dialog(None).await
            })
        })],
    )
    .unwrap();
    let manager = DialogManager::new(dialog, Arc::new(BotState::conversation(conversation)))
        .unwrap()
        .with_user_state(Arc::new(BotState::user(user_storage.clone())));

    let result = send(&manager, "hi").await;

    assert_eq!(texts(&result), vec!["noted"]);
    assert_eq!(result.failures.len(), 2);
    assert!(result.failures.iter().all(DialogError::is_storage));
    assert_eq!(user_storage.writes.load(Ordering::SeqCst), 1);
}

fn memory_context() -> DialogContext {
    let mut turn = TurnContext::new(Activity::message("hi"));
    let storage = Arc::new(InMemoryStorage::new());
    Arc::new(BotState::conversation(storage.clone())).register(&mut turn);
    Arc::new(BotState::user(storage)).register(&mut turn);

    let state = DialogState::with_stack(vec![DialogInstance::new("main")]);
    DialogContext::new(Arc::new(DialogSet::new()), turn, state)
}

#[test]
fn test_watermark_detects_tracked_changes() {
    let mut dc = memory_context();
    let mut state = dc.state();

    let tracked = state.track_paths(["user.name", "conversation.topic"]).unwrap();
    let watermark = state.version();
    assert!(!state.any_path_changed(watermark, &tracked).unwrap());

    state.set_value("turn.scratch", &"ignored").unwrap();
    assert!(!state.any_path_changed(watermark, &tracked).unwrap());

    state.set_value("user.name", &"Ada").unwrap();
    assert!(state.any_path_changed(watermark, &tracked).unwrap());

    let later = state.version();
    assert!(!state.any_path_changed(later, &tracked).unwrap());
}

#[test]
fn test_reads_are_copies() {
    let mut dc = memory_context();
    let mut state = dc.state();
    state
        .set_value("conversation.profile", &json!({"name": "Ada", "tags": ["a"]}))
        .unwrap();

    let mut copy: Value = state.get_value("conversation.profile", Value::Null).unwrap();
    copy["name"] = json!("Grace");
    copy["tags"].as_array_mut().unwrap().push(json!("b"));

    let stored: Value = state.get_value("conversation.profile", Value::Null).unwrap();
    assert_eq!(stored, json!({"name": "Ada", "tags": ["a"]}));
}

#[test]
fn test_alias_paths_are_stable() {
    let mut dc = memory_context();
    let state = dc.state();

    for path in ["$name", "#greeting", "@@city", "@city", "%id", "user.name"] {
        let once = state.transform_path(path);
        assert_eq!(state.transform_path(&once), once, "{path} is not stable");
    }
    assert_eq!(state.transform_path("$name"), "dialog.name");
    assert_eq!(state.transform_path("@city"), "turn.recognized.entities.city.first()");
}

#[test]
fn test_unknown_scope_is_reported() {
    let mut dc = memory_context();
    let mut state = dc.state();

    let err = state.get_value::<i64>("bogus.value", 0).unwrap_err();
    assert!(err.is_scope_not_found());
    assert!(err.to_string().contains("conversation"));

    let err = state.set_value("bogus.value", &1).unwrap_err();
    assert!(err.is_scope_not_found());
}
