//! Dialog manager - runs a root dialog once per turn
//!
//! The manager wires bot state, settings and the memory configuration into
//! the turn, rehydrates the dialog stack from conversation state, continues
//! the active dialog (or begins the root dialog when the stack is empty),
//! and persists everything that changed.

use super::context::DialogContext;
use super::dialog::{Dialog, DialogTurnResult, DialogTurnStatus};
use super::instance::DialogState;
use super::set::DialogSet;
use crate::error::{DialogError, DialogResult};
use crate::memory::DialogStateManagerConfiguration;
use crate::settings::Settings;
use crate::state::{BotState, StatePropertyAccessor};
use crate::telemetry::{BotTelemetryClient, NullTelemetryClient};
use crate::turn::{ActivityType, TurnContext};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Conversation-state property holding the time of the previous turn
pub const LAST_ACCESS: &str = "_lastAccess";

/// Conversation-state property holding the dialog stack
pub const DIALOG_STATE_PROPERTY: &str = "DialogState";

/// Outcome of [`DialogManager::on_turn`]
pub struct DialogManagerResult {
    /// The turn, with the replies sent during it
    pub turn: TurnContext,

    /// What the dialog stack did
    pub turn_result: DialogTurnResult,

    /// Scopes that failed to load or save; the turn itself still ran
    pub failures: Vec<DialogError>,
}

/// Runs one root dialog across turns
pub struct DialogManager {
    root_dialog_id: String,
    dialogs: Arc<DialogSet>,
    conversation_state: Arc<BotState>,
    user_state: Option<Arc<BotState>>,
    settings: Option<Arc<Settings>>,
    state_configuration: Arc<DialogStateManagerConfiguration>,
    telemetry: Arc<dyn BotTelemetryClient>,
    expire_after: Option<Duration>,
}

impl DialogManager {
    /// Manage `root_dialog`, keeping its stack in `conversation_state`
    pub fn new<D: Dialog + 'static>(
        root_dialog: D,
        conversation_state: Arc<BotState>,
    ) -> DialogResult<Self> {
        let root_dialog_id = root_dialog.id().to_string();
        let mut dialogs = DialogSet::new();
        dialogs.add(root_dialog)?;

        Ok(Self {
            root_dialog_id,
            dialogs: Arc::new(dialogs),
            conversation_state,
            user_state: None,
            settings: None,
            state_configuration: Arc::new(DialogStateManagerConfiguration::builtin()),
            telemetry: Arc::new(NullTelemetryClient),
            expire_after: None,
        })
    }

    /// Register another dialog next to the root dialog
    pub fn with_dialog<D: Dialog + 'static>(mut self, dialog: D) -> DialogResult<Self> {
        Arc::make_mut(&mut self.dialogs).add(dialog)?;
        Ok(self)
    }

    pub fn with_user_state(mut self, user_state: Arc<BotState>) -> Self {
        self.user_state = Some(user_state);
        self
    }

    pub fn with_settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replace the built-in memory scopes and path resolvers
    pub fn with_state_configuration(
        mut self,
        configuration: Arc<DialogStateManagerConfiguration>,
    ) -> Self {
        self.state_configuration = configuration;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn BotTelemetryClient>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Forget the conversation when no turn arrived for `expire_after`
    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    pub fn root_dialog_id(&self) -> &str {
        &self.root_dialog_id
    }

    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    /// Run one turn through the dialog stack
    pub async fn on_turn(&self, mut turn: TurnContext) -> DialogResult<DialogManagerResult> {
        self.conversation_state.register(&mut turn);
        if let Some(user_state) = &self.user_state {
            user_state.register(&mut turn);
        }
        if let Some(settings) = &self.settings {
            settings.register(&mut turn);
        }
        self.state_configuration.register(&mut turn);

        self.expire_conversation(&mut turn).await?;

        let accessor = self
            .conversation_state
            .create_property::<DialogState>(DIALOG_STATE_PROPERTY);
        let mut dc = self
            .dialogs
            .create_context_with(turn, &accessor, Arc::clone(&self.telemetry))
            .await?;

        let mut failures = dc.state().load_all_scopes().await;

        let turn_result = continue_or_begin(&mut dc, &self.root_dialog_id).await?;
        debug!(status = ?turn_result.status, "Dialog turn finished");

        dc.save_dialog_state(&accessor).await?;
        failures.extend(dc.state().save_all_changes().await);
        if !failures.is_empty() {
            warn!(count = failures.len(), "Some memory scopes were not persisted");
        }

        let (turn, _) = dc.into_parts();
        Ok(DialogManagerResult {
            turn,
            turn_result,
            failures,
        })
    }

    async fn expire_conversation(&self, turn: &mut TurnContext) -> DialogResult<()> {
        let last_access = self
            .conversation_state
            .create_property::<DateTime<Utc>>(LAST_ACCESS);
        let now = Utc::now();

        if let (Some(expire_after), Some(previous)) =
            (self.expire_after, last_access.try_get(turn).await?)
        {
            let expired = chrono::Duration::from_std(expire_after)
                .map(|limit| now.signed_duration_since(previous) >= limit)
                .unwrap_or(false);
            if expired {
                info!(
                    last_access = %previous,
                    "Conversation expired, clearing conversation state"
                );
                self.conversation_state.clear_state(turn);
            }
        }

        last_access.set(turn, &now).await
    }
}

impl std::fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogManager")
            .field("root_dialog_id", &self.root_dialog_id)
            .field("dialogs", &self.dialogs)
            .field("expire_after", &self.expire_after)
            .finish()
    }
}

/// Run `dialog` for one turn against the stack stored behind `accessor`.
///
/// Continues the active dialog, begins `dialog` when nothing is active, and
/// writes the stack back through `accessor`. Saving the bot state itself is
/// left to the caller.
pub async fn run_dialog(
    dialog: Arc<dyn Dialog>,
    turn: TurnContext,
    accessor: &StatePropertyAccessor<DialogState>,
    telemetry: Arc<dyn BotTelemetryClient>,
) -> DialogResult<(TurnContext, DialogTurnResult)> {
    let mut dialogs = DialogSet::new();
    dialogs.add_arc(Arc::clone(&dialog))?;
    let dialogs = Arc::new(dialogs);

    let mut dc = dialogs.create_context_with(turn, accessor, telemetry).await?;
    let turn_result = continue_or_begin(&mut dc, dialog.id()).await?;
    dc.save_dialog_state(accessor).await?;

    let (turn, _) = dc.into_parts();
    Ok((turn, turn_result))
}

async fn continue_or_begin(
    dc: &mut DialogContext,
    dialog_id: &str,
) -> DialogResult<DialogTurnResult> {
    if dc.context().activity().activity_type == ActivityType::EndOfConversation {
        debug!("End of conversation, cancelling all dialogs");
        return dc.cancel_all_dialogs().await;
    }

    let turn_result = dc.continue_dialog().await?;
    if turn_result.status == DialogTurnStatus::Empty {
        return dc.begin_dialog(dialog_id, None).await;
    }
    Ok(turn_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::{WaterfallDialog, WaterfallStep};
    use crate::storage::InMemoryStorage;
    use crate::turn::Activity;
    use serde_json::json;

    fn echo_twice() -> WaterfallDialog {
        WaterfallDialog::new(
            "root",
            vec![
                WaterfallStep::new(|step| {
                    Box::pin(async move {
                        step.context_mut().send_activity("first");
                        Ok(DialogTurnResult::end_of_turn())
                    })
                }),
                WaterfallStep::new(|step| {
                    Box::pin(async move {
                        step.context_mut().send_activity("second");
                        let text = step.result().cloned();
                        step.end_dialog(text).await
                    })
                }),
            ],
        )
        .unwrap()
    }

    fn replies(result: &DialogManagerResult) -> Vec<String> {
        result
            .turn
            .responses()
            .iter()
            .filter_map(|activity| activity.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_on_turn_persists_stack_between_turns() {
        let storage = Arc::new(InMemoryStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let manager = DialogManager::new(echo_twice(), conversation).unwrap();

        let first = manager.on_turn(TurnContext::new(Activity::message("hi"))).await.unwrap();
        assert_eq!(replies(&first), vec!["first"]);
        assert!(first.turn_result.is_waiting());
        assert!(first.failures.is_empty());
        assert_eq!(storage.len(), 1);

        let second = manager.on_turn(TurnContext::new(Activity::message("bye"))).await.unwrap();
        assert_eq!(replies(&second), vec!["second"]);
        assert_eq!(second.turn_result.status, DialogTurnStatus::Complete);
        assert_eq!(second.turn_result.result, Some(json!("bye")));

        // The stack is empty again, so the next turn starts over
        let third = manager.on_turn(TurnContext::new(Activity::message("again"))).await.unwrap();
        assert_eq!(replies(&third), vec!["first"]);
    }

    #[tokio::test]
    async fn test_end_of_conversation_cancels_dialogs() {
        let storage = Arc::new(InMemoryStorage::new());
        let conversation = Arc::new(BotState::conversation(storage));
        let manager = DialogManager::new(echo_twice(), conversation).unwrap();

        manager.on_turn(TurnContext::new(Activity::message("hi"))).await.unwrap();

        let mut end = Activity::message("");
        end.activity_type = ActivityType::EndOfConversation;
        let result = manager.on_turn(TurnContext::new(end)).await.unwrap();
        assert_eq!(result.turn_result.status, DialogTurnStatus::Cancelled);
        assert!(replies(&result).is_empty());

        let next = manager.on_turn(TurnContext::new(Activity::message("hello"))).await.unwrap();
        assert_eq!(replies(&next), vec!["first"]);
    }

    #[tokio::test]
    async fn test_expired_conversation_restarts() {
        let storage = Arc::new(InMemoryStorage::new());
        let conversation = Arc::new(BotState::conversation(storage));
        let manager = DialogManager::new(echo_twice(), conversation)
            .unwrap()
            .with_expire_after(Duration::ZERO);

        manager.on_turn(TurnContext::new(Activity::message("hi"))).await.unwrap();
        let result = manager.on_turn(TurnContext::new(Activity::message("hi"))).await.unwrap();

        assert_eq!(replies(&result), vec!["first"]);
        assert!(result.turn_result.is_waiting());
    }

    #[tokio::test]
    async fn test_run_dialog_writes_through_accessor() {
        let storage = Arc::new(InMemoryStorage::new());
        let conversation = Arc::new(BotState::conversation(storage));
        let accessor = conversation.create_property::<DialogState>("stack");
        let dialog: Arc<dyn Dialog> = Arc::new(echo_twice());

        let (mut turn, result) = run_dialog(
            Arc::clone(&dialog),
            TurnContext::new(Activity::message("hi")),
            &accessor,
            Arc::new(NullTelemetryClient),
        )
        .await
        .unwrap();

        assert!(result.is_waiting());
        let state = accessor.try_get(&mut turn).await.unwrap().unwrap();
        assert_eq!(state.dialog_stack.len(), 1);
        assert_eq!(state.dialog_stack[0].id, "root");
    }
}
