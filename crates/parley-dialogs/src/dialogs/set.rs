//! A registry of dialogs addressable by id

use super::context::DialogContext;
use super::dialog::Dialog;
use super::instance::DialogState;
use crate::error::{DialogError, DialogResult};
use crate::state::StatePropertyAccessor;
use crate::telemetry::BotTelemetryClient;
use crate::turn::TurnContext;
use std::collections::HashMap;
use std::sync::Arc;

/// Dialogs that can be started from one dialog context
#[derive(Clone, Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
    order: Vec<String>,
}

impl DialogSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog; ids must be unique and non-empty
    pub fn add<D: Dialog + 'static>(&mut self, dialog: D) -> DialogResult<()> {
        self.add_arc(Arc::new(dialog))
    }

    /// Register a shared dialog
    pub fn add_arc(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<()> {
        let id = dialog.id().to_string();
        if id.is_empty() {
            return Err(DialogError::invalid_argument(
                "dialog.id",
                "dialog id must not be empty",
            ));
        }
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::invalid_argument(
                "dialog.id",
                format!("a dialog with id '{}' is already registered", id),
            ));
        }

        self.order.push(id.clone());
        self.dialogs.insert(id, dialog);
        Ok(())
    }

    /// Builder form of [`add`](Self::add)
    pub fn with_dialog<D: Dialog + 'static>(mut self, dialog: D) -> DialogResult<Self> {
        self.add(dialog)?;
        Ok(self)
    }

    /// Look up a dialog by id
    pub fn find(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        self.dialogs.get(id).cloned()
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Number of dialogs
    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Build a dialog context over the stack stored behind `accessor`
    pub async fn create_context(
        self: &Arc<Self>,
        mut turn: TurnContext,
        accessor: &StatePropertyAccessor<DialogState>,
    ) -> DialogResult<DialogContext> {
        let state = accessor.get(&mut turn, DialogState::default).await?;
        Ok(DialogContext::new(Arc::clone(self), turn, state))
    }

    /// Build a dialog context that reports to `telemetry`
    pub async fn create_context_with(
        self: &Arc<Self>,
        turn: TurnContext,
        accessor: &StatePropertyAccessor<DialogState>,
        telemetry: Arc<dyn BotTelemetryClient>,
    ) -> DialogResult<DialogContext> {
        Ok(self
            .create_context(turn, accessor)
            .await?
            .with_telemetry(telemetry))
    }
}

impl std::fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSet").field("ids", &self.order).finish()
    }
}
