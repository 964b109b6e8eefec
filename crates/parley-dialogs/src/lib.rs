//! # Parley Dialogs - Resumable Multi-Turn Dialogs for Rust
//!
//! **Parley Dialogs** runs conversations that span many turns:
//!
//! - **Dialog Stack**: dialogs call other dialogs and resume when they return
//! - **Waterfall Dialogs**: ordered steps, one per turn, with shared values
//! - **Component Dialogs**: reusable groups of dialogs with their own stack
//! - **Scoped Memory**: path-addressed state (`turn.*`, `dialog.*`,
//!   `conversation.*`, `user.*`, ...) with change tracking
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley_dialogs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let greet = WaterfallDialog::new(
//!         "greet",
//!         vec![
//!             WaterfallStep::new(|step| {
//!                 Box::pin(async move {
//!                     step.context_mut().send_activity("What's your name?");
//!                     Ok(DialogTurnResult::end_of_turn())
//!                 })
//!             }),
//!             WaterfallStep::new(|step| {
//!                 Box::pin(async move {
//!                     let name = step.result().cloned();
//!                     step.state().set_value("user.name", &name)?;
//!                     step.end_dialog(name).await
//!                 })
//!             }),
//!         ],
//!     )?;
//!
//!     let storage = Arc::new(InMemoryStorage::new());
//!     let manager = DialogManager::new(greet, Arc::new(BotState::conversation(storage.clone())))?
//!         .with_user_state(Arc::new(BotState::user(storage)));
//!
//!     let result = manager.on_turn(TurnContext::new(Activity::message("hi"))).await?;
//!     for reply in result.turn.responses() {
//!         println!("{}", reply.text.as_deref().unwrap_or_default());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   TurnContext ──► DialogManager ──► DialogContext ──► Dialog (waterfall, component, ...)
//!                        │                 │
//!                        ▼                 ▼
//!                   BotState ◄──── DialogStateManager ──► MemoryScopes / PathResolvers
//!                        │
//!                        ▼
//!                     Storage
//! ```

#![doc(html_root_url = "https://docs.rs/parley-dialogs/0.1.0")]

pub mod dialogs;
pub mod error;
pub mod memory;
pub mod settings;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod turn;

pub use error::{DialogError, DialogResult};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::dialogs::{
        run_dialog, ComponentDialog, Dialog, DialogContext, DialogEvent, DialogInstance,
        DialogManager, DialogManagerResult, DialogReason, DialogSet, DialogState,
        DialogTurnResult, DialogTurnStatus, WaterfallDialog, WaterfallStep, WaterfallStepContext,
    };
    pub use crate::error::{DialogError, DialogResult};
    pub use crate::memory::{
        DialogStateManager, DialogStateManagerConfiguration, MemoryScope, PathResolver,
    };
    pub use crate::settings::Settings;
    pub use crate::state::{BotState, StatePropertyAccessor};
    pub use crate::storage::{InMemoryStorage, Storage};
    pub use crate::telemetry::{BotTelemetryClient, NullTelemetryClient, TracingTelemetryClient};
    pub use crate::turn::{Activity, ActivityType, TurnContext};
}
