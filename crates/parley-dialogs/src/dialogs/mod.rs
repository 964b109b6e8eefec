//! # Dialogs
//!
//! The dialog stack and the dialogs that run on it.
//!
//! - [`Dialog`] - the trait every dialog implements
//! - [`DialogSet`] - dialogs addressable by id
//! - [`DialogContext`] - the live stack for one turn
//! - [`WaterfallDialog`] - ordered steps, one per turn
//! - [`ComponentDialog`] - a dialog with its own inner stack
//! - [`DialogManager`] - runs a root dialog turn after turn

pub mod component;
pub mod context;
pub mod dialog;
pub mod instance;
pub mod manager;
pub mod set;
pub mod step_context;
pub mod waterfall;

pub use component::ComponentDialog;
pub use context::DialogContext;
pub use dialog::{
    dialog_events, Dialog, DialogEvent, DialogReason, DialogTurnResult, DialogTurnStatus,
};
pub use instance::{DialogInstance, DialogState};
pub use manager::{run_dialog, DialogManager, DialogManagerResult};
pub use set::DialogSet;
pub use step_context::WaterfallStepContext;
pub use waterfall::{StepFuture, WaterfallDialog, WaterfallStep};
