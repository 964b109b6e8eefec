//! # Parley - Multi-Turn Conversations for Rust
//!
//! **Parley** brings together:
//!
//! - **Parley Dialogs**: a resumable dialog stack with waterfall and
//!   component dialogs
//! - **Scoped Memory**: `turn`, `dialog`, `conversation`, `user` and more,
//!   addressed by path and persisted through pluggable storage
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hello = WaterfallDialog::new(
//!         "hello",
//!         vec![WaterfallStep::new(|step| {
//!             Box::pin(async move {
//!                 step.context_mut().send_activity("Hello!");
//!                 step.end_dialog(None).await
//!             })
//!         })],
//!     )?;
//!
//!     let storage = Arc::new(InMemoryStorage::new());
//!     let manager = DialogManager::new(hello, Arc::new(BotState::conversation(storage)))?;
//!     let result = manager.on_turn(TurnContext::new(Activity::message("hi"))).await?;
//!     println!("{:?}", result.turn_result.status);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! The `dialogs` feature (on by default) re-exports `parley-dialogs` as
//! [`dialogs`].
//!
//! ```toml
//! [dependencies]
//! parley = { version = "0.1", features = ["full"] }
//! ```

#![doc(html_root_url = "https://docs.rs/parley/0.1.0")]
#![warn(missing_docs)]

// Re-export sub-crates
#[cfg(feature = "dialogs")]
pub use parley_dialogs as dialogs;

/// Commonly used types and traits
pub mod prelude {
    #[cfg(feature = "dialogs")]
    pub use crate::dialogs::prelude::*;
}
