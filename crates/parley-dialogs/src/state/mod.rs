//! # Bot State
//!
//! Conversation and user state persisted through [`Storage`](crate::storage::Storage)
//! and cached in the turn state for the length of a turn.
//!
//! ```rust,no_run
//! use parley_dialogs::state::BotState;
//! use parley_dialogs::storage::InMemoryStorage;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(InMemoryStorage::new());
//! let conversation = Arc::new(BotState::conversation(storage));
//! let counter = conversation.create_property::<u64>("counter");
//! # let _ = counter;
//! ```

pub mod accessor;
pub mod bot_state;

pub use accessor::StatePropertyAccessor;
pub use bot_state::{BotState, BotStateKind, CachedBotState};
