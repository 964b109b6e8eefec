//! # Dialog Memory
//!
//! Path-addressed access to every piece of state a dialog can see. A path
//! such as `conversation.profile.name` starts with a scope name; the rest
//! walks into that scope's JSON memory. Short aliases (`$name`, `#intent`,
//! `@entity`, `%property`) are expanded by path resolvers before lookup.
//!
//! ```rust,no_run
//! # async fn example(dc: &mut parley_dialogs::dialogs::DialogContext) -> parley_dialogs::DialogResult<()> {
//! let mut state = dc.state();
//! state.set_value("$count", &3)?;
//! let count: i64 = state.get_value("dialog.count", 0)?;
//! assert_eq!(count, 3);
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod manager;
pub mod object_path;
pub mod path_resolvers;
pub mod scopes;

pub use configuration::{
    ComponentRegistration, DialogStateManagerConfiguration, DialogsComponentRegistration,
};
pub use manager::DialogStateManager;
pub use object_path::PathSegment;
pub use path_resolvers::{AliasPathResolver, AtPathResolver, PathResolver};
pub use scopes::{scope_path, MemoryScope};
