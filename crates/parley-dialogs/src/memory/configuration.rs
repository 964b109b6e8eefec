//! Registry of memory scopes and path resolvers

use super::path_resolvers::{AliasPathResolver, AtPathResolver, PathResolver};
use super::scopes::{
    BotStateMemoryScope, ClassMemoryScope, DialogClassMemoryScope, DialogContextMemoryScope,
    DialogMemoryScope, MemoryScope, SettingsMemoryScope, ThisMemoryScope, TurnMemoryScope,
};
use crate::error::{DialogError, DialogResult};
use crate::turn::TurnContext;
use std::sync::Arc;

/// Turn-state key the active configuration is cached under
pub const CONFIGURATION_KEY: &str = "parley.dialog_state_manager.configuration";

/// A component contributing memory scopes and path resolvers
pub trait ComponentRegistration: Send + Sync {
    /// Scopes in registration order
    fn memory_scopes(&self) -> Vec<Arc<dyn MemoryScope>> {
        Vec::new()
    }

    /// Resolvers in registration order
    fn path_resolvers(&self) -> Vec<Arc<dyn PathResolver>> {
        Vec::new()
    }
}

/// Registers the built-in scopes and the `$ # @@ @ %` aliases
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogsComponentRegistration;

impl ComponentRegistration for DialogsComponentRegistration {
    fn memory_scopes(&self) -> Vec<Arc<dyn MemoryScope>> {
        vec![
            Arc::new(TurnMemoryScope),
            Arc::new(SettingsMemoryScope),
            Arc::new(DialogMemoryScope),
            Arc::new(DialogContextMemoryScope),
            Arc::new(DialogClassMemoryScope),
            Arc::new(ClassMemoryScope),
            Arc::new(ThisMemoryScope),
            Arc::new(BotStateMemoryScope::conversation()),
            Arc::new(BotStateMemoryScope::user()),
        ]
    }

    fn path_resolvers(&self) -> Vec<Arc<dyn PathResolver>> {
        vec![
            Arc::new(AliasPathResolver::dollar()),
            Arc::new(AliasPathResolver::hash()),
            Arc::new(AliasPathResolver::at_at()),
            Arc::new(AtPathResolver),
            Arc::new(AliasPathResolver::percent()),
        ]
    }
}

/// Ordered scopes and resolvers used by a
/// [`DialogStateManager`](super::DialogStateManager)
#[derive(Clone, Default)]
pub struct DialogStateManagerConfiguration {
    path_resolvers: Vec<Arc<dyn PathResolver>>,
    memory_scopes: Vec<Arc<dyn MemoryScope>>,
}

impl DialogStateManagerConfiguration {
    /// Configuration with no scopes or resolvers
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in scopes and resolvers
    pub fn builtin() -> Self {
        let registration = DialogsComponentRegistration;
        Self {
            path_resolvers: registration.path_resolvers(),
            memory_scopes: registration.memory_scopes(),
        }
    }

    /// Merge registrations in order; scope names must be unique
    pub fn from_registrations(
        registrations: &[&dyn ComponentRegistration],
    ) -> DialogResult<Self> {
        let mut config = Self::empty();
        for registration in registrations {
            for scope in registration.memory_scopes() {
                config.add_memory_scope(scope)?;
            }
            for resolver in registration.path_resolvers() {
                config.add_path_resolver(resolver);
            }
        }
        Ok(config)
    }

    /// Append a scope
    pub fn add_memory_scope(&mut self, scope: Arc<dyn MemoryScope>) -> DialogResult<()> {
        if self.find_scope(scope.name()).is_some() {
            return Err(DialogError::invalid_argument(
                "memory_scopes",
                format!("a memory scope named '{}' is already registered", scope.name()),
            ));
        }
        self.memory_scopes.push(scope);
        Ok(())
    }

    /// Append a resolver
    pub fn add_path_resolver(&mut self, resolver: Arc<dyn PathResolver>) {
        self.path_resolvers.push(resolver);
    }

    /// Builder form of [`add_memory_scope`](Self::add_memory_scope)
    pub fn with_memory_scope(mut self, scope: Arc<dyn MemoryScope>) -> DialogResult<Self> {
        self.add_memory_scope(scope)?;
        Ok(self)
    }

    /// Builder form of [`add_path_resolver`](Self::add_path_resolver)
    pub fn with_path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.add_path_resolver(resolver);
        self
    }

    /// Scopes in registration order
    pub fn memory_scopes(&self) -> &[Arc<dyn MemoryScope>] {
        &self.memory_scopes
    }

    /// Resolvers in registration order
    pub fn path_resolvers(&self) -> &[Arc<dyn PathResolver>] {
        &self.path_resolvers
    }

    /// Find a scope by name, ignoring ASCII case
    pub fn find_scope(&self, name: &str) -> Option<&Arc<dyn MemoryScope>> {
        self.memory_scopes
            .iter()
            .find(|scope| scope.name().eq_ignore_ascii_case(name))
    }

    /// Names of every scope
    pub fn scope_names(&self) -> Vec<String> {
        self.memory_scopes
            .iter()
            .map(|scope| scope.name().to_string())
            .collect()
    }

    /// Cache this configuration for the turn
    pub fn register(self: &Arc<Self>, turn: &mut TurnContext) {
        turn.turn_state_mut()
            .insert(CONFIGURATION_KEY, Arc::clone(self));
    }

    /// The configuration cached for the turn, creating the built-in one on first use
    pub fn for_turn(turn: &mut TurnContext) -> Arc<Self> {
        turn.turn_state_mut()
            .get_or_insert_with(CONFIGURATION_KEY, || Arc::new(Self::builtin()))
            .clone()
    }
}

impl std::fmt::Debug for DialogStateManagerConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogStateManagerConfiguration")
            .field("memory_scopes", &self.scope_names())
            .field("path_resolvers", &self.path_resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Activity;

    #[test]
    fn test_builtin_scope_order() {
        let config = DialogStateManagerConfiguration::builtin();
        assert_eq!(
            config.scope_names(),
            vec![
                "turn",
                "settings",
                "dialog",
                "dialogcontext",
                "dialogclass",
                "class",
                "this",
                "conversation",
                "user"
            ]
        );
        assert_eq!(config.path_resolvers().len(), 5);
        assert!(config.find_scope("CONVERSATION").is_some());
    }

    #[test]
    fn test_duplicate_scope_names_rejected() {
        let builtin = DialogsComponentRegistration;
        let err = DialogStateManagerConfiguration::from_registrations(&[&builtin, &builtin])
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = DialogStateManagerConfiguration::builtin()
            .with_memory_scope(Arc::new(TurnMemoryScope))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_configuration_is_cached_per_turn() {
        let mut turn = TurnContext::new(Activity::message("hi"));

        let first = DialogStateManagerConfiguration::for_turn(&mut turn);
        let second = DialogStateManagerConfiguration::for_turn(&mut turn);
        assert!(Arc::ptr_eq(&first, &second));

        let custom = Arc::new(DialogStateManagerConfiguration::empty());
        custom.register(&mut turn);
        let third = DialogStateManagerConfiguration::for_turn(&mut turn);
        assert!(Arc::ptr_eq(&custom, &third));
    }
}
