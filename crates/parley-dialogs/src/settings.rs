//! Read-only application settings exposed through the `settings` memory scope
//!
//! Settings come either from flattened `section:key` pairs or from the
//! `config` crate (an optional file layered under environment variables).

use crate::error::{DialogError, DialogResult};
use crate::turn::TurnContext;
use config::{Config, Environment, File};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Turn-state key the active settings are registered under
pub const SETTINGS_KEY: &str = "parley.settings";

/// Nested, read-only configuration tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Settings {
    /// Empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings from a JSON object
    pub fn from_value(value: Value) -> DialogResult<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(DialogError::invalid_argument(
                "settings",
                format!("expected an object, found {}", other),
            )),
        }
    }

    /// Settings from flattened pairs; `bot:name` becomes `{"bot": {"name": ..}}`
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut values = Map::new();
        for (key, value) in pairs {
            insert_flattened(&mut values, key.as_ref(), value.into());
        }
        Self { values }
    }

    /// Settings from an already built `config::Config`
    pub fn from_config(config: &Config) -> DialogResult<Self> {
        let value = config.clone().try_deserialize::<Value>()?;
        Self::from_value(value)
    }

    /// Load settings from an optional file, overridden by environment
    /// variables such as `{PREFIX}_BOT__NAME` for `bot.name`
    pub fn load(file: Option<&Path>, env_prefix: Option<&str>) -> DialogResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config = builder.build()?;
        let settings = Self::from_config(&config)?;
        tracing::debug!(
            file = ?file,
            env_prefix = ?env_prefix,
            sections = settings.values.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Look up a value by `a:b` or `a.b` path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(|c| c == ':' || c == '.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The settings tree
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The settings tree as a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Check if there are no settings
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Make these settings visible to the `settings` scope for the turn
    pub fn register(self: &Arc<Self>, turn: &mut TurnContext) {
        turn.turn_state_mut().insert(SETTINGS_KEY, Arc::clone(self));
    }

    /// The settings registered for the turn, if any
    pub fn registered(turn: &TurnContext) -> Option<Arc<Settings>> {
        turn.turn_state().get::<Arc<Settings>>(SETTINGS_KEY).cloned()
    }
}

fn insert_flattened(target: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once(':') {
        None => {
            target.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_flattened(child, rest, value);
            }
        }
    }
}
