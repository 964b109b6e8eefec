//! `settings` - read-only application settings

use super::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use crate::settings::Settings;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Exposes the [`Settings`] registered for the turn; empty when none are
#[derive(Debug, Default, Clone, Copy)]
pub struct SettingsMemoryScope;

#[async_trait]
impl MemoryScope for SettingsMemoryScope {
    fn name(&self) -> &str {
        scope_path::SETTINGS
    }

    fn include_in_snapshot(&self) -> bool {
        false
    }

    fn get_memory(&self, dc: &DialogContext) -> Option<Value> {
        let value = Settings::registered(dc.context())
            .map(|settings| settings.to_value())
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some(value)
    }
}
