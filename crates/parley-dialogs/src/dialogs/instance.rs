//! Persisted stack frames

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One frame of the dialog stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    /// Id of the registered dialog definition
    pub id: String,

    /// The dialog's private scratch memory
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl DialogInstance {
    /// Create a frame with empty state
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Map::new(),
        }
    }
}

/// The persisted dialog stack of one conversation.
///
/// Index 0 is the bottom (oldest) frame; the last element is the active one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogState {
    /// Stack frames, bottom first
    #[serde(default)]
    pub dialog_stack: Vec<DialogInstance>,
}

impl DialogState {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from frames, bottom first
    pub fn with_stack(dialog_stack: Vec<DialogInstance>) -> Self {
        Self { dialog_stack }
    }

    /// Check if no dialog is active
    pub fn is_empty(&self) -> bool {
        self.dialog_stack.is_empty()
    }

    /// The active frame
    pub fn active(&self) -> Option<&DialogInstance> {
        self.dialog_stack.last()
    }

    /// Read a nested stack persisted in a container's state
    pub fn from_instance_state(state: &Map<String, Value>, key: &str) -> Self {
        state
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persisted_shape() {
        let mut instance = DialogInstance::new("main");
        instance.state.insert("stepIndex".to_string(), json!(1));
        let state = DialogState::with_stack(vec![instance]);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({"dialogStack": [{"id": "main", "state": {"stepIndex": 1}}]})
        );

        let back: DialogState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.active().map(|i| i.id.as_str()), Some("main"));
    }

    #[test]
    fn test_missing_fields_default() {
        let state: DialogState = serde_json::from_value(json!({})).unwrap();
        assert!(state.is_empty());

        let instance: DialogInstance = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert!(instance.state.is_empty());
    }
}
