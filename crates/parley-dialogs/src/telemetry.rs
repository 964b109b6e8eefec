//! Telemetry observer handed to the dialog stack

use std::collections::HashMap;

/// Receives named events from dialogs (`WaterfallStart`, `WaterfallStep`, ...)
pub trait BotTelemetryClient: Send + Sync {
    /// Record an event with string properties
    fn track_event(&self, name: &str, properties: &HashMap<String, String>);

    /// Flush buffered events, if the sink buffers
    fn flush(&self) {}
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetryClient;

impl BotTelemetryClient for NullTelemetryClient {
    fn track_event(&self, _name: &str, _properties: &HashMap<String, String>) {}
}

/// Forwards events to `tracing` at info level under the `parley::telemetry` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetryClient;

impl BotTelemetryClient for TracingTelemetryClient {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        tracing::info!(
            target: "parley::telemetry",
            event = name,
            properties = ?properties,
            "Telemetry event"
        );
    }
}
