//! Dialog state manager - path-addressed access across every memory scope
//!
//! Paths look like `conversation.profile.name` or `$count`. The manager
//! expands aliases, resolves the leading scope name, and then reads or
//! writes inside that scope's memory. Reads always return copies.
//!
//! Writes also feed change tracking: paths registered with
//! [`track_paths`](DialogStateManager::track_paths) get a version stamp under
//! `dialog._tracker.paths` whenever they (or anything below them) change.

use super::configuration::DialogStateManagerConfiguration;
use super::object_path::{self, PathSegment};
use super::scopes::{scope_path, MemoryScope};
use crate::dialogs::DialogContext;
use crate::error::{DialogError, DialogResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turn-state key of the turn-local change version
pub const VERSION_KEY: &str = "dialogStateManager.version";

/// Reserved subtree of the `dialog` scope holding change stamps
pub const PATH_TRACKER: &str = "_tracker.paths";

const FIRST_SUFFIX: &str = ".FIRST()";

/// Path-addressed view over the memory scopes of a dialog context
pub struct DialogStateManager<'a> {
    dc: &'a mut DialogContext,
    config: Arc<DialogStateManagerConfiguration>,
}

impl<'a> DialogStateManager<'a> {
    /// Create a manager using the configuration cached for the turn
    pub fn new(dc: &'a mut DialogContext) -> Self {
        let config = DialogStateManagerConfiguration::for_turn(dc.context_mut());
        Self { dc, config }
    }

    /// Create a manager with an explicit configuration
    pub fn with_configuration(
        dc: &'a mut DialogContext,
        config: Arc<DialogStateManagerConfiguration>,
    ) -> Self {
        Self { dc, config }
    }

    /// The configuration in use
    pub fn configuration(&self) -> &Arc<DialogStateManagerConfiguration> {
        &self.config
    }

    /// Current turn-local change version
    pub fn version(&self) -> u64 {
        self.dc
            .context()
            .turn_state()
            .get::<u64>(VERSION_KEY)
            .copied()
            .unwrap_or(0)
    }

    fn next_version(&mut self) -> u64 {
        let version = self
            .dc
            .context_mut()
            .turn_state_mut()
            .get_or_insert_with(VERSION_KEY, || 0u64);
        *version += 1;
        *version
    }

    /// Apply every path resolver in registration order
    pub fn transform_path(&self, path: &str) -> String {
        self.config
            .path_resolvers()
            .iter()
            .fold(path.trim().to_string(), |path, resolver| {
                resolver.transform_path(&path)
            })
    }

    /// Split a path into its scope and the path inside that scope.
    ///
    /// A leading `.` of the remainder is dropped; a leading `[` is kept.
    pub fn resolve_memory_scope(
        &self,
        path: &str,
    ) -> DialogResult<(Arc<dyn MemoryScope>, String)> {
        let path = self.transform_path(path);
        let (name, remaining) = match path.find(|c| c == '.' || c == '[') {
            Some(index) => {
                let (name, rest) = path.split_at(index);
                (name, rest.strip_prefix('.').unwrap_or(rest))
            }
            None => (path.as_str(), ""),
        };

        match self.config.find_scope(name) {
            Some(scope) => Ok((Arc::clone(scope), remaining.to_string())),
            None => Err(DialogError::ScopeNotFound {
                scope: name.to_string(),
                valid: self.config.scope_names(),
            }),
        }
    }

    fn parse(&self, remaining: &str) -> DialogResult<Vec<PathSegment>> {
        object_path::parse_path(remaining, |expr| self.get_raw(expr))
    }

    /// Raw lookup without deserialization
    fn get_raw(&self, path: &str) -> DialogResult<Option<Value>> {
        let path = self.transform_path(path);

        if let Some(index) = path.to_ascii_uppercase().rfind(FIRST_SUFFIX) {
            let prefix = &path[..index];
            let rest = &path[index + FIRST_SUFFIX.len()..];

            let Some(first) = self.get_raw(prefix)?.and_then(first_nested) else {
                return Ok(None);
            };
            if rest.is_empty() {
                return Ok(Some(first));
            }
            let segments = self.parse(rest)?;
            return Ok(object_path::get_path_value(&first, &segments).cloned());
        }

        let (scope, remaining) = self.resolve_memory_scope(&path)?;
        let Some(memory) = scope.get_memory(&*self.dc) else {
            return Ok(None);
        };
        if remaining.is_empty() {
            return Ok(Some(memory));
        }

        let segments = self.parse(&remaining)?;
        Ok(object_path::get_path_value(&memory, &segments).cloned())
    }

    /// Read a copy of the value at `path`.
    ///
    /// Missing values and values of another shape yield `None`; unknown
    /// scopes and malformed paths are errors.
    pub fn try_get_value<T: DeserializeOwned>(&self, path: &str) -> DialogResult<Option<T>> {
        let Some(value) = self.get_raw(path)? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(err) => {
                debug!(path, error = %err, "Value does not match the requested type");
                Ok(None)
            }
        }
    }

    /// Read the value at `path`, or `default` when it is missing
    pub fn get_value<T: DeserializeOwned>(&self, path: &str, default: T) -> DialogResult<T> {
        Ok(self.try_get_value(path)?.unwrap_or(default))
    }

    /// Write `value` at `path` and record the change.
    ///
    /// The write happens first; the turn version is bumped and tracked paths
    /// are stamped only once it succeeded, so a rejected write (read-only
    /// scope, malformed path) leaves the version untouched.
    pub fn set_value<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> DialogResult<()> {
        let value = serde_json::to_value(value)?;
        let path = self.transform_path(path);
        let (scope, remaining) = self.resolve_memory_scope(&path)?;

        if remaining.is_empty() {
            scope.set_memory(&mut *self.dc, value.clone())?;
        } else {
            let segments = self.parse(&remaining)?;
            let memory = scope.memory_mut(&mut *self.dc)?;
            object_path::set_path_value(memory, &segments, value.clone())?;
        }

        self.track_change(&path, Some(&value))?;
        Ok(())
    }

    /// Remove the value at `path` and record the change
    pub fn remove_value(&mut self, path: &str) -> DialogResult<()> {
        let path = self.transform_path(path);
        let (scope, remaining) = self.resolve_memory_scope(&path)?;

        if remaining.is_empty() {
            return Err(DialogError::unsupported(format!(
                "the '{}' scope itself cannot be removed",
                scope.name()
            )));
        }

        let segments = self.parse(&remaining)?;
        let memory = scope.memory_mut(&mut *self.dc)?;
        object_path::remove_path_value(memory, &segments);

        self.track_change(&path, None)?;
        Ok(())
    }

    /// Resolve a path to its scope name plus concrete segment names
    fn segment_names(&self, path: &str) -> DialogResult<Vec<String>> {
        let (scope, remaining) = self.resolve_memory_scope(path)?;
        let mut names = vec![scope.name().to_string()];
        names.extend(
            self.parse(&remaining)?
                .iter()
                .map(PathSegment::to_string),
        );
        Ok(names)
    }

    /// Register paths for change tracking; returns the names to pass to
    /// [`any_path_changed`](Self::any_path_changed)
    pub fn track_paths<I, S>(&mut self, paths: I) -> DialogResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();
        for path in paths {
            let path = self.transform_path(path.as_ref());
            let name = self.segment_names(&path)?.join("_").to_lowercase();
            self.write_tracker(&name, 0)?;
            names.push(name);
        }
        Ok(names)
    }

    /// Whether any tracked path changed after `watermark`
    pub fn any_path_changed(&self, watermark: u64, names: &[String]) -> DialogResult<bool> {
        let Some(memory) = self
            .config
            .find_scope(scope_path::DIALOG)
            .and_then(|scope| scope.get_memory(&*self.dc))
        else {
            return Ok(false);
        };

        // Names may contain '.', '[' or ']' from quoted keys, so look them up
        // as single segments instead of re-parsing a path
        for name in names {
            let segments = [
                PathSegment::Key("_tracker".to_string()),
                PathSegment::Key("paths".to_string()),
                PathSegment::Key(name.clone()),
            ];
            let stamp = object_path::get_path_value(&memory, &segments).and_then(Value::as_u64);
            if stamp.map_or(false, |stamp| stamp > watermark) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn tracker_paths(&self) -> Option<Map<String, Value>> {
        let value = self.get_raw(&format!("{}.{}", scope_path::DIALOG, PATH_TRACKER)).ok()??;
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn write_tracker(&mut self, name: &str, stamp: u64) -> DialogResult<()> {
        let Some(scope) = self.config.find_scope(scope_path::DIALOG).cloned() else {
            return Err(DialogError::invalid_state(
                "change tracking needs a 'dialog' memory scope",
            ));
        };
        let memory = scope.memory_mut(&mut *self.dc)?;
        let segments = [
            PathSegment::Key("_tracker".to_string()),
            PathSegment::Key("paths".to_string()),
            PathSegment::Key(name.to_string()),
        ];
        object_path::set_path_value(memory, &segments, Value::from(stamp))
    }

    /// Bump the version and stamp every tracked path the change touches
    fn track_change(&mut self, path: &str, value: Option<&Value>) -> DialogResult<()> {
        let version = self.next_version();

        let names = self.segment_names(path)?;
        if names.get(1).map_or(false, |segment| segment.starts_with('_')) {
            return Ok(());
        }

        // Nothing to stamp when no dialog is active or nothing is tracked
        let Some(tracked) = self.tracker_paths() else {
            return Ok(());
        };

        let base = names.join("_").to_lowercase();
        let mut touched = Vec::new();
        if tracked.contains_key(&base) {
            touched.push(base.clone());
        }
        if let Some(Value::Object(children)) = value {
            collect_tracked_children(&base, children, &tracked, &mut touched);
        }

        for name in touched {
            self.write_tracker(&name, version)?;
        }
        Ok(())
    }

    /// `{scope: memory}` for every scope included in snapshots
    pub fn get_memory_snapshot(&self) -> Value {
        let snapshot: Map<String, Value> = self
            .config
            .memory_scopes()
            .iter()
            .filter(|scope| scope.include_in_snapshot())
            .filter_map(|scope| {
                scope
                    .get_memory(&*self.dc)
                    .map(|memory| (scope.name().to_string(), memory))
            })
            .collect();
        Value::Object(snapshot)
    }

    /// Load every scope; failures are logged, skipped, and returned
    pub async fn load_all_scopes(&mut self) -> Vec<DialogError> {
        let mut failures = Vec::new();
        for scope in self.config.memory_scopes().to_vec() {
            if let Err(err) = scope.load(&mut *self.dc, false).await {
                warn!(scope = scope.name(), error = %err, "Failed to load memory scope");
                failures.push(err);
            }
        }
        failures
    }

    /// Save every scope; failures are logged, skipped, and returned
    pub async fn save_all_changes(&mut self) -> Vec<DialogError> {
        let mut failures = Vec::new();
        for scope in self.config.memory_scopes().to_vec() {
            if let Err(err) = scope.save_changes(&mut *self.dc, false).await {
                warn!(scope = scope.name(), error = %err, "Failed to save memory scope");
                failures.push(err);
            }
        }
        failures
    }

    /// Delete the backing memory of the scope called `name`
    pub async fn delete_scopes_memory(&mut self, name: &str) -> Vec<DialogError> {
        let mut failures = Vec::new();
        let Some(scope) = self.config.find_scope(name).cloned() else {
            debug!(scope = name, "No memory scope to delete");
            return failures;
        };

        if let Err(err) = scope.delete(&mut *self.dc).await {
            warn!(scope = scope.name(), error = %err, "Failed to delete memory scope");
            failures.push(err);
        }
        failures
    }

    /// Scope names
    pub fn keys(&self) -> Vec<String> {
        self.config.scope_names()
    }

    /// Whether a scope called `name` exists
    pub fn contains_key(&self, name: &str) -> bool {
        self.config.find_scope(name).is_some()
    }

    /// Scopes cannot be removed through the manager
    pub fn remove(&mut self, key: &str) -> DialogResult<()> {
        Err(DialogError::unsupported(format!(
            "memory scope '{}' cannot be removed",
            key
        )))
    }

    /// Scopes cannot be cleared through the manager
    pub fn clear(&mut self) -> DialogResult<()> {
        Err(DialogError::unsupported("memory scopes cannot be cleared"))
    }
}

/// First element of a sequence, or of its first element when that is a sequence too
fn first_nested(value: Value) -> Option<Value> {
    let Value::Array(items) = value else {
        return None;
    };
    match items.into_iter().next()? {
        Value::Array(inner) => inner.into_iter().next(),
        first => Some(first),
    }
}

fn collect_tracked_children(
    base: &str,
    children: &Map<String, Value>,
    tracked: &Map<String, Value>,
    touched: &mut Vec<String>,
) {
    for (key, child) in children {
        let path = format!("{}_{}", base, key.to_lowercase());
        if tracked.contains_key(&path) {
            touched.push(path.clone());
        }
        if let Value::Object(grandchildren) = child {
            collect_tracked_children(&path, grandchildren, tracked, touched);
        }
    }
}
