//! Action registry — central index of registered action handlers.
//!
//! The [`ActionRegistry`] maps action names to their [`ActionHandler`]
//! implementations. It is explicitly constructed and injected into the
//! engine (never a process-wide singleton); its lifecycle ends with the
//! engine that owns it. The registry doubles as the engine's default
//! [`ActionCatalog`] and [`ActionExecutor`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use kestrel_control::ControlToken;
use kestrel_core::calls::{ActionCall, ActionOutcome, failure_outcome, success_outcome};

use crate::errors::CollaboratorError;
use crate::traits::{ActionCatalog, ActionExecutor, ActionHandler, ActionSpec};

/// Source of handlers for [`ActionRegistry::reload`].
pub type HandlerLoader = dyn Fn() -> Vec<Arc<dyn ActionHandler>> + Send + Sync;

/// Central registry mapping action names to their implementations.
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    loader: Mutex<Option<Box<HandlerLoader>>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            loader: Mutex::new(None),
        }
    }

    /// Register a handler. Overwrites any existing handler with the same name.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) {
        debug!(action_name = handler.name(), "action registered");
        let _ = self
            .handlers
            .write()
            .insert(handler.name().to_owned(), handler);
    }

    /// Look up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(name).cloned()
    }

    /// Remove a handler by name, returning it if it existed.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.write().remove(name)
    }

    /// Whether a handler with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Return all action specs, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<ActionSpec> {
        let mut specs: Vec<ActionSpec> = self
            .handlers
            .read()
            .values()
            .map(|h| h.spec())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Return all action names, sorted alphabetically.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Set the loader used by [`reload`](Self::reload).
    pub fn set_loader(&self, loader: Box<HandlerLoader>) {
        *self.loader.lock() = Some(loader);
    }

    /// Replace the registered handlers from the loader.
    ///
    /// Returns the new handler count, or `None` when no loader is set.
    pub fn reload(&self) -> Option<usize> {
        let handlers = {
            let loader = self.loader.lock();
            loader.as_ref().map(|load| load())
        }?;

        let mut map = HashMap::with_capacity(handlers.len());
        for handler in handlers {
            let _ = map.insert(handler.name().to_owned(), handler);
        }
        let count = map.len();
        *self.handlers.write() = map;
        debug!(count, "action registry reloaded");
        Some(count)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("handler_count", &self.len())
            .field("has_loader", &self.loader.lock().is_some())
            .finish()
    }
}

#[async_trait]
impl ActionCatalog for ActionRegistry {
    async fn available_actions(
        &self,
        token: &ControlToken,
    ) -> Result<Vec<ActionSpec>, CollaboratorError> {
        if token.is_cancelled() {
            return Err(CollaboratorError::Cancelled);
        }
        Ok(self.specs())
    }
}

#[async_trait]
impl ActionExecutor for ActionRegistry {
    async fn execute(&self, call: &ActionCall, token: &ControlToken) -> ActionOutcome {
        let start = Instant::now();

        let Some(handler) = self.get(&call.name) else {
            return failure_outcome(
                call.id.clone(),
                format!("Action not found: {}", call.name),
                elapsed_ms(start),
            );
        };

        if token.is_cancelled() {
            return failure_outcome(call.id.clone(), "Operation cancelled", elapsed_ms(start));
        }

        match handler.run(call, token).await {
            Ok(content) => success_outcome(call.id.clone(), content, elapsed_ms(start)),
            Err(e) => failure_outcome(call.id.clone(), e.to_string(), elapsed_ms(start)),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
