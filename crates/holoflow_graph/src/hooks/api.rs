//! Hook registration API for scheduler runs.
//!
//! The [`HooksAPI`] is a registry of observers keyed by [`EventKind`]. The
//! scheduler invokes every observer registered for an event's kind, in
//! registration order.
//!
//! # Multi-Kind Registration
//!
//! ```
//! use holoflow_graph::hooks::{EngineEvent, EventKind, HooksAPI};
//!
//! let hooks = HooksAPI::new();
//! hooks
//!     .register_observer(
//!         "tracker",
//!         [EventKind::NodeStart, EventKind::NodeComplete],
//!         |event: &EngineEvent| match event {
//!             EngineEvent::NodeStart { node_name, .. } => tracing::info!(%node_name, "start"),
//!             EngineEvent::NodeComplete { duration, .. } => tracing::info!(?duration, "done"),
//!             _ => {}
//!         },
//!     )
//!     .unwrap();
//! assert_eq!(hooks.hook_count(EventKind::NodeStart), 1);
//! ```

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::events::{EngineEvent, EventKind};

// ─────────────────────────────────────────────────────────────────────────────
// BoxedHook
// ─────────────────────────────────────────────────────────────────────────────

/// Type-erased hook that receives `&EngineEvent`.
pub struct BoxedHook {
    handler: Arc<dyn Fn(&EngineEvent) + Send + Sync>,
}

impl BoxedHook {
    /// Wraps a handler.
    #[must_use]
    pub fn new(handler: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Invokes the hook.
    pub fn invoke(&self, event: &EngineEvent) {
        (self.handler)(event);
    }
}

impl Clone for BoxedHook {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookRegistrationError
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during hook registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRegistrationError {
    /// A hook with this name already exists for the event kind.
    DuplicateName {
        /// The event kind where the duplicate was found.
        kind: EventKind,
        /// The duplicate hook name.
        name: String,
    },
}

impl fmt::Display for HookRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookRegistrationError::DuplicateName { kind, name } => {
                write!(f, "hook '{}' already registered for event '{}'", name, kind)
            }
        }
    }
}

impl core::error::Error for HookRegistrationError {}

// ─────────────────────────────────────────────────────────────────────────────
// HooksAPI
// ─────────────────────────────────────────────────────────────────────────────

/// Entry in the hook registry.
struct HookEntry {
    /// Human-readable name for debugging and logging.
    name: String,
    hook: BoxedHook,
}

/// API for registering and invoking scheduler hooks.
///
/// Uses interior mutability via [`RwLock`], so hooks can be registered
/// through a shared reference and invoked concurrently from worker threads.
#[derive(Default)]
pub struct HooksAPI {
    hooks: RwLock<HashMap<EventKind, Vec<HookEntry>>>,
}

impl HooksAPI {
    /// Creates a new empty hooks registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for one or more event kinds.
    ///
    /// When registered for more than one kind, the per-kind entry is named
    /// `name@Kind`.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if the name is already
    /// taken for one of the kinds. Kinds processed before the duplicate keep
    /// their registration.
    pub fn register_observer<F>(
        &self,
        name: impl Into<String>,
        kinds: impl IntoIterator<Item = EventKind>,
        hook: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let kinds: Vec<EventKind> = kinds.into_iter().collect();
        let name = name.into();
        let hook = BoxedHook::new(hook);

        for kind in &kinds {
            let hook_name = if kinds.len() > 1 {
                format!("{}@{}", name, kind)
            } else {
                name.clone()
            };
            self.register_boxed(*kind, hook_name, hook.clone())?;
        }
        Ok(self)
    }

    /// Registers an observer for every event kind.
    ///
    /// # Errors
    ///
    /// See [`HooksAPI::register_observer`].
    pub fn register_all<F>(&self, name: impl Into<String>, hook: F) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.register_observer(name, EventKind::ALL, hook)
    }

    /// Registers a pre-built [`BoxedHook`] for one event kind.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if the name is taken.
    pub fn register_boxed(
        &self,
        kind: EventKind,
        name: impl Into<String>,
        hook: BoxedHook,
    ) -> Result<(), HookRegistrationError> {
        let name = name.into();

        let mut hooks = self.hooks.write();
        let entries = hooks.entry(kind).or_default();

        if entries.iter().any(|entry| entry.name == name) {
            return Err(HookRegistrationError::DuplicateName { kind, name });
        }

        entries.push(HookEntry { name, hook });
        Ok(())
    }

    /// Invokes every hook registered for the event's kind.
    pub fn invoke(&self, event: &EngineEvent) {
        let hooks = self.hooks.read();

        if let Some(entries) = hooks.get(&event.kind()) {
            for entry in entries {
                entry.hook.invoke(event);
            }
        }
    }

    /// Returns the number of hooks registered for the kind.
    #[must_use]
    pub fn hook_count(&self, kind: EventKind) -> usize {
        let hooks = self.hooks.read();
        hooks.get(&kind).map_or(0, Vec::len)
    }

    /// Returns `true` if no hook is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().values().all(Vec::is_empty)
    }

    /// Checks if a hook with the given name exists for the kind.
    #[must_use]
    pub fn contains_hook(&self, kind: EventKind, name: &str) -> bool {
        let hooks = self.hooks.read();
        hooks
            .get(&kind)
            .is_some_and(|entries| entries.iter().any(|entry| entry.name == name))
    }
}

impl fmt::Debug for HooksAPI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut map = f.debug_map();
        for (kind, entries) in hooks.iter() {
            let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
            map.entry(kind, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start_event() -> EngineEvent {
        EngineEvent::NodeStart {
            node_id: NodeId::new(0),
            node_name: Arc::from("test"),
            execution: 0,
            worker: 0,
        }
    }

    #[test]
    fn register_increments_count() {
        let api = HooksAPI::new();
        assert!(api.is_empty());

        api.register_observer("test_hook", [EventKind::NodeStart], |_: &EngineEvent| {})
            .expect("registration should succeed");
        assert_eq!(api.hook_count(EventKind::NodeStart), 1);

        api.register_observer("another_hook", [EventKind::NodeStart], |_: &EngineEvent| {})
            .expect("registration should succeed");
        assert_eq!(api.hook_count(EventKind::NodeStart), 2);
        assert!(!api.is_empty());
    }

    #[test]
    fn invoke_calls_hooks() {
        let api = HooksAPI::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        api.register_observer("counting_hook", [EventKind::NodeStart], move |_: &EngineEvent| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("registration should succeed");

        api.invoke(&start_event());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        api.invoke(&EngineEvent::StopRequested { requested_by: None });
        assert_eq!(counter.load(Ordering::SeqCst), 1, "other kinds are not delivered");
    }

    #[test]
    fn invoke_calls_all_hooks_in_order() {
        let api = HooksAPI::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order_clone = Arc::clone(&order);
            api.register_observer(name, [EventKind::NodeStart], move |_: &EngineEvent| {
                order_clone.lock().push(name);
            })
            .expect("registration should succeed");
        }

        api.invoke(&start_event());
        assert_eq!(
            *order.lock(),
            vec!["first", "second", "third"],
            "hooks should execute in registration order"
        );
    }

    #[test]
    fn register_boxed_rejects_duplicate_names() {
        let api = HooksAPI::new();
        api.register_boxed(EventKind::NodeError, "my_hook", BoxedHook::new(|_| {}))
            .expect("first registration should succeed");

        let result = api.register_boxed(EventKind::NodeError, "my_hook", BoxedHook::new(|_| {}));
        assert_eq!(
            result,
            Err(HookRegistrationError::DuplicateName {
                kind: EventKind::NodeError,
                name: "my_hook".into(),
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "hook 'my_hook' already registered for event 'NodeError'"
        );
    }

    #[test]
    fn same_name_different_kinds_allowed() {
        let api = HooksAPI::new();
        api.register_observer("logger", [EventKind::NodeStart], |_: &EngineEvent| {})
            .unwrap();
        api.register_observer("logger", [EventKind::NodeComplete], |_: &EngineEvent| {})
            .unwrap();
        assert!(api.contains_hook(EventKind::NodeStart, "logger"));
        assert!(api.contains_hook(EventKind::NodeComplete, "logger"));
        assert!(!api.contains_hook(EventKind::NodeError, "logger"));
    }

    #[test]
    fn multi_kind_registration_suffixes_names() {
        let api = HooksAPI::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        api.register_observer(
            "tracker",
            [EventKind::RunStart, EventKind::StopRequested],
            move |event: &EngineEvent| seen_clone.lock().push(event.kind()),
        )
        .unwrap()
        .register_observer("other", [EventKind::RunStart], |_: &EngineEvent| {})
        .unwrap();

        assert!(api.contains_hook(EventKind::RunStart, "tracker@RunStart"));
        assert!(api.contains_hook(EventKind::StopRequested, "tracker@StopRequested"));

        api.invoke(&EngineEvent::RunStart {
            node_count: 1,
            worker_count: 1,
        });
        api.invoke(&EngineEvent::StopRequested { requested_by: None });
        assert_eq!(
            *seen.lock(),
            vec![EventKind::RunStart, EventKind::StopRequested]
        );
    }

    #[test]
    fn register_all_covers_every_kind() {
        let api = HooksAPI::new();
        api.register_all("everything", |_: &EngineEvent| {}).unwrap();
        for kind in EventKind::ALL {
            assert_eq!(api.hook_count(kind), 1);
        }
    }
}
