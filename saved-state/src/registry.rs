//! Saved state registry: hands restored snapshots to containers and collects
//! their next snapshots at save time.

use std::{
    fmt,
    ops::ControlFlow,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use rustc_hash::FxHashMap;

use crate::{
    base::{RECREATOR_KEY, debug, trace},
    bundle::{Bundle, Value},
    error::Error,
    lifecycle::{Event, Lifecycle},
    recreation::{TaskId, TaskType},
};

/// Zero-argument snapshot function, invoked when the owner saves.
pub type SavedStateProvider = Box<dyn Fn() -> Bundle + Send + Sync>;

pub trait SavedStateRegistry: Send + Sync {
    /// Returns and forgets the snapshot restored for `key`.
    fn consume_restored_state_for_key(&self, key: &str) -> Option<Bundle>;

    fn register_saved_state_provider(
        &self,
        key: &str,
        provider: SavedStateProvider,
    ) -> Result<(), Error>;

    fn unregister_saved_state_provider(&self, key: &str);

    /// Arranges for a fresh `task` to run once when this owner is next
    /// reconstructed from a snapshot.
    fn schedule_recreation_task(&self, task: TaskType) -> Result<(), Error>;
}

/// In-memory [`SavedStateRegistry`].
///
/// Scheduling recreation tasks is only allowed between the owner's start and
/// stop, once [`Registry::attach`] has wired it to a lifecycle.
pub struct Registry {
    restored: Mutex<Option<Bundle>>,
    providers: Mutex<FxHashMap<String, Arc<SavedStateProvider>>>,
    pending_tasks: Mutex<Vec<TaskType>>,
    allowing_saving_state: Arc<AtomicBool>,
    is_restored: AtomicBool,
}

// Implementations

impl Registry {
    pub fn new() -> Self {
        Self {
            restored: Mutex::new(None),
            providers: Mutex::new(FxHashMap::default()),
            pending_tasks: Mutex::new(Vec::new()),
            allowing_saving_state: Arc::new(AtomicBool::new(false)),
            is_restored: AtomicBool::new(false),
        }
    }

    /// Tracks the start/stop window in which recreation tasks may be scheduled.
    pub fn attach(&self, lifecycle: &dyn Lifecycle) {
        let allowing = self.allowing_saving_state.clone();

        lifecycle.add_observer(Box::new(move |event: Event| {
            match event {
                Event::OnStart => allowing.store(true, Ordering::SeqCst),
                Event::OnStop => allowing.store(false, Ordering::SeqCst),
                Event::OnDestroy => return ControlFlow::Break(()),
                _ => {}
            }
            ControlFlow::Continue(())
        }));
    }

    /// Installs the snapshot of the previous owner instance, if any.
    pub fn perform_restore(&self, saved: Option<Bundle>) {
        trace!(
            "restoring registry with {} saved entries",
            saved.as_ref().map_or(0, Bundle::len)
        );

        *lock(&self.restored) = saved;
        self.is_restored.store(true, Ordering::SeqCst);
    }

    pub fn is_restored(&self) -> bool {
        self.is_restored.load(Ordering::SeqCst)
    }

    /// Collects the next snapshot.
    ///
    /// Restored entries nobody consumed are carried over; every provider's
    /// bundle is stored under its key; pending recreation tasks are stored
    /// under [`RECREATOR_KEY`].
    pub fn perform_save(&self) -> Bundle {
        // Providers may consume restored state, so they run without any lock held.
        let providers: Vec<_> = lock(&self.providers)
            .iter()
            .map(|(key, provider)| (key.clone(), provider.clone()))
            .collect();
        let snapshots: Vec<_> = providers
            .into_iter()
            .map(|(key, provider)| (key, provider()))
            .collect();

        let mut out = lock(&self.restored).clone().unwrap_or_default();
        for (key, snapshot) in snapshots {
            out.put_bundle(key, snapshot);
        }

        let tasks = lock(&self.pending_tasks);
        if !tasks.is_empty() {
            let ids = tasks
                .iter()
                .enumerate()
                .map(|(index, task)| (index.to_string(), Value::String(task.id.to_string())))
                .collect();
            out.put_bundle(RECREATOR_KEY, ids);
        }

        debug!("saved registry snapshot with {} entries", out.len());
        out
    }

    pub fn pending_tasks(&self) -> Vec<TaskType> {
        lock(&self.pending_tasks).clone()
    }

    pub fn provider_keys(&self) -> Vec<String> {
        lock(&self.providers).keys().cloned().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl SavedStateRegistry for Registry {
    fn consume_restored_state_for_key(&self, key: &str) -> Option<Bundle> {
        let mut restored = lock(&self.restored);

        match restored.as_mut()?.remove(key)? {
            Value::Bundle(bundle) => Some(bundle),
            other => {
                // Not ours to interpret; leave it for whoever owns the key.
                restored.as_mut()?.put(key, other);
                None
            }
        }
    }

    fn register_saved_state_provider(
        &self,
        key: &str,
        provider: SavedStateProvider,
    ) -> Result<(), Error> {
        let mut providers = lock(&self.providers);

        if providers.contains_key(key) {
            return Err(Error::ProviderRegistrationConflict {
                key: key.to_string(),
            });
        }

        providers.insert(key.to_string(), Arc::new(provider));
        trace!("registered saved state provider '{key}'");

        Ok(())
    }

    fn unregister_saved_state_provider(&self, key: &str) {
        lock(&self.providers).remove(key);
    }

    fn schedule_recreation_task(&self, task: TaskType) -> Result<(), Error> {
        if !self.allowing_saving_state.load(Ordering::SeqCst) {
            return Err(Error::SavingStateNotAllowed);
        }

        let mut tasks = lock(&self.pending_tasks);
        if !tasks.iter().any(|pending| pending.id == task.id) {
            debug!("scheduled recreation task {} ({})", task.name(), task.id);
            tasks.push(task);
        }

        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.provider_keys())
            .field("pending_tasks", &lock(&self.pending_tasks).len())
            .field("is_restored", &self.is_restored())
            .finish()
    }
}

/// Reads the task ids a previous owner instance saved under [`RECREATOR_KEY`].
pub fn restored_task_ids(registry: &dyn SavedStateRegistry) -> Vec<TaskId> {
    let Some(saved) = registry.consume_restored_state_for_key(RECREATOR_KEY) else {
        return Vec::new();
    };

    let mut indexed: Vec<(usize, TaskId)> = saved
        .iter()
        .filter_map(|(index, id)| {
            let index = index.parse().ok()?;
            let id = match id {
                Value::String(id) => id.parse().ok()?,
                _ => return None,
            };
            Some((index, id))
        })
        .collect();

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, id)| id).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lifecycle::LifecycleRegistry,
        owner::SavedStateRegistryOwner,
        recreation::RecreationTask,
    };

    #[derive(Default)]
    struct Noop;

    impl RecreationTask for Noop {
        const TASK_ID: TaskId = TaskId::from_u128(7);

        fn on_recreated(&mut self, _owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_consume_returns_once() {
        let mut saved = Bundle::new();
        let mut inner = Bundle::new();
        inner.put_int("count", 4);
        saved.put_bundle("key", inner.clone());

        let registry = Registry::new();
        registry.perform_restore(Some(saved));

        assert_eq!(registry.consume_restored_state_for_key("key"), Some(inner));
        assert_eq!(registry.consume_restored_state_for_key("key"), None);
        assert_eq!(registry.consume_restored_state_for_key("other"), None);
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let registry = Registry::new();

        registry
            .register_saved_state_provider("key", Box::new(Bundle::new))
            .unwrap();
        let err = registry
            .register_saved_state_provider("key", Box::new(Bundle::new))
            .unwrap_err();

        assert!(matches!(err, Error::ProviderRegistrationConflict { key } if key == "key"));

        registry.unregister_saved_state_provider("key");
        assert!(
            registry
                .register_saved_state_provider("key", Box::new(Bundle::new))
                .is_ok()
        );
    }

    #[test]
    fn test_save_carries_unconsumed_and_provider_state() {
        let mut leftover = Bundle::new();
        leftover.put_bool("flag", true);
        let mut saved = Bundle::new();
        saved.put_bundle("untouched", leftover.clone());

        let registry = Registry::new();
        registry.perform_restore(Some(saved));
        registry
            .register_saved_state_provider(
                "live",
                Box::new(|| {
                    let mut bundle = Bundle::new();
                    bundle.put_string("name", "live");
                    bundle
                }),
            )
            .unwrap();

        let out = registry.perform_save();

        assert_eq!(out.get_bundle("untouched"), Some(&leftover));
        assert_eq!(
            out.get_bundle("live").and_then(|b| b.get_string("name")),
            Some("live")
        );
        assert!(!out.contains_key(RECREATOR_KEY));
    }

    #[test]
    fn test_scheduling_follows_start_window() {
        let lifecycle = LifecycleRegistry::new();
        let registry = Registry::new();
        registry.attach(&lifecycle);

        let task = Noop::task_type();

        lifecycle.handle_event(Event::OnCreate);
        assert!(matches!(
            registry.schedule_recreation_task(task),
            Err(Error::SavingStateNotAllowed)
        ));

        lifecycle.handle_event(Event::OnStart);
        registry.schedule_recreation_task(task).unwrap();
        registry.schedule_recreation_task(task).unwrap();
        assert_eq!(registry.pending_tasks().len(), 1);

        lifecycle.handle_event(Event::OnStop);
        assert!(registry.schedule_recreation_task(task).is_err());

        let saved = registry.perform_save();
        let next = Registry::new();
        next.perform_restore(Some(saved));

        assert_eq!(restored_task_ids(&next), vec![Noop::TASK_ID]);
        assert!(restored_task_ids(&next).is_empty());
    }
}
