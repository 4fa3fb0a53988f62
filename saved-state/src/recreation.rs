//! One-shot tasks that run when an owner is reconstructed from a snapshot,
//! and the lifecycle gate that decides when such a task may be scheduled.

use std::{
    any::type_name,
    fmt,
    ops::ControlFlow,
    sync::{Arc, LazyLock},
};

use rustc_hash::FxHashMap;

use crate::{
    base::{debug, trace, warn},
    error::Error,
    lifecycle::{Event, State},
    owner::{SavedStateRegistryOwner, SharedOwner},
    registry::restored_task_ids,
};

/// Stable identity of a task type across recreations.
pub type TaskId = uuid::Uuid;

/// Logic to run once, the next time the owner is rebuilt after a save.
///
/// A fresh instance is built with `Default` by whoever restores the owner,
/// so the task carries no state across the boundary. Usually declared with
/// `#[recreation_task("<uuid>")]`, which also registers the type.
///
/// ```ignore
/// #[derive(Default)]
/// struct ShowWelcomeBack;
///
/// #[recreation_task("1d6c1f5e-5a43-4c59-9d1b-4c1f6b0f4a51")]
/// impl RecreationTask for ShowWelcomeBack {
///     fn on_recreated(&mut self, owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()> {
///         // ...
///         Ok(())
///     }
/// }
/// ```
pub trait RecreationTask: Default + Send + 'static {
    const TASK_ID: TaskId;

    fn on_recreated(&mut self, owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()>;

    fn task_type() -> TaskType
    where
        Self: Sized,
    {
        TaskType::of::<Self>()
    }
}

/// Type-erased handle to a [`RecreationTask`] implementation.
#[derive(Clone, Copy)]
pub struct TaskType {
    pub id: TaskId,
    name: fn() -> &'static str,
    run: fn(&dyn SavedStateRegistryOwner) -> anyhow::Result<()>,
}

/// Inventory entry making a task type constructible from its id.
pub struct RegisterTask(pub TaskType);

inventory::collect!(RegisterTask);

static TASKS: LazyLock<FxHashMap<TaskId, TaskType>> = LazyLock::new(|| {
    inventory::iter::<RegisterTask>
        .into_iter()
        .map(|entry| (entry.0.id, entry.0))
        .collect()
});

// Implementations

impl TaskType {
    pub const fn of<T: RecreationTask>() -> Self {
        Self {
            id: T::TASK_ID,
            name: type_name::<T>,
            run: run_fresh::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    /// Builds a fresh instance, runs it against `owner` and drops it.
    pub fn run(&self, owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()> {
        (self.run)(owner)
    }

    pub fn lookup(id: &TaskId) -> Option<TaskType> {
        TASKS.get(id).copied()
    }
}

impl fmt::Debug for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskType")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for TaskType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskType {}

fn run_fresh<T: RecreationTask>(owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()> {
    T::default().on_recreated(owner)
}

/// Runs `T` once on the owner's next recreation.
///
/// - Destroyed owner: dropped, nothing can ever service it.
/// - Not started yet: deferred until the first start; dropped if the owner is
///   destroyed first.
/// - Started or later: scheduled with the registry right away.
pub fn run_on_next_recreation<T: RecreationTask>(owner: &SharedOwner) -> Result<(), Error> {
    schedule_on_next_recreation(owner, T::task_type())
}

pub fn schedule_on_next_recreation(owner: &SharedOwner, task: TaskType) -> Result<(), Error> {
    let lifecycle = owner.lifecycle();

    match lifecycle.current_state() {
        State::Destroyed => {
            trace!("owner destroyed, dropping recreation task {}", task.name());
            Ok(())
        }
        State::Initialized | State::Created => {
            trace!("deferring recreation task {} until start", task.name());

            let owner = Arc::downgrade(owner);
            lifecycle.add_observer(Box::new(move |event: Event| match event {
                Event::OnStart => {
                    let scheduled = owner
                        .upgrade()
                        .map(|owner| owner.saved_state_registry().schedule_recreation_task(task));

                    if let Some(Err(_e)) = scheduled {
                        warn!("failed to schedule recreation task {}: {_e}", task.name());
                    }
                    ControlFlow::Break(())
                }
                Event::OnDestroy => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }));

            Ok(())
        }
        State::Started | State::Resumed => {
            owner.saved_state_registry().schedule_recreation_task(task)
        }
    }
}

/// `run_on_next_recreation` as a method on shared owners.
pub trait RecreationExt {
    fn run_on_next_recreation<T: RecreationTask>(&self) -> Result<(), Error>;
}

impl<O: SavedStateRegistryOwner> RecreationExt for Arc<O> {
    fn run_on_next_recreation<T: RecreationTask>(&self) -> Result<(), Error> {
        let owner: SharedOwner = self.clone();
        run_on_next_recreation::<T>(&owner)
    }
}

impl RecreationExt for SharedOwner {
    fn run_on_next_recreation<T: RecreationTask>(&self) -> Result<(), Error> {
        run_on_next_recreation::<T>(self)
    }
}

/// Runs every task the previous owner instance scheduled, once each.
///
/// Called by the host right after the owner is created from a snapshot.
/// Unknown ids and failing tasks are logged and skipped.
pub fn run_restored_tasks(owner: &dyn SavedStateRegistryOwner) -> usize {
    let mut ran = 0;

    for id in restored_task_ids(owner.saved_state_registry()) {
        let Some(task) = TaskType::lookup(&id) else {
            warn!("no recreation task registered for {id}, skipping");
            continue;
        };

        debug!("running recreation task {} ({id})", task.name());

        match task.run(owner) {
            Ok(()) => ran += 1,
            Err(_e) => {
                warn!("recreation task {} failed: {_e:#}", task.name());
            }
        }
    }

    ran
}

#[cfg(test)]
mod tests {
    use std::{
        any::Any,
        sync::{
            Mutex,
            atomic::{AtomicU64, AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::{
        bundle::Bundle,
        host::Host,
        lifecycle::{Lifecycle, LifecycleObserver, ObserverId},
        registry::{SavedStateProvider, SavedStateRegistry},
    };

    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Counted;

    impl RecreationTask for Counted {
        const TASK_ID: TaskId = TaskId::from_u128(0x5eed);

        fn on_recreated(&mut self, _owner: &dyn SavedStateRegistryOwner) -> anyhow::Result<()> {
            RUNS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_task_type_runs_fresh_instance() {
        let task = Counted::task_type();
        let host = Host::launch(None);

        assert_eq!(task.id, Counted::TASK_ID);
        assert!(task.name().ends_with("Counted"));

        let before = RUNS.load(Ordering::SeqCst);
        task.run(&*host).unwrap();
        assert_eq!(RUNS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_deferral_waits_for_start() {
        let host = Host::launch(None);
        let owner: SharedOwner = host.clone();
        host.create();

        run_on_next_recreation::<Counted>(&owner).unwrap();
        assert!(host.registry().pending_tasks().is_empty());
        assert_eq!(host.lifecycle_registry().observer_count(), 2);

        host.start();
        assert_eq!(host.registry().pending_tasks(), vec![Counted::task_type()]);
        // The one-shot observer detached itself; the registry's stays.
        assert_eq!(host.lifecycle_registry().observer_count(), 1);
    }

    #[test]
    fn test_destroyed_owner_drops_task() {
        let host = Host::launch(None);
        let owner: SharedOwner = host.clone();
        host.create();
        host.destroy();

        run_on_next_recreation::<Counted>(&owner).unwrap();

        assert!(host.registry().pending_tasks().is_empty());
        assert_eq!(host.lifecycle_registry().observer_count(), 0);
    }

    /// Lifecycle that keeps its observers after destruction, so only an
    /// observer's own `Break` can detach it.
    struct KeepsObservers {
        state: Mutex<State>,
        next_id: AtomicU64,
        observers: Mutex<Vec<(ObserverId, Box<dyn LifecycleObserver>)>>,
    }

    impl KeepsObservers {
        fn emit(&self, event: Event) {
            *self.state.lock().unwrap() = event.target_state();

            let observers = std::mem::take(&mut *self.observers.lock().unwrap());
            let kept: Vec<_> = observers
                .into_iter()
                .filter_map(|(id, mut observer)| {
                    observer.on_state_changed(event).is_continue().then_some((id, observer))
                })
                .collect();

            *self.observers.lock().unwrap() = kept;
        }

        fn len(&self) -> usize {
            self.observers.lock().unwrap().len()
        }
    }

    impl Lifecycle for KeepsObservers {
        fn current_state(&self) -> State {
            *self.state.lock().unwrap()
        }

        fn add_observer(&self, observer: Box<dyn LifecycleObserver>) -> ObserverId {
            let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.observers.lock().unwrap().push((id, observer));
            id
        }

        fn remove_observer(&self, id: ObserverId) -> bool {
            let mut observers = self.observers.lock().unwrap();
            let before = observers.len();
            observers.retain(|(observer_id, _)| *observer_id != id);
            observers.len() != before
        }
    }

    /// Owner whose registry only records what gets scheduled.
    struct RecordingOwner {
        lifecycle: KeepsObservers,
        scheduled: Mutex<Vec<TaskId>>,
    }

    impl RecordingOwner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                lifecycle: KeepsObservers {
                    state: Mutex::new(State::Initialized),
                    next_id: AtomicU64::new(0),
                    observers: Mutex::new(Vec::new()),
                },
                scheduled: Mutex::new(Vec::new()),
            })
        }
    }

    impl SavedStateRegistry for RecordingOwner {
        fn consume_restored_state_for_key(&self, _key: &str) -> Option<Bundle> {
            None
        }

        fn register_saved_state_provider(
            &self,
            _key: &str,
            _provider: SavedStateProvider,
        ) -> Result<(), Error> {
            Ok(())
        }

        fn unregister_saved_state_provider(&self, _key: &str) {}

        fn schedule_recreation_task(&self, task: TaskType) -> Result<(), Error> {
            self.scheduled.lock().unwrap().push(task.id);
            Ok(())
        }
    }

    impl SavedStateRegistryOwner for RecordingOwner {
        fn lifecycle(&self) -> &dyn Lifecycle {
            &self.lifecycle
        }

        fn saved_state_registry(&self) -> &dyn SavedStateRegistry {
            self
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_deferred_task_detaches_on_destroy() {
        let started = RecordingOwner::new();
        let owner: SharedOwner = started.clone();
        started.lifecycle.emit(Event::OnCreate);
        run_on_next_recreation::<Counted>(&owner).unwrap();
        started.lifecycle.emit(Event::OnStart);

        assert_eq!(*started.scheduled.lock().unwrap(), vec![Counted::TASK_ID]);
        assert_eq!(started.lifecycle.len(), 0);

        let destroyed = RecordingOwner::new();
        let owner: SharedOwner = destroyed.clone();
        destroyed.lifecycle.emit(Event::OnCreate);
        run_on_next_recreation::<Counted>(&owner).unwrap();
        assert_eq!(destroyed.lifecycle.len(), 1);

        destroyed.lifecycle.emit(Event::OnDestroy);
        assert_eq!(destroyed.lifecycle.len(), 0);

        destroyed.lifecycle.emit(Event::OnStart);
        assert!(destroyed.scheduled.lock().unwrap().is_empty());
    }
}
