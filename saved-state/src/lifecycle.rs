//! Lifecycle phases of an owner and the observable state stream the
//! recreation scheduler listens to.

use std::{
    collections::VecDeque,
    fmt,
    ops::ControlFlow,
    sync::{Mutex, PoisonError},
};

use rustc_hash::FxHashSet;

use crate::base::{trace, warn};

#[cfg(feature = "async")]
use tokio::sync::watch;

/// Lifecycle phase, ordered from terminal to fully active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Destroyed,
    Initialized,
    Created,
    Started,
    Resumed,
}

/// Transition between two [`State`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    OnCreate,
    OnStart,
    OnResume,
    OnPause,
    OnStop,
    OnDestroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

/// Receives every event dispatched after it was added.
///
/// Returning `ControlFlow::Break(())` detaches the observer as part of the
/// same dispatch, so it never sees another event.
pub trait LifecycleObserver: Send {
    fn on_state_changed(&mut self, event: Event) -> ControlFlow<()>;
}

/// Observable lifecycle of an owner.
pub trait Lifecycle: Send + Sync {
    fn current_state(&self) -> State;

    fn add_observer(&self, observer: Box<dyn LifecycleObserver>) -> ObserverId;

    /// Returns `false` if the observer was already detached.
    fn remove_observer(&self, id: ObserverId) -> bool;
}

/// In-memory [`Lifecycle`] driven by explicit events.
pub struct LifecycleRegistry {
    inner: Mutex<Observers>,
    #[cfg(feature = "async")]
    state_tx: watch::Sender<State>,
}

type Batch = Vec<(ObserverId, Box<dyn LifecycleObserver>)>;

struct Observers {
    state: State,
    next_id: u64,
    list: Batch,
    handling: bool,
    pending: VecDeque<Event>,
    /// Observers taken out of `list` for the batch being dispatched.
    in_flight: FxHashSet<ObserverId>,
    removed_in_flight: FxHashSet<ObserverId>,
}

// Implementations

impl State {
    pub fn is_at_least(&self, state: State) -> bool {
        *self >= state
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Event {
    /// The state an owner is in right after this event.
    pub fn target_state(&self) -> State {
        match self {
            Event::OnCreate | Event::OnStop => State::Created,
            Event::OnStart | Event::OnPause => State::Started,
            Event::OnResume => State::Resumed,
            Event::OnDestroy => State::Destroyed,
        }
    }

    fn is_legal_from(&self, state: State) -> bool {
        match self {
            Event::OnCreate => state == State::Initialized,
            Event::OnStart => state == State::Created,
            Event::OnResume => state == State::Started,
            Event::OnPause => state == State::Resumed,
            Event::OnStop => state == State::Started,
            Event::OnDestroy => state == State::Created || state == State::Initialized,
        }
    }
}

impl<F> LifecycleObserver for F
where
    F: FnMut(Event) -> ControlFlow<()> + Send,
{
    fn on_state_changed(&mut self, event: Event) -> ControlFlow<()> {
        self(event)
    }
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Observers {
                state: State::Initialized,
                next_id: 0,
                list: Vec::new(),
                handling: false,
                pending: VecDeque::new(),
                in_flight: FxHashSet::default(),
                removed_in_flight: FxHashSet::default(),
            }),
            #[cfg(feature = "async")]
            state_tx: watch::Sender::new(State::Initialized),
        }
    }

    /// Moves to the event's target state and notifies observers in order.
    ///
    /// Events that are not legal from the current state are ignored. Observers
    /// are called without the internal lock held, so they may add or remove
    /// observers, including themselves. An event raised while another is being
    /// dispatched, from an observer or another thread, is queued and delivered
    /// to every observer once the current one is done.
    pub fn handle_event(&self, event: Event) {
        {
            let mut inner = self.lock();
            inner.pending.push_back(event);

            if inner.handling {
                trace!("queued {event:?} behind the current dispatch");
                return;
            }
            inner.handling = true;
        }

        while let Some((event, batch)) = self.next_batch() {
            #[cfg(feature = "async")]
            self.state_tx.send_replace(event.target_state());

            self.dispatch(event, batch);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.lock().list.len()
    }

    /// Stream of states for async consumers, starting from the current one.
    #[cfg(feature = "async")]
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state_tx.subscribe()
    }

    /// Waits until the owner reaches `state`, or is destroyed.
    #[cfg(feature = "async")]
    pub async fn wait_for(&self, state: State) -> State {
        let mut rx = self.state_tx.subscribe();

        match rx
            .wait_for(|current| current.is_at_least(state) || *current == State::Destroyed)
            .await
        {
            Ok(current) => *current,
            Err(_) => self.current_state(),
        }
    }

    /// Pops the next legal pending event, moves to its state and takes the
    /// observers to notify. Ends the handling run once nothing is pending.
    fn next_batch(&self) -> Option<(Event, Batch)> {
        let mut inner = self.lock();

        while let Some(event) = inner.pending.pop_front() {
            if !event.is_legal_from(inner.state) {
                warn!("ignoring {event:?} in state {}", inner.state);
                continue;
            }

            inner.state = event.target_state();
            trace!("lifecycle moved to {} on {event:?}", inner.state);

            let batch = std::mem::take(&mut inner.list);
            inner.in_flight = batch.iter().map(|(id, _)| *id).collect();

            return Some((event, batch));
        }

        inner.handling = false;
        None
    }

    fn dispatch(&self, event: Event, batch: Batch) {
        let mut kept = Vec::with_capacity(batch.len());

        for (id, mut observer) in batch {
            if self.lock().removed_in_flight.contains(&id) {
                continue;
            }

            if observer.on_state_changed(event).is_continue() {
                kept.push((id, observer));
            } else {
                self.lock().in_flight.remove(&id);
            }
        }

        let mut inner = self.lock();
        let removed = std::mem::take(&mut inner.removed_in_flight);
        inner.in_flight.clear();
        kept.retain(|(id, _)| !removed.contains(id));

        // Observers added during dispatch go after the surviving ones.
        let added = std::mem::replace(&mut inner.list, kept);
        inner.list.extend(added);

        if inner.state == State::Destroyed {
            inner.list.clear();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Observers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for LifecycleRegistry {
    fn current_state(&self) -> State {
        self.lock().state
    }

    fn add_observer(&self, observer: Box<dyn LifecycleObserver>) -> ObserverId {
        let mut inner = self.lock();

        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.list.push((id, observer));

        id
    }

    fn remove_observer(&self, id: ObserverId) -> bool {
        let mut inner = self.lock();

        let before = inner.list.len();
        inner.list.retain(|(observer_id, _)| *observer_id != id);

        if inner.list.len() != before {
            return true;
        }

        inner.in_flight.contains(&id) && inner.removed_in_flight.insert(id)
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();

        f.debug_struct("LifecycleRegistry")
            .field("state", &inner.state)
            .field("observers", &inner.list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting_observer(count: Arc<AtomicUsize>) -> Box<dyn LifecycleObserver> {
        Box::new(move |_event: Event| {
            count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
    }

    #[test]
    fn test_events_drive_state() {
        let lifecycle = LifecycleRegistry::new();
        assert_eq!(lifecycle.current_state(), State::Initialized);

        lifecycle.handle_event(Event::OnCreate);
        lifecycle.handle_event(Event::OnStart);
        lifecycle.handle_event(Event::OnResume);
        assert_eq!(lifecycle.current_state(), State::Resumed);

        lifecycle.handle_event(Event::OnPause);
        lifecycle.handle_event(Event::OnStop);
        assert_eq!(lifecycle.current_state(), State::Created);

        lifecycle.handle_event(Event::OnDestroy);
        assert_eq!(lifecycle.current_state(), State::Destroyed);
    }

    #[test]
    fn test_illegal_event_is_ignored() {
        let lifecycle = LifecycleRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        lifecycle.add_observer(counting_observer(count.clone()));

        lifecycle.handle_event(Event::OnStart);

        assert_eq!(lifecycle.current_state(), State::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_break_detaches_observer() {
        let lifecycle = LifecycleRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        lifecycle.add_observer(Box::new({
            let seen = seen.clone();
            move |event: Event| {
                seen.lock().unwrap().push(event);
                if event == Event::OnStart {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        }));

        lifecycle.handle_event(Event::OnCreate);
        lifecycle.handle_event(Event::OnStart);
        lifecycle.handle_event(Event::OnResume);

        assert_eq!(*seen.lock().unwrap(), vec![Event::OnCreate, Event::OnStart]);
        assert_eq!(lifecycle.observer_count(), 0);
    }

    #[test]
    fn test_remove_observer() {
        let lifecycle = LifecycleRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let id = lifecycle.add_observer(counting_observer(count.clone()));
        assert!(lifecycle.remove_observer(id));
        assert!(!lifecycle.remove_observer(id));

        lifecycle.handle_event(Event::OnCreate);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_may_add_observer_during_dispatch() {
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));

        lifecycle.add_observer(Box::new({
            let lifecycle = Arc::downgrade(&lifecycle);
            let count = count.clone();
            move |_event: Event| {
                if let Some(lifecycle) = lifecycle.upgrade() {
                    lifecycle.add_observer(counting_observer(count.clone()));
                }
                ControlFlow::Break(())
            }
        }));

        lifecycle.handle_event(Event::OnCreate);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(lifecycle.observer_count(), 1);

        lifecycle.handle_event(Event::OnStart);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_clears_observers() {
        let lifecycle = LifecycleRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        lifecycle.add_observer(counting_observer(count.clone()));

        lifecycle.handle_event(Event::OnCreate);
        lifecycle.handle_event(Event::OnDestroy);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(lifecycle.observer_count(), 0);
    }

    fn recording_observer(seen: Arc<Mutex<Vec<Event>>>) -> Box<dyn LifecycleObserver> {
        Box::new(move |event: Event| {
            seen.lock().unwrap().push(event);
            ControlFlow::Continue(())
        })
    }

    #[test]
    fn test_nested_event_reaches_every_observer_in_order() {
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        lifecycle.add_observer(Box::new({
            let lifecycle = Arc::downgrade(&lifecycle);
            let first = first.clone();
            move |event: Event| {
                first.lock().unwrap().push(event);
                if let (Event::OnStart, Some(lifecycle)) = (event, lifecycle.upgrade()) {
                    lifecycle.handle_event(Event::OnResume);
                    assert_eq!(lifecycle.current_state(), State::Started);
                }
                ControlFlow::Continue(())
            }
        }));
        lifecycle.add_observer(recording_observer(second.clone()));

        lifecycle.handle_event(Event::OnCreate);
        lifecycle.handle_event(Event::OnStart);

        let expected = vec![Event::OnCreate, Event::OnStart, Event::OnResume];
        assert_eq!(lifecycle.current_state(), State::Resumed);
        assert_eq!(*first.lock().unwrap(), expected);
        assert_eq!(*second.lock().unwrap(), expected);
        assert_eq!(lifecycle.observer_count(), 2);
    }

    #[test]
    fn test_removal_after_nested_event_sticks() {
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let target = Arc::new(Mutex::new(None::<ObserverId>));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        lifecycle.add_observer(Box::new({
            let lifecycle = Arc::downgrade(&lifecycle);
            let target = target.clone();
            let removed = removed.clone();
            move |event: Event| {
                let id = *target.lock().unwrap();
                if let (Event::OnStart, Some(lifecycle), Some(id)) = (event, lifecycle.upgrade(), id) {
                    lifecycle.handle_event(Event::OnResume);
                    removed.lock().unwrap().push(lifecycle.remove_observer(id));
                    removed.lock().unwrap().push(lifecycle.remove_observer(id));
                }
                ControlFlow::Continue(())
            }
        }));
        *target.lock().unwrap() = Some(lifecycle.add_observer(recording_observer(seen.clone())));

        lifecycle.handle_event(Event::OnCreate);
        lifecycle.handle_event(Event::OnStart);
        lifecycle.handle_event(Event::OnPause);

        assert_eq!(*removed.lock().unwrap(), vec![true, false]);
        assert_eq!(*seen.lock().unwrap(), vec![Event::OnCreate]);
        assert_eq!(lifecycle.observer_count(), 1);
    }

    #[test]
    fn test_unknown_id_during_dispatch_is_not_removed() {
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let results = Arc::new(Mutex::new(Vec::new()));

        let id = lifecycle.add_observer(Box::new({
            let lifecycle = Arc::downgrade(&lifecycle);
            let results = results.clone();
            move |_event: Event| {
                if let Some(lifecycle) = lifecycle.upgrade() {
                    results.lock().unwrap().push(lifecycle.remove_observer(ObserverId(999)));
                }
                ControlFlow::Break(())
            }
        }));

        lifecycle.handle_event(Event::OnCreate);

        assert_eq!(*results.lock().unwrap(), vec![false]);
        assert!(!lifecycle.remove_observer(id));
        assert_eq!(lifecycle.observer_count(), 0);
    }
}
