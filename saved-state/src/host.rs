//! A minimal screen-like owner that wires a [`LifecycleRegistry`] to a
//! [`Registry`].
//!
//! Enough to drive containers through create, save, destroy and recreate in
//! tests and headless hosts.

use std::{any::Any, fmt, sync::Arc};

use crate::{
    base::{debug, trace},
    bundle::Bundle,
    lifecycle::{Event, Lifecycle, LifecycleRegistry, State},
    owner::SavedStateRegistryOwner,
    recreation::run_restored_tasks,
    registry::{Registry, SavedStateRegistry},
};

pub struct Host {
    lifecycle: LifecycleRegistry,
    registry: Registry,
    arguments: Option<Bundle>,
}

// Implementations

impl Host {
    /// A fresh owner with nothing to restore.
    ///
    /// `arguments` are what it was launched with, the default bundle of
    /// screen scoped containers.
    pub fn launch(arguments: Option<Bundle>) -> Arc<Self> {
        Self::build(None, arguments)
    }

    /// An owner rebuilt from the snapshot a previous instance saved.
    pub fn recreate(saved: Bundle, arguments: Option<Bundle>) -> Arc<Self> {
        Self::build(Some(saved), arguments)
    }

    fn build(saved: Option<Bundle>, arguments: Option<Bundle>) -> Arc<Self> {
        let host = Self {
            lifecycle: LifecycleRegistry::new(),
            registry: Registry::new(),
            arguments,
        };

        host.registry.attach(&host.lifecycle);
        host.registry.perform_restore(saved);

        Arc::new(host)
    }

    /// Moves to `Created` and runs the recreation tasks of the previous instance.
    pub fn create(&self) {
        self.lifecycle.handle_event(Event::OnCreate);

        let _ran = run_restored_tasks(self);
        trace!("host created, {_ran} recreation tasks ran");
    }

    pub fn start(&self) {
        self.lifecycle.handle_event(Event::OnStart);
    }

    pub fn resume(&self) {
        self.lifecycle.handle_event(Event::OnResume);
    }

    pub fn pause(&self) {
        self.lifecycle.handle_event(Event::OnPause);
    }

    pub fn stop(&self) {
        self.lifecycle.handle_event(Event::OnStop);
    }

    /// Walks down through pause and stop as needed, then destroys.
    pub fn destroy(&self) {
        if self.state() == State::Resumed {
            self.pause();
        }
        if self.state() == State::Started {
            self.stop();
        }

        self.lifecycle.handle_event(Event::OnDestroy);
    }

    /// Snapshot for [`Host::recreate`].
    pub fn save(&self) -> Bundle {
        let saved = self.registry.perform_save();
        debug!("host saved {} entries", saved.len());
        saved
    }

    pub fn state(&self) -> State {
        self.lifecycle.current_state()
    }

    pub fn lifecycle_registry(&self) -> &LifecycleRegistry {
        &self.lifecycle
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn arguments(&self) -> Option<&Bundle> {
        self.arguments.as_ref()
    }
}

impl SavedStateRegistryOwner for Host {
    fn lifecycle(&self) -> &dyn Lifecycle {
        &self.lifecycle
    }

    fn saved_state_registry(&self) -> &dyn SavedStateRegistry {
        &self.registry
    }

    fn default_arguments(&self) -> Option<Bundle> {
        self.arguments.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("lifecycle", &self.lifecycle)
            .field("registry", &self.registry)
            .field("arguments", &self.arguments.as_ref().map(Bundle::len))
            .finish()
    }
}
