use std::{
    any::Any,
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::{bundle::Bundle, lifecycle::Lifecycle, registry::SavedStateRegistry};

/// An entity with a lifecycle and a saved state registry: a screen, a
/// sub-screen, or the nearest such ancestor of a widget.
pub trait SavedStateRegistryOwner: Send + Sync + 'static {
    fn lifecycle(&self) -> &dyn Lifecycle;

    fn saved_state_registry(&self) -> &dyn SavedStateRegistry;

    /// Bundle a screen scoped container starts from when nothing was restored,
    /// e.g. the arguments the owner was launched with.
    fn default_arguments(&self) -> Option<Bundle> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

pub type SharedOwner = Arc<dyn SavedStateRegistryOwner>;

pub type WidgetId = u64;

/// A component below an owner in the hierarchy.
pub trait Widget: Send + Sync + 'static {
    /// Runtime identity, unique among siblings sharing one owner.
    fn id(&self) -> WidgetId;

    /// The nearest ancestor owning a registry, `None` while detached.
    fn find_registry_owner(&self) -> Option<SharedOwner>;

    /// Runs `action` now if attached, otherwise on the next attach.
    fn do_on_attach(&self, action: Box<dyn FnOnce() + Send>);
}

/// Deferred reference to a container's owner.
///
/// The resolver is called on every access until it first yields an owner.
/// From then on the reference is pinned to that owner and held weakly, so a
/// container never keeps its owner alive.
pub struct OwnerRef {
    resolver: Box<dyn Fn() -> Option<SharedOwner> + Send + Sync>,
    resolved: OnceLock<Weak<dyn SavedStateRegistryOwner>>,
}

// Implementations

impl OwnerRef {
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn() -> Option<SharedOwner> + Send + Sync + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            resolved: OnceLock::new(),
        }
    }

    /// Reference to an owner that already exists.
    pub fn from_owner(owner: &SharedOwner) -> Self {
        let resolved = OnceLock::new();
        let _ = resolved.set(Arc::downgrade(owner));

        Self {
            resolver: Box::new(|| None),
            resolved,
        }
    }

    pub fn resolve(&self) -> Option<SharedOwner> {
        if let Some(owner) = self.resolved.get() {
            return owner.upgrade();
        }

        let owner = (self.resolver)()?;

        // A concurrent first resolution may have won; its owner is the stable one.
        self.resolved
            .get_or_init(|| Arc::downgrade(&owner))
            .upgrade()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRef")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
