//! The saved state container and the constructors that bind one to a screen,
//! a sub-screen or a widget.

use std::{
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

use crate::{
    base::{DEFAULT_KEY, debug, error, trace, warn, widget_key},
    bundle::Bundle,
    error::Error,
    owner::{OwnerRef, SavedStateRegistryOwner, SharedOwner, Widget},
    property::{CustomProperty, Property, PropertyValue, ReadOnlyProperty},
    recreation::{self, RecreationTask},
};

/// The materialized bundle of a container, shared with its properties and its
/// provider.
pub type SharedBundle = Arc<RwLock<Bundle>>;

type DefaultSupplier = Arc<dyn Fn() -> Option<Bundle> + Send + Sync>;

/// Lazily materialized key-value store bound to an owner's registry.
///
/// Construction never touches the registry. The bundle is produced on first
/// access from, in order: the snapshot restored for the key, the default
/// supplier, an empty bundle. Clones share the same container.
#[derive(Clone)]
pub struct SavedState {
    inner: Arc<Inner>,
}

struct Inner {
    owner: OwnerRef,
    key: String,
    default_bundle: Option<DefaultSupplier>,
    bundle: OnceLock<SharedBundle>,
    materializing: Mutex<()>,
}

/// Runtime options for the scope constructors.
#[derive(Default, Clone)]
pub struct SavedStateOptions {
    key: Option<String>,
    default_bundle: Option<DefaultSupplier>,
}

/// A [`SavedState`] built and registered on first access.
///
/// Screens and sub-screens usually hold one of these as a field, so the
/// container only exists once something actually reads it.
pub struct LazySavedState {
    state: OnceLock<SavedState>,
    building: Mutex<()>,
    build: Box<dyn Fn() -> Result<SavedState, Error> + Send + Sync>,
}

// Implementations

impl SavedState {
    /// Container for `owner` under `key`, seeded from `default_bundle` when
    /// nothing was restored.
    pub fn new<F>(owner: OwnerRef, key: impl Into<String>, default_bundle: F) -> Self
    where
        F: Fn() -> Option<Bundle> + Send + Sync + 'static,
    {
        Self::from_parts(owner, key.into(), Some(Arc::new(default_bundle)))
    }

    fn from_parts(owner: OwnerRef, key: String, default_bundle: Option<DefaultSupplier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner,
                key,
                default_bundle,
                bundle: OnceLock::new(),
                materializing: Mutex::new(()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn owner(&self) -> Option<SharedOwner> {
        self.inner.owner.resolve()
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.bundle.get().is_some()
    }

    /// The bundle, materializing it on first call.
    ///
    /// Every successful call returns the same `Arc`.
    pub fn try_bundle(&self) -> Result<SharedBundle, Error> {
        if let Some(bundle) = self.inner.bundle.get() {
            return Ok(bundle.clone());
        }

        let _guard = self
            .inner
            .materializing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(bundle) = self.inner.bundle.get() {
            return Ok(bundle.clone());
        }

        let owner = self.resolve_owner()?;
        let bundle = self.materialize(owner.as_ref());

        Ok(self
            .inner
            .bundle
            .get_or_init(|| Arc::new(RwLock::new(bundle)))
            .clone())
    }

    /// Like [`SavedState::try_bundle`].
    ///
    /// # Panics
    ///
    /// If the owner can not be resolved, e.g. a widget container read before
    /// the widget was attached.
    pub fn bundle(&self) -> SharedBundle {
        match self.try_bundle() {
            Ok(bundle) => bundle,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn with_bundle<R>(&self, f: impl FnOnce(&Bundle) -> R) -> Result<R, Error> {
        let bundle = self.try_bundle()?;
        Ok(f(&read(&bundle)))
    }

    pub fn with_bundle_mut<R>(&self, f: impl FnOnce(&mut Bundle) -> R) -> Result<R, Error> {
        let bundle = self.try_bundle()?;
        Ok(f(&mut write(&bundle)))
    }

    /// Registers this container with its owner's registry, so its bundle is
    /// part of every snapshot the owner saves.
    ///
    /// Does not materialize the bundle; the provider does so if the owner
    /// saves before anything read it.
    pub fn register_saved_state_provider(&self) -> Result<(), Error> {
        let owner = self.resolve_owner()?;
        let state = self.clone();

        owner.saved_state_registry().register_saved_state_provider(
            &self.inner.key,
            Box::new(move || state.snapshot()),
        )?;

        debug!("registered saved state '{}'", self.inner.key);
        Ok(())
    }

    /// Runs `T` once on the owner's next recreation. See
    /// [`recreation::run_on_next_recreation`].
    pub fn run_on_next_recreation<T: RecreationTask>(&self) -> Result<(), Error> {
        let owner = self.resolve_owner()?;
        recreation::run_on_next_recreation::<T>(&owner)
    }

    /// Plain typed property failing with [`Error::MissingValue`] when absent.
    pub fn property<T: PropertyValue>(&self, name: impl Into<String>) -> Property<T> {
        Property::new(self.clone(), name.into(), None)
    }

    /// Plain typed property reading as `default` when absent.
    pub fn property_or<T: PropertyValue>(
        &self,
        name: impl Into<String>,
        default: T,
    ) -> Property<T> {
        Property::new(self.clone(), name.into(), Some(default))
    }

    /// Property for a type the dispatch table does not cover.
    pub fn property_with<T, D, E>(
        &self,
        name: impl Into<String>,
        decode: D,
        encode: E,
    ) -> CustomProperty<T>
    where
        D: Fn(&Bundle, &str) -> T + Send + Sync + 'static,
        E: Fn(&mut Bundle, &str, T) + Send + Sync + 'static,
    {
        CustomProperty::new(self.clone(), name.into(), Box::new(decode), Box::new(encode))
    }

    pub fn read_only_with<T, D>(&self, name: impl Into<String>, decode: D) -> ReadOnlyProperty<T>
    where
        D: Fn(&Bundle, &str) -> T + Send + Sync + 'static,
    {
        ReadOnlyProperty::new(self.clone(), name.into(), Box::new(decode))
    }

    fn resolve_owner(&self) -> Result<SharedOwner, Error> {
        self.inner
            .owner
            .resolve()
            .ok_or_else(|| Error::UnresolvableOwner {
                key: self.inner.key.clone(),
            })
    }

    fn materialize(&self, owner: &dyn SavedStateRegistryOwner) -> Bundle {
        let key = &self.inner.key;
        let registry = owner.saved_state_registry();

        if let Some(restored) = registry.consume_restored_state_for_key(key) {
            debug!("saved state '{key}' restored with {} entries", restored.len());
            return restored;
        }

        if let Some(default) = self.inner.default_bundle.as_ref().and_then(|f| f()) {
            debug!("saved state '{key}' seeded with {} default entries", default.len());
            return default;
        }

        trace!("saved state '{key}' starts empty");
        Bundle::new()
    }

    fn snapshot(&self) -> Bundle {
        match self.try_bundle() {
            Ok(bundle) => read(&bundle).clone(),
            Err(_e) => {
                warn!("skipping snapshot of saved state: {_e}");
                Bundle::new()
            }
        }
    }
}

impl fmt::Debug for SavedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedState")
            .field("key", &self.inner.key)
            .field("owner", &self.inner.owner)
            .field("bundle", &self.inner.bundle.get().map(|b| read(b).len()))
            .finish()
    }
}

impl SavedStateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides [`DEFAULT_KEY`]. Two containers on one owner need distinct keys.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Bundle used when nothing was restored, replacing the owner's defaults.
    pub fn default_bundle<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Bundle + Send + Sync + 'static,
    {
        self.default_bundle = Some(Arc::new(move || Some(f())));
        self
    }

    fn key_or_default(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_KEY)
    }
}

impl fmt::Debug for SavedStateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedStateOptions")
            .field("key", &self.key_or_default())
            .field("default_bundle", &self.default_bundle.is_some())
            .finish()
    }
}

impl LazySavedState {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn() -> Result<SavedState, Error> + Send + Sync + 'static,
    {
        Self {
            state: OnceLock::new(),
            building: Mutex::new(()),
            build: Box::new(build),
        }
    }

    /// The container, building and registering it on first call.
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn try_get(&self) -> Result<&SavedState, Error> {
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let _guard = self.building.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let state = (self.build)()?;
        Ok(self.state.get_or_init(|| state))
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }
}

impl Deref for LazySavedState {
    type Target = SavedState;

    /// # Panics
    ///
    /// If the container can not be built, see [`LazySavedState::try_get`].
    fn deref(&self) -> &Self::Target {
        match self.try_get() {
            Ok(state) => state,
            Err(e) => panic!("{e}"),
        }
    }
}

impl fmt::Debug for LazySavedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySavedState")
            .field("state", &self.state.get())
            .finish()
    }
}

/// Container scoped to a screen.
///
/// Built on first access and registered with the screen's registry right
/// away. Unless `options` say otherwise, an unrestored container starts from
/// the screen's [`SavedStateRegistryOwner::default_arguments`].
pub fn for_screen<O: SavedStateRegistryOwner>(
    owner: &Arc<O>,
    options: SavedStateOptions,
) -> LazySavedState {
    lazy_for_owner("screen", owner, options)
}

/// Container scoped to a sub-screen, defaulting to its arguments.
pub fn for_sub_screen<O: SavedStateRegistryOwner>(
    owner: &Arc<O>,
    options: SavedStateOptions,
) -> LazySavedState {
    lazy_for_owner("sub-screen", owner, options)
}

fn lazy_for_owner<O: SavedStateRegistryOwner>(
    _scope: &'static str,
    owner: &Arc<O>,
    options: SavedStateOptions,
) -> LazySavedState {
    let owner: Weak<O> = Arc::downgrade(owner);
    let key = options.key_or_default().to_string();

    let default_bundle = options.default_bundle.unwrap_or_else(|| {
        let owner = owner.clone();
        Arc::new(move || owner.upgrade()?.default_arguments())
    });

    LazySavedState::new(move || {
        let owner: SharedOwner = owner.upgrade().ok_or_else(|| Error::UnresolvableOwner {
            key: key.clone(),
        })?;

        let state = SavedState::from_parts(
            OwnerRef::from_owner(&owner),
            key.clone(),
            Some(default_bundle.clone()),
        );
        state.register_saved_state_provider()?;

        trace!("built {_scope} saved state '{key}'");
        Ok(state)
    })
}

/// Container scoped to a widget.
///
/// The key is suffixed with the widget's id so sibling widgets on one owner do
/// not collide. The owner is looked up through the widget's ancestors until
/// found, and the container registers itself once the widget is attached.
/// Reading the bundle before that fails with [`Error::UnresolvableOwner`].
pub fn for_widget<W: Widget>(widget: &Arc<W>, options: SavedStateOptions) -> SavedState {
    let key = widget_key(options.key_or_default(), widget.id());

    let resolver = {
        let widget = Arc::downgrade(widget);
        move || widget.upgrade()?.find_registry_owner()
    };

    let state = SavedState::from_parts(OwnerRef::new(resolver), key, options.default_bundle);

    widget.do_on_attach(Box::new({
        let state = state.clone();
        move || {
            if let Err(_e) = state.register_saved_state_provider() {
                error!("failed to register widget saved state '{}': {_e}", state.key());
            }
        }
    }));

    state
}

pub(crate) fn read(bundle: &SharedBundle) -> RwLockReadGuard<'_, Bundle> {
    bundle.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write(bundle: &SharedBundle) -> RwLockWriteGuard<'_, Bundle> {
    bundle.write().unwrap_or_else(PoisonError::into_inner)
}
