//! Lifecycle-bound saved state for UI components.
//!
//! A component (screen, sub-screen or widget) declares a [`SavedState`]
//! container and typed properties on top of it. The container is restored
//! from the owner's previous snapshot, seeded from a default, or starts empty,
//! and is offered back to the owner's registry every time it saves.
//!
//! ```
//! use saved_state::{host::Host, prelude::*};
//!
//! let screen = Host::launch(None);
//! screen.create();
//!
//! let state = saved_state::for_screen(&screen, SavedStateOptions::default());
//! let count = state.property_or("count", 0i32);
//! count.set(count.get().unwrap() + 1).unwrap();
//!
//! let saved = screen.save();
//! screen.destroy();
//!
//! let recreated = Host::recreate(saved, None);
//! recreated.create();
//!
//! let state = saved_state::for_screen(&recreated, SavedStateOptions::default());
//! assert_eq!(state.property_or("count", 0i32).get().unwrap(), 1);
//! ```

extern crate self as saved_state;

pub mod base;
pub mod bundle;
pub mod container;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod owner;
pub mod property;
pub mod recreation;
pub mod registry;

// Re-exports

pub use crate::container::{
    LazySavedState, SavedState, SavedStateOptions, SharedBundle, for_screen, for_sub_screen,
    for_widget,
};

pub mod prelude {
    pub use crate::bundle::{Binder, Bundle, Parcelable, Serializable, Size, SizeF, Value};
    pub use crate::container::{LazySavedState, SavedState, SavedStateOptions};
    pub use crate::error::Error;
    pub use crate::lifecycle::{Event, Lifecycle, State};
    pub use crate::owner::{SavedStateRegistryOwner, Widget};
    pub use crate::property::{CustomProperty, Property, ReadOnlyProperty};
    pub use crate::recreation::{RecreationExt, RecreationTask, run_on_next_recreation};
    pub use crate::registry::SavedStateRegistry;

    #[cfg(feature = "macros")]
    pub use saved_state_macros::{Parcelable, Serializable, recreation_task};
}

#[doc(hidden)]
pub mod __private {
    pub use inventory;
    pub use uuid;
}
