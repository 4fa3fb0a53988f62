//! Shared constants and crate-internal logging macros.

/// Namespaced key a container is registered under unless the caller overrides it.
pub const DEFAULT_KEY: &str = "saved_state::SavedState::Key";

/// Key the recreation task ids are saved under inside an owner's snapshot.
pub const RECREATOR_KEY: &str = "saved_state::Recreator";

/// Key of a widget scoped container, disambiguated by the widget's runtime id.
pub fn widget_key(key: &str, widget_id: impl std::fmt::Display) -> String {
    format!("{key}@{widget_id}")
}

macro_rules! trace {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::trace!($($arg)*);}
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::debug!($($arg)*);}
    };
}

macro_rules! warn_ {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::warn!($($arg)*);}
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::error!($($arg)*);}
    };
}

// `warn` alone clashes with the builtin lint attribute.
pub(crate) use warn_ as warn;
pub(crate) use {debug, error, trace};
