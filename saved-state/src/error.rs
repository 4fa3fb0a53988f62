use thiserror::Error;

/// Contract violations reported by containers, properties and registries.
///
/// None of these are transient; they point at a mistake in the calling
/// component and are reported at the offending access.
#[derive(Debug, Error)]
pub enum Error {
    /// The owner of a container could not be resolved, e.g. a widget scoped
    /// container read before the widget was attached.
    #[error("owner of saved state '{key}' is not resolvable yet")]
    UnresolvableOwner { key: String },

    /// A plain typed property was written with a value outside the dispatch table.
    #[error(
        "can't set the property({name})'s value({value}); use property_with(name, decode, encode) instead"
    )]
    UnsupportedPropertyType { name: String, value: String },

    /// The stored value can not be read as the property's declared type.
    #[error("property({name}) holds a {found} value, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A plain typed property without a default was read before any write.
    #[error("property({name}) has no value and no default")]
    MissingValue { name: String },

    /// Another provider is already registered under this key on the same owner.
    #[error("saved state provider with key '{key}' is already registered")]
    ProviderRegistrationConflict { key: String },

    /// The registry refuses new recreation tasks while the owner is not started.
    #[error("can not schedule a recreation task while the registry is not allowing saving state")]
    SavingStateNotAllowed,

    #[error("failed to encode serializable value: {0}")]
    Serialize(#[from] postcard::Error),
}
