//! Typed views over a single key of a container's bundle.

pub mod dispatch;

use std::{
    any::{Any, type_name},
    fmt::{self, Debug},
};

use crate::{
    bundle::Bundle,
    container::{SavedState, read, write},
    error::Error,
};

/// Types a plain typed property can hold.
///
/// Holding is not the same as storing: writes still go through the dispatch
/// table and fail for types it does not cover.
pub trait PropertyValue: Any + Clone + Debug + Send + Sync {}

impl<T: Any + Clone + Debug + Send + Sync> PropertyValue for T {}

/// Property whose storage form is picked by the dispatch table.
///
/// The declared name is the bundle key. Two properties of one container
/// must not share a name.
pub struct Property<T> {
    state: SavedState,
    name: String,
    default: Option<T>,
}

type Decode<T> = Box<dyn Fn(&Bundle, &str) -> T + Send + Sync>;
type Encode<T> = Box<dyn Fn(&mut Bundle, &str, T) + Send + Sync>;

/// Property stored through caller supplied codec functions.
pub struct CustomProperty<T> {
    state: SavedState,
    name: String,
    decode: Decode<T>,
    encode: Encode<T>,
}

pub struct ReadOnlyProperty<T> {
    state: SavedState,
    name: String,
    decode: Decode<T>,
}

// Implementations

impl<T: PropertyValue> Property<T> {
    pub(crate) fn new(state: SavedState, name: String, default: Option<T>) -> Self {
        Self {
            state,
            name,
            default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored value, or the default when absent.
    ///
    /// A stored value of another type is an error, never coerced.
    pub fn get_opt(&self) -> Result<Option<T>, Error> {
        let bundle = self.state.try_bundle()?;
        let bundle = read(&bundle);

        let Some(value) = bundle.get(&self.name) else {
            return Ok(self.default.clone());
        };

        match value.cast::<T>()? {
            Some(value) => Ok(Some(value)),
            None => Err(Error::TypeMismatch {
                name: self.name.clone(),
                expected: type_name::<T>(),
                found: value.kind().name(),
            }),
        }
    }

    /// Like [`Property::get_opt`], failing with [`Error::MissingValue`] when
    /// there is neither a value nor a default.
    pub fn get(&self) -> Result<T, Error> {
        self.get_opt()?.ok_or_else(|| Error::MissingValue {
            name: self.name.clone(),
        })
    }

    pub fn set(&self, value: T) -> Result<(), Error> {
        let value = dispatch::to_value(&self.name, &value)?;
        let bundle = self.state.try_bundle()?;

        write(&bundle).put(self.name.clone(), value);
        Ok(())
    }

    /// Reads, transforms and writes back, returning the new value.
    ///
    /// Not atomic with respect to other writers of the same key.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<T, Error> {
        let next = f(self.get()?);
        self.set(next.clone())?;
        Ok(next)
    }
}

impl<T> Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .field("key", &self.state.key())
            .finish()
    }
}

impl<T> CustomProperty<T> {
    pub(crate) fn new(
        state: SavedState,
        name: String,
        decode: Decode<T>,
        encode: Encode<T>,
    ) -> Self {
        Self {
            state,
            name,
            decode,
            encode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Result<T, Error> {
        let bundle = self.state.try_bundle()?;
        let bundle = read(&bundle);

        Ok((self.decode)(&bundle, &self.name))
    }

    pub fn set(&self, value: T) -> Result<(), Error> {
        let bundle = self.state.try_bundle()?;
        (self.encode)(&mut write(&bundle), &self.name, value);

        Ok(())
    }
}

impl<T> Debug for CustomProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomProperty")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T> ReadOnlyProperty<T> {
    pub(crate) fn new(state: SavedState, name: String, decode: Decode<T>) -> Self {
        Self {
            state,
            name,
            decode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Result<T, Error> {
        let bundle = self.state.try_bundle()?;
        let bundle = read(&bundle);

        Ok((self.decode)(&bundle, &self.name))
    }
}

impl<T> Debug for ReadOnlyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyProperty")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .finish()
    }
}
