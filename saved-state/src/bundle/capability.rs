//! Runtime capability registries for the two open-ended dispatch cases.
//!
//! A plain typed property only knows its value as `dyn Any`, so "is this
//! parcelable" or "is this serializable" can not be answered by the type
//! system at the write site. Types opt in through `#[derive(Parcelable)]` or
//! `#[derive(Serializable)]`, which submit an entry here.

use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::{Arc, LazyLock},
};

use rustc_hash::FxHashMap;
use serde::{Serialize, de::DeserializeOwned};

use crate::bundle::Serialized;

/// A host object stored in a bundle by reference.
///
/// Usually derived; a manual implementation must also submit a
/// [`ParcelableEntry`] for plain typed properties to recognise the type.
pub trait Parcelable: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// A value stored in a bundle in flattened `postcard` form.
pub trait Serializable: Serialize + DeserializeOwned + Any + Send + Sync {}

pub struct ParcelableEntry {
    type_id: fn() -> TypeId,
    wrap: fn(&dyn Any) -> Option<Arc<dyn Parcelable>>,
}

pub struct SerializableEntry {
    type_id: fn() -> TypeId,
    encode: fn(&dyn Any) -> Option<Result<Serialized, postcard::Error>>,
    decode: fn(&Serialized) -> Result<Option<Box<dyn Any>>, postcard::Error>,
}

inventory::collect!(ParcelableEntry);
inventory::collect!(SerializableEntry);

static PARCELABLES: LazyLock<FxHashMap<TypeId, &'static ParcelableEntry>> = LazyLock::new(|| {
    inventory::iter::<ParcelableEntry>
        .into_iter()
        .map(|entry| ((entry.type_id)(), entry))
        .collect()
});

static SERIALIZABLES: LazyLock<FxHashMap<TypeId, &'static SerializableEntry>> =
    LazyLock::new(|| {
        inventory::iter::<SerializableEntry>
            .into_iter()
            .map(|entry| ((entry.type_id)(), entry))
            .collect()
    });

// Implementations

impl ParcelableEntry {
    pub const fn of<T: Parcelable + Clone>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            wrap: wrap_parcelable::<T>,
        }
    }
}

impl SerializableEntry {
    pub const fn of<T: Serializable>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            encode: encode_serializable::<T>,
            decode: decode_serializable::<T>,
        }
    }
}

pub fn is_parcelable(type_id: TypeId) -> bool {
    PARCELABLES.contains_key(&type_id)
}

pub fn is_serializable(type_id: TypeId) -> bool {
    SERIALIZABLES.contains_key(&type_id)
}

pub(crate) fn as_parcelable(value: &dyn Any) -> Option<Arc<dyn Parcelable>> {
    PARCELABLES
        .get(&value.type_id())
        .and_then(|entry| (entry.wrap)(value))
}

pub(crate) fn as_serialized(value: &dyn Any) -> Option<Result<Serialized, postcard::Error>> {
    SERIALIZABLES
        .get(&value.type_id())
        .and_then(|entry| (entry.encode)(value))
}

pub(crate) fn deserialize_as<T: Any>(
    serialized: &Serialized,
) -> Result<Option<T>, postcard::Error> {
    let Some(entry) = SERIALIZABLES.get(&TypeId::of::<T>()) else {
        return Ok(None);
    };

    Ok((entry.decode)(serialized)?
        .and_then(|decoded| decoded.downcast::<T>().ok())
        .map(|decoded| *decoded))
}

fn wrap_parcelable<T: Parcelable + Clone>(value: &dyn Any) -> Option<Arc<dyn Parcelable>> {
    value
        .downcast_ref::<T>()
        .map(|v| Arc::new(v.clone()) as Arc<dyn Parcelable>)
}

fn encode_serializable<T: Serializable>(
    value: &dyn Any,
) -> Option<Result<Serialized, postcard::Error>> {
    value.downcast_ref::<T>().map(Serialized::encode)
}

fn decode_serializable<T: Serializable>(
    serialized: &Serialized,
) -> Result<Option<Box<dyn Any>>, postcard::Error> {
    Ok(serialized
        .decode::<T>()?
        .map(|decoded| Box::new(decoded) as Box<dyn Any>))
}
