use std::{
    any::{Any, TypeId, type_name},
    borrow::Cow,
    fmt,
    sync::Arc,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::bundle::{Bundle, Parcelable, capability};

/// A single entry of a [`Bundle`].
///
/// The variant set is closed; anything else has to be flattened by a custom
/// codec before it can be stored.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    BoolArray(Vec<bool>),
    Double(f64),
    DoubleArray(Vec<f64>),
    Int(i32),
    IntArray(Vec<i32>),
    Long(i64),
    LongArray(Vec<i64>),
    String(String),
    Binder(Binder),
    Bundle(Bundle),
    Byte(i8),
    ByteArray(Vec<u8>),
    Char(char),
    CharArray(Vec<char>),
    CharSequence(Arc<str>),
    Float(f32),
    FloatArray(Vec<f32>),
    Parcelable(Arc<dyn Parcelable>),
    Serializable(Serialized),
    Short(i16),
    ShortArray(Vec<i16>),
    Size(Size),
    SizeF(SizeF),
}

/// Discriminant of a [`Value`], used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    BoolArray,
    Double,
    DoubleArray,
    Int,
    IntArray,
    Long,
    LongArray,
    String,
    Binder,
    Bundle,
    Byte,
    ByteArray,
    Char,
    CharArray,
    CharSequence,
    Float,
    FloatArray,
    Parcelable,
    Serializable,
    Short,
    ShortArray,
    Size,
    SizeF,
}

/// Opaque handle to a host object that is shared, not copied, across a save.
#[derive(Clone)]
pub struct Binder(Arc<dyn Any + Send + Sync>);

/// Integer width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Floating point width and height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

/// A value flattened with `postcard`, tagged with the Rust type it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serialized {
    type_name: &'static str,
    bytes: Vec<u8>,
}

// Implementations

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::BoolArray(_) => ValueKind::BoolArray,
            Value::Double(_) => ValueKind::Double,
            Value::DoubleArray(_) => ValueKind::DoubleArray,
            Value::Int(_) => ValueKind::Int,
            Value::IntArray(_) => ValueKind::IntArray,
            Value::Long(_) => ValueKind::Long,
            Value::LongArray(_) => ValueKind::LongArray,
            Value::String(_) => ValueKind::String,
            Value::Binder(_) => ValueKind::Binder,
            Value::Bundle(_) => ValueKind::Bundle,
            Value::Byte(_) => ValueKind::Byte,
            Value::ByteArray(_) => ValueKind::ByteArray,
            Value::Char(_) => ValueKind::Char,
            Value::CharArray(_) => ValueKind::CharArray,
            Value::CharSequence(_) => ValueKind::CharSequence,
            Value::Float(_) => ValueKind::Float,
            Value::FloatArray(_) => ValueKind::FloatArray,
            Value::Parcelable(_) => ValueKind::Parcelable,
            Value::Serializable(_) => ValueKind::Serializable,
            Value::Short(_) => ValueKind::Short,
            Value::ShortArray(_) => ValueKind::ShortArray,
            Value::Size(_) => ValueKind::Size,
            Value::SizeF(_) => ValueKind::SizeF,
        }
    }

    /// Reads the value back as `T`.
    ///
    /// Returns `Ok(None)` when the stored variant can not produce a `T`. No
    /// numeric or textual coercion is attempted.
    pub fn cast<T: Any + Clone>(&self) -> Result<Option<T>, postcard::Error> {
        let value = match self {
            Value::Bool(v) => clone_as(v),
            Value::BoolArray(v) => clone_as(v),
            Value::Double(v) => clone_as(v),
            Value::DoubleArray(v) => clone_as(v),
            Value::Int(v) => clone_as(v),
            Value::IntArray(v) => clone_as(v),
            Value::Long(v) => clone_as(v),
            Value::LongArray(v) => clone_as(v),
            Value::String(v) => clone_as(v),
            Value::Binder(v) => clone_as(v),
            Value::Bundle(v) => clone_as(v),
            Value::Byte(v) => clone_as(v),
            Value::ByteArray(v) => clone_as(v),
            Value::Char(v) => clone_as(v),
            Value::CharArray(v) => clone_as(v),
            Value::CharSequence(v) => char_sequence_as(v),
            Value::Float(v) => clone_as(v),
            Value::FloatArray(v) => clone_as(v),
            Value::Parcelable(v) => v.as_any().downcast_ref::<T>().cloned(),
            Value::Serializable(v) => return capability::deserialize_as::<T>(v),
            Value::Short(v) => clone_as(v),
            Value::ShortArray(v) => clone_as(v),
            Value::Size(v) => clone_as(v),
            Value::SizeF(v) => clone_as(v),
        };

        Ok(value)
    }
}

fn clone_as<S: Any, T: Any + Clone>(value: &S) -> Option<T> {
    (value as &dyn Any).downcast_ref::<T>().cloned()
}

// Every owned string form the char-sequence case accepts can be rebuilt from the stored text.
fn char_sequence_as<T: Any>(text: &Arc<str>) -> Option<T> {
    let target = TypeId::of::<T>();

    let rebuilt: Box<dyn Any> = if target == TypeId::of::<Arc<str>>() {
        Box::new(text.clone())
    } else if target == TypeId::of::<Box<str>>() {
        Box::new(Box::<str>::from(&**text))
    } else if target == TypeId::of::<Cow<'static, str>>() {
        Box::new(Cow::<'static, str>::Owned(text.to_string()))
    } else {
        return None;
    };

    rebuilt.downcast::<T>().ok().map(|v| *v)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::BoolArray(a), Value::BoolArray(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::DoubleArray(a), Value::DoubleArray(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::IntArray(a), Value::IntArray(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::LongArray(a), Value::LongArray(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binder(a), Value::Binder(b)) => a == b,
            (Value::Bundle(a), Value::Bundle(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::CharArray(a), Value::CharArray(b)) => a == b,
            (Value::CharSequence(a), Value::CharSequence(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::FloatArray(a), Value::FloatArray(b)) => a == b,
            // Parcelables are shared objects, compared by identity
            (Value::Parcelable(a), Value::Parcelable(b)) => Arc::ptr_eq(a, b),
            (Value::Serializable(a), Value::Serializable(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::ShortArray(a), Value::ShortArray(b)) => a == b,
            (Value::Size(a), Value::Size(b)) => a == b,
            (Value::SizeF(a), Value::SizeF(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    Vec<bool> => BoolArray,
    f64 => Double,
    Vec<f64> => DoubleArray,
    i32 => Int,
    Vec<i32> => IntArray,
    i64 => Long,
    Vec<i64> => LongArray,
    String => String,
    Binder => Binder,
    Bundle => Bundle,
    i8 => Byte,
    Vec<u8> => ByteArray,
    char => Char,
    Vec<char> => CharArray,
    Arc<str> => CharSequence,
    f32 => Float,
    Vec<f32> => FloatArray,
    Serialized => Serializable,
    i16 => Short,
    Vec<i16> => ShortArray,
    Size => Size,
    SizeF => SizeF,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::BoolArray => "boolean-array",
            ValueKind::Double => "double",
            ValueKind::DoubleArray => "double-array",
            ValueKind::Int => "integer",
            ValueKind::IntArray => "integer-array",
            ValueKind::Long => "long",
            ValueKind::LongArray => "long-array",
            ValueKind::String => "string",
            ValueKind::Binder => "binder",
            ValueKind::Bundle => "bundle",
            ValueKind::Byte => "byte",
            ValueKind::ByteArray => "byte-array",
            ValueKind::Char => "character",
            ValueKind::CharArray => "character-array",
            ValueKind::CharSequence => "char-sequence",
            ValueKind::Float => "float",
            ValueKind::FloatArray => "float-array",
            ValueKind::Parcelable => "parcelable",
            ValueKind::Serializable => "serializable",
            ValueKind::Short => "short",
            ValueKind::ShortArray => "short-array",
            ValueKind::Size => "size",
            ValueKind::SizeF => "size-float",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Binder {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn Any + Send + Sync>) -> Self {
        Self(object)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Binder {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binder({:p})", Arc::as_ptr(&self.0))
    }
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl SizeF {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Serialized {
    pub fn encode<T: Serialize + 'static>(value: &T) -> Result<Self, postcard::Error> {
        Ok(Self {
            type_name: type_name::<T>(),
            bytes: postcard::to_stdvec(value)?,
        })
    }

    /// Decodes the payload, or `Ok(None)` if it was written from another type.
    pub fn decode<T: DeserializeOwned + 'static>(&self) -> Result<Option<T>, postcard::Error> {
        if self.type_name != type_name::<T>() {
            return Ok(None);
        }

        postcard::from_bytes(&self.bytes).map(Some)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
