//! Ordered type-dispatch table for plain typed property writes.
//!
//! Cases are tried top to bottom and the first match wins, so a type
//! registered both as parcelable and as serializable is stored as parcelable.

use std::{
    any::Any,
    borrow::Cow,
    fmt::Debug,
    sync::Arc,
};

use crate::{
    base::trace,
    bundle::{Binder, Bundle, Size, SizeF, Value, ValueKind, capability},
    error::Error,
};

type Convert = fn(&dyn Any) -> Option<Result<Value, postcard::Error>>;

struct Case {
    kind: ValueKind,
    convert: Convert,
}

/// The byte case is a signed `i8` while byte arrays are raw `Vec<u8>`, so a
/// `Vec<i8>` matches no case.
static DISPATCH: [Case; 24] = [
    Case { kind: ValueKind::Bool, convert: exact::<bool> },
    Case { kind: ValueKind::BoolArray, convert: exact::<Vec<bool>> },
    Case { kind: ValueKind::Double, convert: exact::<f64> },
    Case { kind: ValueKind::DoubleArray, convert: exact::<Vec<f64>> },
    Case { kind: ValueKind::Int, convert: exact::<i32> },
    Case { kind: ValueKind::IntArray, convert: exact::<Vec<i32>> },
    Case { kind: ValueKind::Long, convert: exact::<i64> },
    Case { kind: ValueKind::LongArray, convert: exact::<Vec<i64>> },
    Case { kind: ValueKind::String, convert: exact::<String> },
    Case { kind: ValueKind::Binder, convert: exact::<Binder> },
    Case { kind: ValueKind::Bundle, convert: exact::<Bundle> },
    Case { kind: ValueKind::Byte, convert: exact::<i8> },
    Case { kind: ValueKind::ByteArray, convert: exact::<Vec<u8>> },
    Case { kind: ValueKind::Char, convert: exact::<char> },
    Case { kind: ValueKind::CharArray, convert: exact::<Vec<char>> },
    Case { kind: ValueKind::CharSequence, convert: char_sequence },
    Case { kind: ValueKind::Float, convert: exact::<f32> },
    Case { kind: ValueKind::FloatArray, convert: exact::<Vec<f32>> },
    Case { kind: ValueKind::Parcelable, convert: parcelable },
    Case { kind: ValueKind::Serializable, convert: serializable },
    Case { kind: ValueKind::Short, convert: exact::<i16> },
    Case { kind: ValueKind::ShortArray, convert: exact::<Vec<i16>> },
    Case { kind: ValueKind::Size, convert: exact::<Size> },
    Case { kind: ValueKind::SizeF, convert: exact::<SizeF> },
];

/// Converts a property value into the bundle variant of the first matching case.
pub(crate) fn to_value<T: Any + Debug>(name: &str, value: &T) -> Result<Value, Error> {
    let erased: &dyn Any = value;

    for case in &DISPATCH {
        if let Some(converted) = (case.convert)(erased) {
            trace!("property({name}) dispatched as {}", case.kind);
            return Ok(converted?);
        }
    }

    Err(Error::UnsupportedPropertyType {
        name: name.to_string(),
        value: format!("{value:?}"),
    })
}

/// The bundle variant a value of this type would be stored as, if any.
pub fn kind_of<T: Any + Debug>(value: &T) -> Option<ValueKind> {
    let erased: &dyn Any = value;

    DISPATCH
        .iter()
        .find(|case| (case.convert)(erased).is_some())
        .map(|case| case.kind)
}

fn exact<T: Any + Clone + Into<Value>>(value: &dyn Any) -> Option<Result<Value, postcard::Error>> {
    value.downcast_ref::<T>().map(|v| Ok(v.clone().into()))
}

fn char_sequence(value: &dyn Any) -> Option<Result<Value, postcard::Error>> {
    let text: Arc<str> = if let Some(v) = value.downcast_ref::<Arc<str>>() {
        v.clone()
    } else if let Some(v) = value.downcast_ref::<Box<str>>() {
        Arc::from(&**v)
    } else if let Some(v) = value.downcast_ref::<Cow<'static, str>>() {
        Arc::from(v.as_ref())
    } else {
        return None;
    };

    Some(Ok(Value::CharSequence(text)))
}

fn parcelable(value: &dyn Any) -> Option<Result<Value, postcard::Error>> {
    capability::as_parcelable(value).map(|v| Ok(Value::Parcelable(v)))
}

fn serializable(value: &dyn Any) -> Option<Result<Value, postcard::Error>> {
    capability::as_serialized(value).map(|v| v.map(Value::Serializable))
}
