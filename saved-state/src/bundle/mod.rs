//! The opaque key-value store a container persists into.

pub mod capability;
pub mod value;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Serialize, de::DeserializeOwned};

// Re-exports
pub use capability::{Parcelable, ParcelableEntry, Serializable, SerializableEntry};
pub use value::{Binder, Serialized, Size, SizeF, Value, ValueKind};

/// String keyed store of [`Value`]s, handed to the owner's registry at save time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    entries: FxHashMap<String, Value>,
}

/// Builds a [`Bundle`] from `key => value` pairs, converting values with `Value::from`.
///
/// ```
/// let bundle = saved_state::bundle! { "count" => 3i32, "title" => "home" };
/// assert_eq!(bundle.get_int("count"), Some(3));
/// ```
#[macro_export]
macro_rules! bundle {
    () => {
        $crate::bundle::Bundle::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut bundle = $crate::bundle::Bundle::new();
        $(bundle.put($key, $crate::bundle::Value::from($value));)+
        bundle
    }};
}

macro_rules! scalar_accessors {
    ($($variant:ident($ty:ty) => $put:ident, $get:ident, $get_or:ident;)*) => {
        $(
            pub fn $put(&mut self, key: impl Into<String>, value: $ty) {
                self.put(key, Value::$variant(value));
            }

            pub fn $get(&self, key: &str) -> Option<$ty> {
                match self.entries.get(key) {
                    Some(Value::$variant(v)) => Some(*v),
                    _ => None,
                }
            }

            pub fn $get_or(&self, key: &str, default: $ty) -> $ty {
                self.$get(key).unwrap_or(default)
            }
        )*
    };
}

macro_rules! array_accessors {
    ($($variant:ident($elem:ty) => $put:ident, $get:ident;)*) => {
        $(
            pub fn $put(&mut self, key: impl Into<String>, value: impl Into<Vec<$elem>>) {
                self.put(key, Value::$variant(value.into()));
            }

            pub fn $get(&self, key: &str) -> Option<&[$elem]> {
                match self.entries.get(key) {
                    Some(Value::$variant(v)) => Some(v.as_slice()),
                    _ => None,
                }
            }
        )*
    };
}

// Implementations

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Type-erased read.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Stores `value`, returning the previous entry under `key`.
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn put_all(&mut self, other: Bundle) {
        self.entries.extend(other.entries);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    scalar_accessors! {
        Bool(bool) => put_bool, get_bool, get_bool_or;
        Double(f64) => put_double, get_double, get_double_or;
        Int(i32) => put_int, get_int, get_int_or;
        Long(i64) => put_long, get_long, get_long_or;
        Byte(i8) => put_byte, get_byte, get_byte_or;
        Char(char) => put_char, get_char, get_char_or;
        Float(f32) => put_float, get_float, get_float_or;
        Short(i16) => put_short, get_short, get_short_or;
        Size(Size) => put_size, get_size, get_size_or;
        SizeF(SizeF) => put_size_f, get_size_f, get_size_f_or;
    }

    array_accessors! {
        BoolArray(bool) => put_bool_array, get_bool_array;
        DoubleArray(f64) => put_double_array, get_double_array;
        IntArray(i32) => put_int_array, get_int_array;
        LongArray(i64) => put_long_array, get_long_array;
        ByteArray(u8) => put_byte_array, get_byte_array;
        CharArray(char) => put_char_array, get_char_array;
        FloatArray(f32) => put_float_array, get_float_array;
        ShortArray(i16) => put_short_array, get_short_array;
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Value::String(value.into()));
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Value::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_string(key).unwrap_or(default)
    }

    pub fn put_char_sequence(&mut self, key: impl Into<String>, value: impl Into<Arc<str>>) {
        self.put(key, Value::CharSequence(value.into()));
    }

    /// Reads a char sequence; a plain string is a char sequence too.
    pub fn get_char_sequence(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Value::CharSequence(v)) => Some(&**v),
            Some(Value::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn put_binder(&mut self, key: impl Into<String>, value: Binder) {
        self.put(key, Value::Binder(value));
    }

    pub fn get_binder(&self, key: &str) -> Option<&Binder> {
        match self.entries.get(key) {
            Some(Value::Binder(v)) => Some(v),
            _ => None,
        }
    }

    pub fn put_bundle(&mut self, key: impl Into<String>, value: Bundle) {
        self.put(key, Value::Bundle(value));
    }

    pub fn get_bundle(&self, key: &str) -> Option<&Bundle> {
        match self.entries.get(key) {
            Some(Value::Bundle(v)) => Some(v),
            _ => None,
        }
    }

    pub fn put_parcelable<T: Parcelable>(&mut self, key: impl Into<String>, value: T) {
        self.put(key, Value::Parcelable(Arc::new(value)));
    }

    pub fn get_parcelable<T: Parcelable>(&self, key: &str) -> Option<&T> {
        match self.entries.get(key) {
            Some(Value::Parcelable(v)) => v.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn put_serializable<T: Serialize + 'static>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), postcard::Error> {
        self.put(key, Value::Serializable(Serialized::encode(value)?));
        Ok(())
    }

    pub fn get_serializable<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, postcard::Error> {
        match self.entries.get(key) {
            Some(Value::Serializable(v)) => v.decode::<T>(),
            _ => Ok(None),
        }
    }
}

impl FromIterator<(String, Value)> for Bundle {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Bundle {
    type Item = (String, Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors_check_variant() {
        let mut bundle = Bundle::new();
        bundle.put_int("count", 3);
        bundle.put_long("big", 3);

        assert_eq!(bundle.get_int("count"), Some(3));
        assert_eq!(bundle.get_int("big"), None);
        assert_eq!(bundle.get_int_or("missing", 9), 9);
        assert_eq!(bundle.get_long_or("big", 0), 3);
    }

    #[test]
    fn test_arrays_and_strings() {
        let mut bundle = Bundle::new();
        bundle.put_int_array("ids", vec![1, 2, 3]);
        bundle.put_byte_array("raw", b"abc".to_vec());
        bundle.put_string("title", "home");
        bundle.put_char_sequence("label", "tab");

        assert_eq!(bundle.get_int_array("ids"), Some(&[1, 2, 3][..]));
        assert_eq!(bundle.get_byte_array("raw"), Some(&b"abc"[..]));
        assert_eq!(bundle.get_string("title"), Some("home"));
        assert_eq!(bundle.get_string("label"), None);
        assert_eq!(bundle.get_char_sequence("label"), Some("tab"));
        assert_eq!(bundle.get_char_sequence("title"), Some("home"));
        assert_eq!(bundle.get_string_or("missing", "none"), "none");
    }

    #[test]
    fn test_nested_bundle_and_serializable() {
        let mut inner = Bundle::new();
        inner.put_bool("flag", true);

        let mut bundle = Bundle::new();
        bundle.put_bundle("inner", inner.clone());
        bundle
            .put_serializable("pair", &(4u32, "four".to_string()))
            .unwrap();

        assert_eq!(bundle.get_bundle("inner"), Some(&inner));
        assert_eq!(
            bundle.get_serializable::<(u32, String)>("pair").unwrap(),
            Some((4, "four".to_string()))
        );
        assert_eq!(bundle.get_serializable::<u64>("pair").unwrap(), None);
    }

    #[test]
    fn test_bundle_macro_and_bulk_ops() {
        let mut bundle = crate::bundle! {
            "count" => 1i32,
            "name" => "a",
        };
        assert_eq!(bundle.len(), 2);

        bundle.put_all(crate::bundle! { "count" => 2i32, "size" => Size::new(3, 4) });
        assert_eq!(bundle.get_int("count"), Some(2));
        assert_eq!(bundle.get_size("size"), Some(Size::new(3, 4)));

        assert_eq!(bundle.remove("name"), Some(Value::from("a")));
        assert!(!bundle.contains_key("name"));

        bundle.clear();
        assert!(bundle.is_empty());
    }
}
