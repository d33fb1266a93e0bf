//! Object-key encoding for coordinate values.
//!
//! JSON field names are strings, so a coordinate type needs a string form to appear as a
//! key. [`KeySerializer`] produces that form for primitives, newtypes and unit variants.
//! [`KeyDeserializer`] reverses it, parsing numbers and booleans out of the field name.

use std::fmt;
use std::marker::PhantomData;

use serde::de::value::StrDeserializer;
use serde::de::{self, IntoDeserializer, Visitor};
use serde::ser::{self, Impossible};
use serde::{Deserialize, Serialize, forward_to_deserialize_any};
use thiserror::Error;
use tn_core::{Coordinate, CoordinateType, DimensionType};

use crate::TokenKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key has no string form")]
    Structured,
    #[error("expected {expected} but was {found}")]
    Shape { expected: TokenKind, found: TokenKind },
    #[error("cannot parse {raw:?} as {expected}")]
    Unparsable { expected: &'static str, raw: String },
    #[error("coordinate of dimension {found} given to the {expected} key codec")]
    WrongDimension {
        expected: DimensionType,
        found: DimensionType,
    },
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for KeyError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl de::Error for KeyError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// A coordinate encoded for an object level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedKey {
    Name(String),
    /// The key has no string form. `fallback` is its debug rendering, used as a field name
    /// when complex map keys are disabled. Such names do not read back.
    Structured { fallback: String },
}

/// Reads and writes the coordinates of one dimension.
pub trait KeyCodec: fmt::Debug + Send + Sync {
    fn dimension(&self) -> DimensionType;

    fn encode(&self, key: &Coordinate) -> Result<EncodedKey, KeyError>;

    /// The key as a full JSON value, for levels written as key/value pairs.
    fn encode_value(&self, key: &Coordinate) -> Result<serde_json::Value, KeyError>;

    fn decode_name(&self, name: &str) -> Result<Coordinate, KeyError>;

    fn decode_value(&self, value: serde_json::Value) -> Result<Coordinate, KeyError>;
}

pub struct SerdeKeyCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeKeyCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeKeyCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CoordinateType> fmt::Debug for SerdeKeyCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeKeyCodec")
            .field("dimension", &DimensionType::of::<T>())
            .finish()
    }
}

impl<T> SerdeKeyCodec<T>
where
    T: CoordinateType,
{
    fn typed<'k>(&self, key: &'k Coordinate) -> Result<&'k T, KeyError> {
        key.downcast_ref::<T>().ok_or(KeyError::WrongDimension {
            expected: DimensionType::of::<T>(),
            found: key.dimension(),
        })
    }
}

impl<T> KeyCodec for SerdeKeyCodec<T>
where
    T: CoordinateType + Serialize + for<'de> Deserialize<'de>,
{
    fn dimension(&self) -> DimensionType {
        DimensionType::of::<T>()
    }

    fn encode(&self, key: &Coordinate) -> Result<EncodedKey, KeyError> {
        let value = self.typed(key)?;
        match value.serialize(KeySerializer) {
            Ok(name) => Ok(EncodedKey::Name(name)),
            Err(KeyError::Structured) => Ok(EncodedKey::Structured {
                fallback: format!("{value:?}"),
            }),
            Err(err) => Err(err),
        }
    }

    fn encode_value(&self, key: &Coordinate) -> Result<serde_json::Value, KeyError> {
        serde_json::to_value(self.typed(key)?).map_err(|err| KeyError::Custom(err.to_string()))
    }

    fn decode_name(&self, name: &str) -> Result<Coordinate, KeyError> {
        T::deserialize(KeyDeserializer::new(name)).map(Coordinate::new)
    }

    fn decode_value(&self, value: serde_json::Value) -> Result<Coordinate, KeyError> {
        if let serde_json::Value::String(name) = &value {
            return self.decode_name(name);
        }
        serde_json::from_value::<T>(value)
            .map(Coordinate::new)
            .map_err(|err| KeyError::Custom(err.to_string()))
    }
}

/// Serializes a key to its field name. Anything without a string form is
/// [`KeyError::Structured`].
#[derive(Debug, Clone, Copy)]
pub struct KeySerializer;

macro_rules! display_keys {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<String, KeyError> {
                Ok(v.to_string())
            }
        )*
    };
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = KeyError;
    type SerializeSeq = Impossible<String, KeyError>;
    type SerializeTuple = Impossible<String, KeyError>;
    type SerializeTupleStruct = Impossible<String, KeyError>;
    type SerializeTupleVariant = Impossible<String, KeyError>;
    type SerializeMap = Impossible<String, KeyError>;
    type SerializeStruct = Impossible<String, KeyError>;
    type SerializeStructVariant = Impossible<String, KeyError>;

    display_keys! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
    }

    fn serialize_str(self, v: &str) -> Result<String, KeyError> {
        Ok(v.to_owned())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_none(self) -> Result<String, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<String, KeyError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<String, KeyError> {
        Ok(name.to_owned())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, KeyError> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, KeyError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, KeyError> {
        Err(KeyError::Structured)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, KeyError> {
        Err(KeyError::Structured)
    }
}

/// Deserializes a key from a field name.
#[derive(Debug, Clone, Copy)]
pub struct KeyDeserializer<'de> {
    name: &'de str,
}

impl<'de> KeyDeserializer<'de> {
    #[must_use]
    pub fn new(name: &'de str) -> Self {
        Self { name }
    }

    fn parse<T: std::str::FromStr>(&self, expected: &'static str) -> Result<T, KeyError> {
        self.name.parse().map_err(|_| KeyError::Unparsable {
            expected,
            raw: self.name.to_owned(),
        })
    }

    fn shape(expected: TokenKind) -> KeyError {
        KeyError::Shape {
            expected,
            found: TokenKind::String,
        }
    }
}

macro_rules! parsed_keys {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, KeyError> {
                visitor.$visit(self.parse::<$ty>(stringify!($ty))?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for KeyDeserializer<'de> {
    type Error = KeyError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, KeyError> {
        visitor.visit_borrowed_str(self.name)
    }

    parsed_keys! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
        deserialize_char => visit_char: char,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, KeyError> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::Null))
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, KeyError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, KeyError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::BeginArray))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::BeginArray))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::BeginArray))
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::BeginObject))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, KeyError> {
        Err(Self::shape(TokenKind::BeginObject))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, KeyError> {
        let variant: StrDeserializer<'_, KeyError> = self.name.into_deserializer();
        visitor.visit_enum(variant)
    }

    forward_to_deserialize_any! {
        str string bytes byte_buf identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tn_core::{Coordinate, CoordinateType, DimensionType};

    use super::{EncodedKey, KeyCodec, KeyError, SerdeKeyCodec};
    use crate::TokenKind;

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Pair {
        a: String,
        b: String,
    }

    impl CoordinateType for Pair {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum Side {
        Left,
        Right,
    }

    impl CoordinateType for Side {}

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Label(String);

    impl CoordinateType for Label {}

    fn pair(a: &str, b: &str) -> Coordinate {
        Coordinate::new(Pair {
            a: a.to_string(),
            b: b.to_string(),
        })
    }

    #[test]
    fn primitives_encode_to_names() {
        let ints = SerdeKeyCodec::<i32>::new();
        assert_eq!(
            ints.encode(&Coordinate::new(-7i32)).expect("i32 key"),
            EncodedKey::Name("-7".to_string())
        );
        let flags = SerdeKeyCodec::<bool>::new();
        assert_eq!(
            flags.encode(&Coordinate::new(true)).expect("bool key"),
            EncodedKey::Name("true".to_string())
        );
        let labels = SerdeKeyCodec::<Label>::new();
        assert_eq!(
            labels
                .encode(&Coordinate::new(Label("x".to_string())))
                .expect("newtype key"),
            EncodedKey::Name("x".to_string())
        );
    }

    #[test]
    fn names_decode_to_typed_coordinates() {
        let ints = SerdeKeyCodec::<i32>::new();
        assert_eq!(ints.decode_name("12").expect("numeric name"), Coordinate::new(12i32));
        let sides = SerdeKeyCodec::<Side>::new();
        assert_eq!(sides.decode_name("Right").expect("variant name"), Coordinate::new(Side::Right));
        let labels = SerdeKeyCodec::<Label>::new();
        assert_eq!(
            labels.decode_name("x").expect("newtype name"),
            Coordinate::new(Label("x".to_string()))
        );
        let chars = SerdeKeyCodec::<char>::new();
        assert_eq!(chars.decode_name("q").expect("char name"), Coordinate::new('q'));
    }

    #[test]
    fn unparsable_names_are_reported() {
        let ints = SerdeKeyCodec::<i32>::new();
        let err = ints.decode_name("x").expect_err("x is not an i32");
        assert_eq!(
            err,
            KeyError::Unparsable {
                expected: "i32",
                raw: "x".to_string()
            }
        );

        let sides = SerdeKeyCodec::<Side>::new();
        let err = sides.decode_name("Up").expect_err("Up is not a variant");
        assert!(matches!(err, KeyError::Custom(message) if message.contains("unknown variant")));
    }

    #[test]
    fn records_have_no_string_form() {
        let codec = SerdeKeyCodec::<Pair>::new();
        let encoded = codec.encode(&pair("a1", "b1")).expect("structured key");
        assert!(matches!(encoded, EncodedKey::Structured { ref fallback } if fallback.contains("a1")));

        let err = codec.decode_name("a1").expect_err("records are not names");
        assert_eq!(
            err,
            KeyError::Shape {
                expected: TokenKind::BeginObject,
                found: TokenKind::String
            }
        );
        assert_eq!(err.to_string(), "expected BEGIN_OBJECT but was STRING");
    }

    #[test]
    fn records_round_trip_as_values() {
        let codec = SerdeKeyCodec::<Pair>::new();
        let value = codec.encode_value(&pair("a2", "b2")).expect("record value");
        assert_eq!(value, json!({"a": "a2", "b": "b2"}));
        assert_eq!(codec.decode_value(value).expect("record"), pair("a2", "b2"));

        let ints = SerdeKeyCodec::<i32>::new();
        assert_eq!(ints.decode_value(json!(3)).expect("number"), Coordinate::new(3i32));
        assert_eq!(ints.decode_value(json!("3")).expect("numeric string"), Coordinate::new(3i32));
    }

    #[test]
    fn foreign_coordinates_are_refused() {
        let codec = SerdeKeyCodec::<String>::new();
        let err = codec.encode(&Coordinate::new(1i32)).expect_err("i32 into String codec");
        assert_eq!(
            err,
            KeyError::WrongDimension {
                expected: DimensionType::of::<String>(),
                found: DimensionType::of::<i32>()
            }
        );
    }
}
