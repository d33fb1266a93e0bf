use std::any::type_name;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::{self, DeserializeOwned, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::error::Category;
use tn_core::{Coordinate, DimensionType, Position, Tensor, TensorBuilder, TensorError};
use tn_nest::{Nested, flatten};
use tracing::{debug, trace};

use crate::{
    CodecConfig, CodecError, CodecRegistry, DuplicatePolicy, EncodedKey, KeyCodec, KeyError,
    TokenKind, validate_payload_size,
};

/// Reads and writes tensors over a fixed dimension list.
///
/// Key codecs are resolved once at construction.
pub struct TensorCodec<V> {
    dimensions: Vec<DimensionType>,
    keys: Vec<Arc<dyn KeyCodec>>,
    config: CodecConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V> TensorCodec<V> {
    pub fn new(
        registry: &CodecRegistry,
        dimensions: Vec<DimensionType>,
        config: CodecConfig,
    ) -> Result<Self, CodecError> {
        TensorBuilder::<V>::new(dimensions.clone())?;
        let keys = registry.resolve(&dimensions)?;
        debug!(
            ?dimensions,
            value = type_name::<V>(),
            complex_map_keys = config.complex_map_keys,
            "resolved tensor codec"
        );
        Ok(Self {
            dimensions,
            keys,
            config,
            _value: PhantomData,
        })
    }

    #[must_use]
    pub fn dimensions(&self) -> &[DimensionType] {
        &self.dimensions
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Flattens `tensor` and encodes its keys, ready for any serde serializer.
    pub fn serializable<'a>(&self, tensor: &'a Tensor<V>) -> Result<TensorDocument<'a, V>, CodecError> {
        let root = match flatten(tensor, &self.dimensions)? {
            Some(nested) => Some(self.layout(nested, 0)?),
            None => None,
        };
        Ok(TensorDocument { root })
    }

    pub fn write<W: io::Write>(&self, tensor: &Tensor<V>, writer: W) -> Result<(), CodecError>
    where
        V: Serialize,
    {
        let document = self.serializable(tensor)?;
        if self.config.pretty {
            serde_json::to_writer_pretty(writer, &document)?;
        } else {
            serde_json::to_writer(writer, &document)?;
        }
        trace!(entries = tensor.len(), "wrote tensor");
        Ok(())
    }

    pub fn to_json_string(&self, tensor: &Tensor<V>) -> Result<String, CodecError>
    where
        V: Serialize,
    {
        let document = self.serializable(tensor)?;
        let output = if self.config.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        trace!(entries = tensor.len(), bytes = output.len(), "wrote tensor");
        Ok(output)
    }

    pub fn read<R: io::Read>(&self, reader: R) -> Result<Tensor<V>, CodecError>
    where
        V: DeserializeOwned,
    {
        let mut de = serde_json::Deserializer::from_reader(reader);
        self.read_from(&mut de)
    }

    pub fn read_str(&self, input: &str) -> Result<Tensor<V>, CodecError>
    where
        V: DeserializeOwned,
    {
        validate_payload_size(input.len(), self.config.max_payload_bytes)?;
        let mut de = serde_json::Deserializer::from_str(input);
        self.read_from(&mut de)
    }

    pub fn read_slice(&self, input: &[u8]) -> Result<Tensor<V>, CodecError>
    where
        V: DeserializeOwned,
    {
        validate_payload_size(input.len(), self.config.max_payload_bytes)?;
        let mut de = serde_json::Deserializer::from_slice(input);
        self.read_from(&mut de)
    }

    /// The read descent as a seed, for tensors embedded in larger documents.
    #[must_use]
    pub fn seed(&self) -> TensorSeed<'_, V> {
        TensorSeed { codec: self }
    }

    fn read_from<'de, R>(&self, de: &mut serde_json::Deserializer<R>) -> Result<Tensor<V>, CodecError>
    where
        R: serde_json::de::Read<'de>,
        V: Deserialize<'de>,
    {
        let mut state = ReadState::new(self)?;
        let outcome = TopSeed { state: &mut state }
            .deserialize(&mut *de)
            .and_then(|()| de.end());
        match outcome {
            Ok(()) => {
                let tensor = state.builder.build();
                trace!(entries = tensor.len(), "read tensor");
                Ok(tensor)
            }
            Err(err) => Err(read_error::<V>(state.failure, err)),
        }
    }

    fn layout<'a>(&self, node: Nested<&'a V>, level: usize) -> Result<Level<'a, V>, CodecError> {
        let map = match node {
            Nested::Value(value) => return Ok(Level::Value(value)),
            Nested::Map(map) => map,
        };
        // flatten nests exactly one level per dimension
        let codec = &self.keys[level];

        let mut encoded = Vec::with_capacity(map.len());
        let mut structured = false;
        for (key, child) in map {
            let name = codec.encode(&key).map_err(|err| encode_error(codec.as_ref(), err))?;
            structured |= matches!(name, EncodedKey::Structured { .. });
            encoded.push((key, name, self.layout(child, level + 1)?));
        }

        if structured && self.config.complex_map_keys {
            let pairs = encoded
                .into_iter()
                .map(|(key, _, child)| {
                    let value = codec
                        .encode_value(&key)
                        .map_err(|err| encode_error(codec.as_ref(), err))?;
                    Ok((value, child))
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            return Ok(Level::Pairs(pairs));
        }

        let fields = encoded
            .into_iter()
            .map(|(_, name, child)| match name {
                EncodedKey::Name(name) | EncodedKey::Structured { fallback: name } => (name, child),
            })
            .collect();
        Ok(Level::Object(fields))
    }
}

impl<V> fmt::Debug for TensorCodec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorCodec")
            .field("dimensions", &self.dimensions)
            .field("value", &type_name::<V>())
            .field("config", &self.config)
            .finish()
    }
}

fn encode_error(codec: &dyn KeyCodec, err: KeyError) -> CodecError {
    CodecError::TypeMismatch {
        expected: match err {
            KeyError::WrongDimension { expected, .. } => expected.name(),
            _ => codec.dimension().name(),
        },
    }
}

/// A flattened tensor with encoded keys.
pub struct TensorDocument<'a, V> {
    root: Option<Level<'a, V>>,
}

enum Level<'a, V> {
    Value(&'a V),
    Object(Vec<(String, Level<'a, V>)>),
    Pairs(Vec<(serde_json::Value, Level<'a, V>)>),
}

impl<V: Serialize> Serialize for TensorDocument<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.root {
            Some(level) => level.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl<V: Serialize> Serialize for Level<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(value) => value.serialize(serializer),
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, child) in fields {
                    map.serialize_entry(name, child)?;
                }
                map.end()
            }
            Self::Pairs(pairs) => {
                let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                for pair in pairs {
                    seq.serialize_element(pair)?;
                }
                seq.end()
            }
        }
    }
}

enum Failure {
    Shape { expected: TokenKind, found: TokenKind },
    Undecodable { target: &'static str, reason: String },
    Duplicate(Position),
    Tensor(TensorError),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape { expected, found } => write!(f, "expected {expected} but was {found}"),
            Self::Undecodable { target, reason } => write!(f, "cannot read {target}: {reason}"),
            Self::Duplicate(position) => write!(f, "duplicate coordinate {position:?}"),
            Self::Tensor(err) => write!(f, "{err}"),
        }
    }
}

impl Failure {
    fn from_key(codec: &dyn KeyCodec, err: KeyError) -> Self {
        match err {
            KeyError::Shape { expected, found } => Self::Shape { expected, found },
            other => Self::Undecodable {
                target: codec.dimension().name(),
                reason: other.to_string(),
            },
        }
    }
}

fn read_error<V>(failure: Option<Failure>, err: serde_json::Error) -> CodecError {
    let (line, column) = (err.line(), err.column());
    match failure {
        Some(Failure::Shape { expected, found }) => CodecError::MalformedInput {
            expected,
            found,
            line,
            column,
        },
        Some(Failure::Undecodable { target, reason }) => CodecError::UndecodableToken {
            target,
            reason,
            line,
            column,
        },
        Some(Failure::Duplicate(position)) => CodecError::DuplicateCoordinate {
            position: format!("{position:?}"),
            line,
            column,
        },
        Some(Failure::Tensor(err)) => CodecError::Tensor(err),
        None if err.classify() == Category::Data => value_error::<V>(&err, line, column),
        None => CodecError::Json(err),
    }
}

/// Classifies a value reader's serde error, which only exists as text.
fn value_error<V>(err: &serde_json::Error, line: usize, column: usize) -> CodecError {
    let message = err.to_string();
    let reason = match message.rsplit_once(" at line ") {
        Some((head, _)) => head.to_string(),
        None => message,
    };
    // Same token on both sides is a value the target cannot hold, not a shape mismatch.
    if let Some((expected, found)) = invalid_type_tokens(&reason).filter(|(e, f)| e != f) {
        return CodecError::MalformedInput {
            expected,
            found,
            line,
            column,
        };
    }
    CodecError::UndecodableToken {
        target: type_name::<V>(),
        reason,
        line,
        column,
    }
}

fn invalid_type_tokens(reason: &str) -> Option<(TokenKind, TokenKind)> {
    // serde message shape: "invalid type: <found>, expected <expected>"
    let rest = reason.strip_prefix("invalid type: ")?;
    let (found, expected) = rest.split_once(", expected ")?;
    Some((
        TokenKind::from_serde_wording(expected)?,
        TokenKind::from_serde_wording(found)?,
    ))
}

struct ReadState<'c, V> {
    keys: &'c [Arc<dyn KeyCodec>],
    duplicates: DuplicatePolicy,
    builder: TensorBuilder<V>,
    failure: Option<Failure>,
}

impl<'c, V> ReadState<'c, V> {
    fn new(codec: &'c TensorCodec<V>) -> Result<Self, TensorError> {
        Ok(Self {
            keys: &codec.keys,
            duplicates: codec.config.duplicates,
            builder: TensorBuilder::new(codec.dimensions.clone())?,
            failure: None,
        })
    }

    fn fail<E: de::Error>(&mut self, failure: Failure) -> E {
        let err = E::custom(&failure);
        self.failure = Some(failure);
        err
    }

    fn store<E: de::Error>(&mut self, position: Position, value: V) -> Result<(), E> {
        if self.duplicates == DuplicatePolicy::Reject && self.builder.contains(&position) {
            return Err(self.fail(Failure::Duplicate(position)));
        }
        match self.builder.put(position, value) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(Failure::Tensor(err))),
        }
    }

    fn bind<E: de::Error>(&mut self, position: &Position, coordinate: Coordinate) -> Result<Position, E> {
        position
            .with(coordinate)
            .map_err(|err| self.fail(Failure::Tensor(err)))
    }
}

/// Reads one tensor from a serde deserializer. Returned by [`TensorCodec::seed`].
pub struct TensorSeed<'c, V> {
    codec: &'c TensorCodec<V>,
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for TensorSeed<'_, V> {
    type Value = Tensor<V>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Tensor<V>, D::Error> {
        let mut state = ReadState::new(self.codec).map_err(<D::Error as de::Error>::custom)?;
        TopSeed { state: &mut state }.deserialize(deserializer)?;
        Ok(state.builder.build())
    }
}

struct TopSeed<'s, 'c, V> {
    state: &'s mut ReadState<'c, V>,
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for TopSeed<'_, '_, V> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_option(self)
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for TopSeed<'_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a nested tensor or null")
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        LevelSeed {
            state: self.state,
            level: 0,
            position: Position::empty(),
        }
        .deserialize(deserializer)
    }
}

struct LevelSeed<'s, 'c, V> {
    state: &'s mut ReadState<'c, V>,
    level: usize,
    position: Position,
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for LevelSeed<'_, '_, V> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        if self.level == self.state.keys.len() {
            let value = V::deserialize(deserializer)?;
            return self.state.store(self.position, value);
        }
        deserializer.deserialize_any(self)
    }
}

impl<'s, 'c, V> LevelSeed<'s, 'c, V> {
    fn codec(&self) -> &'c dyn KeyCodec {
        let keys: &'c [Arc<dyn KeyCodec>] = self.state.keys;
        keys[self.level].as_ref()
    }

    fn mismatch<E: de::Error>(self, found: TokenKind) -> Result<(), E> {
        Err(self.state.fail(Failure::Shape {
            expected: TokenKind::BeginObject,
            found,
        }))
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for LevelSeed<'_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object keyed by {}", self.codec().dimension())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let codec = self.codec();
        while let Some(coordinate) = map.next_key_seed(KeySeed {
            codec,
            failure: &mut self.state.failure,
        })? {
            let position = self.state.bind(&self.position, coordinate)?;
            map.next_value_seed(LevelSeed {
                state: &mut *self.state,
                level: self.level + 1,
                position,
            })?;
        }
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let codec = self.codec();
        while seq
            .next_element_seed(PairSeed {
                codec,
                state: &mut *self.state,
                level: self.level,
                position: &self.position,
            })?
            .is_some()
        {}
        Ok(())
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<(), E> {
        self.mismatch(TokenKind::Boolean)
    }

    fn visit_i64<E: de::Error>(self, _v: i64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_str<E: de::Error>(self, _v: &str) -> Result<(), E> {
        self.mismatch(TokenKind::String)
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.mismatch(TokenKind::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        self.mismatch(TokenKind::Null)
    }
}

struct KeySeed<'s, 'c> {
    codec: &'c dyn KeyCodec,
    failure: &'s mut Option<Failure>,
}

impl<'de> DeserializeSeed<'de> for KeySeed<'_, '_> {
    type Value = Coordinate;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Coordinate, D::Error> {
        let name = String::deserialize(deserializer)?;
        self.codec.decode_name(&name).map_err(|err| {
            let failure = Failure::from_key(self.codec, err);
            let err = <D::Error as de::Error>::custom(&failure);
            *self.failure = Some(failure);
            err
        })
    }
}

/// One `[key, value]` element of a level written with complex map keys.
struct PairSeed<'s, 'c, 'p, V> {
    codec: &'c dyn KeyCodec,
    state: &'s mut ReadState<'c, V>,
    level: usize,
    position: &'p Position,
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for PairSeed<'_, '_, '_, V> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<V> PairSeed<'_, '_, '_, V> {
    fn mismatch<E: de::Error>(self, found: TokenKind) -> Result<(), E> {
        Err(self.state.fail(Failure::Shape {
            expected: TokenKind::BeginArray,
            found,
        }))
    }

    fn malformed<E: de::Error>(self, reason: &str) -> Result<(), E> {
        Err(self.state.fail(Failure::Undecodable {
            target: self.codec.dimension().name(),
            reason: reason.to_string(),
        }))
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for PairSeed<'_, '_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a [key, value] pair keyed by {}", self.codec.dimension())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let Some(raw) = seq.next_element::<serde_json::Value>()? else {
            return self.malformed("empty key/value pair");
        };
        let coordinate = match self.codec.decode_value(raw) {
            Ok(coordinate) => coordinate,
            Err(err) => return Err(self.state.fail(Failure::from_key(self.codec, err))),
        };
        let position = self.state.bind(self.position, coordinate)?;
        let value = seq.next_element_seed(LevelSeed {
            state: &mut *self.state,
            level: self.level + 1,
            position,
        })?;
        if value.is_none() {
            return self.malformed("key/value pair has no value");
        }
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return self.malformed("key/value pair has more than two elements");
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> Result<(), A::Error> {
        self.mismatch(TokenKind::BeginObject)
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<(), E> {
        self.mismatch(TokenKind::Boolean)
    }

    fn visit_i64<E: de::Error>(self, _v: i64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<(), E> {
        self.mismatch(TokenKind::Number)
    }

    fn visit_str<E: de::Error>(self, _v: &str) -> Result<(), E> {
        self.mismatch(TokenKind::String)
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.mismatch(TokenKind::Null)
    }
}
