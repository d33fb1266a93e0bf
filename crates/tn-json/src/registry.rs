use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tn_core::{CoordinateType, DimensionType, TensorBacked};
use tracing::{debug, warn};

use crate::adapter::{ErasedAdapter, TensorbackedAdapter};
use crate::{CodecConfig, CodecError, KeyCodec, SerdeKeyCodec};

type ConstructAdapter = fn(&CodecRegistry, &CodecConfig) -> Result<Box<dyn ErasedAdapter>, CodecError>;

struct TensorbackedEntry {
    name: &'static str,
    dimensions: Vec<DimensionType>,
    construct: ConstructAdapter,
}

/// Key codecs by dimension, plus the tensor-backed types known to the runtime factory.
#[derive(Default)]
pub struct CodecRegistry {
    keys: HashMap<DimensionType, Arc<dyn KeyCodec>>,
    names: HashMap<&'static str, DimensionType>,
    tensorbacked: HashMap<TypeId, TensorbackedEntry>,
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with key codecs for every built-in coordinate type.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_coordinate::<String>()
            .register_coordinate::<i32>()
            .register_coordinate::<i64>()
            .register_coordinate::<u32>()
            .register_coordinate::<u64>()
            .register_coordinate::<bool>()
            .register_coordinate::<char>();
        registry
    }

    pub fn register_coordinate<T>(&mut self) -> &mut Self
    where
        T: CoordinateType + Serialize + DeserializeOwned,
    {
        self.register_key_codec(Arc::new(SerdeKeyCodec::<T>::new()))
    }

    /// Installs `codec` for its dimension, replacing any earlier one.
    pub fn register_key_codec(&mut self, codec: Arc<dyn KeyCodec>) -> &mut Self {
        let dimension = codec.dimension();
        debug!(%dimension, "registered key codec");
        let named = *self.names.entry(dimension.name()).or_insert(dimension);
        if named != dimension {
            warn!(%dimension, "display name already taken by an earlier dimension");
        }
        self.keys.insert(dimension, codec);
        self
    }

    #[must_use]
    pub fn key_codec(&self, dimension: &DimensionType) -> Option<&Arc<dyn KeyCodec>> {
        self.keys.get(dimension)
    }

    /// Looks up one codec per dimension, in order.
    pub fn resolve(&self, dimensions: &[DimensionType]) -> Result<Vec<Arc<dyn KeyCodec>>, CodecError> {
        dimensions
            .iter()
            .map(|dimension| {
                self.keys
                    .get(dimension)
                    .cloned()
                    .ok_or(CodecError::UnregisteredDimension {
                        dimension: *dimension,
                    })
            })
            .collect()
    }

    /// The registered dimension whose display name is `name`. The first registration keeps a name.
    #[must_use]
    pub fn dimension_named(&self, name: &str) -> Option<DimensionType> {
        self.names.get(name).copied()
    }

    pub fn register_tensorbacked<B>(&mut self) -> &mut Self
    where
        B: TensorBacked + Send,
        B::Value: Serialize + DeserializeOwned,
    {
        let entry = TensorbackedEntry {
            name: type_name::<B>(),
            dimensions: B::dimensions(),
            construct: construct_adapter::<B>,
        };
        debug!(target_type = entry.name, dimensions = ?entry.dimensions, "registered tensor-backed type");
        self.tensorbacked.insert(TypeId::of::<B>(), entry);
        self
    }

    #[must_use]
    pub fn is_tensorbacked(&self, type_id: TypeId) -> bool {
        self.tensorbacked.contains_key(&type_id)
    }

    pub(crate) fn construct_adapter(
        &self,
        type_id: TypeId,
        config: &CodecConfig,
    ) -> Option<Result<Box<dyn ErasedAdapter>, CodecError>> {
        self.tensorbacked
            .get(&type_id)
            .map(|entry| (entry.construct)(self, config))
    }
}

fn construct_adapter<B>(
    registry: &CodecRegistry,
    config: &CodecConfig,
) -> Result<Box<dyn ErasedAdapter>, CodecError>
where
    B: TensorBacked + Send,
    B::Value: Serialize + DeserializeOwned,
{
    let adapter = TensorbackedAdapter::<B>::new(registry, config.clone())?;
    Ok(Box::new(adapter))
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dimensions: Vec<&DimensionType> = self.keys.keys().collect();
        dimensions.sort_by_key(|d| d.name());
        let mut tensorbacked: Vec<&str> = self.tensorbacked.values().map(|e| e.name).collect();
        tensorbacked.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("dimensions", &dimensions)
            .field("tensorbacked", &tensorbacked)
            .finish()
    }
}
