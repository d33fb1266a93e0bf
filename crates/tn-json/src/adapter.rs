use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::io;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tn_core::{TensorBacked, tensorbacked_from};
use tracing::debug;

use crate::{CodecConfig, CodecError, CodecRegistry, TensorCodec};

/// Reads and writes one tensor-backed type as its nested tensor.
pub struct TensorbackedAdapter<B: TensorBacked> {
    codec: TensorCodec<B::Value>,
}

impl<B: TensorBacked> TensorbackedAdapter<B> {
    pub fn new(registry: &CodecRegistry, config: CodecConfig) -> Result<Self, CodecError> {
        let codec = TensorCodec::new(registry, B::dimensions(), config)?;
        debug!(target_type = type_name::<B>(), "created tensor-backed adapter");
        Ok(Self { codec })
    }

    #[must_use]
    pub fn codec(&self) -> &TensorCodec<B::Value> {
        &self.codec
    }

    pub fn write<W: io::Write>(&self, value: &B, writer: W) -> Result<(), CodecError>
    where
        B::Value: Serialize,
    {
        self.codec.write(value.tensor(), writer)
    }

    pub fn to_json_string(&self, value: &B) -> Result<String, CodecError>
    where
        B::Value: Serialize,
    {
        self.codec.to_json_string(value.tensor())
    }

    pub fn read<R: io::Read>(&self, reader: R) -> Result<B, CodecError>
    where
        B::Value: DeserializeOwned,
    {
        Ok(tensorbacked_from::<B>(self.codec.read(reader)?)?)
    }

    pub fn read_str(&self, input: &str) -> Result<B, CodecError>
    where
        B::Value: DeserializeOwned,
    {
        Ok(tensorbacked_from::<B>(self.codec.read_str(input)?)?)
    }

    pub fn read_slice(&self, input: &[u8]) -> Result<B, CodecError>
    where
        B::Value: DeserializeOwned,
    {
        Ok(tensorbacked_from::<B>(self.codec.read_slice(input)?)?)
    }
}

impl<B: TensorBacked> fmt::Debug for TensorbackedAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorbackedAdapter")
            .field("target", &type_name::<B>())
            .field("codec", &self.codec)
            .finish()
    }
}

/// A tensor-backed adapter whose target type is only known at runtime.
pub trait ErasedAdapter: Send + Sync {
    fn target(&self) -> TypeId;

    fn target_name(&self) -> &'static str;

    fn write_value(&self, value: &dyn Any) -> Result<String, CodecError>;

    fn read_value(&self, input: &str) -> Result<Box<dyn Any + Send>, CodecError>;
}

impl<B> ErasedAdapter for TensorbackedAdapter<B>
where
    B: TensorBacked + Send,
    B::Value: Serialize + DeserializeOwned,
{
    fn target(&self) -> TypeId {
        TypeId::of::<B>()
    }

    fn target_name(&self) -> &'static str {
        type_name::<B>()
    }

    fn write_value(&self, value: &dyn Any) -> Result<String, CodecError> {
        let typed = value
            .downcast_ref::<B>()
            .ok_or(CodecError::TypeMismatch {
                expected: type_name::<B>(),
            })?;
        self.to_json_string(typed)
    }

    fn read_value(&self, input: &str) -> Result<Box<dyn Any + Send>, CodecError> {
        Ok(Box::new(self.read_str(input)?))
    }
}

/// Creates adapters for tensor-backed types, sharing one registry and configuration.
#[derive(Debug, Clone)]
pub struct AdapterFactory {
    registry: Arc<CodecRegistry>,
    config: CodecConfig,
}

impl AdapterFactory {
    #[must_use]
    pub fn new(registry: Arc<CodecRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn create<B: TensorBacked>(&self) -> Result<TensorbackedAdapter<B>, CodecError> {
        TensorbackedAdapter::new(&self.registry, self.config.clone())
    }

    /// Whether `type_id` names a tensor-backed type registered for runtime lookup.
    #[must_use]
    pub fn supports(&self, type_id: TypeId) -> bool {
        self.registry.is_tensorbacked(type_id)
    }

    /// Builds an adapter for `type_id`, or declines with `None` for any other type.
    pub fn create_for(&self, type_id: TypeId) -> Result<Option<Box<dyn ErasedAdapter>>, CodecError> {
        self.registry
            .construct_adapter(type_id, &self.config)
            .transpose()
    }
}
