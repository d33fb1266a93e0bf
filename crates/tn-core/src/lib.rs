#![forbid(unsafe_code)]
//! Dimension-typed tensors: coordinates, positions, tensors and tensor-backed values.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

mod tensor;
mod tensorbacked;

pub use tensor::{Tensor, TensorBuilder};
pub use tensorbacked::{
    TensorBacked, Tensorbacked1d, Tensorbacked2d, Tensorbacked3d, TensorbackedBuilder,
    TensorbackedScalar, builder_for, tensorbacked_from,
};

/// A type whose values can serve as coordinates along one tensor dimension.
///
/// The type itself identifies the dimension: a tensor holds at most one dimension per
/// coordinate type.
pub trait CoordinateType: Any + Clone + fmt::Debug + Eq + Hash + Send + Sync {
    fn dimension_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

macro_rules! coordinate_types {
    ($($ty:ty),* $(,)?) => {
        $(impl CoordinateType for $ty {})*
    };
}

coordinate_types!(String, i32, i64, u32, u64, bool, char);

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[derive(Clone, Copy)]
pub struct DimensionType {
    id: TypeId,
    name: &'static str,
}

impl DimensionType {
    #[must_use]
    pub fn of<T: CoordinateType>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::dimension_name(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is<T: CoordinateType>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for DimensionType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DimensionType {}

impl Hash for DimensionType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for DimensionType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DimensionType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

trait ErasedCoordinate: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dimension(&self) -> DimensionType;
    fn eq_erased(&self, other: &dyn Any) -> bool;
    fn hash_erased(&self, state: &mut dyn Hasher);
}

impl<T: CoordinateType> ErasedCoordinate for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dimension(&self) -> DimensionType {
        DimensionType::of::<T>()
    }

    fn eq_erased(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn hash_erased(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }
}

/// A coordinate value of any registered coordinate type.
#[derive(Clone)]
pub struct Coordinate(Arc<dyn ErasedCoordinate>);

impl Coordinate {
    #[must_use]
    pub fn new<T: CoordinateType>(value: T) -> Self {
        Self(Arc::new(value))
    }

    #[must_use]
    pub fn dimension(&self) -> DimensionType {
        self.0.dimension()
    }

    #[must_use]
    pub fn downcast_ref<T: CoordinateType>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    #[must_use]
    pub fn is<T: CoordinateType>(&self) -> bool {
        self.0.as_any().is::<T>()
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_erased(other.0.as_any())
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dimension().hash(state);
        self.0.hash_erased(state);
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

pub trait IntoCoordinate {
    fn into_coordinate(self) -> Coordinate;
}

impl<T: CoordinateType> IntoCoordinate for T {
    fn into_coordinate(self) -> Coordinate {
        Coordinate::new(self)
    }
}

impl IntoCoordinate for &str {
    fn into_coordinate(self) -> Coordinate {
        Coordinate::new(self.to_owned())
    }
}

impl IntoCoordinate for Coordinate {
    fn into_coordinate(self) -> Coordinate {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("dimension {dimension} is bound more than once")]
    DuplicateDimension { dimension: DimensionType },
    #[error(
        "coordinates are not consistent with tensor dimensions: expected {expected:?}, found {found:?}"
    )]
    CoordinateInconsistency {
        expected: Vec<DimensionType>,
        found: Vec<DimensionType>,
    },
    #[error("dimension {dimension} is not one of the tensor dimensions {available:?}")]
    UnknownDimension {
        dimension: DimensionType,
        available: Vec<DimensionType>,
    },
}

/// A binding of coordinates to distinct dimensions.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Position {
    coordinates: BTreeMap<DimensionType, Coordinate>,
}

impl Position {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I>(coordinates: I) -> Result<Self, TensorError>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let mut position = Self::empty();
        for coordinate in coordinates {
            position.bind(coordinate)?;
        }
        Ok(position)
    }

    pub fn with(&self, coordinate: Coordinate) -> Result<Self, TensorError> {
        let mut position = self.clone();
        position.bind(coordinate)?;
        Ok(position)
    }

    pub fn union(&self, other: &Self) -> Result<Self, TensorError> {
        let mut position = self.clone();
        for coordinate in other.coordinates.values() {
            position.bind(coordinate.clone())?;
        }
        Ok(position)
    }

    #[must_use]
    pub fn without(&self, dimension: &DimensionType) -> Self {
        let mut coordinates = self.coordinates.clone();
        coordinates.remove(dimension);
        Self { coordinates }
    }

    #[must_use]
    pub fn coordinate(&self, dimension: &DimensionType) -> Option<&Coordinate> {
        self.coordinates.get(dimension)
    }

    #[must_use]
    pub fn coordinate_of<T: CoordinateType>(&self) -> Option<&T> {
        self.coordinates
            .get(&DimensionType::of::<T>())
            .and_then(Coordinate::downcast_ref::<T>)
    }

    pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
        self.coordinates.values()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = DimensionType> + '_ {
        self.coordinates.keys().copied()
    }

    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.coordinates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    fn bind(&mut self, coordinate: Coordinate) -> Result<(), TensorError> {
        let dimension = coordinate.dimension();
        if self.coordinates.contains_key(&dimension) {
            return Err(TensorError::DuplicateDimension { dimension });
        }
        self.coordinates.insert(dimension, coordinate);
        Ok(())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Position")?;
        f.debug_list().entries(self.coordinates.values()).finish()
    }
}

/// Builds a [`Position`] from coordinates of distinct types.
///
/// Evaluates to `Result<Position, TensorError>`; string literals become `String` coordinates.
#[macro_export]
macro_rules! at {
    () => {
        ::core::result::Result::<$crate::Position, $crate::TensorError>::Ok($crate::Position::empty())
    };
    ($($coordinate:expr),+ $(,)?) => {
        $crate::Position::of([$($crate::IntoCoordinate::into_coordinate($coordinate)),+])
    };
}
