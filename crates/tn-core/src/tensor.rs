use indexmap::IndexMap;

use crate::{Coordinate, DimensionType, Position, TensorError};

/// A finite mapping from positions over a fixed dimension set to values.
#[derive(Debug, Clone)]
pub struct Tensor<V> {
    dimensions: Vec<DimensionType>,
    entries: IndexMap<Position, V>,
    context: Position,
}

impl<V> Tensor<V> {
    pub fn builder(dimensions: Vec<DimensionType>) -> Result<TensorBuilder<V>, TensorError> {
        TensorBuilder::new(dimensions)
    }

    /// A zero-dimensional tensor holding exactly one value.
    #[must_use]
    pub fn scalar(value: V) -> Self {
        let mut entries = IndexMap::with_capacity(1);
        entries.insert(Position::empty(), value);
        Self {
            dimensions: Vec::new(),
            entries,
            context: Position::empty(),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> &[DimensionType] {
        &self.dimensions
    }

    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dimensions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: &Position) -> Option<&V> {
        self.entries.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Position, &V)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn context(&self) -> &Position {
        &self.context
    }

    #[must_use]
    pub fn without_context(mut self) -> Self {
        self.context = Position::empty();
        self
    }

    /// The value at the empty position, present only for non-empty zero-dimensional tensors.
    #[must_use]
    pub fn scalar_value(&self) -> Option<&V> {
        self.entries.get(&Position::empty())
    }

    #[must_use]
    pub fn into_scalar_value(mut self) -> Option<V> {
        self.entries.shift_remove(&Position::empty())
    }

    pub fn map_values<U, F>(self, mut f: F) -> Tensor<U>
    where
        F: FnMut(V) -> U,
    {
        Tensor {
            dimensions: self.dimensions,
            entries: self
                .entries
                .into_iter()
                .map(|(position, value)| (position, f(value)))
                .collect(),
            context: self.context,
        }
    }

    #[must_use]
    pub fn as_refs(&self) -> Tensor<&V> {
        Tensor {
            dimensions: self.dimensions.clone(),
            entries: self.entries.iter().map(|(p, v)| (p.clone(), v)).collect(),
            context: self.context.clone(),
        }
    }

    /// Moves `dimension` out of the positions and into the values.
    ///
    /// The result has one dimension fewer. Each of its entries maps the removed coordinate to
    /// the original value, with groups and keys kept in first-encounter order.
    pub fn map_out(
        self,
        dimension: &DimensionType,
    ) -> Result<Tensor<IndexMap<Coordinate, V>>, TensorError> {
        if !self.dimensions.contains(dimension) {
            return Err(TensorError::UnknownDimension {
                dimension: *dimension,
                available: self.dimensions,
            });
        }
        let remaining: Vec<DimensionType> = self
            .dimensions
            .iter()
            .filter(|d| *d != dimension)
            .copied()
            .collect();

        let mut grouped: IndexMap<Position, IndexMap<Coordinate, V>> = IndexMap::new();
        for (position, value) in self.entries {
            let Some(coordinate) = position.coordinate(dimension).cloned() else {
                return Err(TensorError::CoordinateInconsistency {
                    expected: self.dimensions,
                    found: position.dimensions().collect(),
                });
            };
            grouped
                .entry(position.without(dimension))
                .or_default()
                .insert(coordinate, value);
        }

        Ok(Tensor {
            dimensions: remaining,
            entries: grouped,
            context: self.context,
        })
    }
}

impl<V: PartialEq> PartialEq for Tensor<V> {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions.len() == other.dimensions.len()
            && self.dimensions.iter().all(|d| other.dimensions.contains(d))
            && self.context == other.context
            && self.entries == other.entries
    }
}

impl<V: Eq> Eq for Tensor<V> {}

#[derive(Debug, Clone)]
pub struct TensorBuilder<V> {
    dimensions: Vec<DimensionType>,
    sorted: Vec<DimensionType>,
    entries: IndexMap<Position, V>,
    context: Position,
}

impl<V> TensorBuilder<V> {
    pub fn new(dimensions: Vec<DimensionType>) -> Result<Self, TensorError> {
        let mut sorted = dimensions.clone();
        sorted.sort();
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(TensorError::DuplicateDimension { dimension: pair[0] });
        }
        Ok(Self {
            dimensions,
            sorted,
            entries: IndexMap::new(),
            context: Position::empty(),
        })
    }

    #[must_use]
    pub fn dimensions(&self) -> &[DimensionType] {
        &self.dimensions
    }

    /// Stores `value` at `position`, returning the value it displaced.
    pub fn put(&mut self, position: Position, value: V) -> Result<Option<V>, TensorError> {
        self.check(&position)?;
        Ok(self.entries.insert(position, value))
    }

    #[must_use]
    pub fn contains(&self, position: &Position) -> bool {
        self.entries.contains_key(position)
    }

    pub fn put_all(&mut self, tensor: &Tensor<V>) -> Result<(), TensorError>
    where
        V: Clone,
    {
        for (position, value) in tensor.iter() {
            self.put(position.clone(), value.clone())?;
        }
        Ok(())
    }

    pub fn set_context(&mut self, context: Position) -> &mut Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn build(self) -> Tensor<V> {
        Tensor {
            dimensions: self.dimensions,
            entries: self.entries,
            context: self.context,
        }
    }

    fn check(&self, position: &Position) -> Result<(), TensorError> {
        // Position dimensions iterate in the same order as a sorted list.
        let found: Vec<DimensionType> = position.dimensions().collect();
        if found == self.sorted {
            Ok(())
        } else {
            Err(TensorError::CoordinateInconsistency {
                expected: self.dimensions.clone(),
                found,
            })
        }
    }
}
