#![forbid(unsafe_code)]

use indexmap::IndexMap;
use thiserror::Error;
use tn_core::{Coordinate, DimensionType, IntoCoordinate, Position, Tensor, TensorBuilder, TensorError};

/// One level of a nested coordinate map, or a terminal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<V> {
    Value(V),
    Map(IndexMap<Coordinate, Nested<V>>),
}

impl<V> Nested<V> {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: IntoCoordinate,
        I: IntoIterator<Item = (K, Nested<V>)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, child)| (key.into_coordinate(), child))
                .collect(),
        )
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<Coordinate, Nested<V>>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Self::Value(value) => Some(value),
            Self::Map(_) => None,
        }
    }

    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }
}

impl<V: Clone> Nested<&V> {
    #[must_use]
    pub fn cloned(self) -> Nested<V> {
        match self {
            Nested::Value(value) => Nested::Value(value.clone()),
            Nested::Map(map) => Nested::Map(
                map.into_iter()
                    .map(|(key, child)| (key, child.cloned()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NestError {
    #[error(
        "tensor dimensionality ({tensor_dimensionality}) and number of provided dimensions ({provided}: {dimensions:?}) do not match"
    )]
    ArgumentMismatch {
        tensor_dimensionality: usize,
        provided: usize,
        dimensions: Vec<DimensionType>,
    },
    #[error("coordinates are not consistent at nesting level {level}: {detail}")]
    CoordinateInconsistency { level: usize, detail: String },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl NestError {
    #[must_use]
    pub fn is_coordinate_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::CoordinateInconsistency { .. }
                | Self::Tensor(TensorError::CoordinateInconsistency { .. })
        )
    }
}

/// Nests `tensor` by `dimensions`, the first listed dimension outermost.
///
/// Returns `None` when a zero-dimensional tensor holds no value. The tensor context is not
/// part of the result.
pub fn flatten<'a, V>(
    tensor: &'a Tensor<V>,
    dimensions: &[DimensionType],
) -> Result<Option<Nested<&'a V>>, NestError> {
    if dimensions.len() != tensor.dimensionality() {
        return Err(NestError::ArgumentMismatch {
            tensor_dimensionality: tensor.dimensionality(),
            provided: dimensions.len(),
            dimensions: dimensions.to_vec(),
        });
    }

    let mut current = tensor.as_refs().map_values(Nested::Value);
    for dimension in dimensions.iter().rev() {
        current = current.map_out(dimension)?.map_values(Nested::Map);
    }
    Ok(current.into_scalar_value())
}

/// Rebuilds a tensor from a nested map whose level `i` is keyed by `dimensions[i]`.
pub fn unflatten<V>(
    nested: Option<Nested<V>>,
    dimensions: &[DimensionType],
) -> Result<Tensor<V>, NestError> {
    let mut builder = TensorBuilder::new(dimensions.to_vec())?;
    if let Some(nested) = nested {
        descend(nested, 0, Position::empty(), dimensions, &mut builder)?;
    }
    Ok(builder.build())
}

fn descend<V>(
    node: Nested<V>,
    level: usize,
    position: Position,
    dimensions: &[DimensionType],
    builder: &mut TensorBuilder<V>,
) -> Result<(), NestError> {
    match node {
        Nested::Value(value) => {
            if level != dimensions.len() {
                return Err(NestError::CoordinateInconsistency {
                    level,
                    detail: format!(
                        "value found after {level} of {} dimensions {dimensions:?}",
                        dimensions.len()
                    ),
                });
            }
            builder.put(position, value)?;
        }
        Nested::Map(map) => {
            let Some(expected) = dimensions.get(level) else {
                return Err(NestError::CoordinateInconsistency {
                    level,
                    detail: format!("map nested below all dimensions {dimensions:?}"),
                });
            };
            for (key, child) in map {
                if key.dimension() != *expected {
                    return Err(NestError::CoordinateInconsistency {
                        level,
                        detail: format!("key {key:?} is a {} where {expected} was expected", key.dimension()),
                    });
                }
                let next = position.with(key)?;
                descend(child, level + 1, next, dimensions, builder)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tn_core::{Coordinate, DimensionType, Tensor, TensorBuilder, at};

    use super::{NestError, Nested, flatten, unflatten};

    fn string_int() -> Vec<DimensionType> {
        vec![DimensionType::of::<String>(), DimensionType::of::<i32>()]
    }

    fn sample() -> Tensor<f64> {
        let mut builder = Tensor::builder(string_int()).expect("distinct dimensions");
        for (letter, number, value) in [("A", 1, 0.11), ("A", 2, 0.12), ("B", 1, 0.21), ("B", 2, 0.22)] {
            builder
                .put(at!(letter, number).expect("position"), value)
                .expect("consistent position");
        }
        builder.build()
    }

    fn expected_nesting() -> Nested<f64> {
        Nested::map([
            ("A", Nested::map([(1, Nested::Value(0.11)), (2, Nested::Value(0.12))])),
            ("B", Nested::map([(1, Nested::Value(0.21)), (2, Nested::Value(0.22))])),
        ])
    }

    #[test]
    fn first_dimension_is_outermost() {
        let tensor = sample();
        let nested = flatten(&tensor, &string_int())
            .expect("matching dimensions")
            .expect("non-empty tensor")
            .cloned();
        assert_eq!(nested, expected_nesting());

        let outer: Vec<&Coordinate> = nested.as_map().expect("map").keys().collect();
        assert_eq!(outer, vec![&Coordinate::new("A".to_string()), &Coordinate::new("B".to_string())]);
    }

    #[test]
    fn reversed_dimensions_swap_levels() {
        let tensor = sample();
        let reversed = [DimensionType::of::<i32>(), DimensionType::of::<String>()];
        let nested = flatten(&tensor, &reversed)
            .expect("matching dimensions")
            .expect("non-empty tensor");
        let inner = nested
            .as_map()
            .and_then(|m| m.get(&Coordinate::new(2i32)))
            .and_then(Nested::as_map)
            .expect("2 -> map");
        assert_eq!(
            inner.get(&Coordinate::new("B".to_string())).and_then(Nested::as_value),
            Some(&&0.22)
        );
    }

    #[test]
    fn unflatten_inverts_flatten() {
        let rebuilt = unflatten(Some(expected_nesting()), &string_int()).expect("consistent nesting");
        assert_eq!(rebuilt, sample());
    }

    #[test]
    fn scalar_tensor_flattens_to_its_value() {
        let scalar = Tensor::scalar(0.33);
        let nested = flatten(&scalar, &[]).expect("no dimensions");
        assert_eq!(nested, Some(Nested::Value(&0.33)));

        let rebuilt = unflatten(Some(Nested::Value(0.33)), &[]).expect("scalar");
        assert_eq!(rebuilt, scalar);
    }

    #[test]
    fn empty_tensors_flatten_to_none() {
        let empty = Tensor::<f64>::builder(string_int()).expect("dims").build();
        assert_eq!(flatten(&empty, &string_int()).expect("matching dimensions"), None);

        let empty_scalar = Tensor::<f64>::builder(Vec::new()).expect("dims").build();
        assert_eq!(flatten(&empty_scalar, &[]).expect("no dimensions"), None);
        assert_eq!(unflatten::<f64>(None, &string_int()).expect("empty"), empty);
    }

    #[test]
    fn count_mismatch_names_both_counts() {
        let tensor = sample();
        let err = flatten(&tensor, &[DimensionType::of::<i32>()]).expect_err("one of two dimensions");
        assert!(matches!(
            err,
            NestError::ArgumentMismatch {
                tensor_dimensionality: 2,
                provided: 1,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("(2)"), "{message}");
        assert!(message.contains("(1: [i32])"), "{message}");
        assert!(message.contains("do not match"), "{message}");
    }

    #[test]
    fn same_count_with_foreign_dimension_fails() {
        let tensor = sample();
        let err = flatten(&tensor, &[DimensionType::of::<String>(), DimensionType::of::<bool>()])
            .expect_err("bool is foreign");
        assert!(matches!(err, NestError::Tensor(_)));
    }

    #[test]
    fn unflatten_with_wrong_dimensions_is_inconsistent() {
        let too_few = unflatten(Some(expected_nesting()), &[DimensionType::of::<String>()])
            .expect_err("nesting is deeper than one dimension");
        assert!(too_few.is_coordinate_inconsistency());
        assert!(too_few.to_string().contains("coordinates are not consistent"));

        let swapped = unflatten(
            Some(expected_nesting()),
            &[DimensionType::of::<i32>(), DimensionType::of::<String>()],
        )
        .expect_err("outer keys are strings");
        assert!(swapped.is_coordinate_inconsistency());

        let too_many = unflatten(
            Some(expected_nesting()),
            &[DimensionType::of::<String>(), DimensionType::of::<i32>(), DimensionType::of::<bool>()],
        )
        .expect_err("nesting is shallower than three dimensions");
        assert!(matches!(too_many, NestError::CoordinateInconsistency { level: 2, .. }));
    }

    #[test]
    fn context_is_not_flattened() {
        let mut builder = TensorBuilder::new(string_int()).expect("dims");
        builder.put_all(&sample()).expect("same dimensions");
        builder.set_context(at!(true).expect("context"));
        let with_context = builder.build();

        let nested = flatten(&with_context, &string_int())
            .expect("matching dimensions")
            .expect("non-empty")
            .cloned();
        let rebuilt = unflatten(Some(nested), &string_int()).expect("consistent");
        assert_eq!(rebuilt, with_context.clone().without_context());
        assert_ne!(rebuilt, with_context);
    }

    proptest! {
        #[test]
        fn prop_flatten_then_unflatten_is_identity(
            cells in proptest::collection::btree_map((0u32..4, -3i64..3), -40i32..40, 0..12),
        ) {
            let dims = vec![DimensionType::of::<u32>(), DimensionType::of::<i64>()];
            let mut builder = Tensor::builder(dims.clone()).expect("distinct dimensions");
            for ((row, column), value) in &cells {
                builder
                    .put(at!(*row, *column).expect("position"), f64::from(*value) / 4.0)
                    .expect("consistent position");
            }
            let tensor = builder.build();

            let nested = flatten(&tensor, &dims).expect("matching dimensions").map(Nested::cloned);
            prop_assert_eq!(nested.is_none(), cells.is_empty());
            let rebuilt = unflatten(nested, &dims).expect("consistent nesting");
            prop_assert_eq!(rebuilt, tensor);
        }
    }
}
