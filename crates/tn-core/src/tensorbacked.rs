use std::fmt;
use std::marker::PhantomData;

use crate::{CoordinateType, DimensionType, Position, Tensor, TensorBuilder, TensorError};

/// A domain type whose entire state is one tensor over a fixed dimension set.
pub trait TensorBacked: Sized + 'static {
    type Value;

    /// The dimensions every backing tensor must have, in nesting order.
    fn dimensions() -> Vec<DimensionType>;

    /// Wraps a tensor without checking it. Use [`tensorbacked_from`] for untrusted tensors.
    fn from_tensor(tensor: Tensor<Self::Value>) -> Self;

    fn tensor(&self) -> &Tensor<Self::Value>;
}

/// Wraps `tensor` as `B` after checking that its dimensions are exactly `B::dimensions()`.
pub fn tensorbacked_from<B: TensorBacked>(tensor: Tensor<B::Value>) -> Result<B, TensorError> {
    let expected = B::dimensions();
    let found = tensor.dimensions();
    let matches = expected.len() == found.len() && expected.iter().all(|d| found.contains(d));
    if !matches {
        return Err(TensorError::CoordinateInconsistency {
            expected,
            found: found.to_vec(),
        });
    }
    Ok(B::from_tensor(tensor))
}

pub fn builder_for<B: TensorBacked>() -> Result<TensorbackedBuilder<B>, TensorError> {
    Ok(TensorbackedBuilder {
        inner: TensorBuilder::new(B::dimensions())?,
        _target: PhantomData,
    })
}

pub struct TensorbackedBuilder<B: TensorBacked> {
    inner: TensorBuilder<B::Value>,
    _target: PhantomData<fn() -> B>,
}

impl<B: TensorBacked> TensorbackedBuilder<B> {
    pub fn put(&mut self, position: Position, value: B::Value) -> Result<Option<B::Value>, TensorError> {
        self.inner.put(position, value)
    }

    pub fn put_all(&mut self, tensor: &Tensor<B::Value>) -> Result<(), TensorError>
    where
        B::Value: Clone,
    {
        self.inner.put_all(tensor)
    }

    pub fn set_context(&mut self, context: Position) -> &mut Self {
        self.inner.set_context(context);
        self
    }

    #[must_use]
    pub fn build(self) -> B {
        B::from_tensor(self.inner.build())
    }
}

impl<B: TensorBacked> fmt::Debug for TensorbackedBuilder<B>
where
    B::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorbackedBuilder")
            .field("inner", &self.inner)
            .finish()
    }
}

macro_rules! fixed_arity {
    ($name:ident [$($c:ident),*] get($($arg:ident),*)) => {
        pub struct $name<$($c,)* V> {
            tensor: Tensor<V>,
            _dims: PhantomData<fn() -> ($($c,)*)>,
        }

        impl<$($c: CoordinateType,)* V: 'static> TensorBacked for $name<$($c,)* V> {
            type Value = V;

            fn dimensions() -> Vec<DimensionType> {
                vec![$(DimensionType::of::<$c>()),*]
            }

            fn from_tensor(tensor: Tensor<V>) -> Self {
                Self { tensor, _dims: PhantomData }
            }

            fn tensor(&self) -> &Tensor<V> {
                &self.tensor
            }
        }

        impl<$($c: CoordinateType,)* V> $name<$($c,)* V> {
            #[must_use]
            pub fn get(&self, $($arg: $c),*) -> Option<&V> {
                let coordinates: Vec<crate::Coordinate> = vec![$(crate::Coordinate::new($arg)),*];
                let position = Position::of(coordinates).ok()?;
                self.tensor.get(&position)
            }

            #[must_use]
            pub fn into_tensor(self) -> Tensor<V> {
                self.tensor
            }
        }

        impl<$($c,)* V: Clone> Clone for $name<$($c,)* V> {
            fn clone(&self) -> Self {
                Self { tensor: self.tensor.clone(), _dims: PhantomData }
            }
        }

        impl<$($c,)* V: PartialEq> PartialEq for $name<$($c,)* V> {
            fn eq(&self, other: &Self) -> bool {
                self.tensor == other.tensor
            }
        }

        impl<$($c,)* V: fmt::Debug> fmt::Debug for $name<$($c,)* V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.tensor).finish()
            }
        }
    };
}

fixed_arity!(TensorbackedScalar [] get());
fixed_arity!(Tensorbacked1d [C1] get(c1));
fixed_arity!(Tensorbacked2d [C1, C2] get(c1, c2));
fixed_arity!(Tensorbacked3d [C1, C2, C3] get(c1, c2, c3));

/// Declares newtypes over [`Tensor`] with an explicit dimension list.
///
/// ```
/// tn_core::tensorbacked! {
///     pub struct Prices: f64 [String, i32];
/// }
/// ```
#[macro_export]
macro_rules! tensorbacked {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident : $value:ty [$($dim:ty),* $(,)?];)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            $vis struct $name($crate::Tensor<$value>);

            impl $crate::TensorBacked for $name {
                type Value = $value;

                fn dimensions() -> ::std::vec::Vec<$crate::DimensionType> {
                    ::std::vec![$($crate::DimensionType::of::<$dim>()),*]
                }

                fn from_tensor(tensor: $crate::Tensor<$value>) -> Self {
                    Self(tensor)
                }

                fn tensor(&self) -> &$crate::Tensor<$value> {
                    &self.0
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use crate::{
        DimensionType, Tensor, TensorBacked, TensorError, Tensorbacked2d, TensorbackedScalar, at,
        builder_for, tensorbacked_from,
    };

    crate::tensorbacked! {
        struct Grid: f64 [String, i32];
        struct Flags: bool [bool];
    }

    #[test]
    fn macro_declares_dimensions_in_order() {
        assert_eq!(
            Grid::dimensions(),
            vec![DimensionType::of::<String>(), DimensionType::of::<i32>()]
        );
        assert_eq!(Flags::dimensions(), vec![DimensionType::of::<bool>()]);
    }

    #[test]
    fn builder_for_produces_target_type() {
        let mut builder = builder_for::<Grid>().expect("distinct dimensions");
        builder
            .put(at!("A", 1).expect("position"), 0.11)
            .expect("consistent position");
        let grid = builder.build();
        assert_eq!(grid.tensor().get(&at!("A", 1).expect("position")), Some(&0.11));
    }

    #[test]
    fn validating_constructor_checks_dimension_set() {
        let mut builder = Tensor::builder(vec![DimensionType::of::<i32>(), DimensionType::of::<String>()])
            .expect("distinct dimensions");
        builder
            .put(at!(1, "A").expect("position"), 0.11)
            .expect("consistent position");
        let tensor = builder.build();

        let grid: Grid = tensorbacked_from(tensor.clone()).expect("same dimension set");
        assert_eq!(grid.tensor(), &tensor);

        let err = tensorbacked_from::<Flags>(Tensor::<bool>::builder(Vec::new()).expect("none").build())
            .expect_err("scalar tensor is not one-dimensional");
        assert!(matches!(err, TensorError::CoordinateInconsistency { .. }));
    }

    #[test]
    fn generic_wrappers_share_semantics_with_newtypes() {
        let mut builder = builder_for::<Tensorbacked2d<String, i32, f64>>().expect("distinct dimensions");
        builder
            .put(at!("B", 2).expect("position"), 0.22)
            .expect("consistent position");
        let wrapped = builder.build();
        assert_eq!(wrapped.get("B".to_string(), 2), Some(&0.22));
        assert_eq!(wrapped.get("B".to_string(), 3), None);

        let grid = Grid::from_tensor(wrapped.clone().into_tensor());
        assert_eq!(grid.tensor(), wrapped.tensor());

        let scalar = TensorbackedScalar::<f64>::from_tensor(Tensor::scalar(0.33));
        assert_eq!(scalar.get(), Some(&0.33));
        assert!(TensorbackedScalar::<f64>::dimensions().is_empty());
    }
}
