//! Elementwise arithmetic with group-wise broadcasting.
//!
//! Binary tensor operators broadcast the dynamic, intmd and base groups
//! independently and return `Result`, since broadcasting can fail. Scalar
//! operators and negation cannot fail and return tensors directly. Every
//! operator allocates a fresh arena; results never alias their operands.

use std::ops::{Add, Div, Mul, Neg, Sub};

use ndarray::Zip;

use crate::error::ShapeError;
use crate::tensor::Tensor;
use crate::Element;

impl<E: Element> Tensor<E> {
    /// Broadcast two tensors together and combine them elementwise.
    pub fn zip_with(&self, other: &Self, f: impl Fn(E, E) -> E) -> Result<Self, ShapeError> {
        let (lhs, rhs) = self.broadcast_with(other)?;
        let la = lhs.to_array();
        let ra = rhs.to_array();
        let out = Zip::from(&la).and(&ra).map_collect(|&a, &b| f(a, b));
        Tensor::from_array(out, lhs.dynamic_dim(), lhs.intmd_dim())
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<'a, 'b, E: Element> $trait<&'b Tensor<E>> for &'a Tensor<E> {
            type Output = Result<Tensor<E>, ShapeError>;

            fn $method(self, rhs: &'b Tensor<E>) -> Self::Output {
                self.zip_with(rhs, |a, b| a $op b)
            }
        }

        impl<'a, E: Element> $trait<E> for &'a Tensor<E> {
            type Output = Tensor<E>;

            fn $method(self, rhs: E) -> Self::Output {
                self.map(|a| a $op rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);
impl_binary_op!(Div, div, /);

impl<'a, E: Element> Neg for &'a Tensor<E> {
    type Output = Tensor<E>;

    fn neg(self) -> Self::Output {
        self.map(|a| -a)
    }
}
