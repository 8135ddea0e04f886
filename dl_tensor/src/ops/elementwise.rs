//! Element-wise unary and binary operations.

use crate::backend::{Backend, BufferRef};
use crate::element::{BinaryOp, Element, UnaryOp};
use crate::error::{Result, TensorError};
use crate::node::TensorOp;
use crate::shape::Layout;
use crate::tensor::Tensor;

impl<E: Element, B: Backend> Tensor<E, B> {
    fn map_unary(&self, op: UnaryOp) -> Result<Self> {
        if !E::supports(op) {
            return Err(TensorError::UnsupportedOperation {
                op: op.name(),
                dtype: E::DTYPE,
            });
        }
        let count = self.count();
        let (src, offset) = self.materialized();
        let dst = B::allocate(count);
        B::unary(op, BufferRef::new(&src, offset), BufferRef::start(&dst), count)?;

        let layout = Layout::contiguous(self.shape().clone());
        Ok(match TensorOp::from_unary(op) {
            Some(record) => Self::from_op(dst, layout, None, record, vec![self.clone()]),
            None => Self::from_buffer(dst, self.shape().clone()),
        })
    }

    // === Unary ===

    /// Negate: -self
    pub fn neg(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Neg)
    }

    pub fn square(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Square)
    }

    pub fn exp(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Log)
    }

    pub fn sqrt(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Sqrt)
    }

    pub fn tanh(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Tanh)
    }

    pub fn sin(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Cos)
    }

    pub fn tan(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Tan)
    }

    /// ReLU: max(0, self)
    pub fn relu(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Relu)
    }

    /// Step function: 1 where positive, 0 elsewhere. Not differentiable, so
    /// the result never records a context.
    pub fn heaviside(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Heaviside)
    }

    /// Sigmoid: 1 / (1 + exp(-self))
    pub fn sigmoid(&self) -> Result<Self> {
        self.map_unary(UnaryOp::Sigmoid)
    }

    /// Raise every element to a fixed power.
    ///
    /// Integer elements accept only non-negative exponents.
    pub fn pow(&self, exponent: E) -> Result<Self> {
        if E::one().power(exponent).is_none() {
            return Err(TensorError::UnsupportedOperation {
                op: "pow",
                dtype: E::DTYPE,
            });
        }
        let count = self.count();
        let (src, offset) = self.materialized();
        let dst = B::allocate(count);
        B::pow(BufferRef::new(&src, offset), exponent, BufferRef::start(&dst), count)?;
        Ok(Self::from_op(
            dst,
            Layout::contiguous(self.shape().clone()),
            None,
            TensorOp::Pow {
                exponent: exponent.as_f64(),
            },
            vec![self.clone()],
        ))
    }

    /// exp(log(self) * power), with `power` broadcast like any binary
    /// operand. Defined for positive bases only.
    pub fn raised_to(&self, power: &Self) -> Result<Self> {
        self.log()?.mul(power)?.exp()
    }

    /// Element-wise maximum with suffix broadcasting. At ties the gradient
    /// goes to `other`.
    pub fn maximum(&self, other: &Self) -> Result<Self> {
        self.sub(other)?.relu()?.add(other)
    }

    /// Element-wise minimum with suffix broadcasting. At ties the gradient
    /// goes to `self`.
    pub fn minimum(&self, other: &Self) -> Result<Self> {
        self.sub(&self.sub(other)?.relu()?)
    }

    /// relu(x) - leakage * relu(-x)
    pub fn leaky_relu(&self, leakage: E) -> Result<Self> {
        let negative = self.neg()?.relu()?.mul_scalar(leakage)?;
        self.relu()?.sub(&negative)
    }

    // === Binary ===

    /// Apply `op` with suffix broadcasting.
    ///
    /// When ranks differ the kernel runs once per index of the longer
    /// operand's leading axes, reusing the shorter operand each time.
    fn zip_with(&self, other: &Self, op: BinaryOp) -> Result<Self> {
        let shape = self
            .shape()
            .broadcast_suffix(other.shape())
            .ok_or_else(|| TensorError::shape_mismatch(op.symbol(), self.shape(), other.shape()))?;
        let integer = !E::DTYPE.is_floating();
        if op == BinaryOp::Div && integer && other.to_vec().contains(&E::zero()) {
            return Err(TensorError::DivisionByZero {
                op: op.symbol(),
                dtype: E::DTYPE,
            });
        }

        let count = shape.numel();
        let dst = B::allocate(count);
        if count > 0 {
            let (lhs, lhs_offset) = self.materialized();
            let (rhs, rhs_offset) = other.materialized();
            let lhs = BufferRef::new(&lhs, lhs_offset);
            let rhs = BufferRef::new(&rhs, rhs_offset);
            let out = BufferRef::start(&dst);

            if self.shape() == other.shape() {
                B::binary(op, lhs, rhs, out, count);
            } else if other.shape().is_scalar() {
                let value = B::read(rhs, 1)[0];
                B::binary_scalar(op, lhs, value, out, count);
            } else if self.shape().is_scalar() {
                let value = B::read(lhs, 1)[0];
                B::scalar_binary(op, value, rhs, out, count);
            } else if self.dim() > other.dim() {
                let n = other.count();
                for i in 0..shape.prefix_numel(other.dim()) {
                    B::binary(op, lhs.advance(i * n), rhs, out.advance(i * n), n);
                }
            } else {
                let n = self.count();
                for i in 0..shape.prefix_numel(self.dim()) {
                    B::binary(op, lhs, rhs.advance(i * n), out.advance(i * n), n);
                }
            }
        }

        Ok(Self::from_op(
            dst,
            Layout::contiguous(shape),
            None,
            op.into(),
            vec![self.clone(), other.clone()],
        ))
    }

    /// Add: self + other
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, BinaryOp::Add)
    }

    /// Subtract: self - other
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, BinaryOp::Sub)
    }

    /// Multiply: self * other
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, BinaryOp::Mul)
    }

    /// Divide: self / other
    ///
    /// For integer elements a zero anywhere in `other` is an error.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, BinaryOp::Div)
    }

    pub fn add_scalar(&self, value: E) -> Result<Self> {
        self.add(&Self::scalar(value))
    }

    pub fn sub_scalar(&self, value: E) -> Result<Self> {
        self.sub(&Self::scalar(value))
    }

    pub fn mul_scalar(&self, value: E) -> Result<Self> {
        self.mul(&Self::scalar(value))
    }

    pub fn div_scalar(&self, value: E) -> Result<Self> {
        self.div(&Self::scalar(value))
    }

    /// value - self
    pub fn rsub_scalar(&self, value: E) -> Result<Self> {
        Self::scalar(value).sub(self)
    }

    /// 1 / self
    pub fn recip(&self) -> Result<Self> {
        Self::scalar(E::one()).div(self)
    }
}

// === Operator overloads ===
//
// Operators panic on invalid operands; use the named methods to get the error.

fn expect_op<E: Element, B: Backend>(result: Result<Tensor<E, B>>) -> Tensor<E, B> {
    result.unwrap_or_else(|e| panic!("{}", e))
}

impl<E: Element, B: Backend> std::ops::Neg for &Tensor<E, B> {
    type Output = Tensor<E, B>;
    fn neg(self) -> Tensor<E, B> {
        expect_op(Tensor::neg(self))
    }
}

impl<E: Element, B: Backend> std::ops::Neg for Tensor<E, B> {
    type Output = Tensor<E, B>;
    fn neg(self) -> Tensor<E, B> {
        expect_op(Tensor::neg(&self))
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident) => {
        impl<E: Element, B: Backend> std::ops::$trait<&Tensor<E, B>> for &Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: &Tensor<E, B>) -> Tensor<E, B> {
                expect_op(Tensor::$method(self, rhs))
            }
        }

        impl<E: Element, B: Backend> std::ops::$trait<Tensor<E, B>> for &Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: Tensor<E, B>) -> Tensor<E, B> {
                expect_op(Tensor::$method(self, &rhs))
            }
        }

        impl<E: Element, B: Backend> std::ops::$trait<&Tensor<E, B>> for Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: &Tensor<E, B>) -> Tensor<E, B> {
                expect_op(Tensor::$method(&self, rhs))
            }
        }

        impl<E: Element, B: Backend> std::ops::$trait<Tensor<E, B>> for Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: Tensor<E, B>) -> Tensor<E, B> {
                expect_op(Tensor::$method(&self, &rhs))
            }
        }

        impl<E: Element, B: Backend> std::ops::$trait<E> for &Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: E) -> Tensor<E, B> {
                expect_op(Tensor::$method(self, &Tensor::scalar(rhs)))
            }
        }

        impl<E: Element, B: Backend> std::ops::$trait<E> for Tensor<E, B> {
            type Output = Tensor<E, B>;
            fn $method(self, rhs: E) -> Tensor<E, B> {
                expect_op(Tensor::$method(&self, &Tensor::scalar(rhs)))
            }
        }
    };
}

impl_binary_operator!(Add, add);
impl_binary_operator!(Sub, sub);
impl_binary_operator!(Mul, mul);
impl_binary_operator!(Div, div);

macro_rules! impl_scalar_lhs_operator {
    ($elem:ty, $trait:ident, $method:ident) => {
        impl<B: Backend> std::ops::$trait<&Tensor<$elem, B>> for $elem {
            type Output = Tensor<$elem, B>;
            fn $method(self, rhs: &Tensor<$elem, B>) -> Tensor<$elem, B> {
                expect_op(Tensor::$method(&Tensor::scalar(self), rhs))
            }
        }

        impl<B: Backend> std::ops::$trait<Tensor<$elem, B>> for $elem {
            type Output = Tensor<$elem, B>;
            fn $method(self, rhs: Tensor<$elem, B>) -> Tensor<$elem, B> {
                expect_op(Tensor::$method(&Tensor::scalar(self), &rhs))
            }
        }
    };
    ($elem:ty) => {
        impl_scalar_lhs_operator!($elem, Add, add);
        impl_scalar_lhs_operator!($elem, Sub, sub);
        impl_scalar_lhs_operator!($elem, Mul, mul);
        impl_scalar_lhs_operator!($elem, Div, div);
    };
}

impl_scalar_lhs_operator!(f32);
impl_scalar_lhs_operator!(f64);
impl_scalar_lhs_operator!(i32);
