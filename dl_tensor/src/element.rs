//! Element types a tensor can hold and the scalar kernels they support.

use std::fmt;

use num_traits::{Num, NumCast};

/// Runtime tag for an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
}

impl DType {
    pub fn is_floating(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
        };
        f.write_str(name)
    }
}

/// Element-wise unary kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Square,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Sin,
    Cos,
    Tan,
    Relu,
    /// 1 where the input is positive, 0 elsewhere.
    Heaviside,
    Sigmoid,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Square => "square",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Relu => "relu",
            UnaryOp::Heaviside => "heaviside",
            UnaryOp::Sigmoid => "sigmoid",
        }
    }
}

/// Element-wise binary kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "×",
            BinaryOp::Div => "÷",
        }
    }

    /// Apply the operator to a pair of scalars.
    #[inline]
    pub fn apply<E: Element>(self, lhs: E, rhs: E) -> E {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }
}

/// A scalar type that can be stored in a tensor.
pub trait Element:
    Num + NumCast + Copy + PartialOrd + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const DTYPE: DType;

    /// Whether `apply_unary(op, _)` is defined for this type.
    fn supports(op: UnaryOp) -> bool;

    /// Apply a unary kernel, `None` if the type does not support it.
    fn apply_unary(op: UnaryOp, x: Self) -> Option<Self>;

    /// `self` raised to `exponent`, `None` where the type cannot represent it.
    fn power(self, exponent: Self) -> Option<Self>;

    fn from_f64(value: f64) -> Self;

    fn as_f64(self) -> f64;
}

macro_rules! impl_float_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn supports(_op: UnaryOp) -> bool {
                true
            }

            #[inline]
            fn apply_unary(op: UnaryOp, x: Self) -> Option<Self> {
                let y = match op {
                    UnaryOp::Neg => -x,
                    UnaryOp::Square => x * x,
                    UnaryOp::Exp => x.exp(),
                    UnaryOp::Log => x.ln(),
                    UnaryOp::Sqrt => x.sqrt(),
                    UnaryOp::Tanh => x.tanh(),
                    UnaryOp::Sin => x.sin(),
                    UnaryOp::Cos => x.cos(),
                    UnaryOp::Tan => x.tan(),
                    UnaryOp::Relu => {
                        if x > 0.0 {
                            x
                        } else {
                            0.0
                        }
                    }
                    UnaryOp::Heaviside => {
                        if x > 0.0 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
                };
                Some(y)
            }

            #[inline]
            fn power(self, exponent: Self) -> Option<Self> {
                Some(self.powf(exponent))
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_float_element!(f32, DType::F32);
impl_float_element!(f64, DType::F64);

impl Element for i32 {
    const DTYPE: DType = DType::I32;

    fn supports(op: UnaryOp) -> bool {
        matches!(
            op,
            UnaryOp::Neg | UnaryOp::Square | UnaryOp::Relu | UnaryOp::Heaviside
        )
    }

    #[inline]
    fn apply_unary(op: UnaryOp, x: Self) -> Option<Self> {
        match op {
            UnaryOp::Neg => Some(-x),
            UnaryOp::Square => Some(x * x),
            UnaryOp::Relu => Some(x.max(0)),
            UnaryOp::Heaviside => Some(if x > 0 { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Only non-negative exponents; the result wraps on overflow.
    #[inline]
    fn power(self, exponent: Self) -> Option<Self> {
        u32::try_from(exponent).ok().map(|e| self.wrapping_pow(e))
    }

    fn from_f64(value: f64) -> Self {
        value as i32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}
