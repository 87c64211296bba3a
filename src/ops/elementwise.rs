//! The broadcast-lift adapter and the elementwise op families it produces
//! (spec §4.C). `tensor.py`'s scalar-op library and `make_broadcast` factory
//! are external collaborators per spec §1; this module is the Rust stand-in
//! for both: `ScalarOp` is the closed scalar-op library, and `BroadcastOp`
//! is what `make_broadcast`/`wrap_broadcast` would return.

use std::rc::Rc;

use crate::array::{DataHandle, TypedArrayResultRef};
use crate::broadcast::{broadcast_all, broadcast_concrete_shapes, broadcast_input_offset};
use crate::buffer::{ArrayData, HostArray, StridedBuffer};
use crate::dtype::DType;
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, unify_dtype, wire_owner, AliasMap, ArrayOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Abs,
    Exp,
    Neg,
    Log,
    Log2,
    Sgn,
    Sqr,
    Sqrt,
    Cos,
    Sin,
    Tan,
    Cosh,
    Sinh,
    Tanh,
    Identity,
    Fill,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ScalarOp {
    pub fn arity(self) -> usize {
        use ScalarOp::*;
        match self {
            Abs | Exp | Neg | Log | Log2 | Sgn | Sqr | Sqrt | Cos | Sin | Tan | Cosh | Sinh
            | Tanh | Identity => 1,
            Fill | Add | Sub | Mul | Div | Pow | Lt | Le | Gt | Ge => 2,
        }
    }

    pub fn name(self) -> &'static str {
        use ScalarOp::*;
        match self {
            Abs => "Abs",
            Exp => "Exp",
            Neg => "Neg",
            Log => "Log",
            Log2 => "Log2",
            Sgn => "Sgn",
            Sqr => "Sqr",
            Sqrt => "Sqrt",
            Cos => "Cos",
            Sin => "Sin",
            Tan => "Tan",
            Cosh => "Cosh",
            Sinh => "Sinh",
            Tanh => "Tanh",
            Identity => "TensorCopy",
            Fill => "Fill",
            Add => "Add",
            Sub => "Sub",
            Mul => "Mul",
            Div => "Div",
            Pow => "Pow",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
        }
    }

    /// The output dtype this scalar op maps a (unified) input dtype to.
    /// Comparisons always produce `int8` as a stand-in for a boolean dtype
    /// (spec.md has no boolean dtype in its closed set; SPEC_FULL §3 notes
    /// this choice).
    pub fn result_dtype(self, unified_input: DType) -> DType {
        use ScalarOp::*;
        match self {
            Lt | Le | Gt | Ge => DType::Int8,
            _ => unified_input,
        }
    }

    pub fn apply_real(self, args: &[f64]) -> f64 {
        use ScalarOp::*;
        match self {
            Abs => args[0].abs(),
            Exp => args[0].exp(),
            Neg => -args[0],
            Log => args[0].ln(),
            Log2 => args[0].log2(),
            Sgn => {
                if args[0] > 0.0 {
                    1.0
                } else if args[0] < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Sqr => args[0] * args[0],
            Sqrt => args[0].sqrt(),
            Cos => args[0].cos(),
            Sin => args[0].sin(),
            Tan => args[0].tan(),
            Cosh => args[0].cosh(),
            Sinh => args[0].sinh(),
            Tanh => args[0].tanh(),
            Identity => args[0],
            Fill => args[1],
            Add => args[0] + args[1],
            Sub => args[0] - args[1],
            Mul => args[0] * args[1],
            Div => args[0] / args[1],
            Pow => args[0].powf(args[1]),
            Lt => (args[0] < args[1]) as i32 as f64,
            Le => (args[0] <= args[1]) as i32 as f64,
            Gt => (args[0] > args[1]) as i32 as f64,
            Ge => (args[0] >= args[1]) as i32 as f64,
        }
    }

    /// Complex-dtype semantics (spec §4.A "support_code" identities). Only
    /// the ops that have a well-defined closed form in (real, imag) pairs
    /// are implemented; everything else returns `None` so `perform` can
    /// report `KernelError::NotImplementedType`.
    pub fn apply_complex(self, args: &[(f64, f64)]) -> Option<(f64, f64)> {
        use ScalarOp::*;
        match self {
            Identity => Some(args[0]),
            Fill => Some(args[1]),
            Neg => Some((-args[0].0, -args[0].1)),
            Sqr => Some(complex_mul(args[0], args[0])),
            Add => Some((args[0].0 + args[1].0, args[0].1 + args[1].1)),
            Sub => Some((args[0].0 - args[1].0, args[0].1 - args[1].1)),
            Mul => Some(complex_mul(args[0], args[1])),
            Div => Some(complex_div(args[0], args[1])),
            _ => None,
        }
    }
}

fn complex_mul(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

fn complex_div(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let denom = b.0 * b.0 + b.1 * b.1;
    ((a.0 * b.0 + a.1 * b.1) / denom, (a.1 * b.0 - a.0 * b.1) / denom)
}

#[derive(Debug)]
pub struct BroadcastOp {
    scalar_op: ScalarOp,
    inplace: bool,
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl BroadcastOp {
    pub fn scalar_op(&self) -> ScalarOp {
        self.scalar_op
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    /// spec §4.B construction protocol, specialized by `ScalarOp`'s fixed
    /// arity and the broadcast-lift shape/dtype rules (spec §4.C).
    pub fn build(
        scalar_op: ScalarOp,
        inplace: bool,
        inputs: Vec<TypedArrayResultRef>,
    ) -> Result<Rc<BroadcastOp>, GraphBuildError> {
        check_arity(&inputs, Some(scalar_op.arity()))?;

        let patterns: Vec<_> = inputs.iter().map(|i| i.borrow().broadcastable().to_vec()).collect();
        let out_pattern = broadcast_all(&patterns);
        let unified = unify_dtype(&inputs)?;
        let out_dtype = scalar_op.result_dtype(unified);

        log::debug!(
            "{}: inferred output dtype={:?} broadcastable={:?}",
            scalar_op.name(),
            out_dtype,
            out_pattern
        );

        let outputs = fresh_outputs(vec![(out_dtype, out_pattern)])?;
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            BroadcastOp {
                scalar_op,
                inplace,
                inputs,
                outputs,
            }
        });
        Ok(op)
    }

    pub fn output(&self) -> TypedArrayResultRef {
        self.outputs[0].clone()
    }
}

impl ArrayOp for BroadcastOp {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn destroy_map(&self) -> AliasMap {
        if self.inplace {
            AliasMap::from([(0, vec![0])])
        } else {
            AliasMap::new()
        }
    }

    fn perform(&self) -> Result<(), KernelError> {
        let in_bufs: Vec<DataHandle> = self
            .inputs
            .iter()
            .map(|i| {
                i.borrow()
                    .data_handle()
                    .ok_or_else(|| KernelError::ShapeMismatch("missing input buffer".into()))
            })
            .collect::<Result<_, _>>()?;

        let shapes: Vec<Vec<usize>> = in_bufs.iter().map(|b| b.shape.clone()).collect();
        let out_shape = broadcast_concrete_shapes(&shapes)?;
        let out_dtype = self.outputs[0].borrow().dtype();

        let out_handle = if self.inplace {
            let handle = in_bufs[0].clone();
            if handle.shape != out_shape {
                return Err(KernelError::ShapeMismatch(format!(
                    "in-place op cannot grow destination shape {:?} to {:?}",
                    handle.shape, out_shape
                )));
            }
            handle
        } else {
            let n: usize = out_shape.iter().product();
            StridedBuffer::from_contiguous(ArrayData::zeros(out_dtype, n), out_shape.clone())
        };

        let n: usize = out_shape.iter().product();
        for lin in 0..n {
            // `out_handle` may itself be a non-contiguous view (the in-place
            // destination), so its write offset is computed the same way an
            // input's read offset is.
            let out_off = broadcast_input_offset(&out_shape, &out_handle.shape, &out_handle.strides, lin);
            if out_dtype.is_complex() {
                let mut args = Vec::with_capacity(in_bufs.len());
                for bb in &in_bufs {
                    let off = broadcast_input_offset(&out_shape, &bb.shape, &bb.strides, lin);
                    args.push(bb.get_complex(off));
                }
                let r = self
                    .scalar_op
                    .apply_complex(&args)
                    .ok_or(KernelError::NotImplementedType(out_dtype))?;
                out_handle.set_complex(out_off, r);
            } else {
                let mut args = Vec::with_capacity(in_bufs.len());
                for bb in &in_bufs {
                    let off = broadcast_input_offset(&out_shape, &bb.shape, &bb.strides, lin);
                    args.push(bb.get_f64(off));
                }
                let r = self.scalar_op.apply_real(&args);
                out_handle.set_f64(out_off, r);
            }
        }

        self.outputs[0].borrow_mut().set_data_handle(out_handle);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        self.scalar_op.name()
    }
}

fn lift(scalar_op: ScalarOp, inplace: bool, inputs: Vec<TypedArrayResultRef>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(BroadcastOp::build(scalar_op, inplace, inputs)?.output())
}

macro_rules! unary_ops {
    ($($fn_name:ident, $fn_inplace:ident => $variant:ident;)*) => {
        $(
            pub fn $fn_name(x: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
                lift(ScalarOp::$variant, false, vec![x])
            }
            pub fn $fn_inplace(x: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
                lift(ScalarOp::$variant, true, vec![x])
            }
        )*
    };
}

macro_rules! binary_ops {
    ($($fn_name:ident, $fn_inplace:ident => $variant:ident;)*) => {
        $(
            pub fn $fn_name(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
                lift(ScalarOp::$variant, false, vec![x, y])
            }
            pub fn $fn_inplace(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
                lift(ScalarOp::$variant, true, vec![x, y])
            }
        )*
    };
}

unary_ops! {
    abs_, abs_inplace => Abs;
    exp, exp_inplace => Exp;
    neg, neg_inplace => Neg;
    log, log_inplace => Log;
    log2, log2_inplace => Log2;
    sgn, sgn_inplace => Sgn;
    sqr, sqr_inplace => Sqr;
    sqrt, sqrt_inplace => Sqrt;
    cos, cos_inplace => Cos;
    sin, sin_inplace => Sin;
    tan, tan_inplace => Tan;
    cosh, cosh_inplace => Cosh;
    sinh, sinh_inplace => Sinh;
    tanh, tanh_inplace => Tanh;
}

binary_ops! {
    add, add_inplace => Add;
    sub, sub_inplace => Sub;
    mul, mul_inplace => Mul;
    div, div_inplace => Div;
    pow, pow_inplace => Pow;
    fill, fill_inplace => Fill;
}

/// `tensor_copy` has no in-place sibling (spec §4.C).
pub fn tensor_copy(x: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    lift(ScalarOp::Identity, false, vec![x])
}

pub fn lt(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    lift(ScalarOp::Lt, false, vec![x, y])
}
pub fn le(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    lift(ScalarOp::Le, false, vec![x, y])
}
pub fn gt(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    lift(ScalarOp::Gt, false, vec![x, y])
}
pub fn ge(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    lift(ScalarOp::Ge, false, vec![x, y])
}

/// `ones_like(model)` / `zeros_like(model)`: specialize `fill(model, v)`
/// with `1`/`0` (spec §4.C).
pub fn ones_like(model: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    fill_with(model, 1.0)
}

pub fn zeros_like(model: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    fill_with(model, 0.0)
}

fn fill_with(model: TypedArrayResultRef, value: f64) -> Result<TypedArrayResultRef, GraphBuildError> {
    let dtype = model.borrow().dtype();
    let v = crate::array::TypedArrayResult::new_ref(dtype, vec![], None)?;
    v.borrow_mut()
        .set_data(HostArray::scalar_f64(value))
        .map_err(GraphBuildError::from)?;
    fill(model, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::TypedArrayResult;
    use crate::buffer::ArrayData;

    fn vector(vals: Vec<f64>) -> TypedArrayResultRef {
        let r = TypedArrayResult::new_ref(DType::Float64, vec![false], None).unwrap();
        let n = vals.len();
        r.borrow_mut()
            .set_data(HostArray::new(ArrayData::Float64(vals), vec![n]))
            .unwrap();
        r
    }

    #[test]
    fn vector_plus_vector_end_to_end() {
        // spec §8 scenario 1
        let v = vector(vec![1.0, 2.0, 3.0]);
        let out = add(v.clone(), v).unwrap();
        let op = out.borrow().owner().unwrap();
        op.perform().unwrap();
        let result = out.borrow();
        assert_eq!(result.dtype(), DType::Float64);
        assert_eq!(result.broadcastable(), &[false]);
        result.with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![2.0, 4.0, 6.0]));
        });
    }

    #[test]
    fn broadcast_axis_is_or_of_inputs() {
        // spec §8 invariant 4: pairwise OR, not AND — an axis broadcastable
        // on either side comes out broadcastable in the output.
        let row = crate::array::TypedArrayResult::new_ref(DType::Float64, vec![true, false], None).unwrap();
        let col = crate::array::TypedArrayResult::new_ref(DType::Float64, vec![false, true], None).unwrap();
        let out = add(row, col).unwrap();
        assert_eq!(out.borrow().broadcastable(), &[true, true]);
    }

    #[test]
    fn ones_like_minus_ones_like_is_zeros_like() {
        let v = vector(vec![1.0, 2.0, 3.0]);
        let ones = ones_like(v.clone()).unwrap();
        ones.borrow().owner().unwrap().perform().unwrap();
        let zeros = zeros_like(v).unwrap();
        zeros.borrow().owner().unwrap().perform().unwrap();

        let diff = sub(ones, zeros.clone()).unwrap();
        diff.borrow().owner().unwrap().perform().unwrap();
        diff.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![1.0, 1.0, 1.0]));
        });
    }

    #[test]
    fn comparison_ops_produce_int8() {
        let a = vector(vec![1.0, 5.0]);
        let b = vector(vec![2.0, 2.0]);
        let out = lt(a, b).unwrap();
        assert_eq!(out.borrow().dtype(), DType::Int8);
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Int8(vec![1, 0]));
        });
    }

    #[test]
    fn tensor_copy_is_not_the_same_buffer_as_its_input() {
        let v = vector(vec![1.0, 2.0]);
        let copy = tensor_copy(v.clone()).unwrap();
        copy.borrow().owner().unwrap().perform().unwrap();
        let v_handle = v.borrow().data_handle().unwrap();
        let copy_handle = copy.borrow().data_handle().unwrap();
        assert!(!Rc::ptr_eq(&v_handle.storage, &copy_handle.storage));
        assert_eq!(v_handle.values(), copy_handle.values());
    }
}
