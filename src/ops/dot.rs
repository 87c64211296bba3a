//! `Dot` (spec §4.G): the rank-sensitive broadcast table for vector/matrix
//! products, grounded on the teacher's `vm::matmul` loop-nest shape for the
//! 2D·2D case, generalized to the four rank combinations `tensor.py`'s
//! `Dot.make_node` dispatches on.

use std::rc::Rc;

use crate::array::TypedArrayResultRef;
use crate::buffer::{ArrayData, StridedBuffer};
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, unify_dtype, wire_owner, ArrayOp};

#[derive(Debug)]
pub struct Dot {
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl Dot {
    /// spec §4.G: only rank 0/1/2 operands are dispatched; anything else is
    /// a build-time rank restriction, mirroring Gemm's own rank check.
    pub fn build(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<Rc<Dot>, GraphBuildError> {
        check_arity(&[x.clone(), y.clone()], Some(2))?;
        let x_rank = x.borrow().ndim();
        let y_rank = y.borrow().ndim();
        for (which, rank) in [("x", x_rank), ("y", y_rank)] {
            if rank > 2 {
                return Err(GraphBuildError::RankRestriction { which, got: rank });
            }
        }

        let dtype = unify_dtype(&[x.clone(), y.clone()])?;
        let out_pattern = dot_output_pattern(x.borrow().broadcastable(), y.borrow().broadcastable());
        log::debug!(
            "Dot: {}D . {}D -> {}D, dtype={:?}",
            x_rank,
            y_rank,
            out_pattern.len(),
            dtype
        );

        let outputs = fresh_outputs(vec![(dtype, out_pattern)])?;
        let inputs = vec![x, y];
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            Dot { inputs, outputs }
        });
        Ok(op)
    }

    pub fn output(&self) -> TypedArrayResultRef {
        self.outputs[0].clone()
    }
}

/// spec §4.G output-pattern table (`tensor.py:617-627`), derived from the
/// operands' own broadcastable patterns rather than forced to all-`false`:
/// `len(bx)==0 -> by`, `bx>=1, len(by)==0 -> bx`, `bx>=1, len(by)==1 ->
/// bx[:-1]`, `bx>=1, len(by)>=2 -> bx[:-1] + by[:-2] + by[-1:]`.
fn dot_output_pattern(bx: &[bool], by: &[bool]) -> Vec<bool> {
    if bx.is_empty() {
        by.to_vec()
    } else if by.is_empty() {
        bx.to_vec()
    } else if by.len() == 1 {
        bx[..bx.len() - 1].to_vec()
    } else {
        let mut out = bx[..bx.len() - 1].to_vec();
        out.extend_from_slice(&by[..by.len() - 2]);
        out.push(by[by.len() - 1]);
        out
    }
}

fn at(buf: &StridedBuffer, coords: &[usize]) -> f64 {
    let off: isize = coords.iter().zip(&buf.strides).map(|(&c, &s)| c as isize * s).sum();
    buf.get_f64(off)
}

impl ArrayOp for Dot {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    /// Autodiff graph construction is out of scope (spec Non-goals); `Dot`
    /// has a well-defined gradient in `tensor.py` but there is no backward
    /// graph builder here to hang it on.
    fn perform(&self) -> Result<(), KernelError> {
        let x = self.inputs[0].borrow();
        let y = self.inputs[1].borrow();
        let xb = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Dot: x has no data".into()))?;
        let yb = y
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Dot: y has no data".into()))?;
        let dtype = self.outputs[0].borrow().dtype();

        let out = match (xb.rank(), yb.rank()) {
            (0, 0) => {
                let buf = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, 1), Vec::new());
                buf.set_f64(0, xb.get_f64(0) * yb.get_f64(0));
                buf
            }
            (0, _) => {
                let x0 = xb.get_f64(0);
                let y_vals = yb.values();
                let buf = StridedBuffer::from_contiguous(
                    ArrayData::zeros(dtype, y_vals.len()),
                    yb.shape.clone(),
                );
                for i in 0..y_vals.len() {
                    buf.set_f64(i as isize, x0 * y_vals.get_f64(i));
                }
                buf
            }
            (_, 0) => {
                let y0 = yb.get_f64(0);
                let x_vals = xb.values();
                let buf = StridedBuffer::from_contiguous(
                    ArrayData::zeros(dtype, x_vals.len()),
                    xb.shape.clone(),
                );
                for i in 0..x_vals.len() {
                    buf.set_f64(i as isize, x_vals.get_f64(i) * y0);
                }
                buf
            }
            (1, 1) => {
                if xb.shape[0] != yb.shape[0] {
                    return Err(KernelError::ShapeMismatch(format!(
                        "dot: {:?} vs {:?}",
                        xb.shape, yb.shape
                    )));
                }
                let mut acc = 0.0;
                for i in 0..xb.shape[0] {
                    acc += at(&xb, &[i]) * at(&yb, &[i]);
                }
                let buf = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, 1), Vec::new());
                buf.set_f64(0, acc);
                buf
            }
            (1, 2) => {
                if xb.shape[0] != yb.shape[0] {
                    return Err(KernelError::ShapeMismatch(format!(
                        "dot: {:?} vs {:?}",
                        xb.shape, yb.shape
                    )));
                }
                let n = yb.shape[1];
                let buf = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, n), vec![n]);
                for j in 0..n {
                    let mut acc = 0.0;
                    for i in 0..xb.shape[0] {
                        acc += at(&xb, &[i]) * at(&yb, &[i, j]);
                    }
                    buf.set_f64(j as isize, acc);
                }
                buf
            }
            (2, 1) => {
                if xb.shape[1] != yb.shape[0] {
                    return Err(KernelError::ShapeMismatch(format!(
                        "dot: {:?} vs {:?}",
                        xb.shape, yb.shape
                    )));
                }
                let m = xb.shape[0];
                let buf = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, m), vec![m]);
                for i in 0..m {
                    let mut acc = 0.0;
                    for k in 0..xb.shape[1] {
                        acc += at(&xb, &[i, k]) * at(&yb, &[k]);
                    }
                    buf.set_f64(i as isize, acc);
                }
                buf
            }
            (2, 2) => {
                if xb.shape[1] != yb.shape[0] {
                    return Err(KernelError::ShapeMismatch(format!(
                        "dot: {:?} vs {:?}",
                        xb.shape, yb.shape
                    )));
                }
                let (m, k_dim, n) = (xb.shape[0], xb.shape[1], yb.shape[1]);
                let buf = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, m * n), vec![m, n]);
                for i in 0..m {
                    for j in 0..n {
                        let mut acc = 0.0;
                        for k in 0..k_dim {
                            acc += at(&xb, &[i, k]) * at(&yb, &[k, j]);
                        }
                        buf.set_f64((i * n + j) as isize, acc);
                    }
                }
                buf
            }
            (xr, yr) => {
                return Err(KernelError::ShapeMismatch(format!(
                    "dot: unsupported ranks {} and {}",
                    xr, yr
                )))
            }
        };

        self.outputs[0].borrow_mut().set_data_handle(out);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "Dot"
    }
}

pub fn dot(x: TypedArrayResultRef, y: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(Dot::build(x, y)?.output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::TypedArrayResult;
    use crate::buffer::HostArray;
    use crate::dtype::DType;

    fn vec3(vals: Vec<f64>) -> TypedArrayResultRef {
        let r = TypedArrayResult::new_ref(DType::Float64, vec![false], None).unwrap();
        let n = vals.len();
        r.borrow_mut()
            .set_data(HostArray::new(ArrayData::Float64(vals), vec![n]))
            .unwrap();
        r
    }

    fn mat2x2(vals: Vec<f64>) -> TypedArrayResultRef {
        let r = TypedArrayResult::new_ref(DType::Float64, vec![false, false], None).unwrap();
        r.borrow_mut()
            .set_data(HostArray::new(ArrayData::Float64(vals), vec![2, 2]))
            .unwrap();
        r
    }

    fn scalar(v: f64) -> TypedArrayResultRef {
        let r = TypedArrayResult::new_ref(DType::Float64, vec![], None).unwrap();
        r.borrow_mut().set_data(HostArray::scalar_f64(v)).unwrap();
        r
    }

    #[test]
    fn vector_dot_vector_is_scalar() {
        let a = vec3(vec![1.0, 2.0, 3.0]);
        let b = vec3(vec![4.0, 5.0, 6.0]);
        let out = dot(a, b).unwrap();
        assert_eq!(out.borrow().ndim(), 0);
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![32.0]));
        });
    }

    #[test]
    fn matrix_dot_matrix() {
        let a = mat2x2(vec![1.0, 2.0, 3.0, 4.0]);
        let b = mat2x2(vec![5.0, 6.0, 7.0, 8.0]);
        let out = dot(a, b).unwrap();
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![19.0, 22.0, 43.0, 50.0]));
        });
    }

    #[test]
    fn rank_3_is_rejected_at_build_time() {
        let a = TypedArrayResult::new_ref(DType::Float64, vec![false, false, false], None).unwrap();
        let b = vec3(vec![1.0, 2.0, 3.0]);
        assert!(Dot::build(a, b).is_err());
    }

    #[test]
    fn scalar_dot_scalar() {
        let out = dot(scalar(3.0), scalar(4.0)).unwrap();
        assert_eq!(out.borrow().ndim(), 0);
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![12.0]));
        });
    }

    #[test]
    fn scalar_dot_matrix_takes_the_matrix_pattern() {
        let m = mat2x2(vec![1.0, 2.0, 3.0, 4.0]);
        let out = dot(scalar(2.0), m).unwrap();
        assert_eq!(out.borrow().broadcastable(), &[false, false]);
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![2.0, 4.0, 6.0, 8.0]));
        });
    }

    #[test]
    fn vector_dot_matrix_drops_the_vectors_own_axis() {
        // bx=[false] (len 1), by=[false,false] (len>=2) ->
        // bx[:-1] + by[:-2] + by[-1:] = [] + [] + [false] = [false].
        let v = vec3(vec![1.0, 2.0]);
        let m = mat2x2(vec![1.0, 2.0, 3.0, 4.0]);
        let out = dot(v, m).unwrap();
        assert_eq!(out.borrow().broadcastable(), &[false]);
    }

    #[test]
    fn broadcastable_axes_propagate_through_the_output_pattern() {
        // bx=[true,false], by=[false] (len 1) -> bx[:-1] = [true].
        let x = TypedArrayResult::new_ref(DType::Float64, vec![true, false], None).unwrap();
        let y = TypedArrayResult::new_ref(DType::Float64, vec![false], None).unwrap();
        let out = Dot::build(x, y).unwrap().output();
        assert_eq!(out.borrow().broadcastable(), &[true]);
    }
}
