//! `Argmax`/`Max` (spec §4.E) and the supplemented `Sum` passthrough
//! (SPEC_FULL §3). Grounded on the teacher's reduction-by-walking-strides
//! style already used for `vm::matmul`'s own loop nests, adapted here to a
//! single reduced axis.

use std::rc::Rc;

use crate::array::TypedArrayResultRef;
use crate::buffer::{ArrayData, StridedBuffer};
use crate::dtype::DType;
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, wire_owner, ArrayOp};

/// Resolves an opaque axis argument against `rank` (spec §4.E "axis is an
/// opaque-result value"; here it is a plain `Option<i64>` since this core
/// has no symbolic integer result type — see SPEC_FULL §9 decision on
/// opaque-result parameters). `None` defaults to the last axis.
fn resolve_axis(axis: Option<i64>, rank: usize) -> Result<usize, GraphBuildError> {
    if rank == 0 {
        return Err(GraphBuildError::InvalidAxis { axis: 0, rank });
    }
    let axis = axis.unwrap_or(rank as i64 - 1);
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(GraphBuildError::InvalidAxis { axis, rank });
    }
    Ok(resolved as usize)
}

fn drop_axis(pattern: &[bool], axis: usize) -> Vec<bool> {
    pattern
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != axis)
        .map(|(_, &b)| b)
        .collect()
}

/// Shape with `axis` removed.
fn drop_shape_axis(shape: &[usize], axis: usize) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != axis)
        .map(|(_, &d)| d)
        .collect()
}

/// `out_coords` (coordinates into the reduced shape) plus a value for the
/// reduced axis gives the full input coordinate vector.
fn full_coords(out_coords: &[usize], axis: usize, axis_val: usize) -> Vec<usize> {
    let mut c = out_coords.to_vec();
    c.insert(axis, axis_val);
    c
}

fn linear_offset(coords: &[usize], strides: &[isize]) -> isize {
    coords.iter().zip(strides).map(|(&c, &s)| c as isize * s).sum()
}

fn out_shape_iter(shape: &[usize]) -> Vec<Vec<usize>> {
    if shape.is_empty() {
        return vec![Vec::new()];
    }
    let mut out = vec![Vec::new()];
    for &dim in shape {
        let mut next = Vec::with_capacity(out.len() * dim);
        for coords in &out {
            for i in 0..dim {
                let mut c = coords.clone();
                c.push(i);
                next.push(c);
            }
        }
        out = next;
    }
    out
}

/// Two-output reduction computing the max value and its index along one
/// axis (spec §4.E). `max()`/`argmax()` are thin wrappers selecting one
/// output.
#[derive(Debug)]
pub struct MaxAndArgmax {
    axis: usize,
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl MaxAndArgmax {
    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn build(x: TypedArrayResultRef, axis: Option<i64>) -> Result<Rc<MaxAndArgmax>, GraphBuildError> {
        check_arity(std::slice::from_ref(&x), Some(1))?;
        let rank = x.borrow().ndim();
        let axis = resolve_axis(axis, rank)?;
        log::debug!("MaxAndArgmax: reducing axis {} of rank {}", axis, rank);

        let dtype = x.borrow().dtype();
        let in_pattern = x.borrow().broadcastable().to_vec();
        let out_pattern = drop_axis(&in_pattern, axis);

        let outputs = fresh_outputs(vec![
            (dtype, out_pattern.clone()),
            (DType::Int64, out_pattern),
        ])?;
        let inputs = vec![x];
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            MaxAndArgmax {
                axis,
                inputs,
                outputs,
            }
        });
        Ok(op)
    }

    pub fn maxval(&self) -> TypedArrayResultRef {
        self.outputs[0].clone()
    }

    pub fn argidx(&self) -> TypedArrayResultRef {
        self.outputs[1].clone()
    }
}

impl ArrayOp for MaxAndArgmax {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn perform(&self) -> Result<(), KernelError> {
        let x = self.inputs[0].borrow();
        let buf = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("MaxAndArgmax input has no data".into()))?;

        let out_shape = drop_shape_axis(&buf.shape, self.axis);
        let n_reduced = buf.shape[self.axis];
        let axis_stride = buf.strides[self.axis];

        let maxval_dtype = self.outputs[0].borrow().dtype();
        let n_out: usize = out_shape.iter().product();
        let maxval_buf = StridedBuffer::from_contiguous(ArrayData::zeros(maxval_dtype, n_out), out_shape.clone());
        let argidx_buf = StridedBuffer::from_contiguous(ArrayData::zeros(DType::Int64, n_out), out_shape.clone());

        for (lin, out_coords) in out_shape_iter(&out_shape).into_iter().enumerate() {
            let base_coords = full_coords(&out_coords, self.axis, 0);
            let base_off = linear_offset(&base_coords, &buf.strides);

            let mut best_val = buf.get_f64(base_off);
            let mut best_idx: i64 = 0;
            for k in 1..n_reduced {
                let off = base_off + k as isize * axis_stride;
                let val = buf.get_f64(off);
                if val > best_val {
                    best_val = val;
                    best_idx = k as i64;
                }
            }
            maxval_buf.set_f64(lin as isize, best_val);
            argidx_buf.set_f64(lin as isize, best_idx as f64);
        }

        self.outputs[0].borrow_mut().set_data_handle(maxval_buf);
        self.outputs[1].borrow_mut().set_data_handle(argidx_buf);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "MaxAndArgmax"
    }
}

pub fn max(x: TypedArrayResultRef, axis: Option<i64>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(MaxAndArgmax::build(x, axis)?.maxval())
}

pub fn argmax(x: TypedArrayResultRef, axis: Option<i64>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(MaxAndArgmax::build(x, axis)?.argidx())
}

/// `Sum` (SPEC_FULL §3 supplemented feature): single-axis or full reduction.
#[derive(Debug)]
pub struct Sum {
    axis: Option<usize>,
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl Sum {
    pub fn build(x: TypedArrayResultRef, axis: Option<i64>) -> Result<Rc<Sum>, GraphBuildError> {
        check_arity(std::slice::from_ref(&x), Some(1))?;
        let rank = x.borrow().ndim();
        let resolved_axis = match axis {
            None => None,
            Some(a) => Some(resolve_axis(Some(a), rank)?),
        };

        let dtype = x.borrow().dtype();
        let in_pattern = x.borrow().broadcastable().to_vec();
        let out_pattern = match resolved_axis {
            Some(axis) => drop_axis(&in_pattern, axis),
            None => Vec::new(),
        };

        let outputs = fresh_outputs(vec![(dtype, out_pattern)])?;
        let inputs = vec![x];
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            Sum {
                axis: resolved_axis,
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

impl ArrayOp for Sum {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn perform(&self) -> Result<(), KernelError> {
        let x = self.inputs[0].borrow();
        let buf = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Sum input has no data".into()))?;
        let dtype = self.outputs[0].borrow().dtype();

        match self.axis {
            None => {
                let n: usize = buf.shape.iter().product();
                let mut total = 0.0f64;
                for lin in 0..n {
                    let off = crate::broadcast::broadcast_input_offset(&buf.shape, &buf.shape, &buf.strides, lin);
                    total += buf.get_f64(off);
                }
                let out = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, 1), Vec::new());
                out.set_f64(0, total);
                self.outputs[0].borrow_mut().set_data_handle(out);
            }
            Some(axis) => {
                let out_shape = drop_shape_axis(&buf.shape, axis);
                let n_reduced = buf.shape[axis];
                let axis_stride = buf.strides[axis];
                let n_out: usize = out_shape.iter().product();
                let out = StridedBuffer::from_contiguous(ArrayData::zeros(dtype, n_out), out_shape.clone());

                for (lin, out_coords) in out_shape_iter(&out_shape).into_iter().enumerate() {
                    let base_coords = full_coords(&out_coords, axis, 0);
                    let base_off = linear_offset(&base_coords, &buf.strides);
                    let mut total = 0.0f64;
                    for k in 0..n_reduced {
                        total += buf.get_f64(base_off + k as isize * axis_stride);
                    }
                    out.set_f64(lin as isize, total);
                }
                self.outputs[0].borrow_mut().set_data_handle(out);
            }
        }
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "Sum"
    }
}

pub fn sum(x: TypedArrayResultRef, axis: Option<i64>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(Sum::build(x, axis)?.output())
}
