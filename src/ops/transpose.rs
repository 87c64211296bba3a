//! `DimShuffle` and its `TransposeInplace`/`transpose` specialization (spec
//! §4.F). Grounded on the teacher's permuted-stride view handling in
//! `vm::value::array_value`: a dimension shuffle never touches memory, it
//! only reorders shape/stride metadata over the same storage.

use std::rc::Rc;

use crate::array::TypedArrayResultRef;
use crate::buffer::StridedBuffer;
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, wire_owner, AliasMap, ArrayOp};

fn is_permutation(p: &[usize], rank: usize) -> bool {
    if p.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &i in p {
        if i >= rank || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

/// A permutation-only dimension shuffle: `tensor.py`'s `DimShuffle` also
/// supports inserting/dropping broadcastable (`'x'`) axes, which nothing in
/// this crate's scope needs (SPEC_FULL §3).
#[derive(Debug)]
pub struct DimShuffle {
    permutation: Vec<usize>,
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl DimShuffle {
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn build(x: TypedArrayResultRef, permutation: Vec<usize>) -> Result<Rc<DimShuffle>, GraphBuildError> {
        check_arity(std::slice::from_ref(&x), Some(1))?;
        let rank = x.borrow().ndim();
        if !is_permutation(&permutation, rank) {
            return Err(GraphBuildError::Coercion(format!(
                "DimShuffle: {:?} is not a permutation of 0..{}",
                permutation, rank
            )));
        }

        let in_pattern = x.borrow().broadcastable().to_vec();
        let out_pattern: Vec<bool> = permutation.iter().map(|&i| in_pattern[i]).collect();
        let dtype = x.borrow().dtype();

        let outputs = fresh_outputs(vec![(dtype, out_pattern)])?;
        let inputs = vec![x];
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            DimShuffle {
                permutation,
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

impl ArrayOp for DimShuffle {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn view_map(&self) -> AliasMap {
        AliasMap::from([(0, vec![0])])
    }

    fn perform(&self) -> Result<(), KernelError> {
        let x = self.inputs[0].borrow();
        let buf = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("DimShuffle input has no data".into()))?;

        let shape: Vec<usize> = self.permutation.iter().map(|&i| buf.shape[i]).collect();
        let strides: Vec<isize> = self.permutation.iter().map(|&i| buf.strides[i]).collect();
        let view = StridedBuffer::view(buf.storage.clone(), shape, strides, buf.offset);
        drop(x);
        self.outputs[0].borrow_mut().set_data_handle(view);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "DimShuffle"
    }
}

pub fn dimshuffle(x: TypedArrayResultRef, permutation: Vec<usize>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(DimShuffle::build(x, permutation)?.output())
}

/// `tensor.py`'s `transpose` is `DimShuffle(range(ndim)[::-1])` — the
/// reversal permutation, materialized here as a view (spec §4.F).
pub fn transpose_inplace(x: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    let rank = x.borrow().ndim();
    let permutation: Vec<usize> = (0..rank).rev().collect();
    dimshuffle(x, permutation)
}

/// `transpose` always materializes a fresh copy first (spec §4.F): unlike
/// `transpose_inplace`, the result never aliases the original's storage.
pub fn transpose(x: TypedArrayResultRef) -> Result<TypedArrayResultRef, GraphBuildError> {
    let copy = crate::ops::elementwise::tensor_copy(x)?;
    transpose_inplace(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::TypedArrayResult;
    use crate::buffer::{ArrayData, HostArray};
    use crate::dtype::DType;
    use std::rc::Rc as StdRc;

    fn matrix() -> TypedArrayResultRef {
        let r = TypedArrayResult::new_ref(DType::Float64, vec![false, false], None).unwrap();
        r.borrow_mut()
            .set_data(HostArray::new(
                ArrayData::Float64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                vec![2, 3],
            ))
            .unwrap();
        r
    }

    #[test]
    fn transpose_inplace_reverses_shape_and_shares_storage() {
        let m = matrix();
        let out = transpose_inplace(m.clone()).unwrap();
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.shape, vec![3, 2]);
            assert_eq!(
                buf.values(),
                ArrayData::Float64(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0])
            );
        });
        let m_handle = m.borrow().data_handle().unwrap();
        let out_handle = out.borrow().data_handle().unwrap();
        assert!(StdRc::ptr_eq(&m_handle.storage, &out_handle.storage));
    }

    #[test]
    fn transpose_materializes_a_fresh_copy() {
        let m = matrix();
        let out = transpose(m.clone()).unwrap();
        // Force evaluation of the whole chain: tensor_copy then transpose_inplace.
        let dimshuffle_op = out.borrow().owner().unwrap();
        // The DimShuffle's input is the tensor_copy output; perform it first.
        dimshuffle_op.inputs()[0]
            .borrow()
            .owner()
            .unwrap()
            .perform()
            .unwrap();
        dimshuffle_op.perform().unwrap();

        let m_handle = m.borrow().data_handle().unwrap();
        let out_handle = out.borrow().data_handle().unwrap();
        assert!(!StdRc::ptr_eq(&m_handle.storage, &out_handle.storage));
        out.borrow().with_data(|buf| {
            assert_eq!(
                buf.values(),
                ArrayData::Float64(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0])
            );
        });
    }

    #[test]
    fn non_permutation_is_rejected() {
        let m = matrix();
        assert!(DimShuffle::build(m, vec![0, 0]).is_err());
    }
}
