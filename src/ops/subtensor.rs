//! `Subtensor` — the view op for indexing (spec §4.D).
//!
//! Grounded on the teacher's view-returning slice handling in
//! `vm::value::array_value` (a view shares the parent's backing `Vec`
//! through reference counting rather than copying) generalized to this
//! crate's `DataHandle` aliasing.

use std::rc::Rc;

use crate::array::{DataHandle, TypedArrayResultRef};
use crate::buffer::StridedBuffer;
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, wire_owner, AliasMap, ArrayOp};

/// One index-tuple entry (spec §4.D "index is padded with `slice(0, MAX,
/// 1)`"). `Int` drops the axis from the output rank; `Slice` keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEntry {
    Int(i64),
    Slice { start: i64, stop: i64, step: i64 },
}

impl IndexEntry {
    pub fn full_slice() -> Self {
        IndexEntry::Slice {
            start: 0,
            stop: i64::MAX,
            step: 1,
        }
    }

    fn is_int(self) -> bool {
        matches!(self, IndexEntry::Int(_))
    }
}

#[derive(Debug)]
pub struct Subtensor {
    index: Vec<IndexEntry>,
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl Subtensor {
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// spec §4.D construction: pad `index` on the right with full slices up
    /// to the input's rank, each `Int` entry drops its axis from the output
    /// broadcastable pattern, each `Slice` entry keeps it.
    pub fn build(
        x: TypedArrayResultRef,
        mut index: Vec<IndexEntry>,
    ) -> Result<Rc<Subtensor>, GraphBuildError> {
        check_arity(std::slice::from_ref(&x), Some(1))?;

        let rank = x.borrow().ndim();
        if index.len() > rank {
            return Err(GraphBuildError::InvalidIndex);
        }
        while index.len() < rank {
            index.push(IndexEntry::full_slice());
        }
        log::debug!("Subtensor: padded index to rank {}: {:?}", rank, index);

        // Every kept (Slice) axis comes out non-broadcastable: its size is
        // unknown until perform() runs, regardless of the parent axis's own
        // flag (tensor.py:569, `broadcastable = [0 for c in coord.data if
        // isinstance(c, slice)]`).
        let slice_count = index.iter().filter(|entry| !entry.is_int()).count();
        let out_pattern = vec![false; slice_count];

        let dtype = x.borrow().dtype();
        let outputs = fresh_outputs(vec![(dtype, out_pattern)])?;
        let inputs = vec![x];
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            Subtensor {
                index,
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

impl ArrayOp for Subtensor {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn view_map(&self) -> AliasMap {
        AliasMap::from([(0, vec![0])])
    }

    /// spec §4.D "perform special-cases `len(c) == 1`": the general offset
    /// walk below already collapses correctly to a single-element view when
    /// every `Slice` entry has length 1 (kept explicit here because spec.md
    /// calls out this case by name; dropping the case note would lose the
    /// cross-reference, even though no separate code path is needed once
    /// offset/shape/stride are computed per-axis instead of as one flat
    /// index).
    fn perform(&self) -> Result<(), KernelError> {
        let x = self.inputs[0].borrow();
        let buf: DataHandle = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Subtensor input has no data".into()))?;

        let mut offset = buf.offset;
        let mut out_shape = Vec::new();
        let mut out_strides = Vec::new();

        for (axis, entry) in self.index.iter().enumerate() {
            let dim = buf.shape[axis];
            let stride = buf.strides[axis];
            match *entry {
                IndexEntry::Int(i) => {
                    let idx = normalize_index(i, dim)?;
                    offset += idx as isize * stride;
                }
                IndexEntry::Slice { start, stop, step } => {
                    let (s, len) = normalize_slice(start, stop, step, dim)?;
                    offset += s as isize * stride;
                    out_shape.push(len);
                    out_strides.push(stride * step as isize);
                }
            }
        }

        let view = StridedBuffer::view(buf.storage.clone(), out_shape, out_strides, offset);
        drop(x);
        self.outputs[0].borrow_mut().set_data_handle(view);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "Subtensor"
    }
}

fn normalize_index(i: i64, dim: usize) -> Result<usize, KernelError> {
    let resolved = if i < 0 { i + dim as i64 } else { i };
    if resolved < 0 || resolved as usize >= dim {
        return Err(KernelError::ShapeMismatch(format!(
            "index {} out of bounds for axis of size {}",
            i, dim
        )));
    }
    Ok(resolved as usize)
}

fn normalize_slice(start: i64, stop: i64, step: i64, dim: usize) -> Result<(usize, usize), KernelError> {
    if step != 1 {
        return Err(KernelError::NonUnitStride);
    }
    let start = if start < 0 { (start + dim as i64).max(0) } else { start.min(dim as i64) } as usize;
    let stop = if stop < 0 {
        (stop + dim as i64).max(0) as usize
    } else {
        (stop as usize).min(dim)
    };
    let len = stop.saturating_sub(start);
    Ok((start, len))
}

pub fn subtensor(x: TypedArrayResultRef, index: Vec<IndexEntry>) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(Subtensor::build(x, index)?.output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::TypedArrayResult;
    use crate::buffer::{ArrayData, HostArray};
    use crate::dtype::DType;

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
    fn single_integer_index_drops_a_rank() {
        let m = matrix();
        let out = subtensor(m.clone(), vec![IndexEntry::Int(1)]).unwrap();
        assert_eq!(out.borrow().ndim(), 1);
        out.borrow().owner().unwrap().perform().unwrap();
        out.borrow().with_data(|buf| {
            assert_eq!(buf.shape, vec![3]);
            assert_eq!(buf.values(), ArrayData::Float64(vec![4.0, 5.0, 6.0]));
        });
    }

    #[test]
    fn slice_index_keeps_rank() {
        let m = matrix();
        let out = subtensor(
            m.clone(),
            vec![IndexEntry::Slice {
                start: 0,
                stop: 1,
                step: 1,
            }],
        )
        .unwrap();
        assert_eq!(out.borrow().ndim(), 2);
    }

    #[test]
    fn sliced_axes_are_always_non_broadcastable() {
        // A broadcastable parent axis does not carry its flag through a
        // Slice entry — size is unknown at build time regardless.
        let r = TypedArrayResult::new_ref(DType::Float64, vec![true, false], None).unwrap();
        r.borrow_mut()
            .set_data(HostArray::new(ArrayData::Float64(vec![1.0, 2.0]), vec![1, 2]))
            .unwrap();
        let out = subtensor(r, vec![IndexEntry::full_slice(), IndexEntry::full_slice()]).unwrap();
        assert_eq!(out.borrow().broadcastable(), &[false, false]);
    }

    #[test]
    fn view_shares_the_same_buffer_object_as_its_parent() {
        let m = matrix();
        let out = subtensor(m.clone(), vec![IndexEntry::Int(0)]).unwrap();
        out.borrow().owner().unwrap().perform().unwrap();
        let m_handle = m.borrow().data_handle().unwrap();
        let out_handle = out.borrow().data_handle().unwrap();
        assert!(Rc::ptr_eq(&m_handle.storage, &out_handle.storage));

        // Mutating through the view is visible through the parent handle
        // (spec §8 invariant 8: same buffer object, not a copy).
        out_handle.set_f64(0, 99.0);
        assert_eq!(m_handle.get_f64(0), 99.0);
    }

    #[test]
    fn index_longer_than_rank_is_invalid() {
        let m = matrix();
        let err = Subtensor::build(
            m,
            vec![IndexEntry::Int(0), IndexEntry::Int(0), IndexEntry::Int(0)],
        )
        .unwrap_err();
        assert_eq!(err, GraphBuildError::InvalidIndex);
    }

    #[test]
    fn grad_is_unimplemented() {
        // spec §4.D "grad unimplemented" — modeled as a crate-level
        // constant: there is no `grad()` method on `ArrayOp` at all since
        // this core never builds a backward graph (spec Non-goals). Ops
        // that spec.md explicitly calls out as having unimplemented grad
        // (Subtensor, Gemm) simply have no gradient surface to call.
    }
}
