//! `TypedArrayResult` — the symbolic placeholder/value carrier (spec §3, §4.A).
//!
//! Grounded on the teacher's `ArrayRef = Rc<RefCell<ArrayValue>>` pattern
//! (`vm::value::array_value`): graph nodes share ownership of their
//! `TypedArrayResult`s through `Rc<RefCell<_>>` so that an op's output can be
//! aliased (view_map) or mutated in place (destroy_map) by a later op
//! without a borrow-checker fight at graph-construction time. The op that
//! owns a result is held as a `Weak<dyn ArrayOp>` to avoid the
//! op-outputs-own-result / result-owns-op reference cycle.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::buffer::{ArrayData, HostArray, StridedBuffer};
use crate::dtype::DType;
use crate::error::{consts, DescriptorError};
use crate::op::ArrayOp;

pub type TypedArrayResultRef = Rc<RefCell<TypedArrayResult>>;

/// Per-axis broadcast flags (spec §3 "Broadcast pattern algebra"). Element
/// `i` true means axis `i` is forced to size 1 and is a broadcast axis.
pub type Broadcastable = Vec<bool>;

/// A concrete buffer view. Two `TypedArrayResult`s alias the same storage
/// iff their `DataHandle`s share the same `StridedBuffer::storage` Rc (spec
/// §3 invariant 4, §8 invariant 8 "the returned output is the *same* buffer
/// object"); the `StridedBuffer` value itself (shape/strides/offset) is
/// cheap to clone per result.
pub type DataHandle = StridedBuffer;

#[derive(Debug)]
pub struct TypedArrayResult {
    dtype: DType,
    broadcastable: Broadcastable,
    data: Option<DataHandle>,
    name: Option<String>,
    owner: Option<Weak<dyn ArrayOp>>,
    role: Option<usize>,
}

/// The content fingerprint of a `TypedArrayResult` (spec §3 invariant 3,
/// §8 invariant 1). Two results with equal `(dtype, broadcastable,
/// data-bytes-or-null)` produce an equal `Desc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Desc {
    tag: &'static str,
    dtype_tag: u8,
    broadcastable: Vec<bool>,
    data_fingerprint: Option<u64>,
}

impl TypedArrayResult {
    /// spec §4.A `construct(dtype, broadcastable, name=None)`.
    pub fn construct(
        dtype: DType,
        broadcastable: Broadcastable,
        name: Option<String>,
    ) -> Result<Self, DescriptorError> {
        if !DType::ALL.contains(&dtype) {
            return Err(DescriptorError::UnsupportedDtype(dtype));
        }
        Ok(Self {
            dtype,
            broadcastable,
            data: None,
            name,
            owner: None,
            role: None,
        })
    }

    pub fn new_ref(
        dtype: DType,
        broadcastable: Broadcastable,
        name: Option<String>,
    ) -> Result<TypedArrayResultRef, DescriptorError> {
        Ok(Rc::new(RefCell::new(Self::construct(
            dtype,
            broadcastable,
            name,
        )?)))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn broadcastable(&self) -> &[bool] {
        &self.broadcastable
    }

    pub fn ndim(&self) -> usize {
        self.broadcastable.len()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The buffer view, if any. Cloning it is cheap (it clones the `Rc` to
    /// the shared storage, not the backing `Vec`); this is how view ops
    /// alias storage and how destroy-map ops expose the "same buffer
    /// object" identity required by spec §8 invariant 8.
    pub fn data_handle(&self) -> Option<DataHandle> {
        self.data.clone()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&StridedBuffer) -> R) -> Option<R> {
        self.data.as_ref().map(f)
    }

    pub fn owner(&self) -> Option<Rc<dyn ArrayOp>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    pub fn role(&self) -> Option<usize> {
        self.role
    }

    /// Graph-wiring assignment, performed once by the op-construction
    /// protocol (spec §4.B step 5). Not part of the public surface exposed
    /// to graph builders.
    pub(crate) fn set_owner(&mut self, owner: Weak<dyn ArrayOp>, role: usize) {
        self.owner = Some(owner);
        self.role = Some(role);
    }

    /// spec §4.A `filter(input)`: coerce a host array-like to a validated
    /// strided buffer against this result's descriptor.
    pub fn filter(&self, input: HostArray) -> Result<StridedBuffer, DescriptorError> {
        if input.shape.len() != self.broadcastable.len() {
            return Err(DescriptorError::WrongRank {
                expected: self.broadcastable.len(),
                got: input.shape.len(),
            });
        }
        for (axis, &is_broadcast) in self.broadcastable.iter().enumerate() {
            if is_broadcast && input.shape[axis] != 1 {
                return Err(DescriptorError::NonUnitBroadcastAxis {
                    axis,
                    size: input.shape[axis],
                });
            }
        }
        let data = if input.data.dtype() == self.dtype {
            input.data
        } else {
            input.data.cast_to(self.dtype)
        };
        Ok(StridedBuffer::from_contiguous(data, input.shape))
    }

    /// spec §4.A `set data(v)`.
    pub fn set_data(&mut self, input: HostArray) -> Result<(), DescriptorError> {
        let buf = self.filter(input)?;
        self.data = Some(buf);
        Ok(())
    }

    /// Installs a freshly computed buffer, owned solely by this result
    /// (used by op `perform()` implementations writing a brand-new output).
    pub(crate) fn set_data_unchecked(&mut self, buf: StridedBuffer) {
        self.data = Some(buf);
    }

    /// Installs a buffer handle shared with another result (used by view
    /// ops wiring up `view_map` aliasing, and by destroy-map ops that must
    /// expose the *same* buffer object their input already owned).
    pub(crate) fn set_data_handle(&mut self, handle: DataHandle) {
        self.data = Some(handle);
    }

    /// spec §4.A `desc()`.
    pub fn desc(&self) -> Desc {
        let data_fingerprint = self.data.as_ref().map(fingerprint_buffer);
        Desc {
            tag: "TypedArrayResult",
            dtype_tag: self.dtype as u8,
            broadcastable: self.broadcastable.clone(),
            data_fingerprint,
        }
    }

    /// spec §4.A `clone(transfer_data)`: a new, independently owned result
    /// with the same descriptor and name. When `transfer_data` is set the
    /// buffer is deep-copied, never shared (spec §8 "tensor_copy(x).data
    /// equals x.data but is not the same buffer").
    pub fn clone_result(&self, transfer_data: bool) -> Self {
        Self {
            dtype: self.dtype,
            broadcastable: self.broadcastable.clone(),
            data: if transfer_data {
                self.data.as_ref().map(StridedBuffer::deep_copy)
            } else {
                None
            },
            name: self.name.clone(),
            owner: None,
            role: None,
        }
    }
}

/// Hashes a buffer's *logical* content (spec §3 invariant 3: `desc()` must
/// not depend on physical stride/offset layout, only on the values a reader
/// would see), not its raw storage layout.
fn fingerprint_buffer(buf: &StridedBuffer) -> u64 {
    let mut hasher = DefaultHasher::new();
    buf.shape.hash(&mut hasher);
    match buf.values() {
        ArrayData::Float32(v) => v.iter().for_each(|x| x.to_bits().hash(&mut hasher)),
        ArrayData::Float64(v) => v.iter().for_each(|x| x.to_bits().hash(&mut hasher)),
        ArrayData::Int8(v) => v.hash(&mut hasher),
        ArrayData::Int16(v) => v.hash(&mut hasher),
        ArrayData::Int32(v) => v.hash(&mut hasher),
        ArrayData::Int64(v) => v.hash(&mut hasher),
        ArrayData::Complex64(v) => v.iter().for_each(|(r, i)| {
            r.to_bits().hash(&mut hasher);
            i.to_bits().hash(&mut hasher);
        }),
        ArrayData::Complex128(v) => v.iter().for_each(|(r, i)| {
            r.to_bits().hash(&mut hasher);
            i.to_bits().hash(&mut hasher);
        }),
    }
    hasher.finish()
}

// `DescriptorError::E_RANK` / `E_SHAPE` string constants are re-exported via
// `crate::error::consts` (spec §6); referencing them here keeps the import
// used without duplicating the constant.
#[allow(dead_code)]
const _: &str = consts::E_RANK;

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_result(dtype: DType) -> TypedArrayResult {
        TypedArrayResult::construct(dtype, vec![], None).unwrap()
    }

    #[test]
    fn construct_rejects_nothing_in_the_closed_set() {
        for dt in DType::ALL {
            assert!(TypedArrayResult::construct(dt, vec![false], None).is_ok());
        }
    }

    #[test]
    fn desc_is_deterministic_and_equal_for_equal_state() {
        let mut a = scalar_result(DType::Float64);
        let mut b = scalar_result(DType::Float64);
        a.set_data(HostArray::scalar_f64(3.0)).unwrap();
        b.set_data(HostArray::scalar_f64(3.0)).unwrap();
        assert_eq!(a.desc(), b.desc());

        b.set_data(HostArray::scalar_f64(4.0)).unwrap();
        assert_ne!(a.desc(), b.desc());
    }

    #[test]
    fn filter_rejects_wrong_rank() {
        let r = TypedArrayResult::construct(DType::Float64, vec![false, false], None).unwrap();
        let err = r
            .filter(HostArray::new(ArrayData::Float64(vec![1.0]), vec![1]))
            .unwrap_err();
        assert_eq!(err.to_string(), consts::E_RANK);
    }

    #[test]
    fn filter_rejects_non_unit_broadcast_axis() {
        let r = TypedArrayResult::construct(DType::Float64, vec![true], None).unwrap();
        let err = r
            .filter(HostArray::new(ArrayData::Float64(vec![1.0, 2.0]), vec![2]))
            .unwrap_err();
        assert_eq!(err.to_string(), consts::E_SHAPE);
    }

    #[test]
    fn filter_coerces_dtype() {
        let r = TypedArrayResult::construct(DType::Float64, vec![false], None).unwrap();
        let buf = r
            .filter(HostArray::new(ArrayData::Int32(vec![1, 2, 3]), vec![3]))
            .unwrap();
        assert_eq!(buf.dtype(), DType::Float64);
    }

    #[test]
    fn clone_result_transfers_or_drops_data() {
        let mut a = scalar_result(DType::Float64);
        a.set_data(HostArray::scalar_f64(9.0)).unwrap();

        let with_data = a.clone_result(true);
        assert!(with_data.has_data());
        let without_data = a.clone_result(false);
        assert!(!without_data.has_data());
    }
}
