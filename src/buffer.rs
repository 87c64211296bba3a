//! Type-segregated strided buffer storage.
//!
//! Grounded on the teacher's `vm::value::array_data::ArrayData`: one
//! homogeneous `Vec` per element kind instead of a boxed trait object per
//! element, so elementwise kernels stay monomorphic. `HostArray` is the
//! pre-coercion counterpart a caller constructs directly (there is no
//! dynamic, numpy-like host object available to this crate; callers hand
//! in shape + flat data and let `TypedArrayResult::set_data` coerce it).
//!
//! `StridedBuffer` separates the flat backing storage (`Storage`, shared via
//! `Rc<RefCell<_>>`) from the shape/stride/offset view over it, so that two
//! `StridedBuffer`s can alias the same storage while disagreeing about shape
//! (Subtensor's `view_map`) — the Rc is cloned, never the `Vec` it guards.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dtype::DType;

pub type Complex32 = (f32, f32);
pub type Complex64Pair = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Complex64(Vec<Complex32>),
    Complex128(Vec<Complex64Pair>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
            ArrayData::Int8(_) => DType::Int8,
            ArrayData::Int16(_) => DType::Int16,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::Complex64(_) => DType::Complex64,
            ArrayData::Complex128(_) => DType::Complex128,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
            ArrayData::Int8(v) => v.len(),
            ArrayData::Int16(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::Complex64(v) => v.len(),
            ArrayData::Complex128(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read element `i` (linear index into the backing storage) as `f64`.
    /// Fails silently to 0 for complex dtypes; use [`ArrayData::get_complex`]
    /// there instead.
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            ArrayData::Float32(v) => v[i] as f64,
            ArrayData::Float64(v) => v[i],
            ArrayData::Int8(v) => v[i] as f64,
            ArrayData::Int16(v) => v[i] as f64,
            ArrayData::Int32(v) => v[i] as f64,
            ArrayData::Int64(v) => v[i] as f64,
            ArrayData::Complex64(_) | ArrayData::Complex128(_) => 0.0,
        }
    }

    pub fn get_complex(&self, i: usize) -> (f64, f64) {
        match self {
            ArrayData::Complex64(v) => (v[i].0 as f64, v[i].1 as f64),
            ArrayData::Complex128(v) => v[i],
            _ => (self.get_f64(i), 0.0),
        }
    }

    pub fn set_f64(&mut self, i: usize, value: f64) {
        match self {
            ArrayData::Float32(v) => v[i] = value as f32,
            ArrayData::Float64(v) => v[i] = value,
            ArrayData::Int8(v) => v[i] = value as i8,
            ArrayData::Int16(v) => v[i] = value as i16,
            ArrayData::Int32(v) => v[i] = value as i32,
            ArrayData::Int64(v) => v[i] = value as i64,
            ArrayData::Complex64(v) => v[i] = (value as f32, 0.0),
            ArrayData::Complex128(v) => v[i] = (value, 0.0),
        }
    }

    pub fn set_complex(&mut self, i: usize, value: (f64, f64)) {
        match self {
            ArrayData::Complex64(v) => v[i] = (value.0 as f32, value.1 as f32),
            ArrayData::Complex128(v) => v[i] = value,
            _ => self.set_f64(i, value.0),
        }
    }

    /// Cast this buffer's element storage to `target`, matching numpy-style
    /// `astype` for real/integer kinds. Complex dtypes only cast between
    /// each other or from real kinds (imaginary part zero); there is no
    /// narrowing from complex to real.
    pub fn cast_to(&self, target: DType) -> ArrayData {
        if self.dtype() == target {
            return self.clone();
        }
        let n = self.len();
        if target.is_complex() {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(self.get_complex(i));
            }
            return match target {
                DType::Complex64 => {
                    ArrayData::Complex64(out.into_iter().map(|(r, i)| (r as f32, i as f32)).collect())
                }
                DType::Complex128 => ArrayData::Complex128(out),
                _ => unreachable!(),
            };
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(self.get_f64(i));
        }
        match target {
            DType::Float32 => ArrayData::Float32(out.into_iter().map(|v| v as f32).collect()),
            DType::Float64 => ArrayData::Float64(out),
            DType::Int8 => ArrayData::Int8(out.into_iter().map(|v| v as i8).collect()),
            DType::Int16 => ArrayData::Int16(out.into_iter().map(|v| v as i16).collect()),
            DType::Int32 => ArrayData::Int32(out.into_iter().map(|v| v as i32).collect()),
            DType::Int64 => ArrayData::Int64(out.into_iter().map(|v| v as i64).collect()),
            DType::Complex64 | DType::Complex128 => unreachable!(),
        }
    }

    pub fn zeros(target: DType, n: usize) -> ArrayData {
        match target {
            DType::Float32 => ArrayData::Float32(vec![0.0; n]),
            DType::Float64 => ArrayData::Float64(vec![0.0; n]),
            DType::Int8 => ArrayData::Int8(vec![0; n]),
            DType::Int16 => ArrayData::Int16(vec![0; n]),
            DType::Int32 => ArrayData::Int32(vec![0; n]),
            DType::Int64 => ArrayData::Int64(vec![0; n]),
            DType::Complex64 => ArrayData::Complex64(vec![(0.0, 0.0); n]),
            DType::Complex128 => ArrayData::Complex128(vec![(0.0, 0.0); n]),
        }
    }
}

/// A pre-coercion, host-supplied array: flat data in row-major order plus
/// shape. This is what `astensor`/`TypedArrayResult::set_data` accept.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    pub data: ArrayData,
    pub shape: Vec<usize>,
}

impl HostArray {
    pub fn new(data: ArrayData, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    pub fn scalar_f64(v: f64) -> Self {
        HostArray::new(ArrayData::Float64(vec![v]), vec![])
    }
}

/// Row-major contiguous strides (in elements, not bytes) for `shape`.
pub fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// The flat backing storage a `StridedBuffer` view reads/writes through.
/// Shared via `Rc` so that a view (Subtensor) and its parent see the same
/// bytes, and destroy-map ops can hand a fresh result the identical storage.
pub type Storage = Rc<RefCell<ArrayData>>;

/// A concrete, strided n-dimensional view over `storage`, bound to a
/// `TypedArrayResult`. Two `StridedBuffer`s alias the same memory iff
/// `Rc::ptr_eq(&a.storage, &b.storage)` (spec §8 invariant 8).
#[derive(Debug, Clone)]
pub struct StridedBuffer {
    pub storage: Storage,
    pub shape: Vec<usize>,
    pub strides: Vec<isize>,
    /// Element (not byte) offset of this view's first element into `storage`.
    pub offset: isize,
}

impl StridedBuffer {
    pub fn from_contiguous(data: ArrayData, shape: Vec<usize>) -> Self {
        let strides = contiguous_strides(&shape);
        Self {
            storage: Rc::new(RefCell::new(data)),
            shape,
            strides,
            offset: 0,
        }
    }

    /// Builds a view sharing `storage` with an existing buffer (spec §4.D
    /// `view_map` aliasing): no data is copied, only the shape/stride/offset
    /// metadata differs between the view and its parent.
    pub fn view(storage: Storage, shape: Vec<usize>, strides: Vec<isize>, offset: isize) -> Self {
        Self {
            storage,
            shape,
            strides,
            offset,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.storage.borrow().dtype()
    }

    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == contiguous_strides(&self.shape)
    }

    /// Byte stride for axis `i`, for native-kernel stride checks (spec
    /// §4.H: "every stride is a positive multiple of element size").
    pub fn byte_stride(&self, axis: usize) -> isize {
        self.strides[axis] * self.dtype().element_size() as isize
    }

    /// Reads the element at view-local offset `local` (already including
    /// any broadcast/stride adjustment, excluding this view's own `offset`).
    pub fn get_f64(&self, local: isize) -> f64 {
        self.storage.borrow().get_f64((self.offset + local) as usize)
    }

    pub fn set_f64(&self, local: isize, value: f64) {
        self.storage
            .borrow_mut()
            .set_f64((self.offset + local) as usize, value);
    }

    pub fn get_complex(&self, local: isize) -> (f64, f64) {
        self.storage
            .borrow()
            .get_complex((self.offset + local) as usize)
    }

    pub fn set_complex(&self, local: isize, value: (f64, f64)) {
        self.storage
            .borrow_mut()
            .set_complex((self.offset + local) as usize, value);
    }

    fn local_offset_for_linear(&self, linear: usize) -> isize {
        let rank = self.shape.len();
        let mut remaining = linear;
        let mut off = 0isize;
        for axis in 0..rank {
            let stride_in_out = self.shape[axis + 1..].iter().product::<usize>().max(1);
            let coord = remaining / stride_in_out;
            remaining %= stride_in_out;
            off += coord as isize * self.strides[axis];
        }
        off
    }

    /// Materializes this view's logical contents as a dense, row-major
    /// `ArrayData` — used for content comparisons (`Desc`, tests) that must
    /// not depend on physical stride/offset layout.
    pub fn values(&self) -> ArrayData {
        let n: usize = self.shape.iter().product();
        let dtype = self.dtype();
        let mut out = ArrayData::zeros(dtype, n);
        for lin in 0..n {
            let local = self.local_offset_for_linear(lin);
            if dtype.is_complex() {
                out.set_complex(lin, self.get_complex(local));
            } else {
                out.set_f64(lin, self.get_f64(local));
            }
        }
        out
    }

    /// An independent, contiguous copy: no storage is shared with `self`
    /// (spec §8 "tensor_copy(x).data equals x.data but is not the same
    /// buffer").
    pub fn deep_copy(&self) -> StridedBuffer {
        StridedBuffer::from_contiguous(self.values(), self.shape.clone())
    }
}

impl PartialEq for StridedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.values() == other.values()
    }
}
