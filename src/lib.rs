//! `tensorgraph` — a typed, symbolic array expression graph core:
//! descriptors, broadcast-lifted elementwise ops, `Subtensor`, `Argmax`/
//! `Sum`, `TransposeInplace`, `Dot`, and `Gemm` with an in-place BLAS
//! dispatch path.
//!
//! Grounded on `subset_julia_vm`'s value/op separation (`vm::value` for the
//! data side, one module per op family) but scoped to this crate's own
//! symbolic-array domain rather than a Julia interpreter's runtime values.

#![deny(clippy::print_stderr)]

pub mod array;
pub mod broadcast;
pub mod buffer;
pub mod codegen;
pub mod constructors;
pub mod dtype;
pub mod error;
pub mod ffi;
pub mod op;
pub mod ops;

pub use array::{Broadcastable, TypedArrayResult, TypedArrayResultRef};
pub use dtype::DType;
pub use error::{DescriptorError, GraphBuildError, KernelError};
pub use op::ArrayOp;
