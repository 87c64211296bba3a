//! Error types for the typed array graph core.
//!
//! Mirrors the teacher's convention of one focused error enum per concern
//! (`error::unsupported::UnsupportedFeature`, `error::syntax::SyntaxError`)
//! rather than a single catch-all enum, plus the stable string constants
//! that tests are allowed to match against (spec §6).

use thiserror::Error;

/// Errors raised while validating or constructing a `TypedArrayResult`
/// descriptor (spec §4.A, §7 "Descriptor errors").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("unsupported dtype: {0:?}")]
    UnsupportedDtype(crate::dtype::DType),

    #[error("{}", consts::E_RANK)]
    WrongRank { expected: usize, got: usize },

    #[error("{}", consts::E_SHAPE)]
    NonUnitBroadcastAxis { axis: usize, size: usize },
}

/// Errors raised while wiring an `ArrayOp` into the graph (spec §4.B, §7
/// "Graph-build errors").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphBuildError {
    #[error("arity mismatch: expected {expected} inputs, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("dtype inference underdetermined: no non-null input dtypes")]
    DtypeInferenceUnderdetermined,

    #[error("dtype inference conflict: inputs have more than one distinct dtype")]
    DtypeInferenceConflict,

    #[error("{}", consts::SUBTENSOR_E_INVALID)]
    InvalidIndex,

    #[error("{}", consts::GEMM_E_RANK)]
    RankRestriction { which: &'static str, got: usize },

    #[error("{}", consts::GEMM_E_SCALAR)]
    ScalarRequired { which: &'static str },

    #[error("{}", consts::GEMM_E_Z_UNIQ)]
    ZAliasesInput,

    #[error("{}", consts::ARGMAX_E_AXIS)]
    InvalidAxis { axis: i64, rank: usize },

    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("grad is not implemented for {op}")]
    GradNotImplemented { op: &'static str },

    #[error("astensor: {0}")]
    Coercion(String),
}

/// Errors raised by a reference-evaluator `perform()` call (spec §7
/// "Runtime kernel errors"). These are the Rust analogue of the native
/// code's `fail`-macro string-and-unwind errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("not implemented for dtype {0:?}")]
    NotImplementedType(crate::dtype::DType),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("stride is not a positive multiple of the element size")]
    NonUnitStride,

    #[error("stride is not a multiple of the element size")]
    StrideNotMultipleOfElementSize,
}

/// Stable string constants, addressable from tests (spec §6).
pub mod consts {
    pub const E_RANK: &str = "wrong rank";
    pub const E_SHAPE: &str = "non-unit size on broadcastable dimension";
    pub const SUBTENSOR_E_INVALID: &str = "invalid index";
    pub const GEMM_E_RANK: &str = "gemm only works for rank 2";
    pub const GEMM_E_SCALAR: &str = "gemm requires scalar argument";
    pub const GEMM_E_Z_UNIQ: &str = "argument z aliased to x or y";
    pub const ARGMAX_E_AXIS: &str = "invalid axis";
}
