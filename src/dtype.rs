//! The closed dtype set (spec §3) and its native/runtime mapping table
//! (spec §4.A "Dtype-spec table").
//!
//! Modeled on the teacher's `ArrayElementType` (`vm::value::array_element`):
//! a small `Copy` enum with a `Display` impl and a lookup table, rather than
//! a trait-object type registry.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Complex64,
    Complex128,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::Float32,
        DType::Float64,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Complex64,
        DType::Complex128,
    ];

    /// Byte width of one element in this dtype's native representation.
    pub fn element_size(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float64 | DType::Int64 => 8,
            DType::Int8 => 1,
            DType::Int16 => 2,
            DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    pub fn host_kind(self) -> HostKind {
        match self {
            DType::Float32 | DType::Float64 => HostKind::Real,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64 => HostKind::Integer,
            DType::Complex64 | DType::Complex128 => HostKind::Complex,
        }
    }

    /// The native element typename, as it would appear in an emitted
    /// codegen fragment (spec §4.A "Codegen stubs", `dtype_NAME`).
    pub fn native_typename(self) -> &'static str {
        match self {
            DType::Float32 => "float",
            DType::Float64 => "double",
            DType::Int8 => "int8_t",
            DType::Int16 => "int16_t",
            DType::Int32 => "int32_t",
            DType::Int64 => "int64_t",
            DType::Complex64 => "npy_complex64",
            DType::Complex128 => "npy_complex128",
        }
    }

    /// The runtime type-enum tag emitted as `type_num_NAME` (spec §4.A).
    pub fn runtime_enum(self) -> &'static str {
        match self {
            DType::Float32 => "FLOAT32",
            DType::Float64 => "FLOAT64",
            DType::Int8 => "INT8",
            DType::Int16 => "INT16",
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::Complex64 => "COMPLEX64",
            DType::Complex128 => "COMPLEX128",
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Real,
    Integer,
    Complex,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        };
        f.write_str(s)
    }
}
