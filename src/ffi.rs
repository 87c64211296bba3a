//! The BLAS FFI surface consumed as an opaque `sgemm_`/`dgemm_` symbol
//! (spec §1 "Out of scope", §6 "BLAS symbols", §9 "BLAS calling
//! convention").
//!
//! Modeled on the teacher's `ffi` module layout (`ffi::mod` re-exporting a
//! handful of `extern "C"` entry points behind a feature gate, see
//! `subset_julia_vm`'s `aot`/`cranelift` optional-dependency features):
//! the actual Fortran-ABI symbols are only declared when the embedding
//! application opts into linking a BLAS implementation via the `blas`
//! feature. Without it, `Gemm::perform` still works through the pure-Rust
//! reference evaluator in `ops::gemm`; only the codegen fragment that
//! *calls* these symbols needs them declared.

use std::os::raw::{c_char, c_int};

/// Linker flags the embedding build needs to resolve `sgemm_`/`dgemm_`
/// (spec §6 "a helper `ldflags()`").
pub fn ldflags() -> &'static str {
    "-lblas"
}

/// The extern-C prototypes to splice into a generated native source file
/// (spec §6 "`blas_proto()` string declaring the extern prototypes").
pub fn blas_proto() -> &'static str {
    "extern \"C\" {\n\
     \u{20}   void sgemm_(const char* transa, const char* transb, const int* m, const int* n,\n\
     \u{20}               const int* k, const float* alpha, const float* a, const int* lda,\n\
     \u{20}               const float* b, const int* ldb, const float* beta, float* c, const int* ldc);\n\
     \u{20}   void dgemm_(const char* transa, const char* transb, const int* m, const int* n,\n\
     \u{20}               const int* k, const double* alpha, const double* a, const int* lda,\n\
     \u{20}               const double* b, const int* ldb, const double* beta, double* c, const int* ldc);\n\
     }\n"
}

#[cfg(feature = "blas")]
extern "C" {
    /// `sgemm_(transa, transb, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc)`
    /// in the Fortran calling convention: scalar and integer arguments are
    /// passed by address, character flags as single chars, matrices are
    /// column-major (spec §9 "BLAS calling convention").
    pub fn sgemm_(
        transa: *const c_char,
        transb: *const c_char,
        m: *const c_int,
        n: *const c_int,
        k: *const c_int,
        alpha: *const f32,
        a: *const f32,
        lda: *const c_int,
        b: *const f32,
        ldb: *const c_int,
        beta: *const f32,
        c: *mut f32,
        ldc: *const c_int,
    );

    pub fn dgemm_(
        transa: *const c_char,
        transb: *const c_char,
        m: *const c_int,
        n: *const c_int,
        k: *const c_int,
        alpha: *const f64,
        a: *const f64,
        lda: *const c_int,
        b: *const f64,
        ldb: *const c_int,
        beta: *const f64,
        c: *mut f64,
        ldc: *const c_int,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldflags_names_blas() {
        assert!(ldflags().contains("blas"));
    }

    #[test]
    fn blas_proto_declares_both_symbols() {
        let proto = blas_proto();
        assert!(proto.contains("sgemm_"));
        assert!(proto.contains("dgemm_"));
    }
}
