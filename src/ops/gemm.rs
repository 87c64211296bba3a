//! `Gemm` (spec §4.H): `z <- b*z + a*(x·y)`, with `z` rewritten in place
//! (`destroy_map`) and a native-kernel dispatch path that would hand the
//! call straight to BLAS `sgemm_`/`dgemm_` (spec §6, §9) when the three
//! matrices are laid out so BLAS can consume them without a copy.
//!
//! Grounded on the teacher's `vm::matmul` loop nest for the reference
//! evaluator, and on `ffi::mod` for the extern-call shape the codegen path
//! would emit.

use std::rc::Rc;

use crate::array::TypedArrayResultRef;
use crate::buffer::{ArrayData, StridedBuffer};
use crate::error::{GraphBuildError, KernelError};
use crate::op::{check_arity, fresh_outputs, unify_dtype, view_roots_intersect, wire_owner, AliasMap, ArrayOp};

#[derive(Debug)]
pub struct Gemm {
    inputs: Vec<TypedArrayResultRef>,
    outputs: Vec<TypedArrayResultRef>,
}

impl Gemm {
    /// spec §4.H construction: `z`, `x`, `y` must be rank 2; `a`, `b` must
    /// be scalar (rank 0); `z` must not share a view root with `x` or `y`.
    pub fn build(
        z: TypedArrayResultRef,
        a: TypedArrayResultRef,
        x: TypedArrayResultRef,
        y: TypedArrayResultRef,
        b: TypedArrayResultRef,
    ) -> Result<Rc<Gemm>, GraphBuildError> {
        let inputs = vec![z.clone(), a.clone(), x.clone(), y.clone(), b.clone()];
        check_arity(&inputs, Some(5))?;

        for (which, r) in [("z", &z), ("x", &x), ("y", &y)] {
            let rank = r.borrow().ndim();
            if rank != 2 {
                return Err(GraphBuildError::RankRestriction { which, got: rank });
            }
        }
        for (which, r) in [("a", &a), ("b", &b)] {
            let rank = r.borrow().ndim();
            if rank != 0 {
                return Err(GraphBuildError::ScalarRequired { which });
            }
        }

        if view_roots_intersect(&z, &x) || view_roots_intersect(&z, &y) {
            return Err(GraphBuildError::ZAliasesInput);
        }

        let dtype = unify_dtype(&inputs)?;
        let out_pattern = z.borrow().broadcastable().to_vec();
        log::debug!("Gemm: dtype={:?} output pattern={:?}", dtype, out_pattern);

        let outputs = fresh_outputs(vec![(dtype, out_pattern)])?;
        let op = Rc::new_cyclic(|weak| {
            wire_owner(&outputs, weak);
            Gemm { inputs, outputs }
        });
        Ok(op)
    }

    pub fn output(&self) -> TypedArrayResultRef {
        self.outputs[0].clone()
    }

    /// The 12-bit layout code (spec §4.H): each of `x`, `y`, `z` contributes
    /// a 2-bit stride tag — `0` row-major (axis-1 stride is one element),
    /// `1` column-major (axis-0 stride is one element), `2` neither (not
    /// directly BLAS-dispatchable) — combined as
    /// `(x_tag << 8) | (y_tag << 4) | z_tag`.
    pub fn layout_code(&self) -> Option<u16> {
        let z = self.inputs[0].borrow().data_handle()?;
        let x = self.inputs[2].borrow().data_handle()?;
        let y = self.inputs[3].borrow().data_handle()?;
        Some((stride_tag(&x) as u16) << 8 | (stride_tag(&y) as u16) << 4 | (stride_tag(&z) as u16))
    }

    /// The BLAS call pattern the native kernel would emit for the current
    /// operand layouts, or `None` if any operand's tag is `2` (spec §4.H:
    /// "the 9th and above codes fail `NonUnitStride`").
    pub fn native_dispatch(&self) -> Option<&'static str> {
        let code = self.layout_code()?;
        GEMM_DISPATCH_TABLE
            .iter()
            .find(|&&(c, _)| c == code)
            .map(|&(_, pattern)| pattern)
    }
}

/// spec §4.H stride tag: row-major (`0`), column-major (`1`), invalid (`2`).
/// Degenerate (length-1) axes use the other axis as the substitute leading
/// dimension, so a `[1, n]` or `[n, 1]` matrix is never spuriously tagged
/// invalid.
fn stride_tag(buf: &StridedBuffer) -> u8 {
    if buf.strides[1] == 1 {
        0
    } else if buf.strides[0] == 1 {
        1
    } else {
        2
    }
}

/// The 8 valid dispatches (spec §4.H table): `transA`, `transB`, and
/// whether the BLAS call computes the product directly or via the swapped
/// `Cᵀ = Bᵀ·Aᵀ` identity (BLAS is natively column-major; row-major operands
/// are reinterpreted as their own transpose rather than copied).
static GEMM_DISPATCH_TABLE: [(u16, &str); 8] = [
    (0x000, "dgemm_(transA=N, transB=N, swap-args)"),
    (0x100, "dgemm_(transA=N, transB=T, swap-args)"),
    (0x010, "dgemm_(transA=T, transB=N, swap-args)"),
    (0x110, "dgemm_(transA=T, transB=T, swap-args)"),
    (0x001, "dgemm_(transA=T, transB=T, direct)"),
    (0x101, "dgemm_(transA=N, transB=T, direct)"),
    (0x011, "dgemm_(transA=T, transB=N, direct)"),
    (0x111, "dgemm_(transA=N, transB=N, direct)"),
];

fn at(buf: &StridedBuffer, i: usize, j: usize) -> f64 {
    let off = i as isize * buf.strides[0] + j as isize * buf.strides[1];
    buf.get_f64(off)
}

impl ArrayOp for Gemm {
    fn inputs(&self) -> &[TypedArrayResultRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TypedArrayResultRef] {
        &self.outputs
    }

    fn destroy_map(&self) -> AliasMap {
        AliasMap::from([(0, vec![0])])
    }

    /// Reference evaluator. Resolves spec's Open Question 3: regardless of
    /// whether `z` happens to be degenerate in some dimension, the formula
    /// is always `b*z + a*(x·y)` — the native-kernel semantics, taken as
    /// authoritative over the divergent scalar-z branch some bindings show.
    fn perform(&self) -> Result<(), KernelError> {
        let z = self.inputs[0].borrow();
        let a = self.inputs[1].borrow();
        let x = self.inputs[2].borrow();
        let y = self.inputs[3].borrow();
        let b = self.inputs[4].borrow();

        let zbuf = z
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Gemm: z has no data".into()))?;
        let abuf = a
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Gemm: a has no data".into()))?;
        let xbuf = x
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Gemm: x has no data".into()))?;
        let ybuf = y
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Gemm: y has no data".into()))?;
        let bbuf = b
            .data_handle()
            .ok_or_else(|| KernelError::ShapeMismatch("Gemm: b has no data".into()))?;

        if xbuf.shape[1] != ybuf.shape[0] {
            return Err(KernelError::ShapeMismatch(format!(
                "gemm: x {:?} incompatible with y {:?}",
                xbuf.shape, ybuf.shape
            )));
        }
        let (m, k_dim, n) = (xbuf.shape[0], xbuf.shape[1], ybuf.shape[1]);
        if zbuf.shape != [m, n] {
            return Err(KernelError::ShapeMismatch(format!(
                "gemm: z shape {:?} does not match x*y shape [{}, {}]",
                zbuf.shape, m, n
            )));
        }

        let a_val = abuf.get_f64(0);
        let b_val = bbuf.get_f64(0);

        log::trace!(
            "Gemm::perform dispatch would be {:?}",
            self.native_dispatch()
        );

        let mut result = vec![0.0f64; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for k in 0..k_dim {
                    acc += at(&xbuf, i, k) * at(&ybuf, k, j);
                }
                result[i * n + j] = b_val * at(&zbuf, i, j) + a_val * acc;
            }
        }

        // destroy_map: write straight into z's own storage, element by
        // element, then expose that same storage as the output buffer.
        for i in 0..m {
            for j in 0..n {
                let off = i as isize * zbuf.strides[0] + j as isize * zbuf.strides[1];
                zbuf.set_f64(off, result[i * n + j]);
            }
        }

        drop(z);
        drop(a);
        drop(x);
        drop(y);
        drop(b);
        self.outputs[0].borrow_mut().set_data_handle(zbuf);
        Ok(())
    }

    fn op_name(&self) -> &'static str {
        "Gemm"
    }
}

pub fn gemm(
    z: TypedArrayResultRef,
    a: TypedArrayResultRef,
    x: TypedArrayResultRef,
    y: TypedArrayResultRef,
    b: TypedArrayResultRef,
) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(Gemm::build(z, a, x, y, b)?.output())
}
