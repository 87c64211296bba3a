//! The `ArrayOp` base: construction protocol, aliasing declarations, and
//! view-root computation (spec §4.B, §5, §6 "Generic Op base").
//!
//! The generic expression-graph substrate (graph traversal, the true
//! `view_roots` scheduler hook) is out of scope (spec §1) and normally lives
//! in an external graph runtime; this module implements the minimal slice of
//! it this crate's own ops need: the `destroy_map`/`view_map` contract and
//! the transitive view-root walk that `Gemm`'s constructor check (§4.H)
//! depends on.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::array::{Broadcastable, TypedArrayResult, TypedArrayResultRef};
use crate::dtype::DType;
use crate::error::{GraphBuildError, KernelError};

/// Output-index -> input-indices map, as used by `destroy_map`/`view_map`.
pub type AliasMap = HashMap<usize, Vec<usize>>;

/// A node in the symbolic expression graph (spec §4 "Op node", §6 "Generic
/// Op base").
pub trait ArrayOp: fmt::Debug {
    fn inputs(&self) -> &[TypedArrayResultRef];
    fn outputs(&self) -> &[TypedArrayResultRef];

    /// output-index -> input-indices it overwrites in place. Empty by
    /// default (spec §4 "Both maps default empty").
    fn destroy_map(&self) -> AliasMap {
        AliasMap::new()
    }

    /// output-index -> input-indices it aliases without copying.
    fn view_map(&self) -> AliasMap {
        AliasMap::new()
    }

    /// The reference evaluator: runs this op's semantics over concrete
    /// buffers already attached to `inputs()`, writing results into
    /// `outputs()` (spec §4.B, §9 "Two execution modes").
    fn perform(&self) -> Result<(), KernelError>;

    /// Name used in error messages / codegen labels (e.g. `"Gemm"`).
    fn op_name(&self) -> &'static str;
}

/// The default dtype-unification rule used by `propagate_dtype` (spec
/// §4.B step 4): the set of non-null input dtypes must have cardinality
/// exactly one.
pub fn unify_dtype(inputs: &[TypedArrayResultRef]) -> Result<DType, GraphBuildError> {
    let mut found: Option<DType> = None;
    for inp in inputs {
        let dt = inp.borrow().dtype();
        match found {
            None => found = Some(dt),
            Some(prev) if prev == dt => {}
            Some(_) => return Err(GraphBuildError::DtypeInferenceConflict),
        }
    }
    found.ok_or(GraphBuildError::DtypeInferenceUnderdetermined)
}

/// spec §4.B step 2: arity check. `expected = None` skips the check
/// (`nin < 0` in the source, meaning variadic).
pub fn check_arity(
    inputs: &[TypedArrayResultRef],
    expected: Option<usize>,
) -> Result<(), GraphBuildError> {
    if let Some(expected) = expected {
        if inputs.len() != expected {
            return Err(GraphBuildError::ArityMismatch {
                expected,
                got: inputs.len(),
            });
        }
    }
    Ok(())
}

/// spec §4.B step 5: allocate fresh outputs from `(dtype, broadcastable)`
/// pairs and wire `owner`/`role`. `make_owner` receives the freshly
/// allocated outputs and must return the `Rc<dyn ArrayOp>` that owns them
/// (the op struct itself, typically constructed in the same call via
/// `Rc::new_cyclic`).
pub fn fresh_outputs(
    descriptors: Vec<(DType, Broadcastable)>,
) -> Result<Vec<TypedArrayResultRef>, GraphBuildError> {
    descriptors
        .into_iter()
        .map(|(dtype, bcast)| Ok(TypedArrayResult::new_ref(dtype, bcast, None)?))
        .collect()
}

/// Wires `owner`/`role` onto each output after the owning op `Rc` exists.
/// Called from within `Rc::new_cyclic`'s closure.
pub fn wire_owner(outputs: &[TypedArrayResultRef], owner: &std::rc::Weak<dyn ArrayOp>) {
    for (role, out) in outputs.iter().enumerate() {
        out.borrow_mut().set_owner(owner.clone(), role);
    }
}

/// The transitive set of non-view ancestors of `result` (spec glossary
/// "View root", §5 "View roots"). Two results share storage iff their view
/// roots intersect. Identity is the `Rc` pointer of the result.
pub fn view_roots(result: &TypedArrayResultRef) -> Vec<*const ()> {
    let (owner, role) = {
        let r = result.borrow();
        (r.owner(), r.role())
    };
    if let (Some(owner), Some(role)) = (owner, role) {
        if let Some(aliased_inputs) = owner.view_map().get(&role) {
            let mut roots = Vec::new();
            for &idx in aliased_inputs {
                roots.extend(view_roots(&owner.inputs()[idx]));
            }
            roots.sort_unstable();
            roots.dedup();
            return roots;
        }
    }
    vec![Rc::as_ptr(result) as *const ()]
}

/// True iff any view root of `a` is also a view root of `b`.
pub fn view_roots_intersect(a: &TypedArrayResultRef, b: &TypedArrayResultRef) -> bool {
    let ra = view_roots(a);
    let rb = view_roots(b);
    ra.iter().any(|r| rb.contains(r))
}
