//! Result-constructor surface (spec §6 "Interfaces exposed"): `scalar`,
//! `vector`, `matrix`, `row`, `col`, their `i*`/`f*` dtype variants and
//! plural forms, plus `astensor` coercion.
//!
//! Grounded on the teacher's small free-function constructor style for
//! building VM values (`vm::value` constructors taking a name and handing
//! back a freshly wired handle) rather than a builder struct.

use crate::array::{TypedArrayResult, TypedArrayResultRef};
use crate::buffer::HostArray;
use crate::dtype::DType;
use crate::error::GraphBuildError;

fn named(dtype: DType, broadcastable: Vec<bool>, name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    Ok(TypedArrayResult::new_ref(
        dtype,
        broadcastable,
        Some(name.to_string()),
    )?)
}

/// Rank 0, `float64` by default (spec §6).
pub fn scalar(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    named(DType::Float64, vec![], name)
}

/// Rank 1 with one non-broadcast axis (spec §9 Open Question 2: the
/// original passes a bare scalar `broadcastable=(False)` instead of the
/// 1-tuple `(False,)`; the intended, rank-1 semantics is implemented here).
pub fn vector(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    named(DType::Float64, vec![false], name)
}

pub fn matrix(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    named(DType::Float64, vec![false, false], name)
}

/// A `1×n` matrix: axis 0 is broadcastable, axis 1 is not.
pub fn row(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    named(DType::Float64, vec![true, false], name)
}

/// An `n×1` matrix: axis 0 is not broadcastable, axis 1 is.
pub fn col(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
    named(DType::Float64, vec![false, true], name)
}

macro_rules! dtype_variants {
    ($base:ident, $i_name:ident, $f_name:ident, $broadcastable:expr) => {
        pub fn $i_name(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
            named(DType::Int64, $broadcastable, name)
        }
        pub fn $f_name(name: &str) -> Result<TypedArrayResultRef, GraphBuildError> {
            named(DType::Float64, $broadcastable, name)
        }
    };
}

dtype_variants!(scalar, iscalar, fscalar, vec![]);
dtype_variants!(vector, ivector, fvector, vec![false]);
dtype_variants!(matrix, imatrix, fmatrix, vec![false, false]);
dtype_variants!(row, irow, frow, vec![true, false]);
dtype_variants!(col, icol, fcol, vec![false, true]);

macro_rules! plural_forms {
    ($($plural:ident => $singular:ident;)*) => {
        $(
            /// Plural form (spec §6 "each has a plural form returning a list
            /// of independently-named results"): one freshly constructed,
            /// independently owned result per name.
            pub fn $plural(names: &[&str]) -> Result<Vec<TypedArrayResultRef>, GraphBuildError> {
                names.iter().map(|n| $singular(n)).collect()
            }
        )*
    };
}

plural_forms! {
    scalars => scalar;
    vectors => vector;
    matrices => matrix;
    rows => row;
    cols => col;
    iscalars => iscalar;
    ivectors => ivector;
    imatrices => imatrix;
    fscalars => fscalar;
    fvectors => fvector;
    fmatrices => fmatrix;
}

/// spec §6 `astensor(value, broadcastable=None, name=None)`: idempotent on
/// an existing `TypedArrayResult`, otherwise coerces a host array-like.
pub enum Coercible {
    Existing(TypedArrayResultRef),
    Host(HostArray),
}

/// Coerces `value` to a `TypedArrayResult`. Idempotent on an existing
/// result whose broadcast pattern/name already match (spec §8 round-trip
/// law: `astensor(astensor(v)) is astensor(v)`); otherwise builds a fresh
/// result from a host array and assigns its data.
pub fn astensor(
    value: Coercible,
    broadcastable: Option<Vec<bool>>,
    name: Option<&str>,
) -> Result<TypedArrayResultRef, GraphBuildError> {
    match value {
        Coercible::Existing(r) => {
            let matches_pattern = broadcastable
                .as_ref()
                .map(|want| want.as_slice() == r.borrow().broadcastable())
                .unwrap_or(true);
            let matches_name = name
                .map(|want| r.borrow().name() == Some(want))
                .unwrap_or(true);
            if matches_pattern && matches_name {
                Ok(r)
            } else {
                Err(GraphBuildError::Coercion(
                    "astensor: existing TypedArrayResult does not match requested broadcastable/name".into(),
                ))
            }
        }
        Coercible::Host(host) => {
            let inferred = broadcastable.unwrap_or_else(|| vec![false; host.shape.len()]);
            let dtype = host.data.dtype();
            let r = TypedArrayResult::new_ref(dtype, inferred, name.map(str::to_string))?;
            r.borrow_mut()
                .set_data(host)
                .map_err(GraphBuildError::from)?;
            Ok(r)
        }
    }
}

pub use crate::ops::elementwise::{fill, ones_like, tensor_copy, zeros_like};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ArrayData;

    #[test]
    fn vector_is_rank_1() {
        let v = vector("v").unwrap();
        assert_eq!(v.borrow().ndim(), 1);
        assert_eq!(v.borrow().broadcastable(), &[false]);
    }

    #[test]
    fn scalar_and_matrix_have_expected_rank() {
        assert_eq!(scalar("s").unwrap().borrow().ndim(), 0);
        assert_eq!(matrix("m").unwrap().borrow().ndim(), 2);
    }

    #[test]
    fn row_and_col_have_complementary_broadcast_axes() {
        assert_eq!(row("r").unwrap().borrow().broadcastable(), &[true, false]);
        assert_eq!(col("c").unwrap().borrow().broadcastable(), &[false, true]);
    }

    #[test]
    fn int_and_float_variants_pick_the_right_dtype() {
        assert_eq!(ivector("iv").unwrap().borrow().dtype(), DType::Int64);
        assert_eq!(fvector("fv").unwrap().borrow().dtype(), DType::Float64);
    }

    #[test]
    fn plural_form_builds_one_result_per_name() {
        let vs = vectors(&["a", "b", "c"]).unwrap();
        assert_eq!(vs.len(), 3);
        assert_eq!(vs[1].borrow().name(), Some("b"));
    }

    #[test]
    fn astensor_is_idempotent_on_a_matching_existing_result() {
        let v = vector("v").unwrap();
        let again = astensor(Coercible::Existing(v.clone()), Some(vec![false]), Some("v")).unwrap();
        assert!(std::rc::Rc::ptr_eq(&v, &again));
    }

    #[test]
    fn astensor_coerces_a_host_array() {
        let host = HostArray::new(ArrayData::Float64(vec![1.0, 2.0]), vec![2]);
        let r = astensor(Coercible::Host(host), None, Some("h")).unwrap();
        assert_eq!(r.borrow().ndim(), 1);
        r.borrow().with_data(|buf| {
            assert_eq!(buf.values(), ArrayData::Float64(vec![1.0, 2.0]));
        });
    }
}
