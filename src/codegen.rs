//! Codegen stubs consumed by the external code generator (spec §4.A
//! "Codegen stubs", §9 "Two execution modes").
//!
//! Each `TypedArrayResult` can emit named string fragments for a downstream
//! native compiler; the contract is the variable names made available to
//! kernels (`NAME`, `type_num_NAME`, `dtype_NAME`), not the exact syntax.
//! This module supplies the C-flavored fragments the teacher's own
//! code-generating ops would produce (see `aot::codegen::aot_codegen` for
//! the teacher's analogous string-emission style), since no native compiler
//! is invoked by this crate — it only prepares source text.

use crate::array::TypedArrayResult;
use crate::dtype::DType;

/// Per-variable substitution context threaded through a fragment.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    pub failure_label: String,
}

impl TypedArrayResult {
    /// Declares the native variable holding this result's strided-array
    /// handle, plus its `type_num_NAME` and `dtype_NAME` alias.
    pub fn declare(&self, var: &str) -> String {
        format!(
            "StridedArray* {var};\n\
             int type_num_{var} = {runtime_enum};\n\
             typedef {native_ty} dtype_{var};\n",
            var = var,
            runtime_enum = self.dtype().runtime_enum(),
            native_ty = self.dtype().native_typename(),
        )
    }

    /// Initializes `var` to a null handle; paired with `cleanup`.
    pub fn init(&self, var: &str) -> String {
        format!("{var} = NULL;\n", var = var)
    }

    /// Extracts the native strided-array handle from the host object bound
    /// to `var`. Rejects null buffers, non-array host objects, and dtype
    /// mismatches (spec §4.A).
    pub fn extract(&self, var: &str, host_obj: &str, subst: &Subst) -> String {
        format!(
            "if ({host_obj} == Py_None) {{ PyErr_SetString(PyExc_ValueError, \"{var}: null buffer\"); {fail}; }}\n\
             if (!is_strided_array({host_obj})) {{ PyErr_SetString(PyExc_TypeError, \"{var}: not an array\"); {fail}; }}\n\
             if (strided_array_typenum({host_obj}) != type_num_{var}) {{ PyErr_SetString(PyExc_TypeError, \"{var}: dtype mismatch\"); {fail}; }}\n\
             {var} = as_strided_array({host_obj});\n",
            var = var,
            host_obj = host_obj,
            fail = subst.failure_label,
        )
    }

    /// Writes the native buffer back to the host object, publishing a host
    /// null sentinel when `var` is null.
    pub fn sync(&self, var: &str, host_obj: &str) -> String {
        format!(
            "if ({var} == NULL) {{ {host_obj} = host_null_sentinel(); }} else {{ {host_obj} = strided_array_to_host({var}); }}\n",
            var = var,
            host_obj = host_obj,
        )
    }

    /// Releases any native-side resources acquired by `extract`/`init`.
    pub fn cleanup(&self, var: &str) -> String {
        format!("if ({var} != NULL) {{ strided_array_release({var}); }}\n", var = var)
    }

    /// Per-dtype auxiliary struct definitions: complex arithmetic operator
    /// overloads for the two complex widths (spec §4.A, §9 "Complex
    /// arithmetic"). Real and integer dtypes need no support code.
    pub fn support_code(&self) -> String {
        match self.dtype() {
            DType::Complex64 => complex_support_code("npy_complex64", "float"),
            DType::Complex128 => complex_support_code("npy_complex128", "double"),
            _ => String::new(),
        }
    }
}

fn complex_support_code(struct_name: &str, component_ty: &str) -> String {
    format!(
        "struct {name} {{\n\
         \u{20}   {ty} real, imag;\n\
         \u{20}   {name} operator+(const {name}& y) const {{ return {{real + y.real, imag + y.imag}}; }}\n\
         \u{20}   {name} operator-(const {name}& y) const {{ return {{real - y.real, imag - y.imag}}; }}\n\
         \u{20}   {name} operator*(const {name}& y) const {{\n\
         \u{20}       return {{real * y.real - imag * y.imag, real * y.imag + imag * y.real}};\n\
         \u{20}   }}\n\
         \u{20}   {name} operator/(const {name}& y) const {{\n\
         \u{20}       {ty} denom = y.real * y.real + y.imag * y.imag;\n\
         \u{20}       return {{(real * y.real + imag * y.imag) / denom, (imag * y.real - real * y.imag) / denom}};\n\
         \u{20}   }}\n\
         }};\n",
        name = struct_name,
        ty = component_ty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_code_only_emitted_for_complex_dtypes() {
        let r = TypedArrayResult::construct(DType::Float64, vec![], None).unwrap();
        assert!(r.support_code().is_empty());

        let c = TypedArrayResult::construct(DType::Complex128, vec![], None).unwrap();
        assert!(c.support_code().contains("operator/"));
    }

    #[test]
    fn declare_exposes_the_contractual_variable_names() {
        let r = TypedArrayResult::construct(DType::Float32, vec![false], None).unwrap();
        let frag = r.declare("x");
        assert!(frag.contains("type_num_x"));
        assert!(frag.contains("dtype_x"));
    }
}
