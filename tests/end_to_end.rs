//! Integration tests driving the concrete end-to-end scenarios spec.md §8
//! spells out literally.

use std::rc::Rc;

use tensorgraph::buffer::{ArrayData, HostArray};
use tensorgraph::constructors::{matrix, vector};
use tensorgraph::dtype::DType;
use tensorgraph::error::GraphBuildError;
use tensorgraph::ops::elementwise::add;
use tensorgraph::ops::gemm::{gemm, Gemm};
use tensorgraph::ops::reduce::{argmax, max};
use tensorgraph::ops::subtensor::{subtensor, IndexEntry};
use tensorgraph::ops::transpose::transpose;
use tensorgraph::{ArrayOp, TypedArrayResultRef};

fn set(r: &TypedArrayResultRef, vals: Vec<f64>, shape: Vec<usize>) {
    r.borrow_mut()
        .set_data(HostArray::new(ArrayData::Float64(vals), shape))
        .unwrap();
}

#[test]
fn scenario_1_vector_plus_vector() {
    let v = vector("v").unwrap();
    set(&v, vec![1.0, 2.0, 3.0], vec![3]);

    let r = add(v.clone(), v).unwrap();
    r.borrow().owner().unwrap().perform().unwrap();

    assert_eq!(r.borrow().dtype(), DType::Float64);
    assert_eq!(r.borrow().broadcastable(), &[false]);
    r.borrow().with_data(|buf| {
        assert_eq!(buf.values(), ArrayData::Float64(vec![2.0, 4.0, 6.0]));
    });
}

#[test]
fn scenario_2_matrix_transpose() {
    let m = matrix("m").unwrap();
    set(&m, vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);

    let out = transpose(m).unwrap();
    let dimshuffle = out.borrow().owner().unwrap();
    dimshuffle.inputs()[0].borrow().owner().unwrap().perform().unwrap();
    dimshuffle.perform().unwrap();

    out.borrow().with_data(|buf| {
        assert_eq!(buf.shape, vec![2, 2]);
        assert_eq!(buf.values(), ArrayData::Float64(vec![1.0, 3.0, 2.0, 4.0]));
    });
}

#[test]
fn scenario_3_argmax_axis_1() {
    let x = matrix("x").unwrap();
    set(&x, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);

    let maxval = max(x.clone(), Some(1)).unwrap();
    maxval.borrow().owner().unwrap().perform().unwrap();
    maxval.borrow().with_data(|buf| {
        assert_eq!(buf.values(), ArrayData::Float64(vec![3.0, 6.0]));
    });

    let argidx = argmax(x, Some(1)).unwrap();
    argidx.borrow().owner().unwrap().perform().unwrap();
    argidx.borrow().with_data(|buf| {
        assert_eq!(buf.values(), ArrayData::Int64(vec![2, 2]));
    });
}

#[test]
fn scenario_4_gemm_numeric_and_buffer_identity() {
    let z = matrix("z").unwrap();
    set(&z, vec![1.0, 1.0, 1.0, 1.0], vec![2, 2]);
    let x = matrix("x").unwrap();
    set(&x, vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
    let y = matrix("y").unwrap();
    set(&y, vec![3.0, 4.0, 5.0, 6.0], vec![2, 2]);
    let a = tensorgraph::constructors::scalar("a").unwrap();
    set(&a, vec![2.0], vec![]);
    let b = tensorgraph::constructors::scalar("b").unwrap();
    set(&b, vec![0.5], vec![]);

    let z_storage_before = z.borrow().data_handle().unwrap().storage;

    let out = gemm(z, a, x, y, b).unwrap();
    out.borrow().owner().unwrap().perform().unwrap();

    out.borrow().with_data(|buf| {
        assert_eq!(
            buf.values(),
            ArrayData::Float64(vec![6.5, 8.5, 10.5, 12.5])
        );
    });

    let out_storage = out.borrow().data_handle().unwrap().storage;
    assert!(Rc::ptr_eq(&z_storage_before, &out_storage));
}

#[test]
fn scenario_5_gemm_z_aliasing_x_is_rejected_at_build_time() {
    let x = matrix("x").unwrap();
    set(&x, vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
    let y = matrix("y").unwrap();
    set(&y, vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    let a = tensorgraph::constructors::scalar("a").unwrap();
    set(&a, vec![1.0], vec![]);
    let b = tensorgraph::constructors::scalar("b").unwrap();
    set(&b, vec![1.0], vec![]);

    let err = Gemm::build(x.clone(), a, x, y, b).unwrap_err();
    assert_eq!(err, GraphBuildError::ZAliasesInput);
}

#[test]
fn scenario_6_subtensor_integer_vs_slice() {
    let m = matrix("m").unwrap();
    set(&m, vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0], vec![2, 3]);

    let row0 = subtensor(m.clone(), vec![IndexEntry::Int(0)]).unwrap();
    assert_eq!(row0.borrow().ndim(), 1);
    row0.borrow().owner().unwrap().perform().unwrap();
    row0.borrow().with_data(|buf| {
        assert_eq!(buf.values(), ArrayData::Float64(vec![10.0, 20.0, 30.0]));
    });

    let whole = subtensor(
        m.clone(),
        vec![IndexEntry::Slice {
            start: 0,
            stop: 2,
            step: 1,
        }],
    )
    .unwrap();
    assert_eq!(whole.borrow().ndim(), 2);
    whole.borrow().owner().unwrap().perform().unwrap();
    whole.borrow().with_data(|buf| {
        assert_eq!(
            buf.values(),
            ArrayData::Float64(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0])
        );
    });
}
