//! Broadcast pattern algebra (spec §3 "Broadcast pattern algebra", §8
//! invariant 4). Grounded on the teacher's `vm::broadcast::compute_broadcast_shape`
//! (align-right, pad the shorter side, unify per axis) but operating on the
//! *static* broadcastable-flag pattern rather than concrete runtime shapes —
//! this core never knows concrete sizes until a buffer is attached.

use crate::array::Broadcastable;
use crate::error::KernelError;

/// Pairwise elementwise broadcast of two broadcastable patterns: align
/// right, pad the shorter pattern with `true` on the left, then OR each
/// aligned pair (spec §8 invariant 4).
pub fn pairwise_broadcast(a: &[bool], b: &[bool]) -> Broadcastable {
    let n = a.len().max(b.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let a_idx = i as isize - (n as isize - a.len() as isize);
        let b_idx = i as isize - (n as isize - b.len() as isize);
        let a_flag = if a_idx >= 0 { a[a_idx as usize] } else { true };
        let b_flag = if b_idx >= 0 { b[b_idx as usize] } else { true };
        out.push(a_flag || b_flag);
    }
    out
}

/// Broadcast across more than two patterns, left to right. Seeds the fold
/// with the first pattern itself (not an empty accumulator) so a unary call
/// returns its single operand's pattern unchanged — an empty seed would pad
/// every axis with `true` via `pairwise_broadcast`'s own shorter-side rule,
/// forcing every output axis broadcastable regardless of the operands.
pub fn broadcast_all(patterns: &[Broadcastable]) -> Broadcastable {
    match patterns.split_first() {
        Some((first, rest)) => rest
            .iter()
            .fold(first.clone(), |acc, p| pairwise_broadcast(&acc, p)),
        None => Vec::new(),
    }
}

/// Concrete-shape broadcasting used by the reference evaluator (not the
/// static broadcastable-pattern algebra above): align right, each axis must
/// match or one side must be 1. Grounded on the teacher's
/// `vm::broadcast::compute_broadcast_shape`.
pub fn broadcast_concrete_shapes(shapes: &[Vec<usize>]) -> Result<Vec<usize>, KernelError> {
    shapes.iter().try_fold(Vec::new(), |acc, s| {
        broadcast_two_concrete_shapes(&acc, s)
    })
}

fn broadcast_two_concrete_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, KernelError> {
    let n = a.len().max(b.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let a_idx = i as isize - (n as isize - a.len() as isize);
        let b_idx = i as isize - (n as isize - b.len() as isize);
        let a_dim = if a_idx >= 0 { a[a_idx as usize] } else { 1 };
        let b_dim = if b_idx >= 0 { b[b_idx as usize] } else { 1 };
        if a_dim != b_dim && a_dim != 1 && b_dim != 1 {
            return Err(KernelError::ShapeMismatch(format!(
                "cannot broadcast {:?} with {:?}",
                a, b
            )));
        }
        out.push(a_dim.max(b_dim));
    }
    Ok(out)
}

/// Per-input linear-index mapping for one output linear index, given each
/// input's concrete shape and strides (broadcast axes contribute stride 0).
pub fn broadcast_input_offset(out_shape: &[usize], in_shape: &[usize], in_strides: &[isize], out_linear: usize) -> isize {
    let rank = out_shape.len();
    let in_rank = in_shape.len();
    let mut remaining = out_linear;
    let mut offset: isize = 0;
    for axis in 0..rank {
        let axis_size = out_shape[axis];
        let stride_in_out = out_shape[axis + 1..].iter().product::<usize>().max(1);
        let coord = remaining / stride_in_out;
        remaining %= stride_in_out;

        let in_axis = axis as isize - (rank as isize - in_rank as isize);
        if in_axis >= 0 {
            let in_axis = in_axis as usize;
            let in_coord = if in_shape[in_axis] == 1 { 0 } else { coord };
            offset += in_coord as isize * in_strides[in_axis];
        }
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_rightmost_and_pads_with_broadcast_true() {
        // [False] vs [False, False] -> pad shorter on the left with True,
        // then OR: [True || False, False || False] = [True, False]
        assert_eq!(
            pairwise_broadcast(&[false], &[false, false]),
            vec![true, false]
        );
    }

    #[test]
    fn matching_rank_ors_elementwise() {
        assert_eq!(
            pairwise_broadcast(&[true, false], &[false, false]),
            vec![true, false]
        );
    }

    #[test]
    fn empty_patterns_broadcast_to_empty() {
        assert_eq!(pairwise_broadcast(&[], &[]), Vec::<bool>::new());
    }

    #[test]
    fn concrete_shapes_broadcast_like_numpy() {
        assert_eq!(
            broadcast_concrete_shapes(&[vec![3], vec![3]]).unwrap(),
            vec![3]
        );
        assert_eq!(
            broadcast_concrete_shapes(&[vec![1, 3], vec![2, 1]]).unwrap(),
            vec![2, 3]
        );
        assert!(broadcast_concrete_shapes(&[vec![2], vec![3]]).is_err());
    }

    #[test]
    fn broadcast_offset_repeats_size_one_axis() {
        let out_shape = [2usize, 3];
        // in_shape [1, 3] contiguous strides [3, 1]; broadcasting axis 0.
        let in_shape = [1usize, 3];
        let in_strides = [3isize, 1];
        assert_eq!(
            broadcast_input_offset(&out_shape, &in_shape, &in_strides, 0),
            0
        );
        assert_eq!(
            broadcast_input_offset(&out_shape, &in_shape, &in_strides, 4),
            1
        );
    }
}
