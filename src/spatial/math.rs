use glam::Vec3A;

/// Smallest direction component magnitude the reciprocal is computed from.
/// Components closer to zero are clamped to this, keeping the reciprocal
/// finite so slab tests degrade into pure interval checks instead of
/// producing `0 * inf` NaNs.
const MIN_RCP_INPUT: f32 = 1e-18;

/// Classifies a direction into one of 8 octants by the sign bits of its components.
/// Rays sharing an octant agree on which bound plane of every axis is the near one.
pub fn ray_octant(direction: Vec3A) -> usize {
    (direction.x.is_sign_negative() as usize)
        | ((direction.y.is_sign_negative() as usize) << 1)
        | ((direction.z.is_sign_negative() as usize) << 2)
}

/// Component-wise reciprocal, guarded against (near-)zero components.
pub fn rcp_safe(v: Vec3A) -> Vec3A {
    Vec3A::new(rcp_safe_scalar(v.x), rcp_safe_scalar(v.y), rcp_safe_scalar(v.z))
}

fn rcp_safe_scalar(v: f32) -> f32 {
    if v.abs() < MIN_RCP_INPUT {
        1. / MIN_RCP_INPUT.copysign(v)
    } else {
        1. / v
    }
}

/// Clears the lowest set bit of `mask` and returns its index.
/// `mask` must not be zero.
pub(crate) fn bscf(mask: &mut u32) -> usize {
    debug_assert!(*mask != 0);
    let index = mask.trailing_zeros() as usize;
    *mask &= *mask - 1;
    index
}

///####################################################################################
/// Sorting networks
///####################################################################################

/// Compare-exchange sequences sorting `width` elements, data-independent by
/// construction (Batcher odd-even merge up to width 8).
fn exchange_pairs(width: usize) -> &'static [(usize, usize)] {
    match width {
        1 => &[],
        2 => &[(0, 1)],
        4 => &[(0, 1), (2, 3), (0, 2), (1, 3), (1, 2)],
        8 => &[
            (0, 1),
            (2, 3),
            (4, 5),
            (6, 7),
            (0, 2),
            (1, 3),
            (4, 6),
            (5, 7),
            (1, 2),
            (5, 6),
            (0, 4),
            (1, 5),
            (2, 6),
            (3, 7),
            (2, 4),
            (3, 5),
            (1, 2),
            (3, 4),
            (5, 6),
        ],
        _ => panic!("no sorting network for width {}", width),
    }
}

/// Sorts the keys ascending with a fixed compare-exchange sequence;
/// the same comparisons run regardless of the data.
pub fn sort_network<const N: usize>(keys: &mut [u32; N]) {
    for &(i, j) in exchange_pairs(N) {
        let (a, b) = (keys[i], keys[j]);
        keys[i] = a.min(b);
        keys[j] = a.max(b);
    }
}
