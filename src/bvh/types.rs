use crate::spatial::{Aabb, Ray};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Reference to a node of the hierarchy: an inner node, a run of leaf
/// batches, or nothing. The discriminant carries all the type information
/// traversal needs, no external lookup required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum NodeRef {
    Empty,
    /// Index into the inner node arena
    Inner(u32),
    /// Range of consecutive batches in the leaf arena
    Leaf { first: u32, count: u32 },
}

impl NodeRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, NodeRef::Inner(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeRef::Leaf { .. })
    }
}

/// Inner node with `N` child slots. Child bounds are stored as per-axis
/// plane arrays so a slab test touches `[f32; N]` rows, one lane per child.
/// Unused slots hold inverted bounds and `NodeRef::Empty`; no ray can pass
/// their slab test.
#[derive(Debug, Clone, Copy)]
pub struct InnerNode<const N: usize> {
    pub(crate) min_x: [f32; N],
    pub(crate) max_x: [f32; N],
    pub(crate) min_y: [f32; N],
    pub(crate) max_y: [f32; N],
    pub(crate) min_z: [f32; N],
    pub(crate) max_z: [f32; N],
    pub(crate) children: [NodeRef; N],
}

impl<const N: usize> InnerNode<N> {
    pub(crate) fn empty() -> Self {
        Self {
            min_x: [f32::INFINITY; N],
            max_x: [f32::NEG_INFINITY; N],
            min_y: [f32::INFINITY; N],
            max_y: [f32::NEG_INFINITY; N],
            min_z: [f32::INFINITY; N],
            max_z: [f32::NEG_INFINITY; N],
            children: [NodeRef::Empty; N],
        }
    }

    pub(crate) fn set_child(&mut self, slot: usize, bounds: &Aabb, child: NodeRef) {
        debug_assert!(slot < N);
        debug_assert!(!child.is_empty() && !bounds.is_empty());
        self.min_x[slot] = bounds.min.x;
        self.max_x[slot] = bounds.max.x;
        self.min_y[slot] = bounds.min.y;
        self.max_y[slot] = bounds.max.y;
        self.min_z[slot] = bounds.min.z;
        self.max_z[slot] = bounds.max.z;
        self.children[slot] = child;
    }

    pub fn child(&self, slot: usize) -> NodeRef {
        self.children[slot]
    }

    pub fn child_bounds(&self, slot: usize) -> Aabb {
        Aabb {
            min: glam::Vec3A::new(self.min_x[slot], self.min_y[slot], self.min_z[slot]),
            max: glam::Vec3A::new(self.max_x[slot], self.max_y[slot], self.max_z[slot]),
        }
    }
}

/// The seam between traversal and geometry: a leaf batch type the stream
/// drivers can hand an active subset of the ray stream to.
///
/// `ids` maps stream bit positions to indices into `rays`; bit `r` of
/// `active` marks `rays[ids[r]]` as live for this batch.
pub trait StreamPrimitive {
    fn bounds(&self) -> Aabb;

    /// Closest-hit test: for every active ray, shrink its `t_far` and record
    /// geometry/primitive ids and surface parameters whenever a closer
    /// intersection with this batch is found.
    fn intersect_stream(&self, rays: &mut [Ray], ids: &[usize], active: u32);

    /// Any-hit test: returns the subset of `active` whose rays intersect
    /// this batch anywhere inside their `[t_near, t_far]` interval.
    fn occluded_stream(&self, rays: &[Ray], ids: &[usize], active: u32) -> u32;
}

#[cfg(test)]
mod node_tests {
    use super::{InnerNode, NodeRef};
    use crate::spatial::Aabb;
    use glam::Vec3A;

    #[test]
    fn test_node_ref_classification() {
        assert!(NodeRef::Empty.is_empty());
        assert!(NodeRef::Inner(3).is_inner());
        assert!(NodeRef::Leaf { first: 0, count: 2 }.is_leaf());
        assert!(!NodeRef::Inner(0).is_leaf());
    }

    #[test]
    fn test_empty_node_slots_are_inverted() {
        let node = InnerNode::<4>::empty();
        for slot in 0..4 {
            assert!(node.child(slot).is_empty());
            assert!(node.child_bounds(slot).is_empty());
        }
    }

    #[test]
    fn test_set_child() {
        let mut node = InnerNode::<4>::empty();
        let bounds = Aabb::new(Vec3A::ZERO, Vec3A::ONE);
        node.set_child(2, &bounds, NodeRef::Inner(7));
        assert!(node.child(2) == NodeRef::Inner(7));
        assert!(node.child_bounds(2) == bounds);
        assert!(node.child(0).is_empty());
    }
}
