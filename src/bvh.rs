pub mod builder;
pub mod quad;
pub mod stream;
pub mod types;


pub use quad::{QuadBatch, QuadMesh};
pub use stream::QueryFlags;
pub use types::{InnerNode, NodeRef, StreamPrimitive};

use crate::spatial::Aabb;

/// error types during creation of the hierarchy
#[derive(Debug)]
pub enum BvhError {
    /// A quad refers to a vertex index outside the mesh's vertex list
    InvalidQuadIndex { quad: usize, vertex: u32 },
}

/// Deepest tree the builder will produce; the traversal stack capacity
/// is derived from it, so the bound is load-bearing, not advisory.
pub const MAX_DEPTH: usize = 32;

/// Bounding volume hierarchy with branching factor `N`, storing batches of
/// primitives of type `P` at its leaves. Read-only once built; any number of
/// queries may run against it concurrently, each owning its own ray stream.
pub struct Bvh<P, const N: usize = 4> {
    pub(crate) nodes: Vec<InnerNode<N>>,
    pub(crate) leaves: Vec<P>,
    pub(crate) root: NodeRef,
    pub(crate) depth: usize,
    pub(crate) bounds: Aabb,
}

impl<P, const N: usize> Bvh<P, N> {
    /// Number of levels in the tree; 0 for an empty hierarchy, 1 for a lone leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
