use crate::bvh::quad::{QuadBatch, QuadMesh};
use crate::bvh::types::{InnerNode, NodeRef};
use crate::bvh::{Bvh, BvhError, MAX_DEPTH};
use crate::spatial::Aabb;

use glam::Vec3A;
use log::{debug, warn};
use std::ops::Range;

/// Per-quad record the splitter works on
struct BuildPrim {
    prim_id: u32,
    bounds: Aabb,
    center: Vec3A,
}

impl<const M: usize, const N: usize> Bvh<QuadBatch<M>, N> {
    /// Builds the hierarchy over a quad mesh: recursive median splits on the
    /// widest centroid axis, each binary split fanned out until a node has up
    /// to `N` children, quads packed into `QuadBatch`es at the leaves.
    ///
    /// Construction is deliberately simple; any builder producing nodes that
    /// honor the child-slot invariants can replace it.
    pub fn from_quad_mesh(mesh: &QuadMesh) -> Result<Self, BvhError> {
        for (quad, corners) in mesh.quads.iter().enumerate() {
            for &vertex in corners {
                if vertex as usize >= mesh.vertices.len() {
                    return Err(BvhError::InvalidQuadIndex { quad, vertex });
                }
            }
        }

        let mut prims: Vec<BuildPrim> = mesh
            .quads
            .iter()
            .enumerate()
            .map(|(prim_id, _)| {
                let bounds = mesh.quad_bounds(prim_id);
                BuildPrim {
                    prim_id: prim_id as u32,
                    bounds,
                    center: bounds.center(),
                }
            })
            .collect();

        if prims.is_empty() {
            return Ok(Self {
                nodes: Vec::new(),
                leaves: Vec::new(),
                root: NodeRef::Empty,
                depth: 0,
                bounds: Aabb::EMPTY,
            });
        }

        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        let (root, bounds, depth) = build_node(mesh, &mut prims, &mut nodes, &mut leaves, 0);
        debug_assert!(depth <= MAX_DEPTH);
        debug!(
            "built BVH{} over {} quads: {} nodes, {} leaf batches, depth {}",
            N,
            mesh.quads.len(),
            nodes.len(),
            leaves.len(),
            depth
        );
        Ok(Self {
            nodes,
            leaves,
            root,
            depth,
            bounds,
        })
    }
}

/// Turns `prims` into a subtree, appending to the node and leaf arenas.
/// Returns the subtree's reference, bounds, and depth (a leaf counts as 1).
fn build_node<const M: usize, const N: usize>(
    mesh: &QuadMesh,
    prims: &mut [BuildPrim],
    nodes: &mut Vec<InnerNode<N>>,
    leaves: &mut Vec<QuadBatch<M>>,
    level: usize,
) -> (NodeRef, Aabb, usize) {
    let mut bounds = Aabb::EMPTY;
    for prim in prims.iter() {
        bounds.extend_box(&prim.bounds);
    }

    if prims.len() <= M || level + 1 >= MAX_DEPTH {
        if prims.len() > M {
            warn!(
                "leaf forced at depth bound holds {} quads across {} batches",
                prims.len(),
                prims.len().div_ceil(M)
            );
        }
        let first = leaves.len() as u32;
        for chunk in prims.chunks(M) {
            let ids: Vec<u32> = chunk.iter().map(|p| p.prim_id).collect();
            leaves.push(QuadBatch::fill(mesh, &ids));
        }
        let count = leaves.len() as u32 - first;
        return (NodeRef::Leaf { first, count }, bounds, 1);
    }

    // fan the binary median split out to at most N partitions, always
    // splitting the currently largest one
    let mut parts: Vec<Range<usize>> = vec![0..prims.len()];
    while parts.len() < N {
        let Some(widest) = parts
            .iter()
            .enumerate()
            .filter(|(_, range)| range.len() > M)
            .max_by_key(|(_, range)| range.len())
            .map(|(index, _)| index)
        else {
            break;
        };
        let range = parts.swap_remove(widest);
        let mid = range.start + split_median(&mut prims[range.clone()]);
        parts.push(range.start..mid);
        parts.push(mid..range.end);
    }

    // reserve the slot before recursing so children never precede their parent
    let node_index = nodes.len();
    nodes.push(InnerNode::empty());

    let mut node = InnerNode::empty();
    let mut depth = 0;
    for (slot, range) in parts.into_iter().enumerate() {
        let (child, child_bounds, child_depth) =
            build_node(mesh, &mut prims[range], nodes, leaves, level + 1);
        node.set_child(slot, &child_bounds, child);
        depth = depth.max(child_depth);
    }
    nodes[node_index] = node;

    (NodeRef::Inner(node_index as u32), bounds, depth + 1)
}

/// Splits the slice at the median of the widest centroid axis; both halves
/// are non-empty for any input of two or more prims.
fn split_median(prims: &mut [BuildPrim]) -> usize {
    let mut centroid_bounds = Aabb::EMPTY;
    for prim in prims.iter() {
        centroid_bounds.extend_point(prim.center);
    }
    let axis = centroid_bounds.longest_axis();

    let mid = prims.len() / 2;
    prims.select_nth_unstable_by(mid, |a, b| {
        a.center[axis]
            .partial_cmp(&b.center[axis])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    mid
}

#[cfg(test)]
pub(crate) mod builder_tests {
    use crate::bvh::quad::QuadMesh;
    use crate::bvh::types::NodeRef;
    use crate::bvh::{Bvh, BvhError, QuadBatch, MAX_DEPTH};
    use crate::spatial::INVALID_ID;
    use glam::Vec3A;
    use rand::Rng;

    pub(crate) fn quad_grid_mesh(side: u32) -> QuadMesh {
        let mut mesh = QuadMesh::new(1);
        for y in 0..=side {
            for x in 0..=side {
                mesh.push_vertex(Vec3A::new(x as f32, y as f32, 0.));
            }
        }
        let stride = side + 1;
        for y in 0..side {
            for x in 0..side {
                let base = y * stride + x;
                mesh.push_quad([base, base + 1, base + stride + 1, base + stride]);
            }
        }
        mesh
    }

    #[test]
    fn test_build_empty_mesh() {
        let bvh = Bvh::<QuadBatch, 4>::from_quad_mesh(&QuadMesh::new(0)).unwrap();
        assert!(bvh.is_empty());
        assert!(bvh.depth() == 0);
        assert!(bvh.node_count() == 0 && bvh.leaf_count() == 0);
    }

    #[test]
    fn test_build_rejects_bad_index() {
        let mut mesh = QuadMesh::new(0);
        mesh.push_vertex(Vec3A::ZERO);
        mesh.push_quad([0, 0, 0, 9]);
        assert!(matches!(
            Bvh::<QuadBatch, 4>::from_quad_mesh(&mesh),
            Err(BvhError::InvalidQuadIndex { quad: 0, vertex: 9 })
        ));
    }

    #[test]
    fn test_build_single_leaf() {
        let mesh = quad_grid_mesh(2);
        let bvh = Bvh::<QuadBatch, 4>::from_quad_mesh(&mesh).unwrap();
        assert!(bvh.depth() == 1);
        assert!(bvh.node_count() == 0);
        assert!(bvh.root == NodeRef::Leaf { first: 0, count: 1 });
    }

    fn reachable_prims(bvh: &Bvh<QuadBatch, 4>, node: NodeRef, found: &mut Vec<u32>) {
        match node {
            NodeRef::Empty => {}
            NodeRef::Leaf { first, count } => {
                for batch in &bvh.leaves[first as usize..(first + count) as usize] {
                    for slot in 0..batch.len() {
                        found.push(batch.prim_ids[slot]);
                    }
                }
            }
            NodeRef::Inner(index) => {
                for slot in 0..4 {
                    reachable_prims(bvh, bvh.nodes[index as usize].child(slot), found);
                }
            }
        }
    }

    #[test]
    fn test_every_quad_reachable_exactly_once() {
        let mut rng = rand::thread_rng();
        let mut mesh = QuadMesh::new(7);
        for _ in 0..257 {
            let base = Vec3A::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            let a = mesh.push_vertex(base);
            let b = mesh.push_vertex(base + Vec3A::X);
            let c = mesh.push_vertex(base + Vec3A::X + Vec3A::Y);
            let d = mesh.push_vertex(base + Vec3A::Y);
            mesh.push_quad([a, b, c, d]);
        }

        let bvh = Bvh::<QuadBatch, 4>::from_quad_mesh(&mesh).unwrap();
        assert!(bvh.depth() <= MAX_DEPTH);

        let mut found = Vec::new();
        reachable_prims(&bvh, bvh.root, &mut found);
        found.sort_unstable();
        assert!(found.len() == 257);
        for (expected, prim) in found.into_iter().enumerate() {
            assert!(prim == expected as u32 && prim != INVALID_ID);
        }
    }

    #[test]
    fn test_child_bounds_cover_subtree() {
        let mesh = quad_grid_mesh(16);
        let bvh = Bvh::<QuadBatch, 4>::from_quad_mesh(&mesh).unwrap();
        assert!(bvh.node_count() > 0);

        for node in &bvh.nodes {
            for slot in 0..4 {
                match node.child(slot) {
                    NodeRef::Empty => assert!(node.child_bounds(slot).is_empty()),
                    NodeRef::Leaf { first, count } => {
                        for batch in &bvh.leaves[first as usize..(first + count) as usize] {
                            use crate::bvh::StreamPrimitive;
                            let bounds = batch.bounds();
                            let slot_bounds = node.child_bounds(slot);
                            assert!(slot_bounds.min.cmple(bounds.min).all());
                            assert!(slot_bounds.max.cmpge(bounds.max).all());
                        }
                    }
                    NodeRef::Inner(_) => assert!(!node.child_bounds(slot).is_empty()),
                }
            }
        }
    }
}
