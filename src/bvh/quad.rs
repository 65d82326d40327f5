use crate::spatial::{Aabb, Ray, RayHit, INVALID_ID};
use crate::bvh::types::StreamPrimitive;
use crate::spatial::math::bscf;

use glam::Vec3A;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// An indexed quadrilateral mesh, the input of the builder. Quads list their
/// four corners in winding order; the two triangles `(v0,v1,v3)` and
/// `(v2,v3,v1)` cover the quad.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct QuadMesh {
    pub vertices: Vec<Vec3A>,
    pub quads: Vec<[u32; 4]>,
    pub geom_id: u32,
}

impl QuadMesh {
    pub fn new(geom_id: u32) -> Self {
        Self {
            vertices: Vec::new(),
            quads: Vec::new(),
            geom_id,
        }
    }

    pub fn push_vertex(&mut self, vertex: Vec3A) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    pub fn push_quad(&mut self, corners: [u32; 4]) {
        self.quads.push(corners);
    }

    pub(crate) fn quad_bounds(&self, quad: usize) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for &v in &self.quads[quad] {
            bounds.extend_point(self.vertices[v as usize]);
        }
        bounds
    }
}

/// Up to `M` quads gathered into one leaf batch, vertices pre-fetched so
/// traversal never touches the mesh. Valid slots are packed to the front;
/// padding slots repeat the last vertex and carry invalid ids.
#[derive(Debug, Clone, Copy)]
pub struct QuadBatch<const M: usize = 4> {
    pub(crate) v0: [Vec3A; M],
    pub(crate) v1: [Vec3A; M],
    pub(crate) v2: [Vec3A; M],
    pub(crate) v3: [Vec3A; M],
    pub(crate) geom_ids: [u32; M],
    pub(crate) prim_ids: [u32; M],
}

impl<const M: usize> QuadBatch<M> {
    /// Gathers the quads named by `prims` (indices into `mesh.quads`) into a
    /// batch. `prims` must be non-empty and hold at most `M` entries.
    pub(crate) fn fill(mesh: &QuadMesh, prims: &[u32]) -> Self {
        debug_assert!(!prims.is_empty() && prims.len() <= M);
        let mut batch = Self {
            v0: [Vec3A::ZERO; M],
            v1: [Vec3A::ZERO; M],
            v2: [Vec3A::ZERO; M],
            v3: [Vec3A::ZERO; M],
            geom_ids: [INVALID_ID; M],
            prim_ids: [INVALID_ID; M],
        };
        for slot in 0..M {
            // padding slots keep the last quad's vertices so every lane
            // holds finite coordinates
            let prim = prims[slot.min(prims.len() - 1)];
            let corners = mesh.quads[prim as usize];
            batch.v0[slot] = mesh.vertices[corners[0] as usize];
            batch.v1[slot] = mesh.vertices[corners[1] as usize];
            batch.v2[slot] = mesh.vertices[corners[2] as usize];
            batch.v3[slot] = mesh.vertices[corners[3] as usize];
            if slot < prims.len() {
                batch.geom_ids[slot] = mesh.geom_id;
                batch.prim_ids[slot] = prim;
            }
        }
        batch
    }

    /// Number of valid quads stored
    pub fn len(&self) -> usize {
        self.prim_ids.iter().take_while(|&&i| i != INVALID_ID).count()
    }

    pub fn is_empty(&self) -> bool {
        self.prim_ids[0] == INVALID_ID
    }

    /// Bitmask over slots holding a valid quad
    pub fn valid_mask(&self) -> u32 {
        (1u32 << self.len()) - 1
    }
}

impl<const M: usize> StreamPrimitive for QuadBatch<M> {
    fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for slot in 0..self.len() {
            bounds.extend_point(self.v0[slot]);
            bounds.extend_point(self.v1[slot]);
            bounds.extend_point(self.v2[slot]);
            bounds.extend_point(self.v3[slot]);
        }
        bounds
    }

    fn intersect_stream(&self, rays: &mut [Ray], ids: &[usize], active: u32) {
        let mut bits = active;
        while bits != 0 {
            let r = bscf(&mut bits);
            let ray = &mut rays[ids[r]];
            for slot in 0..M {
                if self.prim_ids[slot] == INVALID_ID {
                    break;
                }
                if let Some((t, u, v)) = intersect_quad(
                    ray.origin,
                    ray.direction,
                    ray.t_near,
                    ray.t_far,
                    self.v0[slot],
                    self.v1[slot],
                    self.v2[slot],
                    self.v3[slot],
                ) {
                    ray.t_far = t;
                    ray.hit = RayHit {
                        geom_id: self.geom_ids[slot],
                        prim_id: self.prim_ids[slot],
                        u,
                        v,
                    };
                }
            }
        }
    }

    fn occluded_stream(&self, rays: &[Ray], ids: &[usize], active: u32) -> u32 {
        let mut hits = 0;
        let mut bits = active;
        while bits != 0 {
            let r = bscf(&mut bits);
            let ray = &rays[ids[r]];
            for slot in 0..M {
                if self.prim_ids[slot] == INVALID_ID {
                    break;
                }
                if intersect_quad(
                    ray.origin,
                    ray.direction,
                    ray.t_near,
                    ray.t_far,
                    self.v0[slot],
                    self.v1[slot],
                    self.v2[slot],
                    self.v3[slot],
                )
                .is_some()
                {
                    hits |= 1 << r;
                    break;
                }
            }
        }
        hits
    }
}

/// Both-sided ray/quad intersection, the quad split into triangles
/// `(v0,v1,v3)` and `(v2,v3,v1)`. Returns `(t, u, v)` with `(u, v)`
/// continuous over the whole quad: the second triangle's coordinates are
/// mirrored so `(0,0)` sits at `v0` and `(1,1)` at `v2`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn intersect_quad(
    origin: Vec3A,
    direction: Vec3A,
    t_near: f32,
    t_far: f32,
    v0: Vec3A,
    v1: Vec3A,
    v2: Vec3A,
    v3: Vec3A,
) -> Option<(f32, f32, f32)> {
    if let Some((t, u, v)) = intersect_triangle(origin, direction, t_near, t_far, v0, v1, v3) {
        return Some((t, u, v));
    }
    if let Some((t, u, v)) = intersect_triangle(origin, direction, t_near, t_far, v2, v3, v1) {
        return Some((t, 1. - u, 1. - v));
    }
    None
}

/// Möller–Trumbore, accepting front and back faces.
fn intersect_triangle(
    origin: Vec3A,
    direction: Vec3A,
    t_near: f32,
    t_far: f32,
    a: Vec3A,
    b: Vec3A,
    c: Vec3A,
) -> Option<(f32, f32, f32)> {
    let edge1 = b - a;
    let edge2 = c - a;
    let pvec = direction.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < f32::MIN_POSITIVE {
        // ray parallel to the triangle plane
        return None;
    }
    let inv_det = 1. / det;
    let tvec = origin - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0. ..=1.).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(edge1);
    let v = direction.dot(qvec) * inv_det;
    if v < 0. || u + v > 1. {
        return None;
    }
    let t = edge2.dot(qvec) * inv_det;
    if t < t_near || t > t_far {
        return None;
    }
    Some((t, u, v))
}
