pub mod math;

use glam::Vec3A;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Marker value for "no geometry / no primitive" in hit records.
pub const INVALID_ID: u32 = u32::MAX;

///####################################################################################
/// Aabb
///####################################################################################
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Aabb {
    pub min: Vec3A,
    pub max: Vec3A,
}

impl Aabb {
    /// The inverted box; extending it with any point yields that point,
    /// and no ray can intersect it.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3A::INFINITY,
        max: Vec3A::NEG_INFINITY,
    };

    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    pub fn extend_point(&mut self, point: Vec3A) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn extend_box(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn center(&self) -> Vec3A {
        (self.min + self.max) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Index of the axis the box is widest along
    pub fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        }
    }
}

///####################################################################################
/// Ray
///####################################################################################

/// Hit fields of a ray; filled in place by `Bvh::intersect`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub geom_id: u32,
    pub prim_id: u32,
    /// Parametric surface coordinates of the hit
    pub u: f32,
    pub v: f32,
}

impl RayHit {
    pub const NONE: RayHit = RayHit {
        geom_id: INVALID_ID,
        prim_id: INVALID_ID,
        u: 0.,
        v: 0.,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3A,
    pub direction: Vec3A,
    /// Rays only report intersections inside `[t_near, t_far]`.
    pub t_near: f32,
    /// Shrinks to the hit distance whenever `Bvh::intersect` finds a closer hit.
    pub t_far: f32,
    pub hit: RayHit,
    /// Set by `Bvh::occluded` when anything intersects inside `[t_near, t_far]`.
    pub occluded: bool,
}

impl Ray {
    pub fn new(origin: Vec3A, direction: Vec3A) -> Self {
        Self::with_interval(origin, direction, 0., f32::INFINITY)
    }

    pub fn with_interval(origin: Vec3A, direction: Vec3A, t_near: f32, t_far: f32) -> Self {
        Self {
            origin,
            direction,
            t_near,
            t_far,
            hit: RayHit::NONE,
            occluded: false,
        }
    }

    pub fn point_at(&self, d: f32) -> Vec3A {
        self.origin + self.direction * d
    }

    pub fn has_hit(&self) -> bool {
        self.hit.geom_id != INVALID_ID
    }
}

#[cfg(test)]
mod spatial_tests {
    use super::{Aabb, Ray};
    use glam::Vec3A;

    #[test]
    fn test_aabb_extend() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());

        aabb.extend_point(Vec3A::new(1., 2., 3.));
        aabb.extend_point(Vec3A::new(-1., 0., 5.));
        assert!(!aabb.is_empty());
        assert!(aabb.min == Vec3A::new(-1., 0., 3.));
        assert!(aabb.max == Vec3A::new(1., 2., 5.));
        assert!(aabb.center() == Vec3A::new(0., 1., 4.));
        assert!(aabb.longest_axis() == 0);
    }

    #[test]
    fn test_aabb_extend_box_with_empty() {
        let mut aabb = Aabb::new(Vec3A::ZERO, Vec3A::ONE);
        aabb.extend_box(&Aabb::EMPTY);
        assert!(aabb == Aabb::new(Vec3A::ZERO, Vec3A::ONE));
    }

    #[test]
    fn test_ray_point_at() {
        let ray = Ray::new(Vec3A::new(1., 0., 0.), Vec3A::new(0., 1., 0.));
        assert!(ray.point_at(2.) == Vec3A::new(1., 2., 0.));
        assert!(!ray.has_hit());
        assert!(!ray.occluded);
    }
}
