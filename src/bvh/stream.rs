use crate::bvh::types::{InnerNode, NodeRef, StreamPrimitive};
use crate::bvh::{Bvh, MAX_DEPTH};
use crate::spatial::math::{bscf, ray_octant, rcp_safe, sort_network};
use crate::spatial::Ray;

use glam::Vec3A;

/// Streams are traversed in sign-coherent chunks of at most this many rays,
/// so an active-ray set fits one `u32`.
pub const MAX_RAYS_PER_OCTANT: usize = 32;

/// Upper bound over all supported branching factors (the widest sorting
/// network is 8 lanes); the per-`N` requirement is `N * depth + 1` slots and
/// is asserted during traversal.
const STACK_CAPACITY: usize = 8 * MAX_DEPTH + 1;

/// Widening factors for the robust slab comparison; one or two floating
/// point rounding steps of slack keep borderline boxes from being culled.
const ROUND_DOWN: f32 = 1.0 - 2.0 * f32::EPSILON;
const ROUND_UP: f32 = 1.0 + 2.0 * f32::EPSILON;

/// Per-query options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// Trade a little slab-test precision for never missing intersections on
    /// node boundaries: the accepted `[near, far]` interval is widened by a
    /// couple of rounding steps.
    pub robust: bool,
}

impl QueryFlags {
    pub fn robust() -> Self {
        Self { robust: true }
    }
}

///####################################################################################
/// Ray context & stack
///####################################################################################

/// Per-ray values the slab test reuses at every node: reciprocal direction
/// and the origin pre-multiplied by it, plus the current distance interval.
/// `t_far` shrinks as closest-hit leaves land hits.
#[derive(Debug, Clone, Copy, Default)]
struct RayContext {
    rdir: Vec3A,
    org_rdir: Vec3A,
    t_near: f32,
    t_far: f32,
}

impl RayContext {
    fn new(ray: &Ray) -> Self {
        debug_assert!(ray.t_near >= 0.);
        let rdir = rcp_safe(ray.direction);
        Self {
            rdir,
            org_rdir: ray.origin * rdir,
            t_near: ray.t_near,
            t_far: ray.t_far,
        }
    }
}

/// One deferred visit: a node and the set of stream rays that still owe it a
/// visit. Never pushed with an empty set; masks only narrow down the tree.
#[derive(Debug, Clone, Copy)]
struct StackItem {
    node: NodeRef,
    mask: u32,
}

impl StackItem {
    const EMPTY: StackItem = StackItem {
        node: NodeRef::Empty,
        mask: 0,
    };
}

fn chunk_mask(len: usize) -> u32 {
    debug_assert!((1..=MAX_RAYS_PER_OCTANT).contains(&len));
    u32::MAX >> (32 - len)
}

/// Splits a stream into its 8 sign-coherent octant groups. Rays with an
/// inverted `[t_near, t_far]` interval cannot hit anything and are dropped.
fn octant_partition(rays: &[Ray]) -> [Vec<usize>; 8] {
    let mut groups: [Vec<usize>; 8] = Default::default();
    for (index, ray) in rays.iter().enumerate() {
        if ray.t_far >= ray.t_near {
            groups[ray_octant(ray.direction)].push(index);
        }
    }
    groups
}

///####################################################################################
/// Box test
///####################################################################################

/// Slab-tests every active ray against all `N` children of a node at once.
/// `tmask[lane]` collects which rays hit child `lane`, `tnear[lane]` the
/// smallest entry distance any of them saw. Returns the bitmask of children
/// hit by at least one ray.
fn intersect_node<const N: usize>(
    node: &InnerNode<N>,
    ctxs: &[RayContext],
    active: u32,
    octant: usize,
    robust: bool,
    tmask: &mut [u32; N],
    tnear: &mut [f32; N],
) -> u32 {
    // the whole chunk shares one sign pattern, so the near/far plane of each
    // axis is picked once per node instead of per ray
    let (near_x, far_x) = if octant & 1 != 0 {
        (&node.max_x, &node.min_x)
    } else {
        (&node.min_x, &node.max_x)
    };
    let (near_y, far_y) = if octant & 2 != 0 {
        (&node.max_y, &node.min_y)
    } else {
        (&node.min_y, &node.max_y)
    };
    let (near_z, far_z) = if octant & 4 != 0 {
        (&node.max_z, &node.min_z)
    } else {
        (&node.min_z, &node.max_z)
    };

    let (round_down, round_up) = if robust {
        (ROUND_DOWN, ROUND_UP)
    } else {
        (1., 1.)
    };

    *tmask = [0; N];
    *tnear = [f32::INFINITY; N];

    let mut bits = active;
    while bits != 0 {
        let r = bscf(&mut bits);
        let ctx = &ctxs[r];
        for lane in 0..N {
            let near = (near_x[lane] * ctx.rdir.x - ctx.org_rdir.x)
                .max(near_y[lane] * ctx.rdir.y - ctx.org_rdir.y)
                .max(near_z[lane] * ctx.rdir.z - ctx.org_rdir.z)
                .max(ctx.t_near);
            let far = (far_x[lane] * ctx.rdir.x - ctx.org_rdir.x)
                .min(far_y[lane] * ctx.rdir.y - ctx.org_rdir.y)
                .min(far_z[lane] * ctx.rdir.z - ctx.org_rdir.z)
                .min(ctx.t_far);
            if near * round_down <= far * round_up {
                tmask[lane] |= 1 << r;
                tnear[lane] = tnear[lane].min(near);
            }
        }
    }

    let mut child_hits = 0;
    for lane in 0..N {
        if tmask[lane] != 0 {
            child_hits |= 1 << lane;
        }
    }
    child_hits
}

///####################################################################################
/// Node traversers
///####################################################################################

/// Picks the next child to descend into for a closest-hit query and pushes
/// the remaining hit children, ordered so nearer children pop first.
/// `child_hits` must not be zero.
fn traverse_closest_hit<const N: usize>(
    node: &InnerNode<N>,
    child_hits: u32,
    tmask: &[u32; N],
    tnear: &[f32; N],
    stack: &mut [StackItem],
    sp: &mut usize,
) -> (NodeRef, u32) {
    debug_assert!(child_hits != 0);
    let mut hits = child_hits;

    let r0 = bscf(&mut hits);
    if hits == 0 {
        // single hit child, no push needed
        return (node.children[r0], tmask[r0]);
    }

    let r1 = bscf(&mut hits);
    if hits == 0 {
        // the common case: descend the nearer of two, push the farther
        let (near, far) = if tnear[r0] < tnear[r1] {
            (r0, r1)
        } else {
            (r1, r0)
        };
        debug_assert!(*sp < stack.len());
        stack[*sp] = StackItem {
            node: node.children[far],
            mask: tmask[far],
        };
        *sp += 1;
        return (node.children[near], tmask[near]);
    }

    // three or more hits: order the child slots by entry distance with a
    // fixed compare-exchange network; the low 3 bits of each key carry the
    // slot index, the upper bits its distance
    let mut keys = [u32::MAX; N];
    let mut bits = child_hits;
    while bits != 0 {
        let r = bscf(&mut bits);
        keys[r] = (tnear[r].to_bits() & !7) | r as u32;
    }
    sort_network(&mut keys);

    // push farthest first; the stack then pops nearest-first
    let hit_count = child_hits.count_ones() as usize;
    for sorted in (1..hit_count).rev() {
        let slot = (keys[sorted] & 7) as usize;
        debug_assert!(*sp < stack.len());
        stack[*sp] = StackItem {
            node: node.children[slot],
            mask: tmask[slot],
        };
        *sp += 1;
    }
    let slot = (keys[0] & 7) as usize;
    (node.children[slot], tmask[slot])
}

/// Any-hit variant: visit order cannot change the outcome, so hit children
/// are pushed in discovery order and the last one is followed directly.
/// `child_hits` must not be zero.
fn traverse_any_hit<const N: usize>(
    node: &InnerNode<N>,
    child_hits: u32,
    tmask: &[u32; N],
    stack: &mut [StackItem],
    sp: &mut usize,
) -> (NodeRef, u32) {
    debug_assert!(child_hits != 0);
    let mut hits = child_hits;
    let mut r = bscf(&mut hits);
    while hits != 0 {
        debug_assert!(*sp < stack.len());
        stack[*sp] = StackItem {
            node: node.children[r],
            mask: tmask[r],
        };
        *sp += 1;
        r = bscf(&mut hits);
    }
    (node.children[r], tmask[r])
}

///####################################################################################
/// Stream drivers
///####################################################################################

impl<P: StreamPrimitive, const N: usize> Bvh<P, N> {
    /// Closest-hit query over a stream of rays. Each ray's `t_far` shrinks to
    /// its nearest intersection distance and its `hit` fields are filled in;
    /// rays that hit nothing are left untouched.
    pub fn intersect(&self, rays: &mut [Ray], flags: QueryFlags) {
        if self.root.is_empty() || rays.is_empty() {
            return;
        }
        for group in octant_partition(rays) {
            for ids in group.chunks(MAX_RAYS_PER_OCTANT) {
                self.intersect_chunk(rays, ids, flags);
            }
        }
    }

    /// Any-hit query over a stream of rays: sets `occluded` on every ray
    /// that intersects anything inside its `[t_near, t_far]` interval.
    pub fn occluded(&self, rays: &mut [Ray], flags: QueryFlags) {
        if self.root.is_empty() || rays.is_empty() {
            return;
        }
        for group in octant_partition(rays) {
            for ids in group.chunks(MAX_RAYS_PER_OCTANT) {
                self.occluded_chunk(rays, ids, flags);
            }
        }
    }

    fn intersect_chunk(&self, rays: &mut [Ray], ids: &[usize], flags: QueryFlags) {
        let octant = ray_octant(rays[ids[0]].direction);
        let mut ctxs = [RayContext::default(); MAX_RAYS_PER_OCTANT];
        for (r, &id) in ids.iter().enumerate() {
            ctxs[r] = RayContext::new(&rays[id]);
        }

        let mut stack = [StackItem::EMPTY; STACK_CAPACITY];
        stack[0] = StackItem {
            node: self.root,
            mask: chunk_mask(ids.len()),
        };
        let mut sp = 1;

        let mut tmask = [0u32; N];
        let mut tnear = [0f32; N];

        'pop: while sp > 0 {
            sp -= 1;
            let mut cur = stack[sp].node;
            let mut active = stack[sp].mask;
            loop {
                match cur {
                    NodeRef::Empty => continue 'pop,
                    NodeRef::Leaf { first, count } => {
                        for batch in &self.leaves[first as usize..(first + count) as usize] {
                            batch.intersect_stream(rays, ids, active);
                        }
                        // adopt the shrunken far bounds; sibling boxes now
                        // beyond a ray's nearest hit stop passing its slab test
                        let mut bits = active;
                        while bits != 0 {
                            let r = bscf(&mut bits);
                            ctxs[r].t_far = rays[ids[r]].t_far;
                        }
                        continue 'pop;
                    }
                    NodeRef::Inner(index) => {
                        let node = &self.nodes[index as usize];
                        let child_hits = intersect_node(
                            node,
                            &ctxs,
                            active,
                            octant,
                            flags.robust,
                            &mut tmask,
                            &mut tnear,
                        );
                        if child_hits == 0 {
                            continue 'pop;
                        }
                        (cur, active) =
                            traverse_closest_hit(node, child_hits, &tmask, &tnear, &mut stack, &mut sp);
                        debug_assert!(sp <= N * self.depth + 1);
                    }
                }
            }
        }
    }

    fn occluded_chunk(&self, rays: &mut [Ray], ids: &[usize], flags: QueryFlags) {
        let octant = ray_octant(rays[ids[0]].direction);
        let mut ctxs = [RayContext::default(); MAX_RAYS_PER_OCTANT];
        for (r, &id) in ids.iter().enumerate() {
            ctxs[r] = RayContext::new(&rays[id]);
        }

        let full = chunk_mask(ids.len());
        let mut terminated = 0u32;

        let mut stack = [StackItem::EMPTY; STACK_CAPACITY];
        stack[0] = StackItem {
            node: self.root,
            mask: full,
        };
        let mut sp = 1;

        let mut tmask = [0u32; N];
        let mut tnear = [0f32; N];

        'pop: while sp > 0 {
            sp -= 1;
            let mut cur = stack[sp].node;
            // rays resolved since this item was pushed no longer take part
            let mut active = stack[sp].mask & !terminated;
            if active == 0 {
                continue;
            }
            loop {
                match cur {
                    NodeRef::Empty => continue 'pop,
                    NodeRef::Leaf { first, count } => {
                        for batch in &self.leaves[first as usize..(first + count) as usize] {
                            let hit = batch.occluded_stream(rays, ids, active);
                            if hit != 0 {
                                let mut bits = hit;
                                while bits != 0 {
                                    let r = bscf(&mut bits);
                                    rays[ids[r]].occluded = true;
                                }
                                terminated |= hit;
                                active &= !hit;
                                if active == 0 {
                                    break;
                                }
                            }
                        }
                        if terminated == full {
                            // every ray of the chunk is resolved; the rest of
                            // the stack is dead work
                            return;
                        }
                        continue 'pop;
                    }
                    NodeRef::Inner(index) => {
                        let node = &self.nodes[index as usize];
                        let child_hits = intersect_node(
                            node,
                            &ctxs,
                            active,
                            octant,
                            flags.robust,
                            &mut tmask,
                            &mut tnear,
                        );
                        if child_hits == 0 {
                            continue 'pop;
                        }
                        (cur, active) = traverse_any_hit(node, child_hits, &tmask, &mut stack, &mut sp);
                        debug_assert!(sp <= N * self.depth + 1);
                    }
                }
            }
        }
    }
}
