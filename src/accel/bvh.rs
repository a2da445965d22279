//! Bounding boxes, flat BVH nodes and stack-based traversal.
//!
//! Flat array layout:
//! - 32-byte nodes, index 0 is the root
//! - leaves reference a contiguous run of the reordered primitive list

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Grow to include a point.
    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// True until something was added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Surface area (for SAH cost).
    #[inline]
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Centroid of the box.
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box around the eight transformed corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let mut out = Aabb::EMPTY;
        if self.is_empty() {
            return out;
        }
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.grow_point(m.transform_point3(corner));
        }
        out
    }

    /// Slab test. Returns the entry distance if the ray overlaps
    /// `[t_min, t_max]` inside the box.
    #[inline]
    pub fn intersect(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let t1 = (self.min - origin) * inv_dir;
        let t2 = (self.max - origin) * inv_dir;
        let near = t1.min(t2).max_element().max(t_min);
        let far = t1.max(t2).min_element().min(t_max);
        (near <= far).then_some(near)
    }
}

/// BVH node (32 bytes).
///
/// Internal node: `left_or_first` = left child index, `count` = 0.
/// Leaf node: `left_or_first` = first primitive slot, `count` > 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    pub left_or_first: u32,
    pub aabb_max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    pub(crate) fn new(aabb: &Aabb, left_or_first: u32, count: u32) -> Self {
        Self {
            aabb_min: aabb.min.to_array(),
            left_or_first,
            aabb_max: aabb.max.to_array(),
            count,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: Vec3::from_array(self.aabb_min),
            max: Vec3::from_array(self.aabb_max),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Built hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    /// Flat node array (index 0 = root). Empty when built from no primitives.
    pub nodes: Vec<BvhNode>,
    /// Reordered primitive indices (leaves reference into this).
    pub prim_indices: Vec<u32>,
}

impl Bvh {
    /// Bounds of everything in the hierarchy.
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, BvhNode::aabb)
    }

    /// Visit primitives whose leaves the ray reaches, nearest box first.
    ///
    /// `visit` receives a primitive index and the current `t_max`; it
    /// returns the new `t_max` on a hit. With `any_hit` traversal stops at
    /// the first hit. Returns whether anything was hit.
    pub fn traverse(
        &self,
        origin: Vec3,
        direction: Vec3,
        t_min: f32,
        mut t_max: f32,
        any_hit: bool,
        mut visit: impl FnMut(u32, f32) -> Option<f32>,
    ) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = direction.recip();
        let mut hit = false;
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.aabb().intersect(origin, inv_dir, t_min, t_max).is_none() {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_or_first as usize;
                for &prim in &self.prim_indices[first..first + node.count as usize] {
                    if let Some(t) = visit(prim, t_max) {
                        t_max = t;
                        hit = true;
                        if any_hit {
                            return true;
                        }
                    }
                }
                continue;
            }
            let left = node.left_or_first as usize;
            let right = left + 1;
            let near_left = self.nodes[left].aabb().intersect(origin, inv_dir, t_min, t_max);
            let near_right = self.nodes[right].aabb().intersect(origin, inv_dir, t_min, t_max);
            // Far child first so the near one is popped next.
            match (near_left, near_right) {
                (Some(l), Some(r)) if l <= r => stack.extend([right, left]),
                (Some(_), Some(_)) => stack.extend([left, right]),
                (Some(_), None) => stack.push(left),
                (None, Some(_)) => stack.push(right),
                (None, None) => {}
            }
        }
        hit
    }
}
