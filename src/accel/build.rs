//! SAH-binned BVH builder.
//!
//! Works on primitive bounds only, so the same builder serves the triangle
//! level of a mesh and the instance level of an acceleration structure.

use super::bvh::{Aabb, Bvh, BvhNode};
use super::AccelBuildHint;

/// Number of SAH bins for split evaluation.
const NUM_BINS: usize = 12;

/// Cost ratio: traversal vs intersection.
const TRAVERSAL_COST: f32 = 1.0;
const INTERSECT_COST: f32 = 1.0;

/// Primitives per leaf below which splitting is not attempted.
fn max_leaf_size(hint: AccelBuildHint) -> usize {
    match hint {
        AccelBuildHint::FastTrace => 4,
        AccelBuildHint::FastBuild => 8,
    }
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

impl Bin {
    const EMPTY: Self = Self {
        bounds: Aabb::EMPTY,
        count: 0,
    };
}

/// Pending node: the node to fill and its primitive range.
struct Task {
    node: usize,
    start: usize,
    end: usize,
}

/// Build a BVH over `aabbs`; primitive `i` is the box `aabbs[i]`.
///
/// Empty input gives an empty node list.
#[tracing::instrument(level = "trace", skip(aabbs), fields(prims = aabbs.len()))]
pub fn build_bvh(aabbs: &[Aabb], hint: AccelBuildHint) -> Bvh {
    let n = aabbs.len();
    let leaf_size = max_leaf_size(hint);
    if n == 0 {
        return Bvh::default();
    }

    let centroids: Vec<_> = aabbs.iter().map(Aabb::centroid).collect();
    let mut indices: Vec<u32> = (0..n as u32).collect();
    let mut nodes = Vec::with_capacity(2 * n);
    nodes.push(BvhNode::new(&Aabb::EMPTY, 0, 0));

    let mut stack = vec![Task {
        node: 0,
        start: 0,
        end: n,
    }];

    while let Some(Task { node, start, end }) = stack.pop() {
        let count = end - start;
        let mut bounds = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for &i in &indices[start..end] {
            bounds.grow(&aabbs[i as usize]);
            centroid_bounds.grow_point(centroids[i as usize]);
        }

        let leaf = BvhNode::new(&bounds, start as u32, count as u32);
        if count <= leaf_size {
            nodes[node] = leaf;
            continue;
        }

        let Some((axis, split, cost)) = find_best_split(&indices[start..end], aabbs, &centroid_bounds) else {
            // all centroids coincide
            nodes[node] = leaf;
            continue;
        };
        if cost >= count as f32 * INTERSECT_COST * bounds.area() {
            nodes[node] = leaf;
            continue;
        }

        let mid = start
            + partition(&mut indices[start..end], |&i| {
                centroids[i as usize][axis] < split
            });
        let mid = if mid == start || mid == end {
            (start + end) / 2
        } else {
            mid
        };

        let left = nodes.len();
        nodes.push(BvhNode::new(&Aabb::EMPTY, 0, 0));
        nodes.push(BvhNode::new(&Aabb::EMPTY, 0, 0));
        nodes[node] = BvhNode::new(&bounds, left as u32, 0);

        stack.push(Task {
            node: left + 1,
            start: mid,
            end,
        });
        stack.push(Task {
            node: left,
            start,
            end: mid,
        });
    }

    Bvh {
        nodes,
        prim_indices: indices,
    }
}

/// Binned SAH search over all three axes: `(axis, split position, cost)`.
fn find_best_split(indices: &[u32], aabbs: &[Aabb], centroid_bounds: &Aabb) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32, f32)> = None;

    for axis in 0..3 {
        let lo = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - lo;
        if extent < 1e-8 {
            continue;
        }

        let mut bins = [Bin::EMPTY; NUM_BINS];
        let scale = NUM_BINS as f32 / extent;
        for &i in indices {
            let b = &aabbs[i as usize];
            let bin = (((b.centroid()[axis] - lo) * scale) as usize).min(NUM_BINS - 1);
            bins[bin].bounds.grow(b);
            bins[bin].count += 1;
        }

        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut sweep = Aabb::EMPTY;
        let mut sweep_count = 0;
        for i in 0..NUM_BINS - 1 {
            sweep.grow(&bins[i].bounds);
            sweep_count += bins[i].count;
            left_area[i] = sweep.area();
            left_count[i] = sweep_count;
        }

        sweep = Aabb::EMPTY;
        sweep_count = 0;
        for i in (1..NUM_BINS).rev() {
            sweep.grow(&bins[i].bounds);
            sweep_count += bins[i].count;
            let cost = TRAVERSAL_COST
                + INTERSECT_COST
                    * (left_count[i - 1] as f32 * left_area[i - 1] + sweep_count as f32 * sweep.area());
            if best.map_or(true, |(_, _, c)| cost < c) {
                best = Some((axis, lo + i as f32 / NUM_BINS as f32 * extent, cost));
            }
        }
    }

    best
}

/// In-place partition; returns the number of elements satisfying `pred`.
fn partition<T>(slice: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn unit_box(x: f32) -> Aabb {
        Aabb {
            min: Vec3::new(x - 0.5, -0.5, 0.0),
            max: Vec3::new(x + 0.5, 0.5, 0.0),
        }
    }

    #[test]
    fn test_empty_input() {
        let bvh = build_bvh(&[], AccelBuildHint::FastTrace);
        assert!(bvh.nodes.is_empty());
        assert!(bvh.bounds().is_empty());
    }

    #[test]
    fn test_single_leaf() {
        let bvh = build_bvh(&[unit_box(0.0), unit_box(1.0), unit_box(2.0)], AccelBuildHint::FastTrace);
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.nodes[0].count, 3);
    }

    #[test]
    fn test_many_primitives_split() {
        let boxes: Vec<_> = (0..100).map(|i| unit_box(i as f32 * 2.0)).collect();
        let bvh = build_bvh(&boxes, AccelBuildHint::FastTrace);
        assert!(bvh.nodes.len() > 1);

        let mut sorted = bvh.prim_indices.clone();
        sorted.sort();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());

        let root = bvh.bounds();
        assert!(root.min.x < 0.0);
        assert!(root.max.x > 198.0);

        // every leaf range is in bounds
        for node in bvh.nodes.iter().filter(|n| n.is_leaf()) {
            assert!((node.left_or_first + node.count) as usize <= 100);
        }
    }

    #[test]
    fn test_fast_build_has_larger_leaves() {
        let boxes: Vec<_> = (0..6).map(|i| unit_box(i as f32 * 2.0)).collect();
        assert!(build_bvh(&boxes, AccelBuildHint::FastTrace).nodes.len() > 1);
        assert_eq!(build_bvh(&boxes, AccelBuildHint::FastBuild).nodes.len(), 1);
    }

    #[test]
    fn test_coincident_centroids_stay_leaf() {
        let boxes = vec![unit_box(1.0); 10];
        let bvh = build_bvh(&boxes, AccelBuildHint::FastTrace);
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.nodes[0].count, 10);
    }
}
