//! A balanced 3D k-d tree over a `PointCloud`, supporting masked-axis nearest
//! neighbor queries with per-axis distance caps.
//!
//! The tree borrows points from the store it is built over rather than
//! copying them: a single owner (`PointCloud`) plus an index permutation,
//! not a shared-ownership graph.

use crate::point::{Point, PointCloud};
use nalgebra::Point3;

/// Bitmask of active axes for a query. `x()`/`y()`/`z()`/`xyz()` etc. are the
/// combinations a caller needs when capping distance independently per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axes(u8);

const AXIS_X: u8 = 0b001;
const AXIS_Y: u8 = 0b010;
const AXIS_Z: u8 = 0b100;

impl Axes {
    pub fn x() -> Self {
        Axes(AXIS_X)
    }
    pub fn y() -> Self {
        Axes(AXIS_Y)
    }
    pub fn z() -> Self {
        Axes(AXIS_Z)
    }
    pub fn xy() -> Self {
        Axes(AXIS_X | AXIS_Y)
    }
    pub fn xz() -> Self {
        Axes(AXIS_X | AXIS_Z)
    }
    pub fn yz() -> Self {
        Axes(AXIS_Y | AXIS_Z)
    }
    pub fn xyz() -> Self {
        Axes(AXIS_X | AXIS_Y | AXIS_Z)
    }

    fn contains(self, axis: usize) -> bool {
        match axis {
            0 => self.0 & AXIS_X != 0,
            1 => self.0 & AXIS_Y != 0,
            _ => self.0 & AXIS_Z != 0,
        }
    }
}

impl Default for Axes {
    fn default() -> Self {
        Axes::xyz()
    }
}

/// Per-axis anisotropic caps, applied as a pre-filter in addition to (or
/// instead of) the isotropic `max_distance`. All caps are inclusive upper
/// bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestOptions {
    pub axes: Axes,
    pub max_distance: f64,
    pub max_distance_x: Option<f64>,
    pub max_distance_y: Option<f64>,
    pub max_distance_z: Option<f64>,
}

impl NearestOptions {
    pub fn isotropic(max_distance: f64) -> Self {
        NearestOptions {
            axes: Axes::xyz(),
            max_distance,
            ..Default::default()
        }
    }

    pub fn anisotropic(rx: f64, ry: f64, rz: f64) -> Self {
        NearestOptions {
            axes: Axes::xyz(),
            max_distance: f64::INFINITY,
            max_distance_x: Some(rx),
            max_distance_y: Some(ry),
            max_distance_z: Some(rz),
        }
    }

    fn cap_for(&self, axis: usize) -> Option<f64> {
        match axis {
            0 => self.max_distance_x,
            1 => self.max_distance_y,
            _ => self.max_distance_z,
        }
    }
}

/// The outcome of a `nearest` query.
#[derive(Debug, Clone, Copy)]
pub struct NearestHit<'a> {
    pub point: &'a Point,
    pub distance: f64,
}

struct Node {
    point_idx: usize,
    axis: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// A read-only, balanced k-d tree over a `PointCloud`'s points.
pub struct KdTree<'a> {
    cloud: &'a PointCloud,
    root: Option<Box<Node>>,
}

fn coord(p: &Point3<f64>, axis: usize) -> f64 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

/// Partitions the whole slice in place so every entry strictly less than
/// `value` on `axis` comes first, followed by everything `>= value`.
/// Returns the count of strictly-less entries (the split point). Plain
/// Lomuto partitioning; order within each side is unspecified.
fn partition_less_than(indices: &mut [usize], points: &[Point], axis: usize, value: f64) -> usize {
    let mut write = 0;
    for read in 0..indices.len() {
        if coord(&points[indices[read]].position, axis) < value {
            indices.swap(write, read);
            write += 1;
        }
    }
    write
}

/// Picks the median-by-value split point for `indices` on `axis`, ties
/// going to the right partition (§3's documented k-d tree invariant:
/// `left < node.coord_a <= right`). `select_nth_unstable_by` alone only
/// guarantees `left <= median <= right`, so after finding the median value
/// the whole slice is re-partitioned by strict comparison against it and
/// one instance of that value is swapped into the split position.
fn build(indices: &mut [usize], points: &[Point], depth: usize) -> Option<Box<Node>> {
    if indices.is_empty() {
        return None;
    }
    let axis = depth % 3;
    let approx_mid = indices.len() / 2;
    indices.select_nth_unstable_by(approx_mid, |&a, &b| {
        coord(&points[a].position, axis)
            .partial_cmp(&coord(&points[b].position, axis))
            .unwrap()
    });
    let median_value = coord(&points[indices[approx_mid]].position, axis);

    let split = partition_less_than(indices, points, axis, median_value);
    if coord(&points[indices[split]].position, axis) != median_value {
        let tie = (split + 1..indices.len())
            .find(|&j| coord(&points[indices[j]].position, axis) == median_value)
            .expect("median_value must occur at least once at or after split");
        indices.swap(split, tie);
    }

    let point_idx = indices[split];
    let (left, right) = indices.split_at_mut(split);
    let right = &mut right[1..];
    Some(Box::new(Node {
        point_idx,
        axis,
        left: build(left, points, depth + 1),
        right: build(right, points, depth + 1),
    }))
}

impl<'a> KdTree<'a> {
    /// Builds a balanced tree by recursive median-of-all selection, cycling
    /// the split axis `x -> y -> z` with depth. `O(N log N)`
    /// expected.
    pub fn build(cloud: &'a PointCloud) -> Self {
        let mut indices: Vec<usize> = (0..cloud.points().len()).collect();
        let root = build(&mut indices, cloud.points(), 0);
        KdTree { cloud, root }
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    /// Finds the nearest point to `target` under `options`, or `None` if no
    /// point satisfies the caps. Ties may return either of the tied points.
    pub fn nearest(&self, target: &Point3<f64>, options: &NearestOptions) -> Option<NearestHit<'a>> {
        let mut best: Option<(usize, f64)> = None;
        if let Some(root) = &self.root {
            search(root, self.cloud.points(), target, options, &mut best);
        }
        best.map(|(idx, dist_sq)| NearestHit {
            point: &self.cloud.points()[idx],
            distance: dist_sq.sqrt(),
        })
    }
}

fn squared_distance(a: &Point3<f64>, b: &Point3<f64>, options: &NearestOptions) -> Option<f64> {
    let mut total = 0.0;
    for axis in 0..3 {
        if !options.axes.contains(axis) {
            continue;
        }
        let delta = coord(a, axis) - coord(b, axis);
        if let Some(cap) = options.cap_for(axis) {
            if delta.abs() > cap {
                return None;
            }
        }
        total += delta * delta;
    }
    Some(total)
}

fn search(
    node: &Node,
    points: &[Point],
    target: &Point3<f64>,
    options: &NearestOptions,
    best: &mut Option<(usize, f64)>,
) {
    let candidate = &points[node.point_idx].position;
    if let Some(dist_sq) = squared_distance(candidate, target, options) {
        let max_sq = options.max_distance * options.max_distance;
        if dist_sq <= max_sq && best.map_or(true, |(_, b)| dist_sq < b) {
            *best = Some((node.point_idx, dist_sq));
        }
    }

    let axis = node.axis;
    let split = coord(candidate, axis);
    let target_coord = coord(target, axis);
    let go_left_first = target_coord < split;
    let (near, far) = if go_left_first {
        (&node.left, &node.right)
    } else {
        (&node.right, &node.left)
    };

    if let Some(near) = near {
        search(near, points, target, options, best);
    }

    let axis_active = options.axes.contains(axis);
    let split_dist_sq = {
        let d = target_coord - split;
        d * d
    };
    let pruned = axis_active && best.map_or(false, |(_, b)| split_dist_sq >= b);

    if let Some(far) = far {
        if !pruned {
            search(far, points, target, options, best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn cloud_of(points: Vec<Point3<f64>>) -> PointCloud {
        PointCloud::new(points.into_iter().map(|p| Point::new(p, None)).collect())
    }

    #[test]
    fn two_point_tie_break_returns_midpoint_distance() {
        let cloud = cloud_of(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let tree = KdTree::build(&cloud);
        let hit = tree
            .nearest(&Point3::new(0.5, 0.0, 0.0), &NearestOptions::isotropic(1.0))
            .unwrap();
        approx::assert_abs_diff_eq!(hit.distance, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn anisotropic_z_cap_is_strict_inclusive() {
        let points: Vec<Point3<f64>> = (0..=10)
            .map(|k| Point3::new(0.0, 0.0, k as f64 * 0.1))
            .collect();
        let cloud = cloud_of(points);
        let tree = KdTree::build(&cloud);
        let target = Point3::new(0.0, 0.0, 0.5);

        let hit = tree
            .nearest(&target, &NearestOptions::anisotropic(0.0, 0.0, 0.05))
            .unwrap();
        assert!((hit.point.position.z - 0.5).abs() < 1e-9);

        let none = tree.nearest(&target, &NearestOptions::anisotropic(0.0, 0.0, 0.0));
        assert!(none.is_none());
    }

    #[test]
    fn matches_linear_scan_over_random_points() {
        // Spec invariant 8: 10,000 queries over 100,000 random points.
        let mut rng = StdRng::seed_from_u64(42);
        let points: Vec<Point3<f64>> = (0..100_000)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-1.0, 1.0),
                    rng.gen_range(-1.0, 1.0),
                    rng.gen_range(-1.0, 1.0),
                )
            })
            .collect();
        let cloud = cloud_of(points);
        let tree = KdTree::build(&cloud);
        let options = NearestOptions::isotropic(f64::INFINITY);

        for _ in 0..10_000 {
            let target = Point3::new(
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
            );
            let linear_best = cloud
                .points()
                .iter()
                .map(|p| (p.position - target).norm_squared())
                .fold(f64::INFINITY, f64::min);
            let tree_hit = tree.nearest(&target, &options).unwrap();
            assert!((tree_hit.distance * tree_hit.distance - linear_best).abs() < 1e-9);
        }
    }

    #[test]
    fn duplicate_split_coordinates_keep_left_strictly_less() {
        // Every point in `node.left` must have `coord_a < node.coord_a` and
        // every point in `node.right` must have `coord_a >= node.coord_a`,
        // for every node, recursively.
        fn check(node: &Node, points: &[Point]) {
            let split = coord(&points[node.point_idx].position, node.axis);
            fn assert_all(n: &Option<Box<Node>>, points: &[Point], axis: usize, split: f64, left: bool) {
                if let Some(n) = n {
                    let v = coord(&points[n.point_idx].position, axis);
                    if left {
                        assert!(v < split, "left-subtree coord {} not < split {}", v, split);
                    } else {
                        assert!(v >= split, "right-subtree coord {} not >= split {}", v, split);
                    }
                    assert_all(&n.left, points, axis, split, left);
                    assert_all(&n.right, points, axis, split, left);
                }
            }
            assert_all(&node.left, points, node.axis, split, true);
            assert_all(&node.right, points, node.axis, split, false);
            if let Some(l) = &node.left {
                check(l, points);
            }
            if let Some(r) = &node.right {
                check(r, points);
            }
        }

        // Many points share the same x-coordinate at the root's split, which is
        // exactly the case `select_nth_unstable_by` alone mishandles.
        let points: Vec<Point3<f64>> = (0..40)
            .map(|i| Point3::new(0.0, i as f64, (i % 3) as f64))
            .collect();
        let cloud = cloud_of(points);
        let tree = KdTree::build(&cloud);
        if let Some(root) = &tree.root {
            check(root, cloud.points());
        }
    }

    #[test]
    fn colored_point_round_trips_through_tree() {
        let cloud = cloud_of(vec![Point3::new(0.0, 0.0, 0.0)]);
        let mut points = cloud.points().to_vec();
        points[0].color = Some(Color::opaque(200, 100, 50));
        let cloud = PointCloud::new(points);
        let tree = KdTree::build(&cloud);
        let hit = tree
            .nearest(&Point3::new(0.0, 0.0, 0.0), &NearestOptions::isotropic(1.0))
            .unwrap();
        assert_eq!(hit.point.color, Some(Color::opaque(200, 100, 50)));
    }
}
