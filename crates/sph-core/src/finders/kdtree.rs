use tracing::{debug, warn};

use crate::config::FinderConfig;
use crate::error::FinderError;
use crate::finders::{make_rank, FinderFlags, NeighborFinder, NeighborRecord};
use crate::geometry::{BoundingBox, Vector};
use crate::math::{sqr, Float};
use crate::scheduler::Scheduler;

/// Number of consecutive sliding-midpoint splits before falling back to a median split.
const MAX_SLIDING: u32 = 5;

/// Node of the k-d tree arena.
#[derive(Clone, Debug, PartialEq)]
pub enum KdNode {
    Inner {
        axis: usize,
        split: Float,
        bbox: BoundingBox,
        left: usize,
        right: usize,
    },
    /// Particles `idxs[from..to]` of the tree.
    Leaf {
        from: usize,
        to: usize,
        bbox: BoundingBox,
    },
}

impl KdNode {
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            KdNode::Inner { bbox, .. } | KdNode::Leaf { bbox, .. } => bbox,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, KdNode::Leaf { .. })
    }

    /// Indices of the left and right child of an inner node.
    pub fn children(&self) -> Option<(usize, usize)> {
        match self {
            KdNode::Inner { left, right, .. } => Some((*left, *right)),
            KdNode::Leaf { .. } => None,
        }
    }

    fn shift_children(&mut self, offset: usize) {
        if let KdNode::Inner { left, right, .. } = self {
            *left += offset;
            *right += offset;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterateDirection {
    /// Children are visited before their parent.
    BottomUp,
    /// Parents are visited before their children.
    TopDown,
}

struct BuildContext<'a> {
    points: &'a [Vector],
    config: FinderConfig,
    scheduler: &'a dyn Scheduler,
}

/// K-d tree over particle positions.
///
/// Nodes are stored in pre-order, so every child has a larger index than its parent and the
/// root is node 0. Construction splits the longest axis of the node box at its midpoint, sliding
/// the split to the nearest point when one side would be empty; after several slides in a row it
/// falls back to a median split. Subtrees are built as parallel tasks up to
/// [`FinderConfig::max_parallel_depth`], the resulting structure does not depend on the
/// scheduler.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    config: FinderConfig,
    points: Vec<Vector>,
    rank: Vec<usize>,
    idxs: Vec<usize>,
    nodes: Vec<KdNode>,
}

impl KdTree {
    pub fn new(config: FinderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Particle indices stored in a leaf; empty for inner nodes.
    pub fn leaf_indices(&self, node: usize) -> &[usize] {
        match self.nodes.get(node) {
            Some(KdNode::Leaf { from, to, .. }) => &self.idxs[*from..*to],
            _ => &[],
        }
    }

    /// Visits all nodes; `f(index, node, left, right)` gets the child indices of inner nodes.
    pub fn iterate<F>(&self, direction: IterateDirection, mut f: F)
    where
        F: FnMut(usize, &KdNode, Option<usize>, Option<usize>),
    {
        let mut visit = |i: usize| {
            let node = &self.nodes[i];
            let (left, right) = node.children().unzip();
            f(i, node, left, right);
        };
        match direction {
            IterateDirection::BottomUp => (0..self.nodes.len()).rev().for_each(&mut visit),
            IterateDirection::TopDown => (0..self.nodes.len()).for_each(&mut visit),
        }
    }

    fn build_subtree(
        ctx: &BuildContext,
        idxs: &mut [usize],
        offset: usize,
        bbox: BoundingBox,
        sliding: u32,
        depth: usize,
    ) -> Vec<KdNode> {
        let count = idxs.len();
        if count <= ctx.config.leaf_size.max(1) {
            return vec![KdNode::Leaf {
                from: offset,
                to: offset + count,
                bbox,
            }];
        }

        let size = bbox.size();
        let scale = bbox.lower().abs().max(&bbox.upper().abs()).max_element();
        let axis = size.argmax();
        let (split, n1, left_box, right_box, slid) =
            if size.max_element() <= 4.0 * Float::EPSILON * scale {
                // all points coincide, split by index and keep the box
                warn!(count, "coincident points in k-d tree node");
                (bbox.center()[axis], count / 2, bbox, bbox, false)
            } else if sliding < MAX_SLIDING {
                let (split, n1, slid) = Self::sliding_midpoint(ctx.points, idxs, axis, &bbox);
                let (l, r) = bbox.split(axis, split);
                (split, n1, l, r, slid)
            } else {
                let mid = count / 2;
                idxs.select_nth_unstable_by(mid, |&a, &b| {
                    ctx.points[a][axis].total_cmp(&ctx.points[b][axis])
                });
                let split = ctx.points[idxs[mid]][axis];
                let (l, r) = bbox.split(axis, split);
                (split, mid, l, r, false)
            };
        let sliding = if slid { sliding + 1 } else { 0 };

        let (left_idxs, right_idxs) = idxs.split_at_mut(n1);
        let mut left = Vec::new();
        let mut right = Vec::new();
        let right_offset = offset + n1;
        if depth < ctx.config.max_parallel_depth && count > 4 * ctx.config.leaf_size {
            ctx.scheduler.parallel_invoke(
                &mut || left = Self::build_subtree(ctx, left_idxs, offset, left_box, sliding, depth + 1),
                &mut || {
                    right =
                        Self::build_subtree(ctx, right_idxs, right_offset, right_box, sliding, depth + 1)
                },
            );
        } else {
            left = Self::build_subtree(ctx, left_idxs, offset, left_box, sliding, depth + 1);
            right = Self::build_subtree(ctx, right_idxs, right_offset, right_box, sliding, depth + 1);
        }

        let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
        nodes.push(KdNode::Inner {
            axis,
            split,
            bbox,
            left: 1,
            right: 1 + left.len(),
        });
        let right_shift = 1 + left.len();
        nodes.extend(left.into_iter().map(|mut n| {
            n.shift_children(1);
            n
        }));
        nodes.extend(right.into_iter().map(|mut n| {
            n.shift_children(right_shift);
            n
        }));
        nodes
    }

    /// Partitions `idxs` around the box midpoint; returns the split position, the size of the
    /// left part and whether the split had to slide.
    fn sliding_midpoint(
        points: &[Vector],
        idxs: &mut [usize],
        axis: usize,
        bbox: &BoundingBox,
    ) -> (Float, usize, bool) {
        let split = bbox.center()[axis];
        let mut n1 = 0;
        for k in 0..idxs.len() {
            if points[idxs[k]][axis] < split {
                idxs.swap(k, n1);
                n1 += 1;
            }
        }
        if n1 == 0 {
            // everything on the right, move the minimum to the left
            let k = Self::extreme(points, idxs, axis, |a, b| a < b);
            idxs.swap(0, k);
            (points[idxs[0]][axis], 1, true)
        } else if n1 == idxs.len() {
            // everything on the left, move the maximum to the right
            let k = Self::extreme(points, idxs, axis, |a, b| a > b);
            let last = idxs.len() - 1;
            idxs.swap(last, k);
            (points[idxs[last]][axis], last, true)
        } else {
            (split, n1, false)
        }
    }

    fn extreme(points: &[Vector], idxs: &[usize], axis: usize, better: fn(Float, Float) -> bool) -> usize {
        let mut best = 0;
        for k in 1..idxs.len() {
            if better(points[idxs[k]][axis], points[idxs[best]][axis]) {
                best = k;
            }
        }
        best
    }

    /// Verifies the structure of the tree.
    pub fn sanity_check(&self) -> Result<(), FinderError> {
        if self.points.is_empty() {
            return if self.nodes.is_empty() {
                Ok(())
            } else {
                Err(FinderError::NodeCount {
                    expected: 0,
                    actual: self.nodes.len(),
                })
            };
        }
        let mut seen = vec![false; self.points.len()];
        let mut visited = 0;
        let mut stack = vec![0_usize];
        while let Some(i) = stack.pop() {
            let node = self.nodes.get(i).ok_or(FinderError::InvalidChild(i))?;
            visited += 1;
            match node {
                KdNode::Leaf { from, to, bbox } => {
                    if from >= to {
                        return Err(FinderError::EmptyLeaf(i));
                    }
                    for &index in self.idxs.get(*from..*to).ok_or(FinderError::InvalidChild(i))? {
                        if std::mem::replace(&mut seen[index], true) {
                            return Err(FinderError::RepeatedIndex(index));
                        }
                        if !bbox.contains(&self.points[index]) {
                            return Err(FinderError::PointOutsideBox { node: i, index });
                        }
                    }
                }
                KdNode::Inner {
                    left, right, bbox, ..
                } => {
                    for &child in [left, right] {
                        let valid = child > i
                            && self
                                .nodes
                                .get(child)
                                .is_some_and(|c| bbox.contains_box(c.bbox()));
                        if !valid {
                            return Err(FinderError::InvalidChild(i));
                        }
                        stack.push(child);
                    }
                }
            }
        }
        if visited != self.nodes.len() {
            return Err(FinderError::NodeCount {
                expected: self.nodes.len(),
                actual: visited,
            });
        }
        if let Some(index) = seen.iter().position(|s| !s) {
            return Err(FinderError::PointOutsideBox { node: 0, index });
        }
        Ok(())
    }

    fn equal_subtrees(&self, a: usize, other: &KdTree, b: usize) -> bool {
        match (&self.nodes[a], &other.nodes[b]) {
            (
                KdNode::Inner {
                    axis: a1,
                    split: s1,
                    left: l1,
                    right: r1,
                    ..
                },
                KdNode::Inner {
                    axis: a2,
                    split: s2,
                    left: l2,
                    right: r2,
                    ..
                },
            ) => {
                a1 == a2
                    && s1 == s2
                    && ((self.equal_subtrees(*l1, other, *l2) && self.equal_subtrees(*r1, other, *r2))
                        || (self.equal_subtrees(*l1, other, *r2)
                            && self.equal_subtrees(*r1, other, *l2)))
            }
            (KdNode::Leaf { from: f1, to: t1, .. }, KdNode::Leaf { from: f2, to: t2, .. }) => {
                let mut x = self.idxs[*f1..*t1].to_vec();
                let mut y = other.idxs[*f2..*t2].to_vec();
                x.sort_unstable();
                y.sort_unstable();
                f1 == f2 && t1 == t2 && x == y
            }
            _ => false,
        }
    }
}

impl PartialEq for KdTree {
    /// Structural equality: node types, split axes and positions, leaf ranges and leaf contents
    /// match, with the order of children and of particles within a leaf ignored.
    fn eq(&self, other: &Self) -> bool {
        match (self.nodes.is_empty(), other.nodes.is_empty()) {
            (true, true) => true,
            (false, false) => {
                self.nodes.len() == other.nodes.len() && self.equal_subtrees(0, other, 0)
            }
            _ => false,
        }
    }
}

impl NeighborFinder for KdTree {
    fn build(&mut self, scheduler: &dyn Scheduler, points: &[Vector], flags: FinderFlags) {
        self.points = points.to_vec();
        self.rank = make_rank(points, flags);
        self.idxs = (0..points.len()).collect();
        self.nodes.clear();
        if points.is_empty() {
            return;
        }
        let ctx = BuildContext {
            points,
            config: self.config,
            scheduler,
        };
        let bbox = BoundingBox::from_points(points);
        self.nodes = Self::build_subtree(&ctx, &mut self.idxs, 0, bbox, 0, 0);
        debug!(
            particles = points.len(),
            nodes = self.nodes.len(),
            leaves = self.leaf_count(),
            leaf_size = self.config.leaf_size,
            "built k-d tree"
        );
    }

    fn points(&self) -> &[Vector] {
        &self.points
    }

    fn rank(&self) -> &[usize] {
        &self.rank
    }

    fn find_filtered(
        &self,
        center: &Vector,
        radius: Float,
        accept: &dyn Fn(usize) -> bool,
        out: &mut Vec<NeighborRecord>,
    ) -> usize {
        out.clear();
        if self.nodes.is_empty() {
            return 0;
        }
        let radius_sqr = sqr(radius);
        let mut stack = Vec::with_capacity(64);
        stack.push(0_usize);
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if node.bbox().distance_sqr(center) >= radius_sqr {
                continue;
            }
            match node {
                KdNode::Leaf { from, to, .. } => {
                    for &j in &self.idxs[*from..*to] {
                        let distance_sqr = (self.points[j] - *center).length_squared();
                        if distance_sqr < radius_sqr && accept(j) {
                            out.push(NeighborRecord {
                                index: j,
                                distance_sqr,
                            });
                        }
                    }
                }
                KdNode::Inner { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        out.len()
    }
}
