//! Leaf-wise tree growth over histograms.
//!
//! Each round the booster hands us one gradient/hessian vector per class; we
//! grow one regression tree per vector:
//!
//! - build a `(grad, hess, count)` histogram per (feature, bin) for a leaf
//! - numeric features: scan bins left to right for the best threshold
//! - categorical features: order categories by `grad / (hess + smooth)` and
//!   scan prefixes of that order (many-vs-many split)
//! - always expand the leaf with the largest gain next, until `num_leaves`
//!   or no split improves the objective
//!
//! Gain and leaf weights follow the usual second-order formulas with L1 soft
//! thresholding and L2 shrinkage.

use crate::domain::BoosterParams;
use crate::models::binning::{BinMapper, BinnedMatrix};
use crate::models::tree::{Node, SplitRule, Tree};

/// Smoothing added to the hessian when ordering categories.
const CAT_SMOOTH: f64 = 10.0;

/// Minimum gain for a split to be accepted.
const MIN_SPLIT_GAIN: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default)]
struct BinStat {
    grad: f64,
    hess: f64,
    count: u32,
}

#[derive(Debug, Clone, Copy)]
enum Partition {
    /// Rows with `bin <= max_left_bin` go left.
    UpTo(u8),
    /// Rows whose bin is in the set go left.
    Categories(u64),
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    partition: Partition,
    gain: f64,
}

#[derive(Debug)]
struct Leaf {
    node: usize,
    rows: Vec<u32>,
    depth: usize,
    grad: f64,
    hess: f64,
    best: Option<SplitCandidate>,
}

/// Second-order regularized split scoring.
#[derive(Debug, Clone, Copy)]
pub struct GainParams {
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    pub min_child_samples: u32,
}

impl GainParams {
    pub fn from_params(params: &BoosterParams) -> Self {
        Self {
            reg_alpha: params.reg_alpha,
            reg_lambda: params.reg_lambda,
            min_child_weight: params.min_child_weight,
            min_child_samples: params.min_child_samples.max(1) as u32,
        }
    }

    /// L1 soft-thresholded gradient.
    #[inline]
    fn threshold_l1(&self, grad: f64) -> f64 {
        let abs = grad.abs() - self.reg_alpha;
        if abs <= 0.0 { 0.0 } else { abs.copysign(grad) }
    }

    /// `T(G)^2 / (H + λ)`.
    #[inline]
    pub fn score(&self, grad: f64, hess: f64) -> f64 {
        let g = self.threshold_l1(grad);
        g * g / (hess + self.reg_lambda)
    }

    /// `-T(G) / (H + λ)`.
    #[inline]
    pub fn leaf_weight(&self, grad: f64, hess: f64) -> f64 {
        -self.threshold_l1(grad) / (hess + self.reg_lambda)
    }

    #[inline]
    fn child_ok(&self, hess: f64, count: u32) -> bool {
        hess >= self.min_child_weight && count >= self.min_child_samples
    }
}

/// Grows trees against one binned training matrix.
pub struct TreeGrower<'a> {
    matrix: &'a BinnedMatrix,
    gain: GainParams,
    num_leaves: usize,
    max_depth: usize,
    learning_rate: f64,
}

impl<'a> TreeGrower<'a> {
    pub fn new(matrix: &'a BinnedMatrix, params: &BoosterParams) -> Self {
        Self {
            matrix,
            gain: GainParams::from_params(params),
            num_leaves: params.num_leaves.max(2),
            max_depth: params.max_depth.max(1),
            learning_rate: params.learning_rate,
        }
    }

    /// Grow one tree on `rows` using only the listed `features`.
    ///
    /// Leaf values are already scaled by the learning rate.
    pub fn grow(&self, rows: Vec<u32>, grad: &[f64], hess: &[f64], features: &[usize]) -> Tree {
        if rows.is_empty() {
            return Tree::constant(0.0);
        }

        let (g, h) = sums(&rows, grad, hess);
        let mut root = Leaf {
            node: 0,
            rows,
            depth: 0,
            grad: g,
            hess: h,
            best: None,
        };
        root.best = self.best_split(&root, grad, hess, features);

        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut leaves = vec![root];

        while leaves.len() < self.num_leaves {
            let Some(pick) = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|b| (i, b.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
            else {
                break;
            };

            let mut parent = leaves.swap_remove(pick);
            let Some(split) = parent.best.take() else {
                break;
            };

            let column = &self.matrix.bins[split.feature];
            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = parent
                .rows
                .drain(..)
                .partition(|&r| goes_left(split.partition, column[r as usize]));

            let left_node = nodes.len();
            let right_node = left_node + 1;
            nodes[parent.node] = Node::Split {
                feature: split.feature,
                rule: self.split_rule(split),
                left: left_node as u32,
                right: right_node as u32,
            };
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });

            for (node, child_rows) in [(left_node, left_rows), (right_node, right_rows)] {
                let (g, h) = sums(&child_rows, grad, hess);
                let mut child = Leaf {
                    node,
                    rows: child_rows,
                    depth: parent.depth + 1,
                    grad: g,
                    hess: h,
                    best: None,
                };
                if child.depth < self.max_depth {
                    child.best = self.best_split(&child, grad, hess, features);
                }
                leaves.push(child);
            }
        }

        for leaf in &leaves {
            nodes[leaf.node] = Node::Leaf {
                value: self.learning_rate * self.gain.leaf_weight(leaf.grad, leaf.hess),
            };
        }

        Tree { nodes }
    }

    fn split_rule(&self, split: SplitCandidate) -> SplitRule {
        match (split.partition, &self.matrix.mappers[split.feature]) {
            (Partition::UpTo(bin), BinMapper::Numeric { cuts }) => SplitRule::Threshold(cuts[bin as usize]),
            (Partition::Categories(set), _) => SplitRule::Categories(set),
            // Only reachable if a categorical scan ever emits a prefix split.
            (Partition::UpTo(bin), BinMapper::Categorical { .. }) => SplitRule::Categories(u64::MAX >> (63 - bin.min(63))),
        }
    }

    fn best_split(&self, leaf: &Leaf, grad: &[f64], hess: &[f64], features: &[usize]) -> Option<SplitCandidate> {
        let min_count = self.gain.min_child_samples as usize;
        if leaf.rows.len() < 2 * min_count {
            return None;
        }

        let parent_score = self.gain.score(leaf.grad, leaf.hess);
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let mapper = &self.matrix.mappers[feature];
            if mapper.n_bins() < 2 {
                continue;
            }
            let hist = self.histogram(feature, &leaf.rows, grad, hess);
            let candidate = match mapper {
                BinMapper::Numeric { .. } => self.scan_numeric(feature, &hist, leaf, parent_score),
                BinMapper::Categorical { .. } => self.scan_categorical(feature, &hist, leaf, parent_score),
            };
            if let Some(c) = candidate {
                if best.is_none_or(|b| c.gain > b.gain) {
                    best = Some(c);
                }
            }
        }

        best
    }

    fn histogram(&self, feature: usize, rows: &[u32], grad: &[f64], hess: &[f64]) -> Vec<BinStat> {
        let column = &self.matrix.bins[feature];
        let mut hist = vec![BinStat::default(); self.matrix.mappers[feature].n_bins()];
        for &r in rows {
            let r = r as usize;
            let stat = &mut hist[column[r] as usize];
            stat.grad += grad[r];
            stat.hess += hess[r];
            stat.count += 1;
        }
        hist
    }

    fn scan_numeric(&self, feature: usize, hist: &[BinStat], leaf: &Leaf, parent_score: f64) -> Option<SplitCandidate> {
        let total_count = leaf.rows.len() as u32;
        let mut left = BinStat::default();
        let mut best: Option<SplitCandidate> = None;

        for (bin, stat) in hist.iter().enumerate().take(hist.len() - 1) {
            left.grad += stat.grad;
            left.hess += stat.hess;
            left.count += stat.count;
            if stat.count == 0 || !self.gain.child_ok(left.hess, left.count) {
                continue;
            }

            let right_count = total_count - left.count;
            let right_hess = leaf.hess - left.hess;
            if !self.gain.child_ok(right_hess, right_count) {
                break;
            }
            let right_grad = leaf.grad - left.grad;

            let gain = self.gain.score(left.grad, left.hess) + self.gain.score(right_grad, right_hess) - parent_score;
            if gain > MIN_SPLIT_GAIN && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    partition: Partition::UpTo(bin as u8),
                    gain,
                });
            }
        }

        best
    }

    fn scan_categorical(
        &self,
        feature: usize,
        hist: &[BinStat],
        leaf: &Leaf,
        parent_score: f64,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<usize> = (0..hist.len()).filter(|&b| hist[b].count > 0).collect();
        if order.len() < 2 {
            return None;
        }
        order.sort_by(|&a, &b| {
            let ra = hist[a].grad / (hist[a].hess + CAT_SMOOTH);
            let rb = hist[b].grad / (hist[b].hess + CAT_SMOOTH);
            ra.total_cmp(&rb).then(a.cmp(&b))
        });

        let total_count = leaf.rows.len() as u32;
        let mut left = BinStat::default();
        let mut set = 0u64;
        let mut best: Option<SplitCandidate> = None;

        for &cat in order.iter().take(order.len() - 1) {
            let stat = hist[cat];
            left.grad += stat.grad;
            left.hess += stat.hess;
            left.count += stat.count;
            set |= 1u64 << cat;

            let right_count = total_count - left.count;
            let right_hess = leaf.hess - left.hess;
            if !self.gain.child_ok(left.hess, left.count) || !self.gain.child_ok(right_hess, right_count) {
                continue;
            }
            let right_grad = leaf.grad - left.grad;

            let gain = self.gain.score(left.grad, left.hess) + self.gain.score(right_grad, right_hess) - parent_score;
            if gain > MIN_SPLIT_GAIN && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    partition: Partition::Categories(set),
                    gain,
                });
            }
        }

        best
    }
}

#[inline]
fn goes_left(partition: Partition, bin: u8) -> bool {
    match partition {
        Partition::UpTo(max_left) => bin <= max_left,
        Partition::Categories(set) => (set >> bin) & 1 == 1,
    }
}

fn sums(rows: &[u32], grad: &[f64], hess: &[f64]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(g, h), &r| {
        (g + grad[r as usize], h + hess[r as usize])
    })
}
