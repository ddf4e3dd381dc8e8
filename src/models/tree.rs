//! Decision tree representation used at inference time.
//!
//! Trees are stored as a flat node vector (root at index 0) and evaluated on
//! raw feature values, so serving never needs the training-time bin mappers.

use serde::{Deserialize, Serialize};

/// How a split node routes a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// Go left when `value <= threshold`.
    Threshold(f64),
    /// Go left when the category index is in the bitset.
    Categories(u64),
}

impl SplitRule {
    #[inline]
    pub fn goes_left(&self, value: f64) -> bool {
        match self {
            SplitRule::Threshold(t) => value <= *t,
            SplitRule::Categories(set) => {
                let idx = value as i64;
                (0..64).contains(&idx) && (*set >> idx) & 1 == 1
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        rule: SplitRule,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// A single-leaf tree.
    pub fn constant(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Leaf value reached by `row`.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    rule,
                    left,
                    right,
                } => {
                    idx = if rule.goes_left(row[*feature]) {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    /// Check structural soundness (used when loading artifacts).
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(format!("node {idx}: non-finite leaf value"));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {idx}: feature {feature} out of range"));
                    }
                    // Children always come after their parent, which also rules out cycles.
                    for child in [*left as usize, *right as usize] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx}: invalid child index {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree {
            nodes: vec![
                Node::Split {
                    feature: 1,
                    rule: SplitRule::Threshold(2.5),
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: -1.0 },
                Node::Leaf { value: 1.0 },
            ],
        }
    }

    #[test]
    fn threshold_split_routes_inclusive_left() {
        let tree = stump();
        assert_eq!(tree.predict(&[0.0, 2.5]), -1.0);
        assert_eq!(tree.predict(&[0.0, 2.6]), 1.0);
        let leaves = tree.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count();
        assert_eq!(leaves, 2);
    }

    #[test]
    fn categorical_split_uses_bitset() {
        let rule = SplitRule::Categories(0b1010);
        assert!(rule.goes_left(1.0));
        assert!(rule.goes_left(3.0));
        assert!(!rule.goes_left(0.0));
        assert!(!rule.goes_left(70.0));
    }

    #[test]
    fn validate_rejects_backwards_children() {
        let mut tree = stump();
        assert!(tree.validate(2).is_ok());
        assert!(tree.validate(1).is_err());
        if let Node::Split { left, .. } = &mut tree.nodes[0] {
            *left = 0;
        }
        assert!(tree.validate(2).is_err());
    }
}
