//! Feature quantization for histogram-based split finding.
//!
//! Numeric features are cut into at most `max_bins` buckets; each bucket is
//! described by its inclusive upper bound so that a split "bin <= b" is the
//! same as "value <= cuts[b]" on raw values. Categorical features use their
//! domain index directly as the bin.

use crate::domain::FeatureVector;
use crate::schema::FEATURE_COUNT;

/// Upper bound on categorical bins (splits store categories in a `u64`).
pub const MAX_CATEGORIES: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum BinMapper {
    /// Strictly increasing upper bounds; the last one is `+inf`.
    Numeric { cuts: Vec<f64> },
    Categorical { n_categories: usize },
}

impl BinMapper {
    pub fn n_bins(&self) -> usize {
        match self {
            BinMapper::Numeric { cuts } => cuts.len(),
            BinMapper::Categorical { n_categories } => *n_categories,
        }
    }

    pub fn bin_of(&self, value: f64) -> u8 {
        match self {
            BinMapper::Numeric { cuts } => cuts.partition_point(|&c| c < value) as u8,
            BinMapper::Categorical { n_categories } => {
                (value.max(0.0) as usize).min(n_categories - 1) as u8
            }
        }
    }

    /// Build a numeric mapper from the observed values of one feature.
    pub fn numeric(values: &mut [f64], max_bins: usize) -> Self {
        values.sort_by(f64::total_cmp);
        let mut distinct: Vec<f64> = values.to_vec();
        distinct.dedup();

        let max_bins = max_bins.clamp(2, 256);
        let mut cuts = Vec::new();

        if distinct.len() <= max_bins {
            for pair in distinct.windows(2) {
                cuts.push(midpoint(pair[0], pair[1]));
            }
        } else {
            // Equal-frequency cuts over the full (duplicated) sample.
            let n = values.len();
            for b in 1..max_bins {
                let idx = (b * n) / max_bins;
                let lo = values[idx.saturating_sub(1)];
                let hi = values[idx.min(n - 1)];
                if hi > lo {
                    cuts.push(midpoint(lo, hi));
                }
            }
            cuts.dedup();
        }

        cuts.push(f64::INFINITY);
        BinMapper::Numeric { cuts }
    }

    /// Build a categorical mapper from the observed category indices.
    pub fn categorical(values: &[f64]) -> Self {
        let max_index = values.iter().fold(0.0f64, |acc, &v| acc.max(v)) as usize;
        BinMapper::Categorical {
            n_categories: (max_index + 1).clamp(1, MAX_CATEGORIES),
        }
    }
}

fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    // Guard against the midpoint rounding up to `hi` for adjacent floats.
    if mid < hi { mid } else { lo }
}

/// Column-major binned copy of a training matrix.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    pub mappers: Vec<BinMapper>,
    /// `bins[feature][row]`
    pub bins: Vec<Vec<u8>>,
    pub n_rows: usize,
}

impl BinnedMatrix {
    pub fn build(rows: &[FeatureVector], categorical: &[bool; FEATURE_COUNT], max_bins: usize) -> Self {
        let mut mappers = Vec::with_capacity(FEATURE_COUNT);
        let mut bins = Vec::with_capacity(FEATURE_COUNT);

        for (f, &is_cat) in categorical.iter().enumerate() {
            let mut column: Vec<f64> = rows.iter().map(|r| r[f]).collect();
            let mapper = if is_cat {
                BinMapper::categorical(&column)
            } else {
                BinMapper::numeric(&mut column, max_bins)
            };
            let binned = rows.iter().map(|r| mapper.bin_of(r[f])).collect();
            mappers.push(mapper);
            bins.push(binned);
        }

        Self {
            mappers,
            bins,
            n_rows: rows.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_bins_agree_with_thresholds() {
        let mut values = vec![1.0, 2.0, 2.0, 3.0, 10.0];
        let mapper = BinMapper::numeric(&mut values, 255);
        let BinMapper::Numeric { cuts } = &mapper else {
            panic!("expected numeric mapper");
        };
        assert_eq!(cuts.len(), 4);
        for v in [1.0, 2.0, 2.5, 3.0, 9.0, 10.0, 11.0] {
            let b = mapper.bin_of(v) as usize;
            assert!(v <= cuts[b]);
            if b > 0 {
                assert!(v > cuts[b - 1]);
            }
        }
    }

    #[test]
    fn many_distinct_values_are_capped() {
        let mut values: Vec<f64> = (0..10_000).map(f64::from).collect();
        let mapper = BinMapper::numeric(&mut values, 32);
        assert!(mapper.n_bins() <= 32);
        assert_eq!(mapper.bin_of(-5.0), 0);
        assert_eq!(mapper.bin_of(1e9) as usize, mapper.n_bins() - 1);
    }

    #[test]
    fn categorical_bins_are_indices() {
        let mapper = BinMapper::categorical(&[0.0, 3.0, 1.0]);
        assert_eq!(mapper.n_bins(), 4);
        assert_eq!(mapper.bin_of(3.0), 3);
        // Unseen larger indices clamp into the last bin.
        assert_eq!(mapper.bin_of(9.0), 3);
    }
}
