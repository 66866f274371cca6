//! Maximum ambient contribution estimation.
//!
//! For each sample, finds the largest scaling of the ambient profile under
//! which no gene's observed count is a significant under-count, then reports
//! per-gene contributions at that scaling. The result is an upper bound:
//! the largest contamination level consistent with the data, not a point
//! estimate.

use crate::data::{AmbientProfile, CountMatrix};
use crate::error::{AmbientError, Result};
use crate::estimate::{scaled_estimates, ContributionEstimate, Mode, NullDistribution};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default p-value threshold for the scaling search.
pub const DEFAULT_P_THRESHOLD: f64 = 0.05;

/// Default iteration cap for the binary search.
const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default relative bracket-width tolerance for the binary search.
const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Configuration for [`maximum_contribution`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaximumConfig {
    /// A scaling is feasible while every gene's upper-tail p-value stays at
    /// or above this threshold.
    pub p_threshold: f64,
    /// Null distribution for the expected ambient count.
    pub null: NullDistribution,
    /// Output mode.
    pub mode: Mode,
    /// Iteration cap for the binary search over the scaling factor.
    pub max_iterations: usize,
    /// Relative bracket-width tolerance terminating the binary search.
    pub tolerance: f64,
}

impl Default for MaximumConfig {
    fn default() -> Self {
        Self {
            p_threshold: DEFAULT_P_THRESHOLD,
            null: NullDistribution::default(),
            mode: Mode::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl MaximumConfig {
    fn validate(&self) -> Result<()> {
        if !(self.p_threshold > 0.0 && self.p_threshold < 1.0) {
            return Err(AmbientError::InvalidParameter(format!(
                "p_threshold must be in (0, 1), got {}",
                self.p_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(AmbientError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(AmbientError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        self.null.validate()
    }
}

/// Estimate the maximum ambient contribution per gene per sample.
///
/// The ambient profile column for each sample is normalized to proportions
/// and rescaled by an unknown factor lambda. For each gene with ambient
/// signal, the largest lambda is found (by monotonic binary search) such
/// that the probability of a count at or below the observed one, under the
/// null with mean `lambda * proportion`, stays at or above the p-value
/// threshold. The per-sample lambda is the minimum over genes; at that
/// scaling no gene is significantly under-counted.
///
/// Samples with no positive ambient signal get a column of missing values
/// rather than failing the whole computation.
///
/// # Arguments
/// * `counts` - Observed counts (genes × samples)
/// * `ambient` - Ambient profile sharing the gene axis
/// * `config` - Threshold, null distribution, mode, and search bounds
///
/// # Returns
/// A [`ContributionEstimate`]; proportion mode values lie in [0, 1].
pub fn maximum_contribution(
    counts: &CountMatrix,
    ambient: &AmbientProfile,
    config: &MaximumConfig,
) -> Result<ContributionEstimate> {
    config.validate()?;
    ambient.check_alignment(counts)?;

    let n_genes = counts.n_genes();
    let n_samples = counts.n_samples();
    if n_genes == 0 || n_samples == 0 {
        return Err(AmbientError::EmptyData(
            "Count matrix has no genes or no samples".to_string(),
        ));
    }

    // Samples are independent; parallelize the outer axis.
    let columns: Vec<(Vec<f64>, f64)> = (0..n_samples)
        .into_par_iter()
        .map(|s| {
            let observed = counts.col_dense(s);
            match ambient.column_proportions(s) {
                Some(proportions) => {
                    let lambda = sample_lambda(&observed, &proportions, config);
                    let estimates = scaled_estimates(&observed, &proportions, lambda, config.mode);
                    (estimates, lambda)
                }
                // No ambient signal at all: lambda is undefined.
                None => (vec![f64::NAN; n_genes], f64::NAN),
            }
        })
        .collect();

    let data = DMatrix::from_fn(n_genes, n_samples, |g, s| columns[s].0[g]);
    let lambda = columns.iter().map(|(_, l)| *l).collect();

    Ok(ContributionEstimate::new(
        data,
        counts.gene_ids().to_vec(),
        counts.sample_ids().to_vec(),
        config.mode,
        lambda,
    ))
}

/// Largest profile scaling for one sample.
///
/// Each gene with positive ambient signal contributes an upper limit on the
/// scaling; the binding constraint is the minimum across genes.
fn sample_lambda(observed: &[u64], proportions: &[f64], config: &MaximumConfig) -> f64 {
    let max_count = observed.iter().copied().max().unwrap_or(0) as f64;
    let min_proportion = proportions
        .iter()
        .copied()
        .filter(|&a| a > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !min_proportion.is_finite() {
        return f64::NAN;
    }
    // Search interval upper end: beyond this no gene's expected count can
    // stay below the largest observed count.
    let hi = (max_count / min_proportion).max(1.0);

    (0..observed.len())
        .into_par_iter()
        .filter(|&g| proportions[g] > 0.0)
        .map(|g| gene_lambda(observed[g], proportions[g], hi, config))
        .reduce(|| f64::INFINITY, f64::min)
}

/// Largest scaling at which one gene's observed count is not a significant
/// under-count relative to the ambient expectation.
///
/// The p-value is monotonically decreasing in the scaling, and a scaling of
/// zero is always feasible, so the bracket [0, hi] is valid from the start.
fn gene_lambda(observed: u64, proportion: f64, hi: f64, config: &MaximumConfig) -> f64 {
    let feasible = |lambda: f64| {
        config
            .null
            .upper_tail_pvalue(lambda * proportion, observed)
            >= config.p_threshold
    };

    if feasible(hi) {
        return hi;
    }

    let mut lo = 0.0;
    let mut hi = hi;
    for _ in 0..config.max_iterations {
        if hi - lo <= config.tolerance * hi.max(1.0) {
            break;
        }
        let mid = 0.5 * (lo + hi);
        if feasible(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
