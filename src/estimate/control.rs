//! Control-anchored ambient contribution estimation.
//!
//! Instead of searching for the largest plausible scaling, the scaling is
//! solved in closed form from a set of control genes assumed not to be
//! expressed in the population under study (hemoglobin genes in
//! non-erythroid cells, for example): all of their observed signal is taken
//! to be ambient, and the implied scaling is applied to every gene.

use crate::data::{AmbientProfile, CountMatrix};
use crate::error::{AmbientError, Result};
use crate::estimate::{scaled_estimates, ContributionEstimate, Mode};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for [`control_anchored_contribution`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Output mode.
    pub mode: Mode,
}

/// Estimate ambient contributions anchored on named control genes.
///
/// Resolves gene names against the count matrix and delegates to
/// [`control_anchored_contribution_indices`]. Unknown names are an error:
/// a silently dropped control would bias the scaling.
pub fn control_anchored_contribution(
    counts: &CountMatrix,
    ambient: &AmbientProfile,
    control_genes: &[String],
    config: &ControlConfig,
) -> Result<ContributionEstimate> {
    let indices: Vec<usize> = control_genes
        .iter()
        .map(|name| {
            counts.gene_index(name).ok_or_else(|| {
                AmbientError::InvalidControlSet(format!(
                    "control gene '{}' not found in the count matrix",
                    name
                ))
            })
        })
        .collect::<Result<_>>()?;
    control_anchored_contribution_indices(counts, ambient, &indices, config)
}

/// Estimate ambient contributions anchored on control genes given by index.
///
/// Per sample, the scaling factor is the ratio of the total observed count
/// over the controls to the total ambient proportion over the controls, so
/// that the ambient prediction exactly absorbs the controls' observed
/// signal. Samples whose controls carry no ambient signal have an undefined
/// scaling and degrade to a column of missing values; other samples are
/// unaffected.
pub fn control_anchored_contribution_indices(
    counts: &CountMatrix,
    ambient: &AmbientProfile,
    control_genes: &[usize],
    config: &ControlConfig,
) -> Result<ContributionEstimate> {
    ambient.check_alignment(counts)?;

    if control_genes.is_empty() {
        return Err(AmbientError::InvalidControlSet(
            "control gene set is empty".to_string(),
        ));
    }
    let n_genes = counts.n_genes();
    for &g in control_genes {
        if g >= n_genes {
            return Err(AmbientError::InvalidControlSet(format!(
                "control gene index {} out of bounds ({} genes)",
                g, n_genes
            )));
        }
    }

    let n_samples = counts.n_samples();
    let columns: Vec<(Vec<f64>, f64)> = (0..n_samples)
        .into_par_iter()
        .map(|s| {
            let observed = counts.col_dense(s);
            match ambient.column_proportions(s) {
                Some(proportions) => {
                    let ambient_mass: f64 = control_genes.iter().map(|&g| proportions[g]).sum();
                    let lambda = if ambient_mass > 0.0 {
                        let observed_total: u64 =
                            control_genes.iter().map(|&g| observed[g]).sum();
                        observed_total as f64 / ambient_mass
                    } else {
                        f64::NAN
                    };
                    let estimates = scaled_estimates(&observed, &proportions, lambda, config.mode);
                    (estimates, lambda)
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    /// The 2-gene scenario: HBB is a known contaminant marker.
    fn hbb_fixture() -> (CountMatrix, AmbientProfile) {
        let mut tri_mat = TriMat::new((2, 2));
        tri_mat.add_triplet(0, 0, 100);
        tri_mat.add_triplet(0, 1, 50);
        tri_mat.add_triplet(1, 0, 5);
        tri_mat.add_triplet(1, 1, 200);
        let counts = CountMatrix::new(
            tri_mat.to_csr(),
            vec!["HBB".to_string(), "GeneX".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        let ambient = AmbientProfile::from_matrix(
            DMatrix::from_row_slice(2, 2, &[10.0, 10.0, 1.0, 1.0]),
            counts.gene_ids().to_vec(),
        )
        .unwrap();
        (counts, ambient)
    }

    #[test]
    fn test_hbb_anchoring_scenario() {
        let (counts, ambient) = hbb_fixture();
        let est = control_anchored_contribution(
            &counts,
            &ambient,
            &["HBB".to_string()],
            &ControlConfig::default(),
        )
        .unwrap();

        // All of HBB's signal is declared ambient.
        assert_relative_eq!(est.get(0, 0), 1.0);
        assert_relative_eq!(est.get(0, 1), 1.0);
        // Sample 1: the implied scaling predicts 10 ambient GeneX counts
        // against 5 observed, so the proportion caps at 1.
        assert_relative_eq!(est.get(1, 0), 1.0);
        // Sample 2: 5 predicted against 200 observed.
        assert_relative_eq!(est.get(1, 1), 0.025, epsilon = 1e-12);
    }

    #[test]
    fn test_anchoring_exactness() {
        let (counts, ambient) = hbb_fixture();
        let est = control_anchored_contribution_indices(
            &counts,
            &ambient,
            &[0],
            &ControlConfig::default(),
        )
        .unwrap();

        for s in 0..2 {
            let lambda = est.lambda()[s];
            let props = ambient.column_proportions(s).unwrap();
            let predicted = lambda * props[0];
            assert_relative_eq!(predicted, counts.get(0, s) as f64, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_empty_control_set() {
        let (counts, ambient) = hbb_fixture();
        let result = control_anchored_contribution_indices(
            &counts,
            &ambient,
            &[],
            &ControlConfig::default(),
        );
        assert!(matches!(result, Err(AmbientError::InvalidControlSet(_))));
    }

    #[test]
    fn test_unknown_control_gene() {
        let (counts, ambient) = hbb_fixture();
        let result = control_anchored_contribution(
            &counts,
            &ambient,
            &["HBA1".to_string()],
            &ControlConfig::default(),
        );
        assert!(matches!(result, Err(AmbientError::InvalidControlSet(_))));
    }

    #[test]
    fn test_zero_ambient_controls_degrade_per_sample() {
        // Controls carry ambient signal in sample 1 only; sample 2 must
        // come back as missing without aborting sample 1.
        let mut tri_mat = TriMat::new((2, 2));
        tri_mat.add_triplet(0, 0, 10);
        tri_mat.add_triplet(0, 1, 10);
        tri_mat.add_triplet(1, 0, 20);
        tri_mat.add_triplet(1, 1, 20);
        let counts = CountMatrix::new(
            tri_mat.to_csr(),
            vec!["HBB".to_string(), "GeneX".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        let ambient = AmbientProfile::from_matrix(
            DMatrix::from_row_slice(2, 2, &[5.0, 0.0, 5.0, 3.0]),
            counts.gene_ids().to_vec(),
        )
        .unwrap();

        let est = control_anchored_contribution_indices(
            &counts,
            &ambient,
            &[0],
            &ControlConfig::default(),
        )
        .unwrap();

        assert!(est.lambda()[0].is_finite());
        assert!(!est.is_missing(1, 0));
        assert!(est.lambda()[1].is_nan());
        assert!(est.is_missing(0, 1));
        assert!(est.is_missing(1, 1));
    }

    #[test]
    fn test_count_mode() {
        let (counts, ambient) = hbb_fixture();
        let config = ControlConfig { mode: Mode::Count };
        let est =
            control_anchored_contribution_indices(&counts, &ambient, &[0], &config).unwrap();

        // Sample 1: lambda * proportions = 110 * [10/11, 1/11] = [100, 10].
        assert_relative_eq!(est.get(0, 0), 100.0, epsilon = 1e-9);
        assert_relative_eq!(est.get(1, 0), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_idempotence() {
        let (counts, ambient) = hbb_fixture();
        let config = ControlConfig::default();
        let a = control_anchored_contribution_indices(&counts, &ambient, &[0], &config).unwrap();
        let b = control_anchored_contribution_indices(&counts, &ambient, &[0], &config).unwrap();
        assert_eq!(a.matrix(), b.matrix());
    }
}
