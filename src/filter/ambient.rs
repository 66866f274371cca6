//! Flagging and removal of ambient-affected genes.

use crate::data::CountMatrix;
use crate::error::{AmbientError, Result};
use crate::estimate::{ContributionEstimate, Mode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default contamination threshold: genes with more than 10% estimated
/// ambient contribution on average are flagged.
pub const DEFAULT_CONTAMINATION_THRESHOLD: f64 = 0.10;

/// Flag genes whose mean contribution across samples exceeds the threshold.
///
/// Missing per-sample estimates are ignored in the mean; a gene with no
/// estimate in any sample is not flagged. Requires proportion-mode
/// estimates, since the threshold is a fraction.
pub fn flag_ambient_genes(estimate: &ContributionEstimate, threshold: f64) -> Result<Vec<bool>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AmbientError::InvalidParameter(
            "threshold must be between 0 and 1".to_string(),
        ));
    }
    if estimate.mode() != Mode::Proportion {
        return Err(AmbientError::InvalidParameter(
            "ambient flagging requires proportion-mode estimates".to_string(),
        ));
    }

    let means = estimate.gene_means();
    Ok(means.iter().map(|&m| m > threshold).collect())
}

/// Result of ambient filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbientFilterResult {
    /// Number of genes before filtering.
    pub n_before: usize,
    /// Number of genes after filtering.
    pub n_after: usize,
    /// Number of genes removed.
    pub n_removed: usize,
    /// Proportion of genes retained.
    pub retention_rate: f64,
    /// Proportion of total reads retained.
    pub reads_retained: f64,
    /// Identifiers of the removed genes.
    pub flagged_genes: Vec<String>,
}

impl std::fmt::Display for AmbientFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ambient Filter Result")?;
        writeln!(f, "  Genes before:   {}", self.n_before)?;
        writeln!(f, "  Genes after:    {}", self.n_after)?;
        writeln!(f, "  Genes removed:  {}", self.n_removed)?;
        writeln!(f, "  Gene retention: {:.1}%", self.retention_rate * 100.0)?;
        writeln!(f, "  Reads retained: {:.1}%", self.reads_retained * 100.0)?;
        if !self.flagged_genes.is_empty() {
            writeln!(f, "  Flagged: {}", self.flagged_genes.join(", "))?;
        }
        Ok(())
    }
}

/// Remove ambient-affected genes from a count matrix.
///
/// The estimate must share the count matrix's gene axis. Returns the
/// retained matrix and removal statistics.
pub fn filter_ambient_genes(
    counts: &CountMatrix,
    estimate: &ContributionEstimate,
    threshold: f64,
) -> Result<(CountMatrix, AmbientFilterResult)> {
    if estimate.n_genes() != counts.n_genes() {
        return Err(AmbientError::DimensionMismatch {
            expected: counts.n_genes(),
            actual: estimate.n_genes(),
        });
    }
    for (idx, (a, b)) in estimate
        .gene_ids()
        .iter()
        .zip(counts.gene_ids())
        .enumerate()
    {
        if a != b {
            return Err(AmbientError::GeneMismatch(format!(
                "gene {} is '{}' in the estimate but '{}' in the counts",
                idx, a, b
            )));
        }
    }

    let flagged = flag_ambient_genes(estimate, threshold)?;

    let keep_indices: Vec<usize> = (0..counts.n_genes())
        .into_par_iter()
        .filter(|&g| !flagged[g])
        .collect();

    if keep_indices.is_empty() {
        return Err(AmbientError::EmptyData(format!(
            "All genes exceed the contamination threshold {}",
            threshold
        )));
    }

    let flagged_genes: Vec<String> = counts
        .gene_ids()
        .iter()
        .zip(&flagged)
        .filter(|(_, &f)| f)
        .map(|(id, _)| id.clone())
        .collect();

    let total_reads_before: u64 = counts.row_sums().iter().sum();
    let filtered = counts.subset_genes(&keep_indices)?;
    let total_reads_after: u64 = filtered.row_sums().iter().sum();

    let n_before = counts.n_genes();
    let n_after = filtered.n_genes();
    let result = AmbientFilterResult {
        n_before,
        n_after,
        n_removed: n_before - n_after,
        retention_rate: n_after as f64 / n_before as f64,
        reads_retained: if total_reads_before > 0 {
            total_reads_after as f64 / total_reads_before as f64
        } else {
            0.0
        },
        flagged_genes,
    };

    Ok((filtered, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AmbientProfile;
    use crate::estimate::{control_anchored_contribution_indices, ControlConfig};
    use nalgebra::DMatrix;
    use sprs::TriMat;

    fn fixture() -> (CountMatrix, ContributionEstimate) {
        // 3 genes × 2 samples; HBB is entirely ambient, CD3E barely.
        let mut tri_mat = TriMat::new((3, 2));
        tri_mat.add_triplet(0, 0, 100);
        tri_mat.add_triplet(0, 1, 50);
        tri_mat.add_triplet(1, 0, 5);
        tri_mat.add_triplet(1, 1, 200);
        tri_mat.add_triplet(2, 0, 400);
        tri_mat.add_triplet(2, 1, 800);
        let counts = CountMatrix::new(
            tri_mat.to_csr(),
            vec!["HBB".to_string(), "GeneX".to_string(), "CD3E".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();

        let ambient = AmbientProfile::from_matrix(
            DMatrix::from_row_slice(3, 2, &[10.0, 10.0, 1.0, 1.0, 0.2, 0.2]),
            counts.gene_ids().to_vec(),
        )
        .unwrap();

        let estimate = control_anchored_contribution_indices(
            &counts,
            &ambient,
            &[0],
            &ControlConfig::default(),
        )
        .unwrap();
        (counts, estimate)
    }

    #[test]
    fn test_flagging() {
        let (_, estimate) = fixture();
        let flagged = flag_ambient_genes(&estimate, DEFAULT_CONTAMINATION_THRESHOLD).unwrap();
        // HBB mean = 1.0; GeneX mean = (1.0 + 0.025)/2 > 0.1; CD3E small.
        assert_eq!(flagged, vec![true, true, false]);
    }

    #[test]
    fn test_filtering_removes_flagged_genes() {
        let (counts, estimate) = fixture();
        let (filtered, result) =
            filter_ambient_genes(&counts, &estimate, DEFAULT_CONTAMINATION_THRESHOLD).unwrap();

        assert_eq!(filtered.n_genes(), 1);
        assert_eq!(filtered.gene_ids(), &["CD3E"]);
        assert_eq!(result.n_removed, 2);
        assert_eq!(result.flagged_genes, vec!["HBB", "GeneX"]);
        assert!(result.retention_rate > 0.3 && result.retention_rate < 0.4);
    }

    #[test]
    fn test_permissive_threshold_keeps_everything() {
        let (counts, estimate) = fixture();
        let (filtered, result) = filter_ambient_genes(&counts, &estimate, 1.0).unwrap();
        assert_eq!(filtered.n_genes(), counts.n_genes());
        assert_eq!(result.n_removed, 0);
    }

    #[test]
    fn test_invalid_threshold() {
        let (_, estimate) = fixture();
        assert!(flag_ambient_genes(&estimate, -0.1).is_err());
        assert!(flag_ambient_genes(&estimate, 1.5).is_err());
    }

    #[test]
    fn test_count_mode_rejected() {
        let (counts, _) = fixture();
        let ambient = AmbientProfile::from_matrix(
            DMatrix::from_row_slice(3, 2, &[10.0, 10.0, 1.0, 1.0, 0.2, 0.2]),
            counts.gene_ids().to_vec(),
        )
        .unwrap();
        let config = ControlConfig {
            mode: crate::estimate::Mode::Count,
        };
        let estimate =
            control_anchored_contribution_indices(&counts, &ambient, &[0], &config).unwrap();
        assert!(flag_ambient_genes(&estimate, 0.1).is_err());
    }

    #[test]
    fn test_gene_axis_mismatch() {
        let (counts, estimate) = fixture();
        let sub = counts.subset_genes(&[0, 1]).unwrap();
        assert!(filter_ambient_genes(&sub, &estimate, 0.1).is_err());
    }
}
