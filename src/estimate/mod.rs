//! Ambient contribution estimation.
//!
//! Two strategies for scaling an ambient profile against observed counts:
//!
//! - [`maximum_contribution`]: finds, per sample, the largest profile
//!   scaling consistent with no gene being a significant under-count. An
//!   upper bound on contamination, so downstream filtering is conservative.
//! - [`control_anchored_contribution`]: anchors the scaling on a set of
//!   control genes assumed to carry only ambient signal.

pub mod control;
pub mod maximum;
pub mod null;

pub use control::{
    control_anchored_contribution, control_anchored_contribution_indices, ControlConfig,
};
pub use maximum::{maximum_contribution, MaximumConfig};
pub use null::NullDistribution;

use crate::error::{AmbientError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How contribution estimates are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fraction of each observed count attributable to ambient RNA, in [0, 1].
    #[default]
    Proportion,
    /// Expected ambient-derived count, non-negative and uncapped.
    Count,
}

/// Estimated ambient contribution per gene per sample.
///
/// Cells where no estimate is defined (a sample with no usable ambient
/// signal) hold `f64::NAN`. The per-sample scaling factors are retained for
/// inspection; `NAN` marks samples where the factor is undefined.
#[derive(Debug, Clone)]
pub struct ContributionEstimate {
    /// Estimates (genes × samples).
    data: DMatrix<f64>,
    /// Gene identifiers.
    gene_ids: Vec<String>,
    /// Sample identifiers.
    sample_ids: Vec<String>,
    /// Mode the estimates were computed under.
    mode: Mode,
    /// Per-sample ambient scaling factors.
    lambda: Vec<f64>,
}

impl ContributionEstimate {
    pub(crate) fn new(
        data: DMatrix<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        mode: Mode,
        lambda: Vec<f64>,
    ) -> Self {
        Self {
            data,
            gene_ids,
            sample_ids,
            mode,
            lambda,
        }
    }

    /// Get the estimate for a gene and sample (`NAN` if missing).
    #[inline]
    pub fn get(&self, gene: usize, sample: usize) -> f64 {
        self.data[(gene, sample)]
    }

    /// Whether the estimate for a gene and sample is missing.
    #[inline]
    pub fn is_missing(&self, gene: usize, sample: usize) -> bool {
        self.data[(gene, sample)].is_nan()
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Mode the estimates were computed under.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Per-sample ambient scaling factors (`NAN` where undefined).
    #[inline]
    pub fn lambda(&self) -> &[f64] {
        &self.lambda
    }

    /// Get reference to the underlying matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Mean estimate per gene across samples, ignoring missing values.
    ///
    /// A gene whose estimate is missing in every sample yields `NAN`.
    pub fn gene_means(&self) -> Vec<f64> {
        (0..self.n_genes())
            .map(|g| {
                let (sum, n) = self
                    .data
                    .row(g)
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 {
                    f64::NAN
                } else {
                    sum / n as f64
                }
            })
            .collect()
    }

    /// Write the estimate matrix to a TSV file, with `NA` for missing cells.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for col in 0..self.n_samples() {
                let value = self.data[(row, col)];
                if value.is_nan() {
                    write!(writer, "\tNA")?;
                } else {
                    write!(writer, "\t{}", value)?;
                }
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Load an estimate matrix from a TSV file written by [`Self::to_tsv`].
    ///
    /// The file does not record the mode or the scaling factors, so the
    /// caller supplies the mode and the factors load as missing.
    pub fn from_tsv<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        use std::io::BufRead;

        let file = File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| AmbientError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(AmbientError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();
        let n_samples = sample_ids.len();

        let mut gene_ids: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != n_samples + 1 {
                return Err(AmbientError::DimensionMismatch {
                    expected: n_samples + 1,
                    actual: fields.len(),
                });
            }
            gene_ids.push(fields[0].to_string());
            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let trimmed = value_str.trim();
                let value = if trimmed == "NA" {
                    f64::NAN
                } else {
                    trimmed.parse().map_err(|_| AmbientError::InvalidValue {
                        value: value_str.to_string(),
                        row: row_idx,
                        col: col_idx,
                    })?
                };
                values.push(value);
            }
        }

        if gene_ids.is_empty() {
            return Err(AmbientError::EmptyData("No genes in TSV".to_string()));
        }

        let n_genes = gene_ids.len();
        let data = DMatrix::from_fn(n_genes, n_samples, |r, c| values[r * n_samples + c]);
        let lambda = vec![f64::NAN; n_samples];
        Ok(Self::new(data, gene_ids, sample_ids, mode, lambda))
    }
}

/// Per-gene estimates for one sample given its scaling factor.
///
/// Convention: an observed count of zero yields 1.0 in either mode, since
/// any non-zero ambient presence cannot be excluded. A gene with no ambient
/// signal and a positive observed count gets 0 (proportion) or the zero
/// expected count.
pub(crate) fn scaled_estimates(
    observed: &[u64],
    proportions: &[f64],
    lambda: f64,
    mode: Mode,
) -> Vec<f64> {
    if lambda.is_nan() {
        return vec![f64::NAN; observed.len()];
    }
    observed
        .iter()
        .zip(proportions)
        .map(|(&y, &a)| {
            if y == 0 {
                return 1.0;
            }
            let expected = lambda * a;
            match mode {
                Mode::Count => expected,
                Mode::Proportion => {
                    if a <= 0.0 {
                        0.0
                    } else {
                        (expected / y as f64).min(1.0)
                    }
                }
            }
        })
        .collect()
}
