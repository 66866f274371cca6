//! Ambient RNA expression profile aligned to a count matrix.

use crate::data::CountMatrix;
use crate::error::{AmbientError, Result};
use nalgebra::DMatrix;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Relative abundance of each gene in the ambient (cell-free) pool.
///
/// Rows represent genes and must share identity and order with the count
/// matrix the profile is compared against. Columns are either one per
/// sample, or a single column broadcast across all samples (a profile
/// estimated once from the empty droplets of a pooled run).
///
/// Values are relative abundances on an arbitrary scale; estimation
/// normalizes each column to proportions, so the input scale does not
/// affect results.
#[derive(Debug, Clone)]
pub struct AmbientProfile {
    /// Dense profile values (genes × columns).
    data: DMatrix<f64>,
    /// Gene identifiers (row names).
    gene_ids: Vec<String>,
}

impl AmbientProfile {
    /// Create a profile from a dense matrix (genes × samples).
    pub fn from_matrix(data: DMatrix<f64>, gene_ids: Vec<String>) -> Result<Self> {
        if data.nrows() != gene_ids.len() {
            return Err(AmbientError::DimensionMismatch {
                expected: data.nrows(),
                actual: gene_ids.len(),
            });
        }
        if data.ncols() == 0 {
            return Err(AmbientError::EmptyData(
                "Ambient profile has no columns".to_string(),
            ));
        }
        for (idx, &val) in data.iter().enumerate() {
            if !val.is_finite() || val < 0.0 {
                return Err(AmbientError::InvalidValue {
                    value: val.to_string(),
                    row: idx % data.nrows(),
                    col: idx / data.nrows(),
                });
            }
        }
        Ok(Self { data, gene_ids })
    }

    /// Create a single-column profile broadcast across all samples.
    pub fn from_vector(values: Vec<f64>, gene_ids: Vec<String>) -> Result<Self> {
        let data = DMatrix::from_column_slice(values.len(), 1, &values);
        Self::from_matrix(data, gene_ids)
    }

    /// Load a profile from a TSV file.
    ///
    /// Same layout as a count matrix TSV (header row with column IDs, one
    /// gene per row), except values may be fractional. A file with a single
    /// value column yields a broadcast profile.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| AmbientError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(AmbientError::EmptyData(
                "TSV must have at least one value column".to_string(),
            ));
        }
        let n_cols = header.len() - 1;

        let mut gene_ids: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != n_cols + 1 {
                return Err(AmbientError::DimensionMismatch {
                    expected: n_cols + 1,
                    actual: fields.len(),
                });
            }
            gene_ids.push(fields[0].to_string());
            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value: f64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| AmbientError::InvalidValue {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        })?;
                values.push(value);
            }
        }

        if gene_ids.is_empty() {
            return Err(AmbientError::EmptyData("No genes in TSV".to_string()));
        }

        // values were collected row-major
        let n_genes = gene_ids.len();
        let data = DMatrix::from_fn(n_genes, n_cols, |r, c| values[r * n_cols + c]);
        Self::from_matrix(data, gene_ids)
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    /// Number of stored columns (1 for a broadcast profile).
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    /// Whether a single column is broadcast across samples.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.data.ncols() == 1
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Ambient value for a gene in a sample, resolving broadcasting.
    #[inline]
    pub fn value(&self, gene: usize, sample: usize) -> f64 {
        let col = if self.is_broadcast() { 0 } else { sample };
        self.data[(gene, col)]
    }

    /// Validate that this profile can be compared against a count matrix.
    ///
    /// The gene axes must have the same length and identical, identically
    /// ordered identifiers, and the column count must be 1 (broadcast) or
    /// equal to the number of samples. Fails fast: silent misalignment
    /// would corrupt every downstream estimate.
    pub fn check_alignment(&self, counts: &CountMatrix) -> Result<()> {
        if self.n_genes() != counts.n_genes() {
            return Err(AmbientError::DimensionMismatch {
                expected: counts.n_genes(),
                actual: self.n_genes(),
            });
        }
        for (idx, (a, b)) in self.gene_ids.iter().zip(counts.gene_ids()).enumerate() {
            if a != b {
                return Err(AmbientError::GeneMismatch(format!(
                    "gene {} is '{}' in the ambient profile but '{}' in the counts",
                    idx, a, b
                )));
            }
        }
        if !self.is_broadcast() && self.n_cols() != counts.n_samples() {
            return Err(AmbientError::DimensionMismatch {
                expected: counts.n_samples(),
                actual: self.n_cols(),
            });
        }
        Ok(())
    }

    /// Normalize a sample's profile to proportions summing to one.
    ///
    /// Returns `None` when the column has no positive signal, in which case
    /// no scaling factor is defined for that sample.
    pub fn column_proportions(&self, sample: usize) -> Option<Vec<f64>> {
        let col = if self.is_broadcast() { 0 } else { sample };
        let total: f64 = self.data.column(col).iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(self.data.column(col).iter().map(|v| v / total).collect())
    }
}
