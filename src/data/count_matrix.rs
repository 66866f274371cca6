//! Count matrix with sparse storage for pseudo-bulk expression data.

use crate::error::{AmbientError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse count matrix storing observed gene expression across samples.
///
/// Rows represent genes, columns represent samples (typically pseudo-bulk
/// aggregates of one cluster or biological replicate). Uses CSR (Compressed
/// Sparse Row) format for efficient row-wise operations.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (genes × samples)
    data: CsMat<u64>,
    /// Gene identifiers (row names)
    gene_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<u64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != gene_ids.len() {
            return Err(AmbientError::DimensionMismatch {
                expected: nrows,
                actual: gene_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(AmbientError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
        })
    }

    /// Load a count matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is gene ID header)
    /// - Subsequent rows: gene ID followed by counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        // Parse header
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

        // Parse data rows into triplets for sparse matrix construction
        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();
        let mut gene_ids: Vec<String> = Vec::new();

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != n_samples + 1 {
                return Err(AmbientError::DimensionMismatch {
                    expected: n_samples + 1,
                    actual: fields.len(),
                });
            }

            let gene_id = fields[0].to_string();
            gene_ids.push(gene_id);

            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value: u64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| AmbientError::InvalidValue {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        })?;
                if value > 0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        let n_genes = gene_ids.len();
        if n_genes == 0 {
            return Err(AmbientError::EmptyData("No genes in TSV".to_string()));
        }

        // Build sparse matrix from triplets
        let mut tri_mat = TriMat::new((n_genes, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }
        let data: CsMat<u64> = tri_mat.to_csr();

        Self::new(data, gene_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Write header
        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        // Write data rows
        for (row_idx, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for col_idx in 0..self.n_samples() {
                let value = self.get(row_idx, col_idx);
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
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

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<u64> {
        &self.data
    }

    /// Find the row index of a gene by identifier.
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Get a dense vector for a specific row (gene).
    pub fn row_dense(&self, row: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        (0..self.n_genes()).map(|row| self.get(row, col)).collect()
    }

    /// Compute row sums (total counts per gene).
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_genes())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Compute column sums (library sizes per sample).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Subset the matrix to include only specified genes (by index).
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let n_genes = indices.len();
        let n_samples = self.n_samples();

        let mut triplets = Vec::new();
        let mut new_gene_ids = Vec::with_capacity(n_genes);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_genes() {
                return Err(AmbientError::InvalidParameter(format!(
                    "Gene index {} out of bounds",
                    old_row
                )));
            }
            new_gene_ids.push(self.gene_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    triplets.push((new_row, col, val));
                }
            }
        }

        let mut tri_mat = TriMat::new((n_genes, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), new_gene_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_matrix() -> CountMatrix {
        // 3 genes × 4 samples
        let mut tri_mat = TriMat::new((3, 4));
        tri_mat.add_triplet(0, 0, 10);
        tri_mat.add_triplet(0, 1, 20);
        tri_mat.add_triplet(0, 3, 5);
        tri_mat.add_triplet(1, 0, 100);
        tri_mat.add_triplet(1, 1, 200);
        tri_mat.add_triplet(1, 2, 150);
        tri_mat.add_triplet(1, 3, 175);
        tri_mat.add_triplet(2, 0, 1);
        // gene 2 is sparse, only present in sample 0

        let gene_ids = vec!["HBB".to_string(), "ACTB".to_string(), "CD3E".to_string()];
        let sample_ids = vec![
            "sample1".to_string(),
            "sample2".to_string(),
            "sample3".to_string(),
            "sample4".to_string(),
        ];

        CountMatrix::new(tri_mat.to_csr(), gene_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let mat = create_test_matrix();
        assert_eq!(mat.n_genes(), 3);
        assert_eq!(mat.n_samples(), 4);
    }

    #[test]
    fn test_get_values() {
        let mat = create_test_matrix();
        assert_eq!(mat.get(0, 0), 10);
        assert_eq!(mat.get(0, 2), 0); // zero entry
        assert_eq!(mat.get(2, 0), 1);
        assert_eq!(mat.get(2, 1), 0); // sparse entry
    }

    #[test]
    fn test_gene_index() {
        let mat = create_test_matrix();
        assert_eq!(mat.gene_index("HBB"), Some(0));
        assert_eq!(mat.gene_index("CD3E"), Some(2));
        assert_eq!(mat.gene_index("GAPDH"), None);
    }

    #[test]
    fn test_row_and_col_dense() {
        let mat = create_test_matrix();
        assert_eq!(mat.row_dense(0), vec![10, 20, 0, 5]);
        assert_eq!(mat.col_dense(0), vec![10, 100, 1]);
        assert_eq!(mat.col_dense(2), vec![0, 150, 0]);
    }

    #[test]
    fn test_sums() {
        let mat = create_test_matrix();
        assert_eq!(mat.col_sums(), vec![111, 220, 150, 180]);
        assert_eq!(mat.row_sums(), vec![35, 625, 1]);
    }

    #[test]
    fn test_subset_genes() {
        let mat = create_test_matrix();
        let sub = mat.subset_genes(&[1, 2]).unwrap();
        assert_eq!(sub.n_genes(), 2);
        assert_eq!(sub.gene_ids(), &["ACTB", "CD3E"]);
        assert_eq!(sub.get(0, 1), 200);
        assert_eq!(sub.get(1, 0), 1);

        assert!(mat.subset_genes(&[5]).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let tri_mat: TriMat<u64> = TriMat::new((3, 4));
        let result = CountMatrix::new(
            tri_mat.to_csr(),
            vec!["a".to_string()],
            vec!["s".to_string(); 4],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tsv_roundtrip() {
        let mat = create_test_matrix();

        let temp_file = NamedTempFile::new().unwrap();
        mat.to_tsv(temp_file.path()).unwrap();

        let loaded = CountMatrix::from_tsv(temp_file.path()).unwrap();
        assert_eq!(loaded.n_genes(), mat.n_genes());
        assert_eq!(loaded.n_samples(), mat.n_samples());
        assert_eq!(loaded.gene_ids(), mat.gene_ids());
        assert_eq!(loaded.sample_ids(), mat.sample_ids());

        for row in 0..mat.n_genes() {
            for col in 0..mat.n_samples() {
                assert_eq!(loaded.get(row, col), mat.get(row, col));
            }
        }
    }

    #[test]
    fn test_ragged_rows_rejected() {
        // A short row must not be zero-filled, and an overlong row must
        // not be truncated.
        let mut short_row = NamedTempFile::new().unwrap();
        writeln!(short_row, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(short_row, "HBB\t5").unwrap();
        short_row.flush().unwrap();
        assert!(matches!(
            CountMatrix::from_tsv(short_row.path()),
            Err(AmbientError::DimensionMismatch { expected: 4, actual: 2 })
        ));

        let mut long_row = NamedTempFile::new().unwrap();
        writeln!(long_row, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(long_row, "ACTB\t1\t2\t3\t4").unwrap();
        long_row.flush().unwrap();
        assert!(matches!(
            CountMatrix::from_tsv(long_row.path()),
            Err(AmbientError::DimensionMismatch { expected: 4, actual: 5 })
        ));
    }

    #[test]
    fn test_invalid_count_value() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "gene_id\ts1\ts2").unwrap();
        writeln!(temp_file, "HBB\t10\tnot_a_number").unwrap();
        temp_file.flush().unwrap();

        assert!(CountMatrix::from_tsv(temp_file.path()).is_err());
    }
}
