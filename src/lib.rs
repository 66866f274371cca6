//! Ambient RNA Contribution Estimation
//!
//! This library estimates, per gene per sample, the fraction of observed
//! counts in a pseudo-bulk scRNA-seq count matrix that is attributable to
//! ambient (cell-free) RNA contamination.
//!
//! # Overview
//!
//! The library is organized into small composable modules:
//!
//! - **data**: Core data structures (CountMatrix, AmbientProfile)
//! - **estimate**: Contribution estimation (maximum and control-anchored)
//! - **filter**: Removal of ambient-affected genes from count matrices
//!
//! Estimation is purely functional: both operations take read-only inputs
//! and produce a fresh [`estimate::ContributionEstimate`], parallelizing
//! over samples with no shared state. Producing the inputs (pseudo-bulk
//! aggregation of per-cell counts, summation of empty-droplet barcodes into
//! an ambient profile) is the job of upstream tools; both enter as plain
//! TSV matrices with matching gene rows.
//!
//! # Example
//!
//! ```no_run
//! use ambient_contrib::prelude::*;
//!
//! // Load data produced by upstream aggregation
//! let counts = CountMatrix::from_tsv("pseudobulk.tsv").unwrap();
//! let ambient = AmbientProfile::from_tsv("ambient.tsv").unwrap();
//!
//! // Upper-bound contamination estimates
//! let estimate = maximum_contribution(&counts, &ambient, &MaximumConfig::default()).unwrap();
//!
//! // Drop genes that are more than 10% ambient on average
//! let (kept, stats) =
//!     filter_ambient_genes(&counts, &estimate, DEFAULT_CONTAMINATION_THRESHOLD).unwrap();
//! println!("{}", stats);
//! # let _ = kept;
//! ```

pub mod data;
pub mod error;
pub mod estimate;
pub mod filter;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{AmbientProfile, CountMatrix};
    pub use crate::error::{AmbientError, Result};
    pub use crate::estimate::{
        control_anchored_contribution, control_anchored_contribution_indices,
        maximum_contribution, ContributionEstimate, ControlConfig, MaximumConfig, Mode,
        NullDistribution,
    };
    pub use crate::filter::{
        filter_ambient_genes, flag_ambient_genes, AmbientFilterResult,
        DEFAULT_CONTAMINATION_THRESHOLD,
    };
}
