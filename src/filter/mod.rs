//! Filtering built on top of contribution estimates.

pub mod ambient;

pub use ambient::{
    filter_ambient_genes, flag_ambient_genes, AmbientFilterResult,
    DEFAULT_CONTAMINATION_THRESHOLD,
};
