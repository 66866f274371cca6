//! ambient - Ambient RNA contribution estimation CLI
//!
//! Command-line interface for estimating and filtering ambient RNA
//! contamination in pseudo-bulk count matrices.

use ambient_contrib::data::{AmbientProfile, CountMatrix};
use ambient_contrib::error::Result;
use ambient_contrib::estimate::{
    control_anchored_contribution, maximum_contribution, ContributionEstimate, ControlConfig,
    MaximumConfig, Mode, NullDistribution,
};
use ambient_contrib::filter::{filter_ambient_genes, DEFAULT_CONTAMINATION_THRESHOLD};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI-friendly output mode enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    /// Fraction of each observed count attributable to ambient RNA
    Proportion,
    /// Expected ambient-derived count
    Count,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Proportion => Mode::Proportion,
            CliMode::Count => Mode::Count,
        }
    }
}

/// Ambient RNA contribution estimation
#[derive(Parser)]
#[command(name = "ambient")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the maximum ambient contribution per gene per sample
    Maximum {
        /// Path to count matrix TSV (genes × samples)
        #[arg(short, long)]
        counts: PathBuf,

        /// Path to ambient profile TSV (matching gene rows)
        #[arg(short, long)]
        ambient: PathBuf,

        /// Path for the estimate TSV output
        #[arg(short, long)]
        output: PathBuf,

        /// P-value threshold for the scaling search
        #[arg(long, default_value_t = 0.05)]
        p_threshold: f64,

        /// Output mode
        #[arg(long, value_enum, default_value = "proportion")]
        mode: CliMode,

        /// Negative binomial dispersion; omit for a Poisson null
        #[arg(long)]
        dispersion: Option<f64>,
    },

    /// Estimate ambient contributions anchored on control genes
    Anchored {
        /// Path to count matrix TSV (genes × samples)
        #[arg(short, long)]
        counts: PathBuf,

        /// Path to ambient profile TSV (matching gene rows)
        #[arg(short, long)]
        ambient: PathBuf,

        /// Path for the estimate TSV output
        #[arg(short, long)]
        output: PathBuf,

        /// Control genes: comma-separated names, or @FILE with one per line
        #[arg(long)]
        controls: String,

        /// Output mode
        #[arg(long, value_enum, default_value = "proportion")]
        mode: CliMode,
    },

    /// Remove ambient-affected genes from a count matrix
    Filter {
        /// Path to count matrix TSV (genes × samples)
        #[arg(short, long)]
        counts: PathBuf,

        /// Path to a proportion-mode estimate TSV
        #[arg(short, long)]
        estimate: PathBuf,

        /// Path for the filtered count matrix TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Mean contamination threshold above which a gene is removed
        #[arg(long, default_value_t = DEFAULT_CONTAMINATION_THRESHOLD)]
        threshold: f64,

        /// Print the filter summary as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Maximum {
            counts,
            ambient,
            output,
            p_threshold,
            mode,
            dispersion,
        } => cmd_maximum(&counts, &ambient, &output, p_threshold, mode, dispersion),

        Commands::Anchored {
            counts,
            ambient,
            output,
            controls,
            mode,
        } => cmd_anchored(&counts, &ambient, &output, &controls, mode),

        Commands::Filter {
            counts,
            estimate,
            output,
            threshold,
            json,
        } => cmd_filter(&counts, &estimate, &output, threshold, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_inputs(
    counts_path: &PathBuf,
    ambient_path: &PathBuf,
) -> Result<(CountMatrix, AmbientProfile)> {
    eprintln!("Loading data...");
    let counts = CountMatrix::from_tsv(counts_path)?;
    let ambient = AmbientProfile::from_tsv(ambient_path)?;
    eprintln!(
        "Loaded {} genes x {} samples",
        counts.n_genes(),
        counts.n_samples()
    );
    Ok((counts, ambient))
}

fn report_lambda(estimate: &ContributionEstimate) {
    for (sample, lambda) in estimate.sample_ids().iter().zip(estimate.lambda()) {
        if lambda.is_nan() {
            eprintln!("  {}: scaling undefined (no usable ambient signal)", sample);
        } else {
            eprintln!("  {}: scaling {:.4}", sample, lambda);
        }
    }
}

/// Estimate maximum ambient contributions
fn cmd_maximum(
    counts_path: &PathBuf,
    ambient_path: &PathBuf,
    output_path: &PathBuf,
    p_threshold: f64,
    mode: CliMode,
    dispersion: Option<f64>,
) -> Result<()> {
    let (counts, ambient) = load_inputs(counts_path, ambient_path)?;

    let config = MaximumConfig {
        p_threshold,
        null: match dispersion {
            Some(dispersion) => NullDistribution::NegativeBinomial { dispersion },
            None => NullDistribution::Poisson,
        },
        mode: mode.into(),
        ..Default::default()
    };

    eprintln!("Estimating maximum ambient contributions...");
    let estimate = maximum_contribution(&counts, &ambient, &config)?;
    report_lambda(&estimate);

    eprintln!("Writing estimates to {:?}...", output_path);
    estimate.to_tsv(output_path)?;
    Ok(())
}

/// Estimate control-anchored ambient contributions
fn cmd_anchored(
    counts_path: &PathBuf,
    ambient_path: &PathBuf,
    output_path: &PathBuf,
    controls: &str,
    mode: CliMode,
) -> Result<()> {
    let (counts, ambient) = load_inputs(counts_path, ambient_path)?;

    let control_genes = parse_controls(controls)?;
    eprintln!("Using {} control genes", control_genes.len());

    let config = ControlConfig { mode: mode.into() };
    let estimate = control_anchored_contribution(&counts, &ambient, &control_genes, &config)?;
    report_lambda(&estimate);

    eprintln!("Writing estimates to {:?}...", output_path);
    estimate.to_tsv(output_path)?;
    Ok(())
}

/// Filter ambient-affected genes out of a count matrix
fn cmd_filter(
    counts_path: &PathBuf,
    estimate_path: &PathBuf,
    output_path: &PathBuf,
    threshold: f64,
    json: bool,
) -> Result<()> {
    eprintln!("Loading data...");
    let counts = CountMatrix::from_tsv(counts_path)?;
    let estimate = ContributionEstimate::from_tsv(estimate_path, Mode::Proportion)?;

    let (filtered, result) = filter_ambient_genes(&counts, &estimate, threshold)?;

    eprintln!("Writing filtered counts to {:?}...", output_path);
    filtered.to_tsv(output_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result);
    }
    Ok(())
}

/// Parse a control gene specification: comma-separated names or @FILE.
fn parse_controls(spec: &str) -> Result<Vec<String>> {
    let genes: Vec<String> = if let Some(path) = spec.strip_prefix('@') {
        std::fs::read_to_string(path)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    } else {
        spec.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    Ok(genes)
}
