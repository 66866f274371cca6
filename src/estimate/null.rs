//! Null distributions for the ambient under-count test.

use crate::error::{AmbientError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, NegativeBinomial, Poisson};

/// Null distribution for the expected ambient-derived count.
///
/// Poisson is the default. Negative binomial adds overdispersion with the
/// usual size parameterization: variance = mu + mu^2 / dispersion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "distribution")]
pub enum NullDistribution {
    #[default]
    Poisson,
    NegativeBinomial { dispersion: f64 },
}

impl NullDistribution {
    /// Validate distribution parameters before estimation starts.
    pub fn validate(&self) -> Result<()> {
        if let NullDistribution::NegativeBinomial { dispersion } = self {
            if !dispersion.is_finite() || *dispersion <= 0.0 {
                return Err(AmbientError::InvalidParameter(format!(
                    "dispersion must be positive and finite, got {}",
                    dispersion
                )));
            }
        }
        Ok(())
    }

    /// Probability of observing a count at or below `observed` when the
    /// ambient-derived mean is `mean`.
    ///
    /// Monotonically decreasing in `mean` for a fixed observed count. A
    /// non-positive mean puts all mass at zero, so the probability is 1.
    /// Returns `NAN` if the distribution cannot be constructed, which the
    /// scaling search treats as infeasible.
    pub fn upper_tail_pvalue(&self, mean: f64, observed: u64) -> f64 {
        if mean <= 0.0 {
            return 1.0;
        }
        match self {
            NullDistribution::Poisson => Poisson::new(mean)
                .map(|d| d.cdf(observed))
                .unwrap_or(f64::NAN),
            NullDistribution::NegativeBinomial { dispersion } => {
                // mean = r(1-p)/p with r = dispersion, p = r / (r + mean)
                let p = dispersion / (dispersion + mean);
                NegativeBinomial::new(*dispersion, p)
                    .map(|d| d.cdf(observed))
                    .unwrap_or(f64::NAN)
            }
        }
    }
}
