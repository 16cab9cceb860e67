//! Multivariate normal parameterization

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Multidimensional normal distribution given by a mean vector and a
/// row-major covariance matrix.
///
/// Construction checks shapes only. Symmetry and positive semi-definiteness of
/// the covariance are the caller's contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PackedDistribution")]
pub struct Distribution {
    dimension: usize,
    #[serde(rename = "mu")]
    mean: Vec<f64>,
    #[serde(rename = "cov")]
    covariance: Vec<f64>,
}

/// Wire shape, checked on the way in.
#[derive(Deserialize)]
struct PackedDistribution {
    dimension: usize,
    mu: Vec<f64>,
    cov: Vec<f64>,
}

impl TryFrom<PackedDistribution> for Distribution {
    type Error = Error;

    fn try_from(packed: PackedDistribution) -> Result<Self> {
        Self::new(packed.dimension, packed.mu, packed.cov)
    }
}

impl Distribution {
    pub fn new(dimension: usize, mean: Vec<f64>, covariance: Vec<f64>) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Shape("dimension must be at least 1".to_string()));
        }
        if mean.len() != dimension {
            return Err(Error::Shape(format!(
                "mean has {} elements, expected {}",
                mean.len(),
                dimension
            )));
        }
        let expected = dimension
            .checked_mul(dimension)
            .ok_or_else(|| Error::Shape(format!("dimension {} is too large", dimension)))?;
        if covariance.len() != expected {
            return Err(Error::Shape(format!(
                "covariance has {} elements, expected {}x{}={}",
                covariance.len(),
                dimension,
                dimension,
                expected
            )));
        }

        Ok(Self {
            dimension,
            mean,
            covariance,
        })
    }

    /// Covariance with `variances` on the diagonal and zeros elsewhere.
    pub fn diagonal(mean: Vec<f64>, variances: &[f64]) -> Result<Self> {
        let dimension = mean.len();
        if variances.len() != dimension {
            return Err(Error::Shape(format!(
                "{} variances given for a {}-dimensional mean",
                variances.len(),
                dimension
            )));
        }
        let mut covariance = vec![0.0; dimension * dimension];
        for (i, v) in variances.iter().enumerate() {
            covariance[i * dimension + i] = *v;
        }
        Self::new(dimension, mean, covariance)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Row-major `dimension x dimension` matrix.
    pub fn covariance(&self) -> &[f64] {
        &self.covariance
    }

    pub fn covariance_at(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.dimension || col >= self.dimension {
            return None;
        }
        self.covariance.get(row * self.dimension + col).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_round_trips_values() {
        let mean = vec![1.0, -2.5, 3.25];
        let cov = vec![1.0, 0.1, 0.0, 0.1, 2.0, 0.0, 0.0, 0.0, 3.0];
        let d = Distribution::new(3, mean.clone(), cov.clone()).unwrap();

        assert_eq!(d.dimension(), 3);
        assert_eq!(d.mean(), mean.as_slice());
        assert_eq!(d.covariance(), cov.as_slice());
        assert_eq!(d.covariance_at(1, 0), Some(0.1));
        assert_eq!(d.covariance_at(3, 0), None);
    }

    #[test]
    fn test_identity_example() {
        let d = Distribution::new(
            3,
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        );
        assert!(d.is_ok());
    }

    #[test]
    fn test_mean_length_mismatch() {
        let err = Distribution::new(3, vec![0.0, 0.0], vec![0.0; 9]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_covariance_length_mismatch() {
        for len in [0, 3, 8, 10] {
            let err = Distribution::new(3, vec![0.0; 3], vec![0.0; len]).unwrap_err();
            assert!(matches!(err, Error::Shape(_)), "covariance len {}", len);
        }
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = Distribution::new(0, vec![], vec![]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_diagonal() {
        let d = Distribution::diagonal(vec![0.0; 2], &[0.5, 0.25]).unwrap();
        assert_eq!(d.covariance(), &[0.5, 0.0, 0.0, 0.25]);

        let err = Distribution::diagonal(vec![0.0; 2], &[0.5]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_serialized_field_names() {
        let d = Distribution::diagonal(vec![1.0], &[2.0]).unwrap();
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["mu"], serde_json::json!([1.0]));
        assert_eq!(json["cov"], serde_json::json!([2.0]));

        let back: Distribution = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_deserialize_rejects_bad_shape() {
        let json = serde_json::json!({"dimension": 2, "mu": [0.0], "cov": [1.0, 0.0, 0.0, 1.0]});
        assert!(serde_json::from_value::<Distribution>(json).is_err());
    }
}
