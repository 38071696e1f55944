//! Classification: the malignant/benign decision rule and probability rounding.

use std::fmt;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

use crate::model::IdcClassifier;
use crate::utils::error::{IdcError, Result};
use crate::utils::round3;

/// Probabilities strictly above this are malignant; exactly 0.5 is benign
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Predicted tissue class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnosis {
    Malignant,
    Benign,
}

impl Diagnosis {
    /// Apply the decision rule to a malignant probability
    pub fn from_probability(probability: f32) -> Self {
        if probability > DECISION_THRESHOLD {
            Diagnosis::Malignant
        } else {
            Diagnosis::Benign
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::Malignant => "Malignant",
            Diagnosis::Benign => "Benign",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output after the decision rule and rounding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub diagnosis: Diagnosis,
    /// Malignant probability rounded to 3 decimals
    pub malignant_probability: f32,
    /// Benign probability rounded to 3 decimals
    pub benign_probability: f32,
    /// Unrounded model output
    pub raw_probability: f32,
}

impl Prediction {
    /// Build a prediction from the model's malignant probability
    ///
    /// The benign share is derived from the rounded malignant share so the
    /// reported pair always sums to 1.0.
    pub fn from_probability(probability: f32) -> Result<Self> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(IdcError::Numerical(format!(
                "classifier produced an invalid probability: {}",
                probability
            )));
        }

        let malignant = round3(probability);
        Ok(Self {
            diagnosis: Diagnosis::from_probability(probability),
            malignant_probability: malignant,
            benign_probability: round3(1.0 - malignant),
            raw_probability: probability,
        })
    }
}

/// Run the classifier on one normalised image `[1, 3, H, W]`
pub fn classify<B: Backend>(model: &IdcClassifier<B>, input: Tensor<B, 4>) -> Result<f32> {
    let [batch, _, _, _] = input.dims();
    if batch != 1 {
        return Err(IdcError::InvalidInput(format!(
            "expected a single image, got a batch of {}",
            batch
        )));
    }
    let probability: f32 = model.forward_probability(input).into_scalar().elem();
    Ok(probability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_boundary() {
        assert_eq!(Diagnosis::from_probability(0.5), Diagnosis::Benign);
        assert_eq!(Diagnosis::from_probability(0.5001), Diagnosis::Malignant);
        assert_eq!(Diagnosis::from_probability(0.0), Diagnosis::Benign);
        assert_eq!(Diagnosis::from_probability(1.0), Diagnosis::Malignant);
    }

    #[test]
    fn test_boundary_uses_raw_probability() {
        // Rounds to 0.5 but is above the threshold
        let prediction = Prediction::from_probability(0.5004).unwrap();
        assert_eq!(prediction.diagnosis, Diagnosis::Malignant);
        assert_eq!(prediction.malignant_probability, 0.5);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        for i in 0..=1000 {
            let p = i as f32 / 1000.0 + 0.0004;
            let p = p.min(1.0);
            let prediction = Prediction::from_probability(p).unwrap();
            let sum = prediction.malignant_probability + prediction.benign_probability;
            assert!((sum - 1.0).abs() < 1e-6, "p = {}", p);
        }
    }

    #[test]
    fn test_rounding_to_three_decimals() {
        let prediction = Prediction::from_probability(0.87654).unwrap();
        assert_eq!(prediction.malignant_probability, 0.877);
        assert_eq!(prediction.benign_probability, 0.123);
        assert_eq!(prediction.diagnosis, Diagnosis::Malignant);
    }

    #[test]
    fn test_invalid_probability() {
        assert!(Prediction::from_probability(f32::NAN).is_err());
        assert!(Prediction::from_probability(1.5).is_err());
    }
}
