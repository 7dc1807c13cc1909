pub mod alignment;
pub mod similarity;

use serde::{Deserialize, Serialize};

pub use self::similarity::{similarity, AlignedPair};

/// Decay coefficients of the similarity model. `m` weights how fast a match
/// loses value with its position in the stack, `n` how fast it loses value
/// with the distance between the function blocks of the matched components.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub m: f64,
    pub n: f64,
}

impl ModelParams {
    pub fn new(m: f64, n: f64) -> Self {
        ModelParams { m, n }
    }
}

/// One aligned component pair between two signatures.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignmentFeature {
    pub position: usize,
    pub distance: f64,
}
