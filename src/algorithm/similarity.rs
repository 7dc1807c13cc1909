use string_interner::DefaultStringInterner;

use super::{
    alignment::{lcs_positions, normalized_edit_distance},
    AlignmentFeature, ModelParams,
};
use crate::signature::DumpSignature;

/// The parameter-independent part of comparing two signatures: the aligned
/// features and the longer component count. Computed once, it can be scored
/// under any number of `ModelParams`.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedPair {
    pub features: Vec<AlignmentFeature>,
    pub max_len: usize,
}

impl AlignedPair {
    pub fn new(signatures: [&DumpSignature; 2]) -> Self {
        let mut interner = DefaultStringInterner::default();
        let symbols = signatures.map(|signature| {
            signature
                .runs()
                .iter()
                .map(|run| interner.get_or_intern(&run.component))
                .collect::<Vec<_>>()
        });

        let features = lcs_positions(&symbols[0], &symbols[1])
            .into_iter()
            .map(|(i, j)| AlignmentFeature {
                position: usize::max(i, j),
                distance: normalized_edit_distance(&signatures[0].runs()[i].tokens, &signatures[1].runs()[j].tokens),
            })
            .collect();

        AlignedPair {
            features,
            max_len: usize::max(signatures[0].len(), signatures[1].len()),
        }
    }

    pub fn numerator(&self, params: ModelParams) -> f64 {
        self.features
            .iter()
            .map(|feature| (-params.m * feature.position as f64).exp() * (-params.n * feature.distance).exp())
            .sum()
    }

    pub fn denominator(&self, params: ModelParams) -> f64 {
        (0..self.max_len).map(|k| (-params.m * k as f64).exp()).sum()
    }

    /// Weighted share of aligned components, in `[0, 1]`. Two empty
    /// signatures have similarity 0.
    pub fn similarity(&self, params: ModelParams) -> f64 {
        if self.max_len == 0 {
            return 0.0;
        }
        self.numerator(params) / self.denominator(params)
    }
}

pub fn similarity(signatures: [&DumpSignature; 2], params: ModelParams) -> f64 {
    AlignedPair::new(signatures).similarity(params)
}
