use std::{cmp::Reverse, collections::HashMap};

use float_ord::FloatOrd;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    algorithm::{AlignedPair, ModelParams},
    labels::{Label, SamplePair},
    signature::DumpSignature,
    store::{SignatureStore, TestId},
    Error, Result,
};

/// Values `start, start + step, ...` up to and including `stop`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridAxis {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl GridAxis {
    pub fn values(&self) -> Vec<f64> {
        if self.step <= 0.0 || self.stop < self.start {
            return vec![self.start];
        }
        // Multiplying instead of accumulating keeps 0.1 steps on the decimal grid.
        let steps = ((self.stop - self.start) / self.step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|k| ((self.start + k as f64 * self.step) * 1e9).round() / 1e9)
            .collect()
    }
}

impl Default for GridAxis {
    fn default() -> Self {
        GridAxis {
            start: 0.0,
            stop: 2.0,
            step: 0.1,
        }
    }
}

/// Precision and recall at each distinct score threshold, thresholds
/// ascending. `precision` and `recall` have one more entry than
/// `thresholds`: the final point of precision 1 and recall 0.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecisionRecallCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Cumulative (true positives, false positives, threshold) at each distinct
/// score, scores descending.
fn binary_curve(labels: &[Label], scores: &[f64]) -> Vec<(usize, usize, f64)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by_key(|&index| Reverse(FloatOrd(scores[index])));

    let mut result = vec![];
    let mut true_positives = 0;
    for (position, &index) in order.iter().enumerate() {
        if labels[index] == Label::Positive {
            true_positives += 1;
        }
        let is_last_of_score = order
            .get(position + 1)
            .map_or(true, |&next| scores[next] != scores[index]);
        if is_last_of_score {
            result.push((true_positives, position + 1 - true_positives, scores[index]));
        }
    }
    result
}

fn positives_count(labels: &[Label]) -> usize {
    labels.iter().filter(|&&label| label == Label::Positive).count()
}

/// Area under the precision-recall step function, summed over thresholds
/// from the highest score down.
pub fn average_precision(labels: &[Label], scores: &[f64]) -> f64 {
    let positives = positives_count(labels);
    if positives == 0 {
        return 0.0;
    }
    let mut result = 0.0;
    let mut last_recall = 0.0;
    for (true_positives, false_positives, _) in binary_curve(labels, scores) {
        let precision = true_positives as f64 / (true_positives + false_positives) as f64;
        let recall = true_positives as f64 / positives as f64;
        result += (recall - last_recall) * precision;
        last_recall = recall;
    }
    result
}

pub fn precision_recall_curve(labels: &[Label], scores: &[f64]) -> PrecisionRecallCurve {
    let positives = positives_count(labels);
    let mut curve = PrecisionRecallCurve {
        precision: vec![],
        recall: vec![],
        thresholds: vec![],
    };
    for (true_positives, false_positives, threshold) in binary_curve(labels, scores).into_iter().rev() {
        curve.precision.push(true_positives as f64 / (true_positives + false_positives) as f64);
        curve.recall.push(if positives == 0 {
            0.0
        } else {
            true_positives as f64 / positives as f64
        });
        curve.thresholds.push(threshold);
    }
    curve.precision.push(1.0);
    curve.recall.push(0.0);
    curve
}

/// Weighted harmonic mean of precision and recall; `beta < 1` favours
/// precision.
pub fn f_measure(precision: f64, recall: f64, beta: f64) -> f64 {
    let beta2 = beta * beta;
    let denominator = beta2 * precision + recall;
    if denominator == 0.0 {
        return 0.0;
    }
    (1.0 + beta2) * precision * recall / denominator
}

/// The threshold maximizing the F-measure among the points whose precision
/// is strictly higher than at the previous (lower) threshold. Falls back to
/// the lowest threshold.
pub fn select_threshold(curve: &PrecisionRecallCurve, beta: f64) -> Option<f64> {
    let mut best = (0.0, 0);
    for i in 1..curve.thresholds.len() {
        if curve.precision[i] <= curve.precision[i - 1] {
            continue;
        }
        let score = f_measure(curve.precision[i], curve.recall[i], beta);
        if score > best.0 {
            best = (score, i);
        }
    }
    curve.thresholds.get(best.1).copied()
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridPoint {
    pub params: ModelParams,
    pub average_precision: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub params: ModelParams,
    pub average_precision: f64,
    pub grid: Vec<GridPoint>,
    pub threshold: f64,
    pub false_positives: Vec<SamplePair>,
    pub false_negatives: Vec<SamplePair>,
}

/// Where calibrated parameters are committed.
pub trait ParamsSink {
    fn commit(&mut self, params: ModelParams) -> Result<()>;
}

pub struct Calibrator {
    pub m_axis: GridAxis,
    pub n_axis: GridAxis,
    pub beta: f64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Calibrator {
            m_axis: GridAxis::default(),
            n_axis: GridAxis::default(),
            beta: 0.5,
        }
    }
}

/// Signatures of every test case named by `pairs`. Pairs whose test cases
/// have no stored signature are dropped with a warning.
pub fn load_signatures(
    pairs: Vec<SamplePair>,
    store: &dyn SignatureStore,
) -> Result<(Vec<SamplePair>, HashMap<TestId, DumpSignature>)> {
    let mut signatures = HashMap::new();
    let mut missing = vec![];
    for pair in &pairs {
        for test_id in &pair.test_ids {
            if signatures.contains_key(test_id) || missing.contains(test_id) {
                continue;
            }
            match store.read(test_id)? {
                Some(record) => {
                    signatures.insert(test_id.clone(), record.signature()?);
                }
                None => missing.push(test_id.clone()),
            }
        }
    }
    if !missing.is_empty() {
        warn!(count = missing.len(), "test cases without a stored signature");
    }
    let pairs = pairs
        .into_iter()
        .filter(|pair| pair.test_ids.iter().all(|test_id| signatures.contains_key(test_id)))
        .collect();
    Ok((pairs, signatures))
}

impl Calibrator {
    pub fn grid(&self) -> Vec<ModelParams> {
        let n_values = self.n_axis.values();
        self.m_axis
            .values()
            .into_iter()
            .flat_map(|m| n_values.iter().map(move |&n| ModelParams::new(m, n)))
            .collect()
    }

    /// Runs the grid search, commits the best parameters to `sink` and
    /// reports the misclassified pairs at the chosen threshold.
    pub fn calibrate(
        &self,
        pairs: &[SamplePair],
        signatures: &HashMap<TestId, DumpSignature>,
        sink: &mut dyn ParamsSink,
    ) -> Result<Calibration> {
        let labels: Vec<Label> = pairs.iter().map(|pair| pair.label).collect();
        let positives = positives_count(&labels);
        if positives == 0 || positives == labels.len() {
            return Err(Error::InsufficientData(format!(
                "calibration needs positive and negative pairs, got {positives} of {}",
                labels.len()
            )));
        }

        let aligned: Vec<AlignedPair> = pairs
            .par_iter()
            .map(|pair| {
                let [a, b] = pair.test_ids.each_ref().map(|test_id| {
                    signatures
                        .get(test_id)
                        .ok_or_else(|| Error::InsufficientData(format!("no signature for test case {test_id}")))
                });
                Ok(AlignedPair::new([a?, b?]))
            })
            .collect::<Result<_>>()?;
        let score_all =
            |params: ModelParams| -> Vec<f64> { aligned.iter().map(|pair| pair.similarity(params)).collect() };

        let grid: Vec<GridPoint> = self
            .grid()
            .into_par_iter()
            .map(|params| GridPoint {
                params,
                average_precision: average_precision(&labels, &score_all(params)),
            })
            .collect();

        let mut best: Option<&GridPoint> = None;
        for point in &grid {
            info!(
                "m={:.1}, n={:.1}, AP={:.3}",
                point.params.m, point.params.n, point.average_precision
            );
            if best.map_or(true, |best| point.average_precision > best.average_precision) {
                best = Some(point);
            }
        }
        let Some(best) = best.cloned() else {
            return Err(Error::InsufficientData("parameter grid is empty".to_owned()));
        };
        info!(m = best.params.m, n = best.params.n, ap = best.average_precision, "selected parameters");
        sink.commit(best.params)?;

        let scores = score_all(best.params);
        let curve = precision_recall_curve(&labels, &scores);
        let Some(threshold) = select_threshold(&curve, self.beta) else {
            return Err(Error::InsufficientData("no scores to threshold".to_owned()));
        };
        info!(threshold, "selected threshold");

        let mut false_positives = vec![];
        let mut false_negatives = vec![];
        for (pair, &score) in pairs.iter().zip(&scores) {
            match pair.label {
                Label::Negative if score >= threshold => false_positives.push(pair.clone()),
                Label::Positive if score < threshold => false_negatives.push(pair.clone()),
                _ => {}
            }
        }

        Ok(Calibration {
            params: best.params,
            average_precision: best.average_precision,
            grid,
            threshold,
            false_positives,
            false_negatives,
        })
    }
}
