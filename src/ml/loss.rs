// Ranking losses over a flattened batch of document scores.
//
// Scores and targets are [total_docs], grouped per query by
// `num_docs` exactly like RankingBatch::doc_ids.
//
//   ranknet     for every pair (i, j) of one query with
//               target_i > target_j:  log(1 + exp(-(s_i - s_j)))
//   margin_mse  2-document samples only:
//               ((s_a - s_b) - (t_a - t_b))^2

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use crate::domain::error::{RankingError, RankingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    RankNet,
    MarginMse,
}

impl FromStr for LossFunction {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranknet" => Ok(Self::RankNet),
            "margin_mse" => Ok(Self::MarginMse),
            other => Err(RankingError::config(format!("unknown loss function '{other}'"))),
        }
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RankNet => "ranknet",
            Self::MarginMse => "margin_mse",
        })
    }
}

impl LossFunction {
    /// Mean loss over the batch as a single-element tensor.
    pub fn compute<B: Backend>(
        &self,
        scores:   Tensor<B, 1>,
        targets:  Tensor<B, 1>,
        num_docs: &[usize],
    ) -> RankingResult<Tensor<B, 1>> {
        let total: usize = num_docs.iter().sum();
        if scores.dims()[0] != total || targets.dims()[0] != total {
            return Err(RankingError::config(format!(
                "loss got {} scores and {} targets for {total} documents",
                scores.dims()[0],
                targets.dims()[0]
            )));
        }
        match self {
            Self::RankNet => ranknet(scores, targets, num_docs),
            Self::MarginMse => margin_mse(scores, targets, num_docs),
        }
    }
}

fn ranknet<B: Backend>(
    scores:   Tensor<B, 1>,
    targets:  Tensor<B, 1>,
    num_docs: &[usize],
) -> RankingResult<Tensor<B, 1>> {
    let values = targets
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| RankingError::config(format!("cannot read targets: {e:?}")))?;

    // Ordered pairs (better, worse) inside each query
    let mut better = Vec::new();
    let mut worse = Vec::new();
    let mut start = 0usize;
    for &count in num_docs {
        for i in start..start + count {
            for j in start..start + count {
                if values[i] > values[j] {
                    better.push(i as i32);
                    worse.push(j as i32);
                }
            }
        }
        start += count;
    }

    if better.is_empty() {
        // Nothing to compare: zero loss that still belongs to the graph
        return Ok(scores.sum().mul_scalar(0.0));
    }

    let device = scores.device();
    let better = Tensor::<B, 1, Int>::from_ints(better.as_slice(), &device);
    let worse = Tensor::<B, 1, Int>::from_ints(worse.as_slice(), &device);
    let diff = scores.clone().select(0, better) - scores.select(0, worse);

    // log(1 + exp(-x)) = relu(-x) + log(1 + exp(-|x|))
    let loss = relu(diff.clone().neg()) + diff.abs().neg().exp().log1p();
    Ok(loss.mean())
}

fn margin_mse<B: Backend>(
    scores:   Tensor<B, 1>,
    targets:  Tensor<B, 1>,
    num_docs: &[usize],
) -> RankingResult<Tensor<B, 1>> {
    if num_docs.iter().any(|&n| n != 2) {
        return Err(RankingError::config(
            "margin_mse needs exactly two documents per query",
        ));
    }
    let pairs = num_docs.len();
    let scores = scores.reshape([pairs, 2]);
    let targets = targets.reshape([pairs, 2]);

    let margin = |t: Tensor<B, 2>| {
        t.clone().slice([0..pairs, 0..1]) - t.slice([0..pairs, 1..2])
    };
    let error = margin(scores) - margin(targets);
    Ok(error.powf_scalar(2.0).mean())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn tensor(values: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn test_ranknet_matches_hand_computation() {
        // one pair per query: diffs 1.0 and -2.0
        let loss = LossFunction::RankNet
            .compute(tensor(&[2.0, 1.0, 0.0, 2.0]), tensor(&[1.0, 0.0, 1.0, 0.0]), &[2, 2])
            .unwrap();
        let expected = ((1.0f32 + (-1.0f32).exp()).ln() + (1.0f32 + 2.0f32.exp()).ln()) / 2.0;
        assert!((scalar(loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_ranknet_ignores_pairs_across_queries() {
        // the only ordered pair lies inside query 2
        let loss = LossFunction::RankNet
            .compute(tensor(&[5.0, 0.0, 3.0]), tensor(&[9.0, 1.0, 0.0]), &[1, 2])
            .unwrap();
        let expected = (1.0f32 + 3.0f32.exp()).ln();
        assert!((scalar(loss) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_ranknet_without_pairs_is_zero() {
        let loss = LossFunction::RankNet
            .compute(tensor(&[1.0, 2.0]), tensor(&[0.0, 0.0]), &[2])
            .unwrap();
        assert_eq!(scalar(loss), 0.0);
    }

    #[test]
    fn test_margin_mse() {
        // margins: (3-1)=2 vs 1 → 1;  (0-0)=0 vs 0.6 → 0.36
        let loss = LossFunction::MarginMse
            .compute(tensor(&[3.0, 1.0, 0.0, 0.0]), tensor(&[1.0, 0.0, 0.8, 0.2]), &[2, 2])
            .unwrap();
        assert!((scalar(loss) - 0.68).abs() < 1e-5);
    }

    #[test]
    fn test_margin_mse_rejects_listwise_samples() {
        let result = LossFunction::MarginMse.compute(tensor(&[1.0, 2.0, 3.0]), tensor(&[1.0, 0.0, 0.0]), &[3]);
        assert!(matches!(result, Err(RankingError::Config(_))));
    }

    #[test]
    fn test_ranknet_has_gradients() {
        let device = Default::default();
        let scores = Tensor::<Autodiff<NdArray>, 1>::from_floats([1.0, 0.0], &device).require_grad();
        let targets = Tensor::<Autodiff<NdArray>, 1>::from_floats([1.0, 0.0], &device);
        let loss = LossFunction::RankNet.compute(scores.clone(), targets, &[2]).unwrap();
        let grads = loss.backward();
        let grad = scores.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        // d/ds_a log(1+exp(-(a-b))) = -sigmoid(-(a-b))
        let expected = 1.0 / (1.0 + 1.0f32.exp());
        assert!((grad[0] + expected).abs() < 1e-5);
        assert!((grad[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_names() {
        assert_eq!("margin_mse".parse::<LossFunction>().unwrap(), LossFunction::MarginMse);
        assert_eq!(LossFunction::RankNet.to_string(), "ranknet");
    }
}
