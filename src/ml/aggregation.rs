// Sparse per-document aggregation.
//
// Each row holds K (score, document index) pairs, e.g. the best
// matching token scores of a query token against an inverted index.
// The scores are reduced per document bucket with a minimum:
//
//   scores   [N, K]     ─┐
//   indices  [N, K]     ─┼─▶ one-hot [N, K, M] ─▶ masked min over K ─▶ [N, M]
//   buckets  0..M       ─┘
//
// A bucket nobody maps to is NaN: "no evidence", never 0.
// The dense one-hot costs O(N·K·M) memory.

use burn::prelude::*;

/// Minimum score per (row, bucket). `num_docs` fixes M, otherwise
/// M = max(doc_indices) + 1. Indices outside `[0, M)` are ignored.
///
/// Memory: the one-hot expansion materialises N·K·M elements, so
/// callers with a large document space should pass a bounded
/// `num_docs` or split `token_scores` into row chunks.
pub fn sparse_doc_aggregation<B: Backend>(
    token_scores: Tensor<B, 2>,
    doc_indices:  Tensor<B, 2, Int>,
    num_docs:     Option<usize>,
) -> Tensor<B, 2> {
    let [rows, k] = token_scores.dims();
    let device = token_scores.device();

    let m = match num_docs {
        Some(m) => m,
        None if k == 0 => 0,
        None => {
            let max: i64 = doc_indices.clone().max().into_scalar().elem();
            usize::try_from(max + 1).unwrap_or(0)
        }
    };
    if k == 0 || m == 0 || rows == 0 {
        return Tensor::full([rows, m], f32::NAN, &device);
    }

    let buckets = Tensor::<B, 1, Int>::arange(0..m as i64, &device)
        .reshape([1, 1, m])
        .expand([rows, k, m]);
    let hits = doc_indices
        .unsqueeze_dim::<3>(2)
        .expand([rows, k, m])
        .equal(buckets); // [N, K, M]

    let minimum = token_scores
        .unsqueeze_dim::<3>(2)
        .expand([rows, k, m])
        .mask_fill(hits.clone().bool_not(), f32::INFINITY)
        .min_dim(1)
        .squeeze::<2>(1);

    let missing = hits.int().sum_dim(1).squeeze::<2>(1).equal_elem(0);
    minimum.mask_fill(missing, f32::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn run(scores: Vec<f32>, indices: Vec<i32>, shape: [usize; 2], m: Option<usize>) -> (Vec<f32>, [usize; 2]) {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 2>::from_data(TensorData::new(scores, shape), &device);
        let indices = Tensor::<TestBackend, 1, Int>::from_ints(indices.as_slice(), &device).reshape(shape);
        let out = sparse_doc_aggregation(scores, indices, m);
        let dims = out.dims();
        (out.into_data().to_vec::<f32>().unwrap(), dims)
    }

    fn brute_force(scores: &[f32], indices: &[i32], k: usize, m: usize) -> Vec<f32> {
        let rows = scores.len() / k.max(1);
        let mut out = vec![f32::NAN; rows * m];
        for i in 0..rows {
            for j in 0..k {
                let bucket = indices[i * k + j];
                if bucket < 0 || bucket as usize >= m {
                    continue;
                }
                let cell = &mut out[i * m + bucket as usize];
                let score = scores[i * k + j];
                if cell.is_nan() || score < *cell {
                    *cell = score;
                }
            }
        }
        out
    }

    fn assert_same(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            if e.is_nan() {
                assert!(a.is_nan(), "expected NaN, got {a}");
            } else {
                assert!((a - e).abs() < 1e-6, "expected {e}, got {a}");
            }
        }
    }

    #[test]
    fn test_minimum_per_bucket() {
        let (values, dims) = run(vec![5.0, 3.0, 9.0], vec![1, 1, 0], [1, 3], Some(2));
        assert_eq!(dims, [1, 2]);
        assert_eq!(values, vec![9.0, 3.0]);
    }

    #[test]
    fn test_matches_brute_force() {
        let scores = vec![
            0.3, -1.0, 2.5, 0.0, 4.0,
            1.0, 1.0, 7.0, -2.0, 0.5,
            3.0, 2.0, 1.0, 0.0, -1.0,
        ];
        let indices = vec![
            0, 3, 3, 1, 0,
            2, 2, 2, 2, 2,
            4, -1, 1, 4, 9,
        ];
        let (values, dims) = run(scores.clone(), indices.clone(), [3, 5], Some(5));
        assert_eq!(dims, [3, 5]);
        assert_same(&values, &brute_force(&scores, &indices, 5, 5));
    }

    #[test]
    fn test_bucket_count_inferred_from_indices() {
        let (values, dims) = run(vec![1.0, 2.0, 0.5, 4.0], vec![0, 2, 2, 0], [2, 2], None);
        assert_eq!(dims, [2, 3]);
        assert_same(&values, &[1.0, f32::NAN, 2.0, 4.0, f32::NAN, 0.5]);
    }

    #[test]
    fn test_identical_indices_collapse_to_one_bucket() {
        let (values, _) = run(vec![4.0, 2.0, 8.0], vec![1, 1, 1], [1, 3], Some(3));
        assert_same(&values, &[f32::NAN, 2.0, f32::NAN]);
    }

    #[test]
    fn test_zero_width_rows_are_all_missing() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 2>::zeros([2, 0], &device);
        let indices = Tensor::<TestBackend, 2, Int>::zeros([2, 0], &device);
        let out = sparse_doc_aggregation(scores, indices, Some(3));
        assert_eq!(out.dims(), [2, 3]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_zero_score_is_not_missing() {
        let (values, _) = run(vec![0.0, 0.0], vec![0, 0], [1, 2], Some(2));
        assert_eq!(values[0], 0.0);
        assert!(values[1].is_nan());
    }
}
