// Scoring masks decide which vectors of an encoded text take part
// in similarity scoring.
//
//   pooled text    → every pooled vector is scored, the mask is
//                    all-true with one column per viewer token
//   token-level    → padding and configured token ids are masked

use burn::prelude::*;

use crate::data::batcher::BatchEncoding;
use crate::ml::config::{MvrConfig, PoolingStrategy};

impl MvrConfig {
    /// Boolean mask of shape [batch, seq_len] (token-level) or
    /// [batch, num_viewer_tokens] (pooled).
    pub fn scoring_mask<B: Backend>(
        &self,
        encoding: &BatchEncoding<B>,
        pooling:  Option<PoolingStrategy>,
    ) -> Tensor<B, 2, Bool> {
        let [batch, _] = encoding.input_ids.dims();
        let device = encoding.input_ids.device();

        if pooling.is_some() {
            return Tensor::<B, 2, Int>::ones([batch, self.pooled_vectors()], &device)
                .equal_elem(1);
        }
        token_validity_mask(encoding, &self.mask_scoring_input_ids)
    }
}

/// Attention mask with `masked_ids` removed.
pub fn token_validity_mask<B: Backend>(
    encoding:   &BatchEncoding<B>,
    masked_ids: &[i64],
) -> Tensor<B, 2, Bool> {
    let mut valid = encoding.attention_mask.clone();
    for &id in masked_ids {
        let hit = encoding.input_ids.clone().equal_elem(id);
        valid = valid.mask_fill(hit, 0);
    }
    valid.equal_elem(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn encoding() -> BatchEncoding<TestBackend> {
        BatchEncoding::from_rows(&[vec![2, 4, 10, 11, 12, 13], vec![2, 4, 10]], &Default::default())
    }

    #[test]
    fn test_pooled_mask_has_one_column_per_viewer_token() {
        let config = MvrConfig::new().with_num_viewer_tokens(Some(4));
        let mask = config.scoring_mask(&encoding(), Some(PoolingStrategy::First));
        assert_eq!(mask.dims(), [2, 4]);
        let values = mask.into_data().to_vec::<bool>().unwrap();
        assert!(values.iter().all(|&v| v));
    }

    #[test]
    fn test_pooled_mask_defaults_to_one_vector() {
        let config = MvrConfig::new();
        let mask = config.scoring_mask(&encoding(), Some(PoolingStrategy::Mean));
        assert_eq!(mask.dims(), [2, 1]);
    }

    #[test]
    fn test_token_mask_excludes_padding_and_listed_ids() {
        let config = MvrConfig::new().with_mask_scoring_input_ids(vec![11]);
        let mask = config.scoring_mask(&encoding(), None);
        assert_eq!(mask.dims(), [2, 6]);
        let values = mask.into_data().to_vec::<bool>().unwrap();
        assert_eq!(values, vec![
            true, true, true, false, true, true,
            true, true, true, false, false, false,
        ]);
    }
}
