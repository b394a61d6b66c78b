use candle_core::{
    bail,
    DType,
    Result,
    Tensor,
};

/// Turns a batch of raw observations into a batch of agent states.
///
/// The output keeps the row count of the input; the column count is
/// whatever [`FeatureExtractor::estimate_state_size`] reports for the raw
/// observation width.
pub trait FeatureExtractor {
    fn estimate_state_size(
        &self,
        size_observation: usize,
    ) -> usize;

    fn extract_states(
        &self,
        observations: &Tensor,
    ) -> Result<Tensor>;
}

fn check_batch(observations: &Tensor) -> Result<(usize, usize)> {
    if observations.rank() != 2 {
        bail!(
            "expected a (rows, features) observation batch, got shape {:?}",
            observations.dims(),
        )
    }
    observations.dims2()
}

/// Passes observations through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityExtractor;

impl FeatureExtractor for IdentityExtractor {
    fn estimate_state_size(
        &self,
        size_observation: usize,
    ) -> usize {
        size_observation
    }

    fn extract_states(
        &self,
        observations: &Tensor,
    ) -> Result<Tensor> {
        check_batch(observations)?;
        observations.to_dtype(DType::F64)
    }
}

/// Appends a one-hot perspective block to every row.
///
/// In a symmetric multi-agent game two agents can receive mirrored, and
/// therefore identical, observations. Row `i` of a batch is the observation of
/// agent `i`, so tagging it with a one-hot `i` lets a shared policy tell the
/// agents apart.
#[derive(Clone, Copy, Debug)]
pub struct PerspectiveExtractor {
    perspectives: usize,
}

impl PerspectiveExtractor {
    pub fn new(perspectives: usize) -> Self {
        Self { perspectives }
    }

    pub fn perspectives(&self) -> usize {
        self.perspectives
    }
}

impl FeatureExtractor for PerspectiveExtractor {
    fn estimate_state_size(
        &self,
        size_observation: usize,
    ) -> usize {
        size_observation + self.perspectives
    }

    fn extract_states(
        &self,
        observations: &Tensor,
    ) -> Result<Tensor> {
        let (rows, _) = check_batch(observations)?;
        if rows != self.perspectives {
            bail!(
                "expected one observation row per perspective ({}), got {rows}",
                self.perspectives,
            )
        }
        let one_hot: Vec<f64> = (0..rows * rows)
            .map(|k| if k / rows == k % rows { 1.0 } else { 0.0 })
            .collect();
        let one_hot = Tensor::from_vec(one_hot, (rows, rows), observations.device())?;
        Tensor::cat(&[&observations.to_dtype(DType::F64)?, &one_hot], 1)
    }
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        candle_core::Device,
    };

    #[test]
    fn identity_keeps_values() {
        let obs = Tensor::new(&[[1.0f64, 2.0], [3.0, 4.0]], &Device::Cpu).unwrap();
        let states = IdentityExtractor.extract_states(&obs).unwrap();
        assert_eq!(IdentityExtractor.estimate_state_size(2), 2);
        assert_eq!(
            states.to_vec2::<f64>().unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        );
    }

    #[test]
    fn perspectives_disambiguate_identical_rows() {
        let extractor = PerspectiveExtractor::new(2);
        let obs = Tensor::new(&[[0.5f64, -0.5], [0.5, -0.5]], &Device::Cpu).unwrap();
        let states = extractor.extract_states(&obs).unwrap();
        assert_eq!(extractor.perspectives(), 2);
        assert_eq!(extractor.estimate_state_size(2), 2 + extractor.perspectives());
        assert_eq!(
            states.to_vec2::<f64>().unwrap(),
            vec![vec![0.5, -0.5, 1.0, 0.0], vec![0.5, -0.5, 0.0, 1.0]],
        );
    }

    #[test]
    fn rejects_flat_observations() {
        let obs = Tensor::new(&[1.0f64, 2.0], &Device::Cpu).unwrap();
        assert!(IdentityExtractor.extract_states(&obs).is_err());
        assert!(PerspectiveExtractor::new(2).extract_states(&obs).is_err());
    }

    #[test]
    fn rejects_wrong_number_of_perspectives() {
        let obs = Tensor::new(&[[1.0f64, 2.0], [3.0, 4.0], [5.0, 6.0]], &Device::Cpu).unwrap();
        assert!(PerspectiveExtractor::new(2).extract_states(&obs).is_err());
    }
}
