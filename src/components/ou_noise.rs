use {
    candle_core::{
        DType,
        Device,
        Result,
        Tensor,
    },
    rand::{
        rngs::StdRng,
        Rng,
    },
    rand_distr::StandardNormal,
};

/// Discrete-time Ornstein-Uhlenbeck process.
///
/// Every call to [`OuNoise::sample`] advances one shared state by
/// `x <- x + theta * (mu - x) + sigma * eps` with `eps ~ N(0, I)`.
pub struct OuNoise {
    mu: Tensor,
    theta: f64,
    sigma: f64,
    state: Tensor,
    rng: StdRng,
}
impl OuNoise {
    pub fn new(
        mu: f64,
        theta: f64,
        sigma: f64,
        size_action: usize,
        device: &Device,
        rng: StdRng,
    ) -> Result<Self> {
        let mu = Tensor::full(mu, size_action, device)?;
        Ok(Self {
            state: mu.copy()?,
            mu,
            theta,
            sigma,
            rng,
        })
    }

    /// Reset the internal state to (an independent copy of) the mean.
    pub fn reset(&mut self) -> Result<()> {
        self.state = self.mu.copy()?;
        Ok(())
    }

    /// Advance the process by one step and return the new state.
    pub fn sample(&mut self) -> Result<Tensor> {
        let size = self.state.dim(0)?;
        let eps: Vec<f64> = (0..size)
            .map(|_| self.rng.sample(StandardNormal))
            .collect();
        let eps = Tensor::from_vec(eps, size, self.state.device())?;

        let reversion = (&self.mu - &self.state)?.affine(self.theta, 0.0)?;
        let diffusion = eps.affine(self.sigma, 0.0)?;
        let dx = (reversion + diffusion)?;
        self.state = (&self.state + dx)?;
        Ok(self.state.clone())
    }

    /// Advance the process `n` times and stack the states into an `(n, A)`
    /// tensor.
    ///
    /// The rows are successive, autocorrelated states of this one process,
    /// not `n` independent processes.
    pub fn sample_batch(
        &mut self,
        n: usize,
    ) -> Result<Tensor> {
        let rows = (0..n)
            .map(|_| self.sample())
            .collect::<Result<Vec<Tensor>>>()?;
        if rows.is_empty() {
            return Tensor::zeros((0, self.mu.dim(0)?), DType::F64, self.mu.device());
        }
        Tensor::stack(&rows, 0)
    }

    pub fn state(&self) -> &Tensor {
        &self.state
    }

    pub fn mu(&self) -> &Tensor {
        &self.mu
    }
}
