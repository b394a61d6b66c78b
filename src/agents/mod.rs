pub mod configs;
mod ddpg;
pub mod networks;

pub use configs::DDPG_Config;
pub use ddpg::{
    UpdateStats,
    DDPG,
};


use {
    crate::components::{
        FeatureExtractor,
        ReplayBuffer,
    },
    candle_core::{
        Device,
        Result,
        Tensor,
    },
    std::path::Path,
};


pub trait Algorithm {
    type Config;

    fn config(&self) -> &Self::Config;
    fn from_config(
        device: &Device,
        config: &Self::Config,
        size_observation: usize,
        size_action: usize,
        seed: u64,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Result<Box<Self>>;

    /// Actions for a `(rows, size_observation)` batch of raw observations,
    /// clipped to `[-1, 1]`. Exploration noise is added when `explore` is set.
    fn choose_action(
        &mut self,
        observations: &Tensor,
        explore: bool,
    ) -> Result<Tensor>;

    /// Called at episode boundaries.
    fn reset(&mut self) -> Result<()>;
}

pub trait OffPolicyAlgorithm: Algorithm {
    /// Store one transition per row and learn when the schedule says so.
    fn ingest(
        &mut self,
        observations: &Tensor,
        actions: &Tensor,
        rewards: &Tensor,
        next_observations: &Tensor,
        dones: &Tensor,
    ) -> Result<()>;

    fn replay_buffer(&self) -> &ReplayBuffer;
}

pub trait SaveableAlgorithm {
    fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
        name: &str,
    ) -> Result<()>;

    /// Returns `false`, leaving the current parameters in place, when the
    /// checkpoint does not exist. A checkpoint that cannot be read in full is
    /// an error and also leaves the parameters in place.
    fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
        name: &str,
    ) -> Result<bool>;
}
