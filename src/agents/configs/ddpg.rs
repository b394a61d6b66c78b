use serde::{
    Deserialize,
    Serialize,
};


#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DDPG_Config {
    // The learning rates for the Actor and Critic networks.
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    // L2 weight decay on the Critic's optimizer.
    pub critic_weight_decay: f64,
    // Maximum global gradient norm for the Critic update.
    pub critic_max_grad_norm: f64,
    // The impact of the q value of the next state on the current state's q value.
    pub gamma: f64,
    // The weight for updating the target networks.
    pub tau: f64,
    // The number of neurons in the hidden layers of the Actor and Critic networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // The training batch size for each training iteration.
    pub training_batch_size: usize,
    // Learn on every n-th call to `ingest`.
    pub learn_every: usize,
    // The number of updates performed each time learning is due.
    pub iterations_per_learn: usize,
    // Ornstein-Uhlenbeck process parameters.
    pub ou_mu: f64,
    pub ou_theta: f64,
    pub ou_sigma: f64,
}
impl Default for DDPG_Config {
    fn default() -> Self {
        Self::tennis()
    }
}
impl DDPG_Config {
    /// Settings for the two-player tennis task.
    pub fn tennis() -> Self {
        Self {
            actor_learning_rate: 1e-3,
            critic_learning_rate: 1e-3,
            critic_weight_decay: 0.0,
            critic_max_grad_norm: 1.0,
            gamma: 0.99,
            tau: 0.15,
            hidden_1_size: 256,
            hidden_2_size: 128,
            replay_buffer_capacity: 100_000,
            training_batch_size: 514,
            learn_every: 10,
            iterations_per_learn: 10,
            ou_mu: 0.0,
            ou_theta: 0.15,
            ou_sigma: 0.2,
        }
    }
}

