//! # Components
//!
//! This module contains the components that the agent is built from.
//!
//! ## Noise
//!
//! The [`OuNoise`] struct implements the Ornstein-Uhlenbeck process, which is
//! added to the actions of the [`crate::agents::DDPG`] algorithm while it
//! explores.
//!
//! ## Replay Buffer
//!
//! The [`ReplayBuffer`] struct implements a fixed-capacity FIFO replay buffer
//! with uniform sampling without replacement.
//!
//! ## Features
//!
//! A [`FeatureExtractor`] turns raw observations into agent states before they
//! reach the networks or the replay buffer.

mod features;
mod ou_noise;
mod replay_buffer;

pub use features::{
    FeatureExtractor,
    IdentityExtractor,
    PerspectiveExtractor,
};
pub use ou_noise::OuNoise;
pub use replay_buffer::{
    Minibatch,
    ReplayBuffer,
    Transition,
};
