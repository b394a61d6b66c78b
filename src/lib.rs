//! The learning core of a DDPG agent for multi-agent continuous control.
//!
//! An episode driver feeds raw observations to [`agents::DDPG`] through
//! [`agents::Algorithm::choose_action`] and hands every resulting transition
//! back through [`agents::OffPolicyAlgorithm::ingest`], which stores it in the
//! [`components::ReplayBuffer`] and runs the actor-critic update on a fixed
//! cadence.

pub mod logging;
pub mod util;

pub mod components;
pub mod agents;
