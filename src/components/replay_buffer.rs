use {
    candle_core::{
        Result,
        Tensor,
    },
    rand::{
        rngs::StdRng,
        seq::index,
    },
    std::collections::VecDeque,
    unzip_n::unzip_n,
};

unzip_n!(5);

/// A transition in the replay buffer.
///
/// Transitions are never mutated once pushed; the buffer only hands out
/// shared references or clones of the underlying tensors.
///
/// # Fields
///
/// * `state` - The (extracted) state, shape `(size_state,)`.
/// * `action` - The action taken, shape `(size_action,)`.
/// * `reward` - The reward received, shape `(1,)`.
/// * `next_state` - The (extracted) next state, shape `(size_state,)`.
/// * `done` - `1.0` for a terminal transition and `0.0` otherwise, shape `(1,)`.
#[derive(Clone, Debug)]
pub struct Transition {
    state: Tensor,
    action: Tensor,
    reward: Tensor,
    next_state: Tensor,
    done: Tensor,
}
impl Transition {
    pub fn new(
        state: &Tensor,
        action: &Tensor,
        reward: &Tensor,
        next_state: &Tensor,
        done: &Tensor,
    ) -> Self {
        Self {
            state: state.clone(),
            action: action.clone(),
            reward: reward.clone(),
            next_state: next_state.clone(),
            done: done.clone(),
        }
    }

    pub fn state(&self) -> &Tensor {
        &self.state
    }

    pub fn action(&self) -> &Tensor {
        &self.action
    }

    pub fn reward(&self) -> &Tensor {
        &self.reward
    }

    pub fn next_state(&self) -> &Tensor {
        &self.next_state
    }

    pub fn done(&self) -> &Tensor {
        &self.done
    }
}

/// A minibatch of transitions, decomposed into row-aligned tensors.
///
/// Row `i` of every field belongs to the same source transition. Rewards and
/// dones are columns of shape `(batch_size, 1)` so they line up with the
/// critic output.
#[derive(Clone, Debug)]
pub struct Minibatch {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub next_states: Tensor,
    pub dones: Tensor,
}

/// A fixed-capacity replay buffer for off-policy algorithms.
///
/// The replay buffer is implemented as a simple ring buffer / VecDeque with
/// strict FIFO eviction, and owns the random source it samples with.
///
/// # Fields
///
/// * `buffer` - The buffer of transitions, oldest first.
/// * `capacity` - The capacity of the buffer.
/// * `rng` - The random source used for sampling.
#[derive(Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
    rng: StdRng,
}
impl ReplayBuffer {
    /// Create a new replay buffer with the given capacity.
    pub fn new(
        capacity: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if the buffer is full.
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over the stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Push a transition into the buffer.
    ///
    /// If the buffer is full, the oldest transition is removed to make room for
    /// the new transition.
    pub fn push(
        &mut self,
        transition: Transition,
    ) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Sample `batch_size` distinct transitions uniformly at random.
    ///
    /// # Panics
    ///
    /// The caller must ensure `batch_size <= self.len()`. Asking for more
    /// transitions than are stored panics inside the index sampler.
    pub fn sample(
        &mut self,
        batch_size: usize,
    ) -> Result<Minibatch> {
        let transition_to_tuple =
            |t: &Transition| -> Result<(Tensor, Tensor, Tensor, Tensor, Tensor)> {
                Ok((
                    t.state.unsqueeze(0)?,
                    t.action.unsqueeze(0)?,
                    t.reward.unsqueeze(0)?,
                    t.next_state.unsqueeze(0)?,
                    t.done.unsqueeze(0)?,
                ))
            };

        let (states, actions, rewards, next_states, dones) =
            index::sample(&mut self.rng, self.buffer.len(), batch_size)
                .into_iter()
                .map(|i| transition_to_tuple(&self.buffer[i]))
                .collect::<Result<Vec<(Tensor, Tensor, Tensor, Tensor, Tensor)>>>()?
                .into_iter()
                .unzip_n_vec();

        Ok(Minibatch {
            states: Tensor::cat(&states, 0)?,
            actions: Tensor::cat(&actions, 0)?,
            rewards: Tensor::cat(&rewards, 0)?,
            next_states: Tensor::cat(&next_states, 0)?,
            dones: Tensor::cat(&dones, 0)?,
        })
    }
}
