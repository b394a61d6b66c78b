use {
    super::{
        configs::DDPG_Config,
        networks::{
            clip_grad_norm,
            Actor,
            Critic,
        },
        Algorithm,
        OffPolicyAlgorithm,
        SaveableAlgorithm,
    },
    crate::components::{
        FeatureExtractor,
        Minibatch,
        OuNoise,
        ReplayBuffer,
        Transition,
    },
    candle_core::{
        backprop::GradStore,
        bail,
        DType,
        Device,
        Result,
        Tensor,
    },
    candle_nn::{
        AdamW,
        Optimizer,
        ParamsAdamW,
    },
    rand::{
        rngs::StdRng,
        Rng,
        SeedableRng,
    },
    std::path::{
        Path,
        PathBuf,
    },
    tracing::{
        debug,
        info,
        warn,
    },
};

const CHECKPOINT_PARTS: [&str; 4] = [
    "policy_local",
    "policy_target",
    "critic_local",
    "critic_target",
];

fn checkpoint_file<P: AsRef<Path> + ?Sized>(
    path: &P,
    name: &str,
    part: &str,
) -> PathBuf {
    path.as_ref().join(format!("{name}_{part}.safetensors"))
}

/// The losses of a single update.
#[derive(Clone, Copy, Debug)]
pub struct UpdateStats {
    pub critic_loss: f64,
    pub actor_loss: f64,
    /// Global norm of the critic gradients before clipping.
    pub critic_grad_norm: f64,
}

/// Deep Deterministic Policy Gradient.
///
/// Owns four independently initialized parameter sets (policy and critic,
/// each as a local and a target copy), one optimizer per local network, the
/// exploration noise and the replay buffer.
///
/// Learning is driven by [`OffPolicyAlgorithm::ingest`]: every call counts as
/// one step, and on every `learn_every`-th step, once the buffer holds more
/// than `training_batch_size` transitions, `iterations_per_learn` updates are
/// run back to back.
#[allow(clippy::upper_case_acronyms)]
pub struct DDPG {
    actor: Actor,
    actor_target: Actor,
    actor_optim: AdamW,
    critic: Critic,
    critic_target: Critic,
    critic_optim: AdamW,
    replay_buffer: ReplayBuffer,
    ou_noise: OuNoise,
    extractor: Box<dyn FeatureExtractor>,
    config: DDPG_Config,

    size_observation: usize,
    size_state: usize,
    size_action: usize,
    step_count: usize,
    updates: usize,
}

impl DDPG {
    pub fn new(
        device: &Device,
        config: DDPG_Config,
        size_observation: usize,
        size_action: usize,
        seed: u64,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Result<Self> {
        if config.learn_every == 0 {
            bail!("learn_every must be at least 1")
        }
        let size_state = extractor.estimate_state_size(size_observation);

        // One stream per consumer of randomness, all derived from the seed.
        let mut rng = StdRng::seed_from_u64(seed);
        let mut child = || StdRng::seed_from_u64(rng.gen());

        let actor_dims = [
            (size_state, config.hidden_1_size),
            (config.hidden_1_size, config.hidden_2_size),
            (config.hidden_2_size, size_action),
        ];
        let actor = Actor::new(device, &actor_dims, &mut child())?;
        let actor_target = Actor::new(device, &actor_dims, &mut child())?;
        let actor_optim = AdamW::new(
            actor.vars(),
            ParamsAdamW {
                lr: config.actor_learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let critic_dims = [
            (size_state + size_action, config.hidden_1_size),
            (config.hidden_1_size, config.hidden_2_size),
            (config.hidden_2_size, 1),
        ];
        let critic = Critic::new(device, &critic_dims, &mut child())?;
        let critic_target = Critic::new(device, &critic_dims, &mut child())?;
        let critic_optim = AdamW::new(
            critic.vars(),
            ParamsAdamW {
                lr: config.critic_learning_rate,
                weight_decay: config.critic_weight_decay,
                ..Default::default()
            },
        )?;

        let ou_noise = OuNoise::new(
            config.ou_mu,
            config.ou_theta,
            config.ou_sigma,
            size_action,
            device,
            child(),
        )?;
        let replay_buffer = ReplayBuffer::new(config.replay_buffer_capacity, child());

        info!(
            "DDPG agent with observation size {size_observation}, state size {size_state}, action size {size_action} on {device:?}"
        );

        Ok(Self {
            actor,
            actor_target,
            actor_optim,
            critic,
            critic_target,
            critic_optim,
            replay_buffer,
            ou_noise,
            extractor,
            config,
            size_observation,
            size_state,
            size_action,
            step_count: 0,
            updates: 0,
        })
    }

    pub fn size_state(&self) -> usize {
        self.size_state
    }

    pub fn size_action(&self) -> usize {
        self.size_action
    }

    /// The number of `ingest` calls so far. Not affected by `reset`.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// The number of completed `update_rule` calls.
    pub fn updates_performed(&self) -> usize {
        self.updates
    }

    pub fn actor(&self) -> (&Actor, &Actor) {
        (&self.actor, &self.actor_target)
    }

    pub fn critic(&self) -> (&Critic, &Critic) {
        (&self.critic, &self.critic_target)
    }

    fn extract(
        &self,
        observations: &Tensor,
    ) -> Result<Tensor> {
        if observations.rank() != 2 {
            bail!(
                "expected a (rows, {}) observation batch, got shape {:?}",
                self.size_observation,
                observations.dims(),
            )
        }
        let (_, width) = observations.dims2()?;
        if width != self.size_observation {
            bail!(
                "expected observations with {} features, got {width}",
                self.size_observation,
            )
        }
        let states = self.extractor.extract_states(observations)?;
        let (_, width) = states.dims2()?;
        if width != self.size_state {
            bail!(
                "feature extractor produced {width} features, expected {}",
                self.size_state,
            )
        }
        Ok(states)
    }

    /// Bootstrapped targets `r + gamma * Q'(s', mu'(s')) * (1 - done)`,
    /// detached from the graph.
    pub fn td_targets(
        &self,
        minibatch: &Minibatch,
        gamma: f64,
    ) -> Result<Tensor> {
        let next_actions = self.actor_target.forward(&minibatch.next_states)?;
        let q_next = self
            .critic_target
            .forward(&minibatch.next_states, &next_actions)?;
        let not_done = minibatch.dones.affine(-1.0, 1.0)?;
        let bootstrap = (q_next.affine(gamma, 0.0)? * not_done)?;
        Ok((&minibatch.rewards + bootstrap)?.detach())
    }

    /// Mean squared TD error of the local critic and its gradients, rescaled
    /// to a global norm of at most `critic_max_grad_norm`. The third value is
    /// the norm before rescaling.
    fn critic_gradients(
        &self,
        minibatch: &Minibatch,
        gamma: f64,
    ) -> Result<(Tensor, GradStore, f64)> {
        let q_targets = self.td_targets(minibatch, gamma)?;
        let q = self.critic.forward(&minibatch.states, &minibatch.actions)?;
        let loss = (q - q_targets)?.sqr()?.mean_all()?;
        let mut grads = loss.backward()?;
        let norm = clip_grad_norm(
            &mut grads,
            &self.critic.vars(),
            self.config.critic_max_grad_norm,
        )?;
        Ok((loss, grads, norm))
    }

    /// One DDPG update: critic regression onto the TD targets with clipped
    /// gradients, policy ascent on the critic, then soft updates of both
    /// target networks (critic first).
    pub fn update_rule(
        &mut self,
        minibatch: &Minibatch,
        gamma: f64,
    ) -> Result<UpdateStats> {
        let (critic_loss, grads, critic_grad_norm) = self.critic_gradients(minibatch, gamma)?;
        self.critic_optim.step(&grads)?;

        let actor_loss = self
            .critic
            .forward(&minibatch.states, &self.actor.forward(&minibatch.states)?)?
            .mean_all()?
            .neg()?;
        self.actor_optim.backward_step(&actor_loss)?;

        self.critic_target.track(&self.critic, self.config.tau)?;
        self.actor_target.track(&self.actor, self.config.tau)?;
        self.updates += 1;

        let stats = UpdateStats {
            critic_loss: critic_loss.to_scalar::<f64>()?,
            actor_loss: actor_loss.to_scalar::<f64>()?,
            critic_grad_norm,
        };
        debug!(
            update = self.updates,
            critic_loss = stats.critic_loss,
            actor_loss = stats.actor_loss,
            critic_grad_norm = stats.critic_grad_norm,
            "update finished"
        );
        Ok(stats)
    }
}

impl Algorithm for DDPG {
    type Config = DDPG_Config;

    fn config(&self) -> &DDPG_Config {
        &self.config
    }

    fn from_config(
        device: &Device,
        config: &DDPG_Config,
        size_observation: usize,
        size_action: usize,
        seed: u64,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Result<Box<Self>> {
        Ok(Box::new(Self::new(
            device,
            config.clone(),
            size_observation,
            size_action,
            seed,
            extractor,
        )?))
    }

    fn choose_action(
        &mut self,
        observations: &Tensor,
        explore: bool,
    ) -> Result<Tensor> {
        let states = self.extract(observations)?;
        let actions = self.actor.forward(&states)?.detach();
        let actions = if explore {
            let noise = self.ou_noise.sample_batch(actions.dim(0)?)?;
            (actions + noise)?
        } else {
            actions
        };
        actions.clamp(-1.0, 1.0)
    }

    fn reset(&mut self) -> Result<()> {
        self.ou_noise.reset()
    }
}

impl OffPolicyAlgorithm for DDPG {
    fn ingest(
        &mut self,
        observations: &Tensor,
        actions: &Tensor,
        rewards: &Tensor,
        next_observations: &Tensor,
        dones: &Tensor,
    ) -> Result<()> {
        let states = self.extract(observations)?;
        let next_states = self.extract(next_observations)?;
        let rows = states.dim(0)?;
        if next_states.dim(0)? != rows {
            bail!(
                "observations have {rows} rows but next observations have {}",
                next_states.dim(0)?,
            )
        }
        if actions.dims() != [rows, self.size_action] {
            bail!(
                "expected actions of shape ({rows}, {}), got {:?}",
                self.size_action,
                actions.dims(),
            )
        }
        if rewards.elem_count() != rows || dones.elem_count() != rows {
            bail!(
                "expected one reward and one done flag per row ({rows}), got {} and {}",
                rewards.elem_count(),
                dones.elem_count(),
            )
        }
        let actions = actions.to_dtype(DType::F64)?;
        let rewards = rewards.to_dtype(DType::F64)?.reshape((rows, 1))?;
        let dones = dones.to_dtype(DType::F64)?.reshape((rows, 1))?;

        self.step_count += 1;
        for i in 0..rows {
            self.replay_buffer.push(Transition::new(
                &states.get(i)?,
                &actions.get(i)?,
                &rewards.get(i)?,
                &next_states.get(i)?,
                &dones.get(i)?,
            ));
        }

        let batch_size = self.config.training_batch_size;
        if self.replay_buffer.len() > batch_size
            && self.step_count % self.config.learn_every == 0
        {
            for _ in 0..self.config.iterations_per_learn {
                let minibatch = self.replay_buffer.sample(batch_size)?;
                self.update_rule(&minibatch, self.config.gamma)?;
            }
        }
        Ok(())
    }

    fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }
}

impl SaveableAlgorithm for DDPG {
    fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
        name: &str,
    ) -> Result<()> {
        std::fs::create_dir_all(path.as_ref())?;
        self.actor.save(checkpoint_file(path, name, CHECKPOINT_PARTS[0]))?;
        self.actor_target.save(checkpoint_file(path, name, CHECKPOINT_PARTS[1]))?;
        self.critic.save(checkpoint_file(path, name, CHECKPOINT_PARTS[2]))?;
        self.critic_target.save(checkpoint_file(path, name, CHECKPOINT_PARTS[3]))?;
        info!("Saved checkpoint '{name}' to {:?}", path.as_ref());
        Ok(())
    }

    fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
        name: &str,
    ) -> Result<bool> {
        let missing: Vec<PathBuf> = CHECKPOINT_PARTS
            .iter()
            .map(|part| checkpoint_file(path, name, part))
            .filter(|file| !file.exists())
            .collect();
        if !missing.is_empty() {
            warn!("Checkpoint '{name}' not found ({missing:?} missing), proceeding without");
            return Ok(false);
        }

        // All four sets are validated before any of them is overwritten.
        let parameters = [
            self.actor.read(checkpoint_file(path, name, CHECKPOINT_PARTS[0]))?,
            self.actor_target.read(checkpoint_file(path, name, CHECKPOINT_PARTS[1]))?,
            self.critic.read(checkpoint_file(path, name, CHECKPOINT_PARTS[2]))?,
            self.critic_target.read(checkpoint_file(path, name, CHECKPOINT_PARTS[3]))?,
        ];
        for set in parameters {
            set.assign()?;
        }
        info!("Loaded checkpoint '{name}' from {:?}", path.as_ref());
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::components::IdentityExtractor,
        candle_core::Var,
    };

    fn agent(critic_max_grad_norm: f64) -> DDPG {
        let config = DDPG_Config {
            hidden_1_size: 8,
            hidden_2_size: 4,
            critic_max_grad_norm,
            ..DDPG_Config::tennis()
        };
        DDPG::new(&Device::Cpu, config, 2, 1, 0, Box::new(IdentityExtractor)).unwrap()
    }

    // Rewards far away from anything the fresh critic predicts.
    fn huge_td_errors() -> Minibatch {
        let device = &Device::Cpu;
        Minibatch {
            states: Tensor::new(&[[0.3f64, -0.2], [0.1, 0.4]], device).unwrap(),
            actions: Tensor::new(&[[0.5f64], [-0.5]], device).unwrap(),
            rewards: Tensor::new(&[[1e4f64], [2e4]], device).unwrap(),
            next_states: Tensor::new(&[[0.2f64, 0.2], [-0.1, 0.0]], device).unwrap(),
            dones: Tensor::ones((2, 1), DType::F64, device).unwrap(),
        }
    }

    fn norm(
        grads: &GradStore,
        vars: &[Var],
    ) -> f64 {
        vars.iter()
            .filter_map(|var| grads.get(var))
            .map(|grad| grad.sqr().unwrap().sum_all().unwrap().to_scalar::<f64>().unwrap())
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn critic_gradients_are_clipped() {
        let agent = agent(1.0);
        let (_, grads, before) = agent.critic_gradients(&huge_td_errors(), 0.99).unwrap();
        let after = norm(&grads, &agent.critic.vars());
        assert!(before > 100.0);
        assert!(after <= 1.0);
        assert!((after - 1.0).abs() < 1e-5);
    }

    #[test]
    fn small_gradients_are_not_rescaled() {
        let agent = agent(f64::INFINITY);
        let (_, grads, before) = agent.critic_gradients(&huge_td_errors(), 0.99).unwrap();
        let after = norm(&grads, &agent.critic.vars());
        assert!((after - before).abs() < 1e-9 * before);
    }

    #[test]
    fn update_reports_the_unclipped_norm() {
        let mut agent = agent(1.0);
        let minibatch = huge_td_errors();
        let (_, _, expected) = agent.critic_gradients(&minibatch, 0.99).unwrap();
        let stats = agent.update_rule(&minibatch, 0.99).unwrap();
        assert!((stats.critic_grad_norm - expected).abs() < 1e-9 * expected);
        assert_eq!(agent.updates_performed(), 1);
    }
}
