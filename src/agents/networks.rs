use {
    candle_core::{
        backprop::GradStore,
        bail,
        safetensors,
        DType,
        Device,
        Error,
        Module,
        Result,
        Tensor,
        Var,
    },
    candle_nn::{
        func,
        linear,
        sequential::seq,
        Activation,
        Sequential,
        VarBuilder,
        VarMap,
    },
    rand::{
        distributions::Uniform,
        rngs::StdRng,
        Rng,
    },
    std::path::Path,
};

/// `(in_dim, out_dim)` of the three fully connected layers of a network.
pub type LayerDims = [(usize, usize); 3];

fn sorted_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| Error::Msg("parameter map lock is poisoned".to_string()))?;
    let mut vars: Vec<(String, Var)> = data
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Draw every parameter from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
///
/// Parameters are visited in name order so that the result only depends on
/// the state of `rng`.
fn initialize(
    varmap: &VarMap,
    rng: &mut StdRng,
) -> Result<()> {
    let vars = sorted_vars(varmap)?;
    let fan_in = |name: &str| -> usize {
        let layer = name.rsplit_once('.').map_or(name, |(layer, _)| layer);
        let weight = format!("{layer}.weight");
        vars.iter()
            .find(|(n, _)| *n == weight)
            .and_then(|(_, var)| var.dims().get(1).copied())
            .unwrap_or(1)
            .max(1)
    };

    for (name, var) in vars.iter() {
        let bound = 1.0 / (fan_in(name) as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let values: Vec<f64> = (0..var.elem_count()).map(|_| rng.sample(dist)).collect();
        var.set(&Tensor::from_vec(values, var.dims(), var.device())?)?;
    }
    Ok(())
}

fn make_network(
    vb: &VarBuilder,
    prefix: &str,
    dims: &LayerDims,
) -> Result<Sequential> {
    Ok(seq()
        .add(linear(dims[0].0, dims[0].1, vb.pp(format!("{prefix}-fc0")))?)
        .add(Activation::Relu)
        .add(linear(dims[1].0, dims[1].1, vb.pp(format!("{prefix}-fc1")))?)
        .add(Activation::Relu)
        .add(linear(dims[2].0, dims[2].1, vb.pp(format!("{prefix}-fc2")))?))
}

/// Polyak averaging: `target <- tau * local + (1 - tau) * target`, per
/// parameter and elementwise.
pub fn track(
    local: &VarMap,
    target: &VarMap,
    tau: f64,
) -> Result<()> {
    if std::ptr::eq(local.data(), target.data()) {
        return Ok(());
    }
    let local = local
        .data()
        .lock()
        .map_err(|_| Error::Msg("parameter map lock is poisoned".to_string()))?;
    let target = target
        .data()
        .lock()
        .map_err(|_| Error::Msg("parameter map lock is poisoned".to_string()))?;

    for (name, target_var) in target.iter() {
        let local_var = local
            .get(name)
            .ok_or_else(|| Error::Msg(format!("no local parameter named {name}")))?;
        let blended = (local_var.as_tensor().detach().affine(tau, 0.0)?
            + target_var.as_tensor().detach().affine(1.0 - tau, 0.0)?)?;
        target_var.set(&blended)?;
    }
    Ok(())
}

/// Rescale the gradients of `vars` so that their global L2 norm is at most
/// `max_norm`. Returns the norm measured before clipping.
pub fn clip_grad_norm(
    grads: &mut GradStore,
    vars: &[Var],
    max_norm: f64,
) -> Result<f64> {
    let mut total = 0.0;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f64>()?;
        }
    }
    let norm = total.sqrt();

    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for var in vars {
            if let Some(grad) = grads.remove(var) {
                grads.insert(var, grad.affine(coef, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// A named, flattened copy of every parameter, in name order.
pub fn snapshot(varmap: &VarMap) -> Result<Vec<(String, Vec<f64>)>> {
    sorted_vars(varmap)?
        .into_iter()
        .map(|(name, var)| -> Result<(String, Vec<f64>)> {
            Ok((name, var.as_tensor().flatten_all()?.to_vec1::<f64>()?))
        })
        .collect()
}

/// Parameters read from a checkpoint and checked against a network, but not
/// yet written into it.
pub struct Parameters(Vec<(Var, Tensor)>);

impl Parameters {
    /// Overwrite the network's parameters with the checkpointed values.
    pub fn assign(self) -> Result<()> {
        for (var, value) in self.0 {
            var.set(&value)?;
        }
        Ok(())
    }
}

fn read_parameters(
    varmap: &VarMap,
    path: &Path,
) -> Result<Parameters> {
    let mut tensors = safetensors::load(path, &Device::Cpu)?;
    let mut parameters = Vec::new();
    for (name, var) in sorted_vars(varmap)? {
        let Some(value) = tensors.remove(&name) else {
            bail!("{path:?} has no parameter named {name}")
        };
        if value.dims() != var.dims() {
            bail!(
                "{path:?} stores {name} with shape {:?}, expected {:?}",
                value.dims(),
                var.dims(),
            )
        }
        let value = value.to_dtype(var.dtype())?.to_device(var.device())?;
        parameters.push((var, value));
    }
    Ok(Parameters(parameters))
}

/// The deterministic policy: `state -> action` squashed into `[-1, 1]`.
///
/// One `Actor` is one parameter set; local and target copies are separate
/// instances.
pub struct Actor {
    varmap: VarMap,
    network: Sequential,
}

impl Actor {
    pub fn new(
        device: &Device,
        dims: &LayerDims,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, device);
        let network = make_network(&vb, "actor", dims)?.add(func(|xs| xs.tanh()));
        initialize(&varmap, rng)?;
        Ok(Self { varmap, network })
    }

    pub fn forward(
        &self,
        state: &Tensor,
    ) -> Result<Tensor> {
        self.network.forward(state)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Move this (target) actor towards `local`.
    pub fn track(
        &self,
        local: &Self,
        tau: f64,
    ) -> Result<()> {
        track(&local.varmap, &self.varmap, tau)
    }

    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<()> {
        self.varmap.save(path)
    }

    /// Read and validate a checkpoint without touching the parameters.
    pub fn read<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Parameters> {
        read_parameters(&self.varmap, path.as_ref())
    }
}

/// The action-value estimate: `(state, action) -> q`, one value per row.
pub struct Critic {
    varmap: VarMap,
    network: Sequential,
}

impl Critic {
    pub fn new(
        device: &Device,
        dims: &LayerDims,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, device);
        let network = make_network(&vb, "critic", dims)?;
        initialize(&varmap, rng)?;
        Ok(Self { varmap, network })
    }

    pub fn forward(
        &self,
        state: &Tensor,
        action: &Tensor,
    ) -> Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        self.network.forward(&xs)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Move this (target) critic towards `local`.
    pub fn track(
        &self,
        local: &Self,
        tau: f64,
    ) -> Result<()> {
        track(&local.varmap, &self.varmap, tau)
    }

    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<()> {
        self.varmap.save(path)
    }

    /// Read and validate a checkpoint without touching the parameters.
    pub fn read<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Parameters> {
        read_parameters(&self.varmap, path.as_ref())
    }
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::SeedableRng,
    };

    const DIMS: LayerDims = [(3, 8), (8, 4), (4, 2)];

    fn actor(seed: u64) -> Actor {
        Actor::new(&Device::Cpu, &DIMS, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn tau_one_copies_local() {
        let local = actor(1);
        let target = actor(2);
        target.track(&local, 1.0).unwrap();
        assert_eq!(
            snapshot(target.varmap()).unwrap(),
            snapshot(local.varmap()).unwrap(),
        );
    }

    #[test]
    fn tau_zero_keeps_target() {
        let local = actor(1);
        let target = actor(2);
        let before = snapshot(target.varmap()).unwrap();
        target.track(&local, 0.0).unwrap();
        assert_eq!(snapshot(target.varmap()).unwrap(), before);
    }

    #[test]
    fn tracking_interpolates() {
        let local = actor(3);
        let target = actor(4);
        let l = snapshot(local.varmap()).unwrap();
        let t = snapshot(target.varmap()).unwrap();
        target.track(&local, 0.25).unwrap();
        let blended = snapshot(target.varmap()).unwrap();
        for ((_, b), ((_, l), (_, t))) in blended.iter().zip(l.iter().zip(t.iter())) {
            for ((b, l), t) in b.iter().zip(l).zip(t) {
                assert!((b - (0.25 * l + 0.75 * t)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn initialization_follows_the_seed() {
        assert_eq!(
            snapshot(actor(7).varmap()).unwrap(),
            snapshot(actor(7).varmap()).unwrap(),
        );
        assert_ne!(
            snapshot(actor(7).varmap()).unwrap(),
            snapshot(actor(8).varmap()).unwrap(),
        );
    }

    #[test]
    fn initialization_is_bounded_by_fan_in() {
        for (name, values) in snapshot(actor(9).varmap()).unwrap() {
            let fan_in = if name.starts_with("actor-fc0") {
                3.0
            } else if name.starts_with("actor-fc1") {
                8.0
            } else {
                4.0
            };
            let bound = 1.0 / f64::sqrt(fan_in);
            assert!(values.iter().all(|v| v.abs() <= bound), "{name} out of bounds");
        }
    }

    #[test]
    fn actor_output_is_squashed() {
        let actor = actor(10);
        let state = Tensor::new(&[[100.0f64, -100.0, 50.0]], &Device::Cpu).unwrap();
        let action = actor.forward(&state).unwrap().to_vec2::<f64>().unwrap();
        assert!(action[0].iter().all(|a| (-1.0..=1.0).contains(a)));
    }

    #[test]
    fn critic_yields_one_value_per_row() {
        let critic = Critic::new(
            &Device::Cpu,
            &[(5, 8), (8, 4), (4, 1)],
            &mut StdRng::seed_from_u64(11),
        ).unwrap();
        let states = Tensor::zeros((6, 3), DType::F64, &Device::Cpu).unwrap();
        let actions = Tensor::zeros((6, 2), DType::F64, &Device::Cpu).unwrap();
        assert_eq!(critic.forward(&states, &actions).unwrap().dims(), &[6, 1]);
    }

    #[test]
    fn gradient_norm_is_clipped() {
        let critic = Critic::new(
            &Device::Cpu,
            &[(3, 4), (4, 4), (4, 1)],
            &mut StdRng::seed_from_u64(12),
        ).unwrap();
        let states = Tensor::new(&[[10.0f64, 20.0], [30.0, -40.0]], &Device::Cpu).unwrap();
        let actions = Tensor::new(&[[1.0f64], [-1.0]], &Device::Cpu).unwrap();
        let loss = (critic.forward(&states, &actions).unwrap() - 1e3)
            .unwrap()
            .sqr()
            .unwrap()
            .mean_all()
            .unwrap();
        let mut grads = loss.backward().unwrap();
        let vars = critic.vars();

        let before = clip_grad_norm(&mut grads, &vars, 1.0).unwrap();
        assert!(before > 1.0);
        let after = clip_grad_norm(&mut grads, &vars, f64::INFINITY).unwrap();
        assert!((after - 1.0).abs() < 1e-5);
    }
}
