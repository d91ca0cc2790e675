use std::{
    env,
    fs::File,
    io::{BufReader, BufWriter},
    thread,
};

use anyhow::{Context, anyhow};
use log::{debug, info, warn};

use neural_params::{
    LockingPolicy, ParamTree, ParameterValue, ParamsCopy, ParamsRef, Precision, PrecisionKind,
    layer::{Dense, Layer},
    persistence::{BinaryReader, BinaryWriter},
    specs::StoreSpec,
};

const INPUTS: usize = 4;
const HIDDEN: usize = 8;
const OUTPUTS: usize = 2;

/// A two layer model, only its parameters matter here.
struct Model<T: Precision> {
    hidden: Dense<T>,
    output: Dense<T>,
}

impl<T: Precision> Model<T> {
    fn new() -> Self {
        Self {
            hidden: Dense::new("hidden", (INPUTS, HIDDEN)),
            output: Dense::new("output", (HIDDEN, OUTPUTS)),
        }
    }
}

impl<T: Precision> Layer for Model<T> {
    fn name(&self) -> &str {
        "model"
    }

    fn parameter_count(&self) -> usize {
        self.hidden.parameter_count() + self.output.parameter_count()
    }

    fn add_parameters<'a>(&'a mut self, params: &mut ParamTree<'a>) -> neural_params::Result<()> {
        params
            .add_layer(0, &mut self.hidden)?
            .add_layer(1, &mut self.output)?;

        Ok(())
    }
}

/// Returns the euclidean distance between two trees with the same layout.
fn distance(params: &ParamTree<'_>, target: &ParamTree<'_>) -> neural_params::Result<f64> {
    let diff = ParamsCopy::<f64>::from_tree(params);
    diff.subtract(target)?;
    Ok(diff.two_norm())
}

/// Repeatedly steps `params` towards `target`, minimizing `||params - target||²`.
fn train(
    id: usize,
    spec: &StoreSpec,
    params: &ParamTree<'_>,
    target: &ParamTree<'_>,
) -> anyhow::Result<()> {
    let mut optimizer = spec.optimizer.build();

    for step in 0..spec.steps {
        let grad = ParamsCopy::<f64>::from_tree(params);
        grad.subtract(target)?;
        grad.scale(2.);

        optimizer.update_params(&grad, params)?;

        if step % 50 == 0 {
            debug!(worker = id, step = step; "gradient norm {:.4}", grad.two_norm());
        }
    }

    info!(worker = id; "finished {} steps", spec.steps);
    Ok(())
}

fn checkpoint<T: Precision>(params: &ParamsRef<'_>, path: &str) -> anyhow::Result<()> {
    let mut writer = BinaryWriter::new(BufWriter::new(File::create(path)?));
    params.to_owned_copy::<T>().serialize(&mut writer)?;
    writer.into_inner()?;

    let file = File::open(path)?;
    let restored = ParamsCopy::<T>::reconstitute(&mut BinaryReader::new(BufReader::new(file)))?;
    info!(
        "checkpointed {} parameters into {path}, restored distance {:.1e}",
        restored.parameter_count(),
        distance(&restored, params)?
    );

    Ok(())
}

fn run<T: Precision>(spec: &StoreSpec, checkpoint_path: Option<&str>) -> anyhow::Result<()> {
    let mut model = Model::<T>::new();
    let params = ParamsRef::for_layer(&mut model, spec.locking)?;

    let mut rng = spec.rng(0);
    spec.init.apply(&params, &mut rng)?;

    let target = ParamsCopy::<f64>::zeros_like(&params);
    target.random_fill(1., &mut rng)?;

    info!(
        "training {} {} precision parameters with {} workers, initial distance {:.4}",
        params.parameter_count(),
        T::KIND,
        spec.workers,
        distance(&params, &target)?
    );

    thread::scope(|s| {
        let handles: Vec<_> = (0..spec.workers.get())
            .map(|id| {
                let (params, target) = (&params, &target);
                s.spawn(move || train(id, spec, params, target))
            })
            .collect();

        handles
            .into_iter()
            .try_for_each(|handle| handle.join().map_err(|_| anyhow!("a worker panicked"))?)
    })?;

    info!("final distance {:.4}", distance(&params, &target)?);

    if let Some(path) = checkpoint_path {
        checkpoint::<T>(&params, path)?;
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);

    let spec: StoreSpec = match args.next() {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("opening {path}"))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {path}"))?
        }
        None => StoreSpec::default(),
    };

    if spec.locking == LockingPolicy::None && spec.workers.get() > 1 {
        warn!("locking policy is none, concurrent updates may be lost");
    }

    let checkpoint_path = args.next();

    match spec.precision {
        PrecisionKind::Single => run::<f32>(&spec, checkpoint_path.as_deref()),
        PrecisionKind::Double => run::<f64>(&spec, checkpoint_path.as_deref()),
    }
}
