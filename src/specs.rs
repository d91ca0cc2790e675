use std::num::NonZeroUsize;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    initialization::RandomSource,
    locking::LockingPolicy,
    optimization::{GradientDescent, GradientDescentWithMomentum, Optimizer},
    precision::PrecisionKind,
    storage::ParamTree,
};

/// The specification of how a parameter tree is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitSpec {
    Const { value: f64 },
    Uniform { limit: f64 },
}

impl InitSpec {
    /// Initializes every parameter of `params` following this spec.
    ///
    /// # Returns
    /// An `InvalidRange` error if the uniform limit is unusable.
    pub fn apply<R: RandomSource + ?Sized>(&self, params: &ParamTree<'_>, rng: &mut R) -> Result<()> {
        match *self {
            InitSpec::Const { value } => {
                params.fill(value);
                Ok(())
            }
            InitSpec::Uniform { limit } => params.random_fill(limit, rng),
        }
    }
}

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    GradientDescent { learning_rate: f64 },
    GradientDescentWithMomentum { learning_rate: f64, momentum: f64 },
}

impl OptimizerSpec {
    pub fn build(&self) -> Box<dyn Optimizer + Send> {
        match *self {
            OptimizerSpec::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(learning_rate, momentum)),
        }
    }
}

/// The specification of a shared parameter store and the workers updating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSpec {
    #[serde(default)]
    pub locking: LockingPolicy,
    pub precision: PrecisionKind,
    pub init: InitSpec,
    pub optimizer: OptimizerSpec,
    pub seed: Option<u64>,
    pub workers: NonZeroUsize,
    pub steps: usize,
}

impl StoreSpec {
    /// Generates a random number generator given (or not) a seed.
    ///
    /// # Arguments
    /// * `offset` - Added to the seed, so every worker gets its own sequence.
    pub fn rng(&self, offset: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(offset)),
            None => StdRng::from_os_rng(),
        }
    }
}

impl Default for StoreSpec {
    fn default() -> Self {
        Self {
            locking: LockingPolicy::Fine,
            precision: PrecisionKind::Single,
            init: InitSpec::Uniform { limit: 0.5 },
            optimizer: OptimizerSpec::GradientDescentWithMomentum {
                learning_rate: 0.05,
                momentum: 0.5,
            },
            seed: Some(42),
            workers: NonZeroUsize::MIN.saturating_add(3),
            steps: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_are_read_from_json() {
        let json = r#"{
            "locking": "coarse",
            "precision": "double",
            "init": { "uniform": { "limit": 0.1 } },
            "optimizer": { "gradient_descent": { "learning_rate": 0.01 } },
            "seed": 7,
            "workers": 2,
            "steps": 10
        }"#;

        let spec: StoreSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.locking, LockingPolicy::Coarse);
        assert_eq!(spec.precision, PrecisionKind::Double);
        assert_eq!(spec.init, InitSpec::Uniform { limit: 0.1 });
        assert_eq!(
            spec.optimizer,
            OptimizerSpec::GradientDescent {
                learning_rate: 0.01
            }
        );
        assert_eq!(spec.workers.get(), 2);
    }

    #[test]
    fn locking_defaults_to_none() {
        let json = r#"{
            "precision": "single",
            "init": { "const": { "value": 1.0 } },
            "optimizer": { "gradient_descent_with_momentum": { "learning_rate": 0.1, "momentum": 0.9 } },
            "seed": null,
            "workers": 1,
            "steps": 1
        }"#;

        let spec: StoreSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.locking, LockingPolicy::None);
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut value = serde_json::to_value(StoreSpec::default()).unwrap();
        value["workers"] = 0.into();
        assert!(serde_json::from_value::<StoreSpec>(value).is_err());
    }

    #[test]
    fn seeded_rngs_are_reproducible() {
        use rand::Rng;

        let spec = StoreSpec::default();
        let a: u64 = spec.rng(1).random();
        let b: u64 = spec.rng(1).random();
        let c: u64 = spec.rng(2).random();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn init_specs_are_applied() {
        let mut w = [0.0f32; 8];
        let mut params = ParamTree::new("params");
        params.add_vector(0, "w", &mut w).unwrap();

        let mut rng = StoreSpec::default().rng(0);
        InitSpec::Const { value: 2. }.apply(&params, &mut rng).unwrap();
        assert_eq!(params.to_vec::<f32>(), [2.; 8]);

        InitSpec::Uniform { limit: 0.5 }.apply(&params, &mut rng).unwrap();
        assert!(params.to_vec::<f64>().iter().all(|x| x.abs() <= 0.5));
        assert!(InitSpec::Uniform { limit: -1. }.apply(&params, &mut rng).is_err());
    }
}
