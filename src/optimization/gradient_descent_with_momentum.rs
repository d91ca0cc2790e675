use super::Optimizer;
use crate::{
    error::Result,
    storage::{ParamTree, ParamsCopy},
};

#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f64,
    momentum: f64,
    velocity: Option<ParamsCopy<f64>>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// The velocity is allocated on the first update, with the gradient's layout.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: None,
        }
    }

    /// Returns the current velocity, if any update was made.
    pub fn velocity(&self) -> Option<&ParamsCopy<f64>> {
        self.velocity.as_ref()
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &ParamTree<'_>, params: &ParamTree<'_>) -> Result<()> {
        params.check_peer(grad)?;

        if let Some(velocity) = &self.velocity {
            velocity.check_peer(grad)?;
        }

        let velocity = self
            .velocity
            .get_or_insert_with(|| ParamsCopy::zeros_like(grad));

        velocity.scale(self.momentum);
        velocity.accumulate(grad)?;
        params.update(velocity, self.learning_rate)
    }
}
