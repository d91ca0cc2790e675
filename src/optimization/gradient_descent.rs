use super::Optimizer;
use crate::{error::Result, storage::ParamTree};

#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &ParamTree<'_>, params: &ParamTree<'_>) -> Result<()> {
        params.update(grad, self.learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut w = [1.0f32, -1.];
        let mut g = [2.0f64, -4.];

        let mut params = ParamTree::new("params");
        params.add_vector(0, "w", &mut w).unwrap();
        let mut grad = ParamTree::new("grad");
        grad.add_vector(0, "w", &mut g).unwrap();

        let mut optimizer = GradientDescent::new(0.25);
        optimizer.update_params(&grad, &params).unwrap();
        assert_eq!(params.to_vec::<f64>(), [0.5, 0.]);
    }
}
