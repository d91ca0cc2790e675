use crate::{error::Result, storage::ParamTree};

/// Defines the strategy for updating model parameters based on calculated gradients.
///
/// The `Optimizer` trait is responsible for the transition of the parameters from step `t` to `t+1`.
pub trait Optimizer {
    /// Updates `params` using the gradient `grad`.
    ///
    /// # Arguments
    /// * `grad` - The gradient, with the same layout as `params`.
    /// * `params` - The parameters to update, synchronized following their own locking policy.
    ///
    /// # Returns
    /// A `SizeMismatch` or `StructureMismatch` error if the layouts differ.
    fn update_params(&mut self, grad: &ParamTree<'_>, params: &ParamTree<'_>) -> Result<()>;
}
