use ndarray::{Array1, Array2};

use crate::{error::Result, precision::Precision, storage::ParamTree};

/// Something that owns trainable parameters and knows how to register them.
pub trait Layer {
    /// The name the layer's subtree is registered with.
    fn name(&self) -> &str;

    /// Should return the amount of scalar parameters `add_parameters` registers.
    fn parameter_count(&self) -> usize;

    /// Should register every parameter of the layer into `params`, borrowing them.
    ///
    /// # Arguments
    /// * `params` - The layer's own subtree, empty when called.
    ///
    /// # Returns
    /// An error if a parameter couldn't be registered.
    fn add_parameters<'a>(&'a mut self, params: &mut ParamTree<'a>) -> Result<()>;
}

/// A fully connected layer, `y = x w + b`.
#[derive(Debug, Clone)]
pub struct Dense<T: Precision> {
    name: String,
    w: Array2<T>,
    b: Array1<T>,
}

impl<T: Precision> Dense<T> {
    pub const WEIGHTS: usize = 0;
    pub const BIASES: usize = 1;

    /// Creates a new zeroed `Dense` layer.
    ///
    /// # Arguments
    /// * `name` - The name of the layer.
    /// * `dim` - The amount of inputs and outputs.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(name: impl Into<String>, dim: (usize, usize)) -> Self {
        Self {
            name: name.into(),
            w: Array2::from_elem(dim, T::default()),
            b: Array1::from_elem(dim.1, T::default()),
        }
    }

    pub fn weights(&self) -> &Array2<T> {
        &self.w
    }

    pub fn biases(&self) -> &Array1<T> {
        &self.b
    }
}

impl<T: Precision> Layer for Dense<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_count(&self) -> usize {
        self.w.len() + self.b.len()
    }

    fn add_parameters<'a>(&'a mut self, params: &mut ParamTree<'a>) -> Result<()> {
        params
            .add_array2(Self::WEIGHTS, "w", &mut self.w)?
            .add_array1(Self::BIASES, "b", &mut self.b)?;

        Ok(())
    }
}
