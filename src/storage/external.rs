use std::ops::{Deref, DerefMut};

use super::{Param, ParamTree, ParameterValue, ParamsCopy};
use crate::{
    error::{Result, check_len},
    layer::Layer,
    locking::LockingPolicy,
    precision::Precision,
};

/// A parameter tree whose leaves reference memory owned elsewhere, usually by layers.
///
/// Every leaf keeps its owner's buffer mutably borrowed for `'a`, so the owner
/// can't be touched or dropped while the tree lives.
#[derive(Debug)]
pub struct ParamsRef<'a> {
    tree: ParamTree<'a>,
}

impl<'a> ParamsRef<'a> {
    /// Creates a new empty `ParamsRef`.
    ///
    /// # Arguments
    /// * `name` - The name of the root tree.
    /// * `policy` - How concurrent value operations are synchronized.
    ///
    /// # Returns
    /// A new `ParamsRef` instance.
    pub fn new(name: impl Into<String>, policy: LockingPolicy) -> Self {
        Self {
            tree: ParamTree::with_policy(name, policy),
        }
    }

    /// Creates a `ParamsRef` holding the parameters of `layer`.
    ///
    /// # Arguments
    /// * `layer` - The layer to borrow the parameters from.
    /// * `policy` - How concurrent value operations are synchronized.
    ///
    /// # Returns
    /// The new tree, or a `SizeMismatch` if the layer registered a different amount
    /// of parameters than the one it reports.
    pub fn for_layer<L: Layer + ?Sized>(layer: &'a mut L, policy: LockingPolicy) -> Result<Self> {
        let expected = layer.parameter_count();
        let mut tree = ParamTree::with_policy(layer.name(), policy);

        layer.add_parameters(&mut tree)?;
        check_len("layer parameters", tree.parameter_count(), expected)?;
        Ok(Self { tree })
    }

    /// Changes the locking policy of the whole hierarchy, with a fresh coarse lock.
    pub fn set_policy(&mut self, policy: LockingPolicy) {
        self.tree.set_policy(policy);
    }

    /// Same as `ParamTree::compatible_tree_ref`, keeping the external storage variant.
    pub fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<ParamsRef<'b>> {
        let tree = self.tree.compatible_tree_ref(values)?;
        Ok(ParamsRef { tree })
    }

    /// Same as `compatible_ref`, but `values` is first initialized with the current values.
    pub fn compatible_copy<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<ParamsRef<'b>> {
        self.tree.copy_to(values)?;
        self.compatible_ref(values)
    }

    /// Takes an owned snapshot of the referenced values in precision `T`.
    pub fn to_owned_copy<T: Precision>(&self) -> ParamsCopy<T> {
        ParamsCopy::from_tree(&self.tree)
    }

    pub fn into_inner(self) -> ParamTree<'a> {
        self.tree
    }
}

impl<'a> Deref for ParamsRef<'a> {
    type Target = ParamTree<'a>;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

impl DerefMut for ParamsRef<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tree
    }
}

impl ParameterValue for ParamsRef<'_> {
    fn name(&self) -> &str {
        self.tree.name()
    }

    fn parameter_count(&self) -> usize {
        self.tree.parameter_count()
    }

    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize> {
        self.tree.copy_to(out)
    }

    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        ParameterValue::compatible_ref(&self.tree, values)
    }
}
