use std::collections::HashMap;

use log::{debug, trace};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::{
    Param, ParameterValue, View,
    cells::{CellSource, Splitter},
};
use crate::{
    error::{ParamErr, Result, check_len},
    initialization::{self, RandomSource},
    layer::Layer,
    locking::{Access, Locking, LockingPolicy},
    persistence::{self, StoreWriter},
    precision::Precision,
};

/// A named, indexed and ordered collection of parameters, which may be trees themselves.
///
/// Value operations take `&self` and can be called from several threads at once,
/// they are synchronized following the tree's `LockingPolicy`. Structural operations
/// take `&mut self`, so they can't run concurrently with value operations.
///
/// Every subtree adopts the locking policy of the tree it's registered into and
/// shares its coarse lock, one policy governs the whole hierarchy.
#[derive(Debug)]
pub struct ParamTree<'a> {
    name: String,
    locking: Locking,
    params: Vec<Param<'a>>,
    indices: Vec<usize>,
    by_index: HashMap<usize, usize>,
    by_name: HashMap<String, usize>,
}

impl<'a> ParamTree<'a> {
    /// Creates a new empty `ParamTree` without synchronization.
    ///
    /// # Arguments
    /// * `name` - The name of the tree.
    ///
    /// # Returns
    /// A new `ParamTree` instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, LockingPolicy::None)
    }

    /// Creates a new empty `ParamTree`.
    ///
    /// # Arguments
    /// * `name` - The name of the tree.
    /// * `policy` - How concurrent value operations are synchronized.
    ///
    /// # Returns
    /// A new `ParamTree` instance.
    pub fn with_policy(name: impl Into<String>, policy: LockingPolicy) -> Self {
        Self::with_locking(name, Locking::new(policy))
    }

    pub(crate) fn with_locking(name: impl Into<String>, locking: Locking) -> Self {
        Self {
            name: name.into(),
            locking,
            params: Vec::new(),
            indices: Vec::new(),
            by_index: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn policy(&self) -> LockingPolicy {
        self.locking.policy()
    }

    pub(crate) fn locking(&self) -> &Locking {
        &self.locking
    }

    /// Changes the locking policy of this tree and every subtree, with a fresh coarse lock.
    ///
    /// Only roots are rebound, a subtree always follows the hierarchy it's registered in.
    pub(crate) fn set_policy(&mut self, policy: LockingPolicy) {
        self.bind(Locking::new(policy));
    }

    fn bind(&mut self, locking: Locking) {
        for param in &mut self.params {
            if let Some(tree) = param.as_tree_mut() {
                tree.bind(locking.clone());
            }
        }

        self.locking = locking;
    }

    /// Returns the amount of direct children.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates the direct children in registration order, along with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Param<'a>)> {
        self.indices.iter().copied().zip(&self.params)
    }

    /// Looks up a direct child by name.
    pub fn get(&self, name: &str) -> Option<&Param<'a>> {
        self.by_name.get(name).map(|&slot| &self.params[slot])
    }

    /// Looks up a direct child by index.
    pub fn get_index(&self, index: usize) -> Option<&Param<'a>> {
        self.by_index.get(&index).map(|&slot| &self.params[slot])
    }

    fn check_vacant(&self, index: usize, name: &str) -> Result<()> {
        if self.by_index.contains_key(&index) || self.by_name.contains_key(name) {
            return Err(ParamErr::DuplicateParam {
                index,
                name: name.to_owned(),
            });
        }

        Ok(())
    }

    /// Registers a child, the caller already checked `index` and the name are vacant.
    pub(crate) fn insert(&mut self, index: usize, mut param: Param<'a>) {
        if let Some(tree) = param.as_tree_mut() {
            tree.bind(self.locking.clone());
        }

        let slot = self.params.len();
        trace!(tree = self.name.as_str(), index = index; "registering '{}'", param.name());

        self.by_index.insert(index, slot);
        self.by_name.insert(param.name().to_owned(), slot);
        self.indices.push(index);
        self.params.push(param);
    }

    /// Registers a new child.
    ///
    /// # Arguments
    /// * `index` - A caller assigned index, unique among this tree's children.
    /// * `param` - The child, its name must be unique among this tree's children.
    ///
    /// # Returns
    /// The tree itself for chaining, or a `DuplicateParam` error if the index or the
    /// name are already taken, in which case nothing is registered.
    pub fn add(&mut self, index: usize, param: impl Into<Param<'a>>) -> Result<&mut Self> {
        let param = param.into();
        self.check_vacant(index, param.name())?;
        self.insert(index, param);
        Ok(self)
    }

    /// Registers a vector borrowed from its owner.
    pub fn add_vector<T: Precision>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut [T],
    ) -> Result<&mut Self> {
        self.add(index, View::vector(name, values))
    }

    /// Registers a row-major `rows x cols` matrix borrowed from its owner.
    pub fn add_matrix<T: Precision>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut [T],
        rows: usize,
        cols: usize,
    ) -> Result<&mut Self> {
        let view = View::matrix(name, values, rows, cols)?;
        self.add(index, view)
    }

    /// Registers an `ndarray` vector borrowed from its owner.
    pub fn add_array1<T: Precision>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut Array1<T>,
    ) -> Result<&mut Self> {
        let view = View::from_array1(name, values)?;
        self.add(index, view)
    }

    /// Registers an `ndarray` matrix borrowed from its owner.
    pub fn add_array2<T: Precision>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut Array2<T>,
    ) -> Result<&mut Self> {
        let view = View::from_array2(name, values)?;
        self.add(index, view)
    }

    /// Lets `layer` register its own parameters in a new subtree.
    ///
    /// # Arguments
    /// * `index` - The index of the new subtree, the layer can later find it with `subparams`.
    /// * `layer` - The layer, its parameters stay borrowed while this tree lives.
    ///
    /// # Returns
    /// The tree itself for chaining, a `DuplicateParam` error or the layer's own error.
    pub fn add_layer<L: Layer + ?Sized>(&mut self, index: usize, layer: &'a mut L) -> Result<&mut Self> {
        let name = layer.name().to_owned();
        self.check_vacant(index, &name)?;

        let mut subtree = ParamTree::with_locking(name, self.locking.clone());
        layer.add_parameters(&mut subtree)?;
        debug!(
            tree = self.name.as_str(), index = index;
            "added layer '{}' with {} parameters", subtree.name, subtree.parameter_count()
        );

        self.insert(index, Param::Tree(subtree));
        Ok(self)
    }

    fn slot(&self, index: usize, name: &str) -> Result<usize> {
        match self.by_index.get(&index) {
            Some(&slot) if self.params[slot].name() == name => Ok(slot),
            _ => Err(ParamErr::UnknownParam {
                index,
                name: name.to_owned(),
            }),
        }
    }

    /// Retrieves the subtree previously registered with this index and name.
    ///
    /// # Returns
    /// The subtree, an `UnknownParam` error if nothing matches or a `NotATree`
    /// error if the child is a leaf.
    pub fn subparams(&self, index: usize, name: &str) -> Result<&ParamTree<'a>> {
        let slot = self.slot(index, name)?;

        self.params[slot].as_tree().ok_or_else(|| ParamErr::NotATree {
            index,
            name: name.to_owned(),
        })
    }

    /// Mutable version of `subparams`.
    pub fn subparams_mut(&mut self, index: usize, name: &str) -> Result<&mut ParamTree<'a>> {
        let slot = self.slot(index, name)?;

        self.params[slot].as_tree_mut().ok_or_else(|| ParamErr::NotATree {
            index,
            name: name.to_owned(),
        })
    }

    /// Removes every child, the referenced values are left untouched.
    pub fn clear(&mut self) {
        self.params.clear();
        self.indices.clear();
        self.by_index.clear();
        self.by_name.clear();
    }

    /// Sets every parameter to `value`.
    pub fn fill(&self, value: f64) {
        let _guard = self.locking.enter();
        self.map_with(self.locking.access(), &|_| value);
    }

    /// Multiplies every parameter by `factor`.
    pub fn scale(&self, factor: f64) {
        let _guard = self.locking.enter();
        self.map_with(self.locking.access(), &|x| x * factor);
    }

    /// Sets every parameter to a uniform draw in `[-limit, limit]`, in registration order.
    ///
    /// # Arguments
    /// * `limit` - The bound of the range, must be finite and non negative.
    /// * `source` - The randomness to draw from.
    ///
    /// # Returns
    /// An `InvalidRange` error if `limit` can't define a range.
    pub fn random_fill<R: RandomSource + ?Sized>(&self, limit: f64, source: &mut R) -> Result<()> {
        let range = initialization::symmetric_range(limit)?;

        let _guard = self.locking.enter();
        self.map_serial(self.locking.access(), &mut |_| source.sample_uniform(&range));
        Ok(())
    }

    /// Adds `other` element-wise.
    ///
    /// # Returns
    /// A `SizeMismatch` or `StructureMismatch` error if `other` has a different layout,
    /// in which case nothing is modified.
    pub fn accumulate(&self, other: &ParamTree<'_>) -> Result<()> {
        self.combine(other, &|x, y| x + y)
    }

    /// Subtracts `other` element-wise.
    pub fn subtract(&self, other: &ParamTree<'_>) -> Result<()> {
        self.combine(other, &|x, y| x - y)
    }

    /// Overwrites every parameter with the one at the same position in `other`.
    pub fn assign(&self, other: &ParamTree<'_>) -> Result<()> {
        self.combine(other, &|_, y| y)
    }

    /// Takes a gradient descent step, `this[i] -= learning_rate * other[i]` for every element.
    ///
    /// # Arguments
    /// * `other` - The gradient, with the same layout as this tree.
    /// * `learning_rate` - The step size.
    ///
    /// # Returns
    /// A `SizeMismatch` or `StructureMismatch` error if `other` has a different layout,
    /// in which case nothing is modified.
    pub fn update(&self, other: &ParamTree<'_>, learning_rate: f64) -> Result<()> {
        self.combine(other, &|x, g| x - learning_rate * g)
    }

    /// Same as `accumulate`, with the direct children spread over rayon's global pool.
    pub fn par_accumulate(&self, other: &ParamTree<'_>) -> Result<()> {
        self.par_combine(other, &|x, y| x + y)
    }

    /// Same as `update`, with the direct children spread over rayon's global pool.
    ///
    /// Worth it for trees with many large children, every other operation stays
    /// on the calling thread.
    pub fn par_update(&self, other: &ParamTree<'_>, learning_rate: f64) -> Result<()> {
        self.par_combine(other, &|x, g| x - learning_rate * g)
    }

    fn combine<F>(&self, other: &ParamTree<'_>, f: &F) -> Result<()>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.check_peer(other)?;

        let _guard = self.locking.enter();
        self.zip_with(other, self.locking.access(), f);
        Ok(())
    }

    fn par_combine<F>(&self, other: &ParamTree<'_>, f: &F) -> Result<()>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        self.check_peer(other)?;

        let _guard = self.locking.enter();
        let access = self.locking.access();
        self.params
            .par_iter()
            .zip(other.params.par_iter())
            .for_each(|(mine, theirs)| mine.zip_map(theirs, access, f));
        Ok(())
    }

    /// Returns the euclidean norm of all the parameters.
    pub fn two_norm(&self) -> f64 {
        let _guard = self.locking.enter();
        self.sum_squares(self.locking.access()).sqrt()
    }

    /// Returns a snapshot of every parameter converted to `T`, in registration order.
    pub fn to_vec<T: Precision>(&self) -> Vec<T> {
        let mut values = vec![T::default(); self.parameter_count()];
        let _guard = self.locking.enter();
        self.copy_with(&mut values, self.locking.access());
        values
    }

    /// Creates a tree with this tree's layout that references `values`, without copying.
    ///
    /// # Returns
    /// The new tree or a `SizeMismatch` if `values` doesn't hold exactly as many elements.
    pub fn compatible_tree_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<ParamTree<'b>> {
        check_len("compatible buffer", values.len(), self.parameter_count())?;

        let mut tree = self.rebuild_tree(&mut Splitter::new(values));
        tree.set_policy(self.policy());
        Ok(tree)
    }

    /// Writes the layout and the values, as `f64`, into `store`.
    ///
    /// # Returns
    /// A `Format` error, before anything is written, if the tree is nested deeper
    /// than `reconstitute` accepts, or an `Io` error.
    pub fn serialize<W: StoreWriter>(&self, store: &mut W) -> Result<()> {
        self.serialize_as::<f64, W>(store)
    }

    pub(crate) fn serialize_as<T: Precision, W: StoreWriter>(
        &self,
        store: &mut W,
    ) -> Result<()> {
        persistence::check_depth(self)?;
        persistence::write_header(store)?;
        persistence::write_layout(store, self)?;

        let values = self.to_vec::<T>();
        persistence::write_values(store, &values)?;
        debug!(tree = self.name.as_str(); "serialized {} parameters", values.len());
        Ok(())
    }

    pub(crate) fn map_with<F>(&self, access: Access, f: &F)
    where
        F: Fn(f64) -> f64,
    {
        for param in &self.params {
            param.map(access, f);
        }
    }

    pub(crate) fn map_serial(&self, access: Access, f: &mut dyn FnMut(f64) -> f64) {
        for param in &self.params {
            param.map_serial(access, &mut *f);
        }
    }

    pub(crate) fn zip_with<F>(&self, other: &ParamTree<'_>, access: Access, f: &F)
    where
        F: Fn(f64, f64) -> f64,
    {
        for (mine, theirs) in self.params.iter().zip(&other.params) {
            mine.zip_map(theirs, access, f);
        }
    }

    pub(crate) fn sum_squares(&self, access: Access) -> f64 {
        self.params.iter().map(|param| param.sum_squares(access)).sum()
    }

    pub(crate) fn copy_with<U: Precision>(&self, out: &mut [U], access: Access) -> usize {
        let mut offset = 0;

        for param in &self.params {
            let n = param.parameter_count();
            offset += param.copy_with(&mut out[offset..offset + n], access);
        }

        offset
    }

    /// Lays out a tree with this tree's layout over the next cells of `source`.
    ///
    /// The new tree has no synchronization, callers pick its policy.
    pub(crate) fn rebuild_tree<'b, U, S>(&self, source: &mut S) -> ParamTree<'b>
    where
        U: Precision,
        S: CellSource<'b, U>,
    {
        let mut tree = ParamTree::new(self.name.clone());

        for (index, param) in self.iter() {
            let copy = param.rebuild(&mut *source);
            tree.insert(index, copy);
        }

        tree
    }

    /// Checks `other` can be combined with this tree, first by count then by structure.
    pub(crate) fn check_peer(&self, other: &ParamTree<'_>) -> Result<()> {
        check_len(
            "peer parameters",
            other.parameter_count(),
            self.parameter_count(),
        )?;
        self.check_compatible(other)
    }

    pub(crate) fn check_compatible(&self, other: &ParamTree<'_>) -> Result<()> {
        if self.params.len() != other.params.len() {
            return Err(ParamErr::StructureMismatch {
                name: self.name.clone(),
                detail: format!(
                    "{} children against {}",
                    self.params.len(),
                    other.params.len()
                ),
            });
        }

        for (mine, theirs) in self.params.iter().zip(&other.params) {
            if mine.name() != theirs.name() {
                return Err(ParamErr::StructureMismatch {
                    name: self.name.clone(),
                    detail: format!("child '{}' against '{}'", mine.name(), theirs.name()),
                });
            }

            mine.check_compatible(theirs)?;
        }

        Ok(())
    }
}

impl ParameterValue for ParamTree<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_count(&self) -> usize {
        self.params.iter().map(Param::parameter_count).sum()
    }

    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize> {
        check_len("destination", out.len(), self.parameter_count())?;

        let _guard = self.locking.enter();
        Ok(self.copy_with(out, self.locking.access()))
    }

    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        self.compatible_tree_ref(values).map(Param::Tree)
    }
}
