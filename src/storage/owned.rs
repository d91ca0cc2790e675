use std::{
    fmt::{self, Debug},
    ops::Deref,
    sync::Arc,
};

use log::debug;

use super::{Param, ParamTree, ParameterValue, ParamsRef, cells::Slicer};
use crate::{
    error::Result,
    layer::Layer,
    locking::{Access, LockingPolicy},
    persistence::{self, Skeleton, StoreReader, StoreWriter},
    precision::{Precision, PrecisionKind},
};

/// A parameter tree that owns its values, all of them in one contiguous buffer of precision `T`.
///
/// Its structure can't change once built, only its values.
pub struct ParamsCopy<T: Precision> {
    buffer: Arc<[T::Atomic]>,
    tree: ParamTree<'static>,
}

impl<T: Precision> ParamsCopy<T> {
    fn allocate(n: usize) -> Arc<[T::Atomic]> {
        (0..n).map(|_| T::new_atomic(T::default())).collect()
    }

    fn with_buffer(buffer: Arc<[T::Atomic]>, tree: ParamTree<'static>) -> Self {
        debug!(
            "owning {} {} precision parameters for '{}'",
            buffer.len(),
            T::KIND,
            tree.name()
        );

        Self { buffer, tree }
    }

    /// Allocates a zeroed buffer and lays out `layout`'s structure over it.
    fn lay_out(layout: &ParamTree<'_>, policy: LockingPolicy) -> Self {
        let buffer = Self::allocate(layout.parameter_count());

        let mut tree = layout.rebuild_tree(&mut Slicer::<T>::new(Arc::clone(&buffer)));
        tree.set_policy(policy);
        Self::with_buffer(buffer, tree)
    }

    /// Overwrites every value with the one at the same position in `source`,
    /// which has the same layout.
    fn copy_from(&self, source: &ParamTree<'_>) {
        let _guard = source.locking().enter();
        self.tree.zip_with(source, Access::Plain, &|_, y| y);
    }

    /// Creates a zeroed `ParamsCopy` with the structure and policy of `tree`.
    ///
    /// # Arguments
    /// * `tree` - The tree to copy the structure from.
    ///
    /// # Returns
    /// A new `ParamsCopy` instance.
    pub fn zeros_like(tree: &ParamTree<'_>) -> Self {
        Self::lay_out(tree, tree.policy())
    }

    /// Creates a `ParamsCopy` with the structure, policy and values of `tree`.
    ///
    /// # Arguments
    /// * `tree` - The tree to copy, its values are converted to `T`.
    ///
    /// # Returns
    /// A new `ParamsCopy` instance.
    pub fn from_tree(tree: &ParamTree<'_>) -> Self {
        let copy = Self::zeros_like(tree);
        copy.copy_from(tree);
        copy
    }

    /// Creates a `ParamsCopy` of any parameter, a leaf becomes the only child of a
    /// tree with its name, registered at index 0.
    pub fn from_param(param: &Param<'_>) -> Self {
        if let Param::Tree(tree) = param {
            return Self::from_tree(tree);
        }

        let buffer = Self::allocate(param.parameter_count());
        let leaf = param.rebuild(&mut Slicer::<T>::new(Arc::clone(&buffer)));
        leaf.zip_map(param, Access::Plain, &|_, y| y);

        let mut tree = ParamTree::new(param.name());
        tree.insert(0, leaf);
        Self::with_buffer(buffer, tree)
    }

    /// Creates a `ParamsCopy` holding the parameters of `layer`.
    ///
    /// The layer reports its parameter count first, then the buffer is allocated
    /// once and the layer's structure is laid out over it.
    ///
    /// # Arguments
    /// * `layer` - The layer to copy the parameters from.
    /// * `policy` - How concurrent value operations on the copy are synchronized.
    ///
    /// # Returns
    /// The new copy, or an error if the layer couldn't register its parameters or
    /// registered a different amount than the one it reports.
    pub fn from_layer<L: Layer + ?Sized>(layer: &mut L, policy: LockingPolicy) -> Result<Self> {
        let params = ParamsRef::for_layer(layer, LockingPolicy::None)?;

        let copy = Self::lay_out(&params, policy);
        copy.copy_from(&params);
        Ok(copy)
    }

    /// Creates an owned copy of the subtree registered with this index and name.
    ///
    /// # Returns
    /// The copy, or the same errors as `ParamTree::subparams`.
    pub fn subparams_copy(&self, index: usize, name: &str) -> Result<Self> {
        let subtree = self.tree.subparams(index, name)?;
        Ok(Self::from_tree(subtree))
    }

    /// Returns a snapshot of every value, in registration order.
    pub fn values(&self) -> Vec<T> {
        self.tree.to_vec()
    }

    pub fn precision(&self) -> PrecisionKind {
        T::KIND
    }

    pub fn set_policy(&mut self, policy: LockingPolicy) {
        self.tree.set_policy(policy);
    }

    /// Writes the layout and the values, in precision `T`, into `store`.
    pub fn serialize<W: StoreWriter>(&self, store: &mut W) -> Result<()> {
        self.tree.serialize_as::<T, W>(store)
    }

    /// Reads a tree written by `serialize` into a new `ParamsCopy`, without synchronization.
    ///
    /// The stored values are converted to `T` whatever precision they were written in.
    ///
    /// # Arguments
    /// * `store` - The source to read from.
    ///
    /// # Returns
    /// The new copy, a `Format` error if the data doesn't describe a valid tree or
    /// an `Io` error if it can't be read entirely.
    pub fn reconstitute<R: StoreReader>(store: &mut R) -> Result<Self> {
        persistence::read_header(store)?;

        let skeleton = Skeleton::read(store)?;
        let count = skeleton.count()?;
        let values = persistence::read_values::<T, R>(store, count)?;

        let buffer: Arc<[T::Atomic]> = values.into_iter().map(T::new_atomic).collect();
        let mut slicer = Slicer::<T>::new(Arc::clone(&buffer));
        let tree = skeleton.build(&mut slicer)?;
        debug_assert_eq!(slicer.offset(), buffer.len());

        Ok(Self::with_buffer(buffer, tree))
    }
}

impl<T: Precision> Clone for ParamsCopy<T> {
    fn clone(&self) -> Self {
        Self::from_tree(&self.tree)
    }
}

impl<T: Precision> Deref for ParamsCopy<T> {
    type Target = ParamTree<'static>;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

impl<T: Precision> ParameterValue for ParamsCopy<T> {
    fn name(&self) -> &str {
        self.tree.name()
    }

    fn parameter_count(&self) -> usize {
        self.buffer.len()
    }

    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize> {
        self.tree.copy_to(out)
    }

    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        ParameterValue::compatible_ref(&self.tree, values)
    }
}

impl<T: Precision> Debug for ParamsCopy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamsCopy")
            .field("name", &self.tree.name())
            .field("precision", &T::KIND)
            .field("count", &self.buffer.len())
            .field("policy", &self.tree.policy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ParamErr,
        layer::Dense,
        persistence::{BinaryReader, BinaryWriter},
        storage::Shape,
    };

    #[test]
    fn from_tree_copies_values_and_structure() {
        let mut w = [1.0f32, 2., 3., 4.];
        let mut b = [0.5f64];
        let mut tree = ParamTree::with_policy("model", LockingPolicy::Fine);
        tree.add_matrix(3, "w", &mut w, 2, 2)
            .unwrap()
            .add_vector(8, "b", &mut b)
            .unwrap();

        let copy = ParamsCopy::<f64>::from_tree(&tree);
        assert_eq!(copy.values(), [1., 2., 3., 4., 0.5]);
        assert_eq!(copy.policy(), LockingPolicy::Fine);
        assert_eq!(copy.get_index(3).and_then(Param::shape), Some(Shape::Matrix(2, 2)));
        assert_eq!(copy.get("b").and_then(Param::precision), Some(PrecisionKind::Double));

        copy.fill(0.);
        assert_eq!(tree.to_vec::<f64>(), [1., 2., 3., 4., 0.5]);
    }

    #[test]
    fn zeros_like_only_copies_the_structure() {
        let mut w = [7.0f32; 3];
        let mut tree = ParamTree::new("model");
        tree.add_vector(0, "w", &mut w).unwrap();

        let zeros = ParamsCopy::<f32>::zeros_like(&tree);
        assert_eq!(zeros.values(), [0.; 3]);
        assert_eq!(zeros.parameter_count(), 3);
    }

    #[test]
    fn clones_are_independent() {
        let mut w = [1.0f64, 2.];
        let mut tree = ParamTree::new("model");
        tree.add_vector(0, "w", &mut w).unwrap();

        let copy = ParamsCopy::<f64>::from_tree(&tree);
        let clone = copy.clone();
        clone.scale(10.);

        assert_eq!(copy.values(), [1., 2.]);
        assert_eq!(clone.values(), [10., 20.]);
    }

    #[test]
    fn from_param_wraps_leaves() {
        let mut w = [1.5f32, 2.5];
        let mut tree = ParamTree::new("model");
        tree.add_vector(4, "w", &mut w).unwrap();

        let copy = ParamsCopy::<f64>::from_param(tree.get("w").unwrap());
        assert_eq!(copy.name(), "w");
        assert_eq!(copy.values(), [1.5, 2.5]);
        assert_eq!(copy.get_index(0).map(|p| p.name()), Some("w"));
    }

    #[test]
    fn from_layer_allocates_once_with_the_layer_structure() {
        let mut layer = Dense::<f32>::new("dense", (2, 3));
        ParamsRef::for_layer(&mut layer, LockingPolicy::None)
            .unwrap()
            .fill(1.);

        let copy = ParamsCopy::<f64>::from_layer(&mut layer, LockingPolicy::Atomic).unwrap();
        assert_eq!(copy.name(), "dense");
        assert_eq!(copy.policy(), LockingPolicy::Atomic);
        assert_eq!(copy.values(), [1.; 9]);

        copy.fill(0.);
        assert!(layer.weights().iter().all(|&w| w == 1.));
    }

    #[test]
    fn subparams_copy_owns_the_subtree() {
        let mut first = Dense::<f64>::new("first", (1, 1));
        let mut second = Dense::<f64>::new("second", (1, 2));

        let mut params = ParamsRef::new("model", LockingPolicy::None);
        params
            .add_layer(0, &mut first)
            .unwrap()
            .add_layer(1, &mut second)
            .unwrap();
        params.fill(4.);

        let copy = ParamsCopy::<f32>::from_tree(&params);
        let sub = copy.subparams_copy(1, "second").unwrap();
        assert_eq!(sub.parameter_count(), 4);
        assert_eq!(sub.values(), [4.; 4]);

        sub.fill(0.);
        assert_eq!(copy.values(), [4.; 6]);

        assert!(matches!(
            copy.subparams_copy(1, "first"),
            Err(ParamErr::UnknownParam { .. })
        ));
    }

    #[test]
    fn serialized_copies_are_reconstituted() {
        let mut w = [0.25f32, -1., 3.5, 8.];
        let mut b = [2.0f64];
        let mut inner = ParamTree::new("inner");
        inner.add_vector(1, "b", &mut b).unwrap();
        let mut tree = ParamTree::new("model");
        tree.add_matrix(5, "w", &mut w, 2, 2).unwrap().add(9, inner).unwrap();

        let copy = ParamsCopy::<f32>::from_tree(&tree);
        let mut writer = BinaryWriter::new(Vec::new());
        copy.serialize(&mut writer).unwrap();
        let bytes = writer.into_inner().unwrap();

        let back = ParamsCopy::<f64>::reconstitute(&mut BinaryReader::new(bytes.as_slice())).unwrap();
        assert_eq!(back.name(), "model");
        assert_eq!(back.values(), [0.25, -1., 3.5, 8., 2.]);
        assert_eq!(back.get_index(5).and_then(Param::shape), Some(Shape::Matrix(2, 2)));
        assert_eq!(back.subparams(9, "inner").unwrap().parameter_count(), 1);
        back.check_compatible(&tree).unwrap();
    }

    #[test]
    fn double_copies_round_trip_exactly() {
        let mut w = [0.1 + 1e-12, -1. / 3., 1e300, f64::MIN_POSITIVE];
        let mut tree = ParamTree::new("model");
        tree.add_matrix(0, "w", &mut w, 2, 2).unwrap();

        let copy = ParamsCopy::<f64>::from_tree(&tree);
        assert_ne!(copy.values()[0] as f32 as f64, copy.values()[0]);

        let mut writer = BinaryWriter::new(Vec::new());
        copy.serialize(&mut writer).unwrap();
        let bytes = writer.into_inner().unwrap();

        let back = ParamsCopy::<f64>::reconstitute(&mut BinaryReader::new(bytes.as_slice())).unwrap();
        assert_eq!(back.values(), copy.values());
        assert_eq!(back.get("w").and_then(Param::shape), Some(Shape::Matrix(2, 2)));
        back.check_compatible(&copy).unwrap();
    }

    #[test]
    fn truncated_stores_are_rejected() {
        let mut w = [1.0f64; 4];
        let mut tree = ParamTree::new("model");
        tree.add_vector(0, "w", &mut w).unwrap();

        let mut writer = BinaryWriter::new(Vec::new());
        tree.serialize(&mut writer).unwrap();
        let mut bytes = writer.into_inner().unwrap();
        bytes.truncate(bytes.len() - 1);

        assert!(matches!(
            ParamsCopy::<f64>::reconstitute(&mut BinaryReader::new(bytes.as_slice())),
            Err(ParamErr::Io(_))
        ));
        assert!(matches!(
            ParamsCopy::<f64>::reconstitute(&mut BinaryReader::new(&b"garbage!garbage!"[..])),
            Err(ParamErr::Format(_))
        ));
    }
}
