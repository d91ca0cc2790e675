use super::{ParamTree, Shape, View, cells::CellSource};
use crate::{
    error::{ParamErr, Result},
    locking::Access,
    precision::{Precision, PrecisionKind},
};

/// The contract every parameter storage implements, regardless of its precision
/// or of who owns the memory.
pub trait ParameterValue {
    fn name(&self) -> &str;

    /// Returns the amount of scalar parameters this handle represents.
    fn parameter_count(&self) -> usize;

    /// Copies the parameters into `out`, converting them to `U`.
    ///
    /// # Arguments
    /// * `out` - The destination, must hold exactly `parameter_count` elements.
    ///
    /// # Returns
    /// The amount of values written or a `SizeMismatch` if `out` is undersized or oversized.
    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize>;

    /// Creates a handle with the same layout that references `values` instead,
    /// the given buffer is not modified.
    ///
    /// # Arguments
    /// * `values` - The buffer to reference, must hold exactly `parameter_count` elements.
    ///
    /// # Returns
    /// The new handle or a `SizeMismatch` if `values` has a different length.
    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>>;

    /// Same as `compatible_ref`, but `values` is first initialized with the current values.
    fn compatible_copy<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        self.copy_to(values)?;
        self.compatible_ref(values)
    }
}

/// A child of a parameter tree.
#[derive(Debug)]
pub enum Param<'a> {
    F32(View<'a, f32>),
    F64(View<'a, f64>),
    Tree(ParamTree<'a>),
}

impl<'a> Param<'a> {
    /// Borrows the view if this is a leaf of precision `T`.
    pub fn as_view<T: Precision>(&self) -> Option<&View<'a, T>> {
        T::view_of(self)
    }

    pub fn as_tree(&self) -> Option<&ParamTree<'a>> {
        match self {
            Param::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub(crate) fn as_tree_mut(&mut self) -> Option<&mut ParamTree<'a>> {
        match self {
            Param::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Returns the shape of a leaf, `None` for trees.
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Param::F32(view) => Some(view.shape()),
            Param::F64(view) => Some(view.shape()),
            Param::Tree(_) => None,
        }
    }

    /// Returns the native precision of a leaf, `None` for trees.
    pub fn precision(&self) -> Option<PrecisionKind> {
        match self {
            Param::F32(_) => Some(PrecisionKind::Single),
            Param::F64(_) => Some(PrecisionKind::Double),
            Param::Tree(_) => None,
        }
    }

    pub(crate) fn map<F>(&self, access: Access, f: &F)
    where
        F: Fn(f64) -> f64,
    {
        match self {
            Param::F32(view) => view.map(access, f),
            Param::F64(view) => view.map(access, f),
            Param::Tree(tree) => tree.map_with(access, f),
        }
    }

    pub(crate) fn map_serial(&self, access: Access, f: &mut dyn FnMut(f64) -> f64) {
        match self {
            Param::F32(view) => view.map(access, &mut *f),
            Param::F64(view) => view.map(access, &mut *f),
            Param::Tree(tree) => tree.map_serial(access, f),
        }
    }

    /// Combines this parameter with `other` element-wise.
    ///
    /// # Panics
    /// If the layouts differ, callers run `check_compatible` first.
    pub(crate) fn zip_map<F>(&self, other: &Param<'_>, access: Access, f: &F)
    where
        F: Fn(f64, f64) -> f64,
    {
        match (self, other) {
            (Param::Tree(mine), Param::Tree(theirs)) => mine.zip_with(theirs, access, f),
            (Param::F32(mine), theirs) => zip_leaf(mine, theirs, access, f),
            (Param::F64(mine), theirs) => zip_leaf(mine, theirs, access, f),
            (Param::Tree(_), _) => unreachable!("layouts are checked before zipping"),
        }
    }

    pub(crate) fn sum_squares(&self, access: Access) -> f64 {
        match self {
            Param::F32(view) => view.sum_squares(access),
            Param::F64(view) => view.sum_squares(access),
            Param::Tree(tree) => tree.sum_squares(access),
        }
    }

    pub(crate) fn copy_with<U: Precision>(&self, out: &mut [U], access: Access) -> usize {
        match self {
            Param::F32(view) => view.copy_with(out, access),
            Param::F64(view) => view.copy_with(out, access),
            Param::Tree(tree) => tree.copy_with(out, access),
        }
    }

    pub(crate) fn rebuild<'b, U, S>(&self, source: &mut S) -> Param<'b>
    where
        U: Precision,
        S: CellSource<'b, U>,
    {
        match self {
            Param::F32(view) => view.rebuild(source).into(),
            Param::F64(view) => view.rebuild(source).into(),
            Param::Tree(tree) => Param::Tree(tree.rebuild_tree(source)),
        }
    }

    /// Checks that `other` has the same layout: same kind, same leaf shapes and,
    /// for trees, the same children in the same order. Precisions may differ.
    pub(crate) fn check_compatible(&self, other: &Param<'_>) -> Result<()> {
        match (self, other) {
            (Param::Tree(mine), Param::Tree(theirs)) => mine.check_compatible(theirs),
            (Param::Tree(_), _) | (_, Param::Tree(_)) => Err(ParamErr::StructureMismatch {
                name: self.name().to_owned(),
                detail: "a tree can't be combined with a leaf".to_owned(),
            }),
            (mine, theirs) if mine.shape() != theirs.shape() => {
                Err(ParamErr::StructureMismatch {
                    name: self.name().to_owned(),
                    detail: format!("shape {:?} against {:?}", mine.shape(), theirs.shape()),
                })
            }
            _ => Ok(()),
        }
    }
}

fn zip_leaf<T, F>(mine: &View<'_, T>, theirs: &Param<'_>, access: Access, f: &F)
where
    T: Precision,
    F: Fn(f64, f64) -> f64,
{
    match theirs {
        Param::F32(theirs) => mine.zip_map(theirs, access, f),
        Param::F64(theirs) => mine.zip_map(theirs, access, f),
        Param::Tree(_) => unreachable!("layouts are checked before zipping"),
    }
}

impl ParameterValue for Param<'_> {
    fn name(&self) -> &str {
        match self {
            Param::F32(view) => view.name(),
            Param::F64(view) => view.name(),
            Param::Tree(tree) => tree.name(),
        }
    }

    fn parameter_count(&self) -> usize {
        match self {
            Param::F32(view) => view.parameter_count(),
            Param::F64(view) => view.parameter_count(),
            Param::Tree(tree) => tree.parameter_count(),
        }
    }

    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize> {
        match self {
            Param::F32(view) => view.copy_to(out),
            Param::F64(view) => view.copy_to(out),
            Param::Tree(tree) => tree.copy_to(out),
        }
    }

    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        match self {
            Param::F32(view) => view.compatible_ref(values),
            Param::F64(view) => view.compatible_ref(values),
            Param::Tree(tree) => tree.compatible_ref(values),
        }
    }
}

impl<'a, T: Precision> From<View<'a, T>> for Param<'a> {
    fn from(view: View<'a, T>) -> Self {
        T::wrap(view)
    }
}

impl<'a> From<ParamTree<'a>> for Param<'a> {
    fn from(tree: ParamTree<'a>) -> Self {
        Param::Tree(tree)
    }
}
