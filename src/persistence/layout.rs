use log::trace;

use super::{MAGIC, StoreReader, StoreWriter, VERSION};
use crate::{
    error::{ParamErr, Result},
    precision::{Precision, PrecisionKind},
    storage::{
        Param, ParamTree, ParameterValue, Shape, View,
        cells::CellSource,
    },
};

const NODE_TREE: u8 = 0;
const NODE_LEAF: u8 = 1;

const SHAPE_VECTOR: u8 = 0;
const SHAPE_MATRIX: u8 = 1;

const LITTLE_ENDIAN: u8 = 0;
const BIG_ENDIAN: u8 = 1;

/// The deepest nesting accepted when reading a layout.
const MAX_DEPTH: usize = 64;

fn native_byte_order() -> u8 {
    if cfg!(target_endian = "little") {
        LITTLE_ENDIAN
    } else {
        BIG_ENDIAN
    }
}

pub(crate) fn write_header<W: StoreWriter>(store: &mut W) -> Result<()> {
    store.write_u64(MAGIC)?;
    store.write_u8(VERSION)?;
    store.write_u8(native_byte_order())
}

/// Reads and validates the header written by `write_header`.
///
/// # Returns
/// A `Format` error if the magic, the version or the byte order are not the expected ones.
pub(crate) fn read_header<R: StoreReader>(store: &mut R) -> Result<()> {
    if store.read_u64()? != MAGIC {
        return Err(ParamErr::format("not a persisted parameter tree"));
    }

    let version = store.read_u8()?;
    if version != VERSION {
        return Err(ParamErr::format(format!("unsupported version {version}")));
    }

    let order = store.read_u8()?;
    if order != native_byte_order() {
        return Err(ParamErr::format(format!("unsupported byte order {order}")));
    }

    Ok(())
}

/// Checks `tree` isn't nested deeper than a layout can be read back with.
///
/// # Returns
/// A `Format` error naming the depth otherwise.
pub(crate) fn check_depth(tree: &ParamTree<'_>) -> Result<()> {
    let depth = deepest(tree);

    if depth > MAX_DEPTH {
        return Err(ParamErr::format(format!(
            "nested {depth} levels deep, at most {MAX_DEPTH} can be stored"
        )));
    }

    Ok(())
}

fn deepest(tree: &ParamTree<'_>) -> usize {
    tree.iter()
        .map(|(_, param)| match param {
            Param::Tree(tree) => 1 + deepest(tree),
            _ => 1,
        })
        .max()
        .unwrap_or(0)
}

/// Writes the structure of `tree`, without values.
pub(crate) fn write_layout<W: StoreWriter>(store: &mut W, tree: &ParamTree<'_>) -> Result<()> {
    store.write_u8(NODE_TREE)?;
    store.write_str(tree.name())?;
    store.write_u64(tree.len() as u64)?;

    for (index, param) in tree.iter() {
        store.write_u64(index as u64)?;

        match param {
            Param::F32(view) => write_leaf(store, view)?,
            Param::F64(view) => write_leaf(store, view)?,
            Param::Tree(tree) => write_layout(store, tree)?,
        }
    }

    Ok(())
}

fn write_leaf<T: Precision, W: StoreWriter>(store: &mut W, view: &View<'_, T>) -> Result<()> {
    store.write_u8(NODE_LEAF)?;
    store.write_str(view.name())?;
    store.write_u8(T::KIND.tag())?;

    match view.shape() {
        Shape::Vector(len) => {
            store.write_u8(SHAPE_VECTOR)?;
            store.write_u64(len as u64)
        }
        Shape::Matrix(rows, cols) => {
            store.write_u8(SHAPE_MATRIX)?;
            store.write_u64(rows as u64)?;
            store.write_u64(cols as u64)
        }
    }
}

/// Writes the values block: their precision, their amount and the values themselves.
pub(crate) fn write_values<T: Precision, W: StoreWriter>(store: &mut W, values: &[T]) -> Result<()> {
    store.write_u8(T::KIND.tag())?;
    store.write_u64(values.len() as u64)?;
    store.write_values(values)
}

/// Reads the values block and converts the values to `T`.
///
/// # Arguments
/// * `expected` - The amount of values the layout describes.
///
/// # Returns
/// The values, or a `Format` error if the block holds a different amount.
pub(crate) fn read_values<T: Precision, R: StoreReader>(
    store: &mut R,
    expected: usize,
) -> Result<Vec<T>> {
    let precision = read_precision(store)?;
    let count = read_usize(store)?;

    if count != expected {
        return Err(ParamErr::format(format!(
            "the layout describes {expected} values but {count} were stored"
        )));
    }

    let values = match precision {
        PrecisionKind::Single => cast_all(store.read_values::<f32>(count)?),
        PrecisionKind::Double => cast_all(store.read_values::<f64>(count)?),
    };

    Ok(values)
}

fn cast_all<S: Precision, T: Precision>(values: Vec<S>) -> Vec<T> {
    values.into_iter().map(S::cast).collect()
}

fn read_precision<R: StoreReader>(store: &mut R) -> Result<PrecisionKind> {
    let tag = store.read_u8()?;
    PrecisionKind::from_tag(tag).ok_or_else(|| ParamErr::format(format!("unknown precision {tag}")))
}

fn read_usize<R: StoreReader>(store: &mut R) -> Result<usize> {
    let value = store.read_u64()?;
    usize::try_from(value).map_err(|_| ParamErr::format(format!("{value} doesn't fit in memory")))
}

/// A parameter tree layout read back from a store, before any memory is laid out.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Skeleton {
    Tree {
        name: String,
        children: Vec<(usize, Skeleton)>,
    },
    Leaf {
        name: String,
        precision: PrecisionKind,
        shape: Shape,
    },
}

impl Skeleton {
    /// Reads the layout of a whole tree.
    ///
    /// # Returns
    /// The layout, or a `Format` error if it's malformed or its root is not a tree.
    pub(crate) fn read<R: StoreReader>(store: &mut R) -> Result<Self> {
        let skeleton = Self::read_node(store, 0)?;

        if !matches!(skeleton, Skeleton::Tree { .. }) {
            return Err(ParamErr::format("the root is not a tree"));
        }

        Ok(skeleton)
    }

    fn read_node<R: StoreReader>(store: &mut R, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(ParamErr::format(format!("nested deeper than {MAX_DEPTH} levels")));
        }

        let kind = store.read_u8()?;
        let name = store.read_string()?;
        trace!(depth = depth; "reading node '{name}'");

        match kind {
            NODE_TREE => {
                let len = read_usize(store)?;
                let mut children = Vec::new();

                for _ in 0..len {
                    let index = read_usize(store)?;
                    children.push((index, Self::read_node(store, depth + 1)?));
                }

                Ok(Skeleton::Tree { name, children })
            }
            NODE_LEAF => {
                let precision = read_precision(store)?;

                let shape = match store.read_u8()? {
                    SHAPE_VECTOR => Shape::Vector(read_usize(store)?),
                    SHAPE_MATRIX => Shape::Matrix(read_usize(store)?, read_usize(store)?),
                    tag => return Err(ParamErr::format(format!("unknown shape {tag}"))),
                };

                Ok(Skeleton::Leaf {
                    name,
                    precision,
                    shape,
                })
            }
            kind => Err(ParamErr::format(format!("unknown node kind {kind}"))),
        }
    }

    /// Returns the amount of values the layout describes.
    ///
    /// # Returns
    /// The amount, or a `Format` error if it overflows.
    pub(crate) fn count(&self) -> Result<usize> {
        let overflow = || ParamErr::format("the layout describes too many values");

        match self {
            Skeleton::Leaf { shape, .. } => match *shape {
                Shape::Vector(len) => Ok(len),
                Shape::Matrix(rows, cols) => rows.checked_mul(cols).ok_or_else(overflow),
            },
            Skeleton::Tree { children, .. } => children.iter().try_fold(0usize, |acc, (_, child)| {
                acc.checked_add(child.count()?).ok_or_else(overflow)
            }),
        }
    }

    /// Lays out the described tree over the cells of `source`.
    ///
    /// The caller checked `source` holds `count` cells. The new tree has no synchronization.
    ///
    /// # Returns
    /// The tree, or a `Format` error if the layout registers an index or a name twice.
    pub(crate) fn build<'b, U, S>(&self, source: &mut S) -> Result<ParamTree<'b>>
    where
        U: Precision,
        S: CellSource<'b, U>,
    {
        match self.build_node(source)? {
            Param::Tree(tree) => Ok(tree),
            _ => Err(ParamErr::format("the root is not a tree")),
        }
    }

    fn build_node<'b, U, S>(&self, source: &mut S) -> Result<Param<'b>>
    where
        U: Precision,
        S: CellSource<'b, U>,
    {
        match self {
            Skeleton::Leaf {
                name,
                precision,
                shape,
            } => {
                trace!("laying out '{name}', stored in {precision} precision");
                let cells = source.take(shape.count());
                Ok(View::with_cells(name.clone(), *shape, cells).into())
            }
            Skeleton::Tree { name, children } => {
                let mut tree = ParamTree::new(name.clone());

                for (index, child) in children {
                    let param = child.build_node(&mut *source)?;
                    tree.add(*index, param)
                        .map_err(|e| ParamErr::format(e.to_string()))?;
                }

                Ok(tree.into())
            }
        }
    }
}
