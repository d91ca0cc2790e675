use std::fmt::{self, Debug};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;

use super::{
    Param, ParameterValue,
    cells::{CellSource, Cells, Splitter},
};
use crate::{
    error::{ParamErr, Result, check_len},
    locking::Access,
    precision::Precision,
};

/// The logical shape of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Vector(usize),
    /// A row-major `rows x cols` matrix.
    Matrix(usize, usize),
}

impl Shape {
    /// Returns the amount of elements of this shape.
    ///
    /// Saturates at `usize::MAX`, an amount no buffer can hold.
    pub fn count(self) -> usize {
        match self {
            Shape::Vector(len) => len,
            Shape::Matrix(rows, cols) => rows.saturating_mul(cols),
        }
    }

    /// Returns the amount of rows, a vector is a single row.
    pub fn rows(self) -> usize {
        match self {
            Shape::Vector(_) => 1,
            Shape::Matrix(rows, _) => rows,
        }
    }

    /// Returns the length of every row.
    pub fn row_len(self) -> usize {
        match self {
            Shape::Vector(len) => len,
            Shape::Matrix(_, cols) => cols,
        }
    }
}

/// A leaf handle over a contiguous buffer of precision `T`.
///
/// The buffer is either borrowed from its owner for `'a` or a slice of an
/// owned copy's buffer. Each row carries its own lock, used by the
/// `Fine` locking policy.
pub struct View<'a, T: Precision> {
    name: String,
    shape: Shape,
    cells: Cells<'a, T>,
    rows: Box<[Mutex<()>]>,
}

impl<'a, T: Precision> View<'a, T> {
    pub(crate) fn with_cells(name: impl Into<String>, shape: Shape, cells: Cells<'a, T>) -> Self {
        // Rows without elements have nothing to guard.
        let rows = if cells.is_empty() { 0 } else { shape.rows() };

        Self {
            name: name.into(),
            shape,
            cells,
            rows: (0..rows).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Creates a new vector `View`.
    ///
    /// # Arguments
    /// * `name` - The name of the parameter.
    /// * `values` - The buffer to reference, it stays borrowed while the view lives.
    ///
    /// # Returns
    /// A new `View` instance.
    pub fn vector(name: impl Into<String>, values: &'a mut [T]) -> Self {
        let shape = Shape::Vector(values.len());
        Self::with_cells(name, shape, Cells::borrow(values))
    }

    /// Creates a new matrix `View`.
    ///
    /// # Arguments
    /// * `name` - The name of the parameter.
    /// * `values` - The row-major buffer to reference.
    /// * `rows` - The amount of rows of the matrix.
    /// * `cols` - The amount of columns of the matrix.
    ///
    /// # Returns
    /// A new `View` instance, or a `SizeMismatch` if `values` doesn't hold `rows * cols` elements.
    pub fn matrix(
        name: impl Into<String>,
        values: &'a mut [T],
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let shape = Shape::Matrix(rows, cols);
        check_len("matrix buffer", values.len(), shape.count())?;
        Ok(Self::with_cells(name, shape, Cells::borrow(values)))
    }

    /// Creates a new vector `View` over an `ndarray` array.
    ///
    /// # Returns
    /// A new `View` instance, or a `NonContiguous` error if the array isn't in standard layout.
    pub fn from_array1(name: impl Into<String>, values: &'a mut Array1<T>) -> Result<Self> {
        let name = name.into();

        match values.as_slice_mut() {
            Some(values) => Ok(Self::vector(name, values)),
            None => Err(ParamErr::NonContiguous { name }),
        }
    }

    /// Creates a new matrix `View` over an `ndarray` array.
    ///
    /// # Returns
    /// A new `View` instance, or a `NonContiguous` error if the array isn't in standard layout.
    pub fn from_array2(name: impl Into<String>, values: &'a mut Array2<T>) -> Result<Self> {
        let name = name.into();
        let (rows, cols) = values.dim();

        match values.as_slice_mut() {
            Some(values) => Self::matrix(name, values, rows, cols),
            None => Err(ParamErr::NonContiguous { name }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Reads a single element.
    pub fn get(&self, i: usize) -> Option<T> {
        self.cells.get(i).map(T::load)
    }

    /// Returns a snapshot of the referenced values.
    pub fn to_vec(&self) -> Vec<T> {
        self.cells.iter().map(T::load).collect()
    }

    /// Visits every row, holding the row's lock if `access` asks for it.
    fn for_each_row<F>(&self, access: Access, mut f: F)
    where
        F: FnMut(usize, &[T::Atomic]),
    {
        let row_len = self.shape.row_len();

        for (row, lock) in self.rows.iter().enumerate() {
            let _guard = access.locks_rows().then(|| lock.lock());
            let start = row * row_len;
            f(start, &self.cells[start..start + row_len]);
        }
    }

    /// Replaces every element `x` at index `i` by `f(i, x)`.
    fn modify<F>(&self, access: Access, mut f: F)
    where
        F: FnMut(usize, f64) -> f64,
    {
        self.for_each_row(access, |start, row| {
            for (i, cell) in row.iter().enumerate() {
                let i = start + i;

                if access == Access::Atomic {
                    T::fetch_update(cell, |x| T::from_f64(f(i, x.to_f64())));
                } else {
                    T::store(cell, T::from_f64(f(i, T::load(cell).to_f64())));
                }
            }
        });
    }

    pub(crate) fn map<F>(&self, access: Access, mut f: F)
    where
        F: FnMut(f64) -> f64,
    {
        self.modify(access, |_, x| f(x));
    }

    /// Combines every element with the element at the same position in `other`.
    ///
    /// The caller guarantees both views have the same amount of elements,
    /// `other` is read without taking its locks.
    pub(crate) fn zip_map<U, F>(&self, other: &View<'_, U>, access: Access, f: F)
    where
        U: Precision,
        F: Fn(f64, f64) -> f64,
    {
        let theirs = &other.cells;
        self.modify(access, |i, x| f(x, U::load(&theirs[i]).to_f64()));
    }

    pub(crate) fn sum_squares(&self, access: Access) -> f64 {
        let mut sum = 0.;

        self.for_each_row(access, |_, row| {
            sum += row
                .iter()
                .map(|cell| T::load(cell).to_f64().powi(2))
                .sum::<f64>();
        });

        sum
    }

    /// Copies the values into `out`, the caller checks that the length matches.
    pub(crate) fn copy_with<U: Precision>(&self, out: &mut [U], access: Access) -> usize {
        self.for_each_row(access, |start, row| {
            for (o, cell) in out[start..start + row.len()].iter_mut().zip(row) {
                *o = T::load(cell).cast();
            }
        });

        self.cells.len()
    }

    /// Lays out a view with the same name and shape over the next cells of `source`.
    pub(crate) fn rebuild<'b, U, S>(&self, source: &mut S) -> View<'b, U>
    where
        U: Precision,
        S: CellSource<'b, U>,
    {
        View::with_cells(self.name.clone(), self.shape, source.take(self.shape.count()))
    }

    /// Creates a view with this view's name and shape over `values`, without copying.
    ///
    /// # Returns
    /// The new view or a `SizeMismatch` if `values` doesn't hold exactly as many elements.
    pub fn compatible_view<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<View<'b, U>> {
        check_len("compatible buffer", values.len(), self.shape.count())?;
        Ok(self.rebuild(&mut Splitter::new(values)))
    }
}

impl<T: Precision> ParameterValue for View<'_, T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_count(&self) -> usize {
        self.shape.count()
    }

    fn copy_to<U: Precision>(&self, out: &mut [U]) -> Result<usize> {
        check_len("destination", out.len(), self.shape.count())?;
        Ok(self.copy_with(out, Access::Plain))
    }

    fn compatible_ref<'b, U: Precision>(&self, values: &'b mut [U]) -> Result<Param<'b>> {
        self.compatible_view(values).map(Param::from)
    }
}

impl<T: Precision> Debug for View<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("precision", &T::KIND)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, ShapeBuilder};

    use super::*;

    #[test]
    fn copy_to_converts_precision() {
        let mut values = [0.5f32, -1.25, 3.];
        let view = View::vector("bias", &mut values);

        let mut out = [0.0f64; 3];
        assert_eq!(view.copy_to(&mut out).unwrap(), 3);
        assert_eq!(out, [0.5, -1.25, 3.]);
    }

    #[test]
    fn copy_to_rejects_undersized_and_oversized_destinations() {
        let mut values = [1.0f64, 2., 3.];
        let view = View::vector("w", &mut values);

        let mut small = [0.0f32; 2];
        let mut large = [0.0f32; 4];
        assert!(matches!(
            view.copy_to(&mut small),
            Err(ParamErr::SizeMismatch { got: 2, expected: 3, .. })
        ));
        assert!(matches!(
            view.copy_to(&mut large),
            Err(ParamErr::SizeMismatch { got: 4, expected: 3, .. })
        ));
        assert_eq!(large, [0.; 4]);
    }

    #[test]
    fn matrix_requires_matching_buffer() {
        let mut values = [0.0f32; 5];
        assert!(View::matrix("w", &mut values, 2, 3).is_err());

        let mut values = [0.0f32; 6];
        let view = View::matrix("w", &mut values, 2, 3).unwrap();
        assert_eq!(view.parameter_count(), 6);
        assert_eq!(view.shape(), Shape::Matrix(2, 3));
    }

    #[test]
    fn overflowing_dimensions_are_size_mismatches() {
        let mut values = [0.0f32; 4];
        assert!(matches!(
            View::matrix("w", &mut values, usize::MAX, 2),
            Err(ParamErr::SizeMismatch { got: 4, .. })
        ));
        assert_eq!(Shape::Matrix(usize::MAX, 2).count(), usize::MAX);
    }

    #[test]
    fn compatible_ref_keeps_the_matrix_shape() {
        let mut values = [1.0f32, 2., 3., 4., 5., 6.];
        let view = View::matrix("w", &mut values, 3, 2).unwrap();

        let mut other = [0.0f64; 6];
        let param = view.compatible_ref(&mut other).unwrap();

        assert_eq!(param.name(), "w");
        assert_eq!(param.shape(), Some(Shape::Matrix(3, 2)));
        assert_eq!(param.precision(), Some(f64::KIND));
    }

    #[test]
    fn compatible_ref_rejects_wrong_sizes() {
        let mut values = [1.0f32; 4];
        let view = View::vector("w", &mut values);

        let mut small = [0.0f32; 3];
        let mut large = [0.0f32; 5];
        assert!(view.compatible_ref(&mut small).is_err());
        assert!(view.compatible_ref(&mut large).is_err());
    }

    #[test]
    fn compatible_copy_initializes_the_new_range() {
        let mut values = [1.5f32, 2.5];
        let view = View::vector("b", &mut values);

        let mut single = [0.0f32; 2];
        let copy = view.compatible_copy(&mut single).unwrap();
        assert_eq!(copy.as_view::<f32>().unwrap().to_vec(), [1.5, 2.5]);
        drop(copy);
        assert_eq!(single, [1.5, 2.5]);

        let mut double = [0.0f64; 2];
        view.compatible_copy(&mut double).unwrap();
        assert_eq!(double, [1.5, 2.5]);
    }

    #[test]
    fn zip_map_mixes_precisions() {
        let mut mine = [2.0f32, 4.];
        let mut theirs = [0.5f64, 1.];
        let mine = View::vector("w", &mut mine);
        let theirs = View::vector("w", &mut theirs);

        mine.zip_map(&theirs, Access::Rows, |x, g| x - 2. * g);
        assert_eq!(mine.to_vec(), [1., 2.]);
    }

    #[test]
    fn arrays_must_be_contiguous() {
        let mut standard = Array2::<f64>::zeros((2, 3));
        let view = View::from_array2("w", &mut standard).unwrap();
        assert_eq!(view.shape(), Shape::Matrix(2, 3));

        let mut transposed = Array2::<f64>::zeros((2, 3).f());
        assert!(matches!(
            View::from_array2("w", &mut transposed),
            Err(ParamErr::NonContiguous { .. })
        ));
    }

    #[test]
    fn empty_views_are_valid() {
        let mut values: [f64; 0] = [];
        let view = View::vector("empty", &mut values);
        assert_eq!(view.parameter_count(), 0);
        assert_eq!(view.sum_squares(Access::Rows), 0.);

        let mut out: [f32; 0] = [];
        assert_eq!(view.copy_to(&mut out).unwrap(), 0);

        let mut values: [f32; 0] = [];
        let columnless = View::matrix("w", &mut values, usize::MAX, 0).unwrap();
        assert_eq!(columnless.shape(), Shape::Matrix(usize::MAX, 0));
        columnless.map(Access::Rows, |x| x + 1.);
        assert_eq!(columnless.sum_squares(Access::Rows), 0.);
        assert!(columnless.to_vec().is_empty());
    }
}
