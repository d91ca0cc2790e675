use std::{mem, ops::Deref, ops::Range, slice, sync::Arc};

use crate::precision::Precision;

/// The backing memory of a leaf.
///
/// Either borrowed from a buffer somebody else owns, or a range of a
/// buffer shared by every leaf of an owned copy.
#[derive(Debug)]
pub(crate) enum Cells<'a, T: Precision> {
    Borrowed(&'a [T::Atomic]),
    Shared {
        buffer: Arc<[T::Atomic]>,
        range: Range<usize>,
    },
}

impl<'a, T: Precision> Cells<'a, T> {
    /// Borrows `values` exclusively for `'a` and exposes them as atomic cells.
    pub(crate) fn borrow(values: &'a mut [T]) -> Self {
        Self::Borrowed(as_atomics(values))
    }
}

impl<T: Precision> Deref for Cells<'_, T> {
    type Target = [T::Atomic];

    fn deref(&self) -> &Self::Target {
        match self {
            Cells::Borrowed(cells) => cells,
            Cells::Shared { buffer, range } => &buffer[range.clone()],
        }
    }
}

/// Reinterprets a mutable float slice as a slice of atomic cells.
///
/// # Arguments
/// * `values` - The floats to reinterpret.
///
/// # Returns
/// The same memory as atomics, borrowed for as long as `values` was.
pub(crate) fn as_atomics<T: Precision>(values: &mut [T]) -> &[T::Atomic] {
    const {
        assert!(mem::size_of::<T>() == mem::size_of::<T::Atomic>());
        assert!(mem::align_of::<T>() == mem::align_of::<T::Atomic>());
    }

    // SAFETY: Both types have the same size and alignment (checked at compile time) and
    //         every bit pattern is a valid float. The exclusive borrow guarantees nothing
    //         else accesses the memory non-atomically while the returned slice lives.
    unsafe { slice::from_raw_parts(values.as_mut_ptr().cast::<T::Atomic>(), values.len()) }
}

/// Something leaves can be laid out over, one leaf after the other.
pub(crate) trait CellSource<'b, T: Precision> {
    /// Takes the cells for the next leaf of `n` elements.
    fn take(&mut self, n: usize) -> Cells<'b, T>;
}

/// Hands out consecutive cells of a borrowed buffer.
pub(crate) struct Splitter<'b, T: Precision> {
    rest: &'b [T::Atomic],
}

impl<'b, T: Precision> Splitter<'b, T> {
    pub(crate) fn new(values: &'b mut [T]) -> Self {
        Self {
            rest: as_atomics(values),
        }
    }
}

impl<'b, T: Precision> CellSource<'b, T> for Splitter<'b, T> {
    /// # Panics
    /// If fewer than `n` cells are left, callers check the total size up front.
    fn take(&mut self, n: usize) -> Cells<'b, T> {
        let (head, tail) = mem::take(&mut self.rest).split_at(n);
        self.rest = tail;
        Cells::Borrowed(head)
    }
}

/// Hands out consecutive ranges of one owned buffer.
pub(crate) struct Slicer<T: Precision> {
    buffer: Arc<[T::Atomic]>,
    offset: usize,
}

impl<T: Precision> Slicer<T> {
    pub(crate) fn new(buffer: Arc<[T::Atomic]>) -> Self {
        Self { buffer, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }
}

impl<T: Precision> CellSource<'static, T> for Slicer<T> {
    fn take(&mut self, n: usize) -> Cells<'static, T> {
        let range = self.offset..self.offset + n;
        self.offset += n;

        Cells::Shared {
            buffer: Arc::clone(&self.buffer),
            range,
        }
    }
}
