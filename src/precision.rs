use std::{
    fmt::{self, Debug, Display},
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::storage::{Param, View};

/// The numeric precision of a parameter buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionKind {
    Single,
    Double,
}

impl PrecisionKind {
    /// Returns the byte used to tag this precision in persisted data.
    pub fn tag(self) -> u8 {
        match self {
            PrecisionKind::Single => 0,
            PrecisionKind::Double => 1,
        }
    }

    /// Parses a persisted precision tag.
    ///
    /// # Arguments
    /// * `tag` - The persisted byte.
    ///
    /// # Returns
    /// The precision or `None` if the byte is not a known tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PrecisionKind::Single),
            1 => Some(PrecisionKind::Double),
            _ => None,
        }
    }
}

impl Display for PrecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecisionKind::Single => f.write_str("single"),
            PrecisionKind::Double => f.write_str("double"),
        }
    }
}

/// A floating point type parameters can be stored in.
///
/// Values are kept inside atomic cells holding their bit pattern, so the same
/// buffer can be read and written from several threads. Every arithmetic
/// operation is carried out in `f64` and rounded back to the native precision.
pub trait Precision:
    bytemuck::Pod + Default + PartialEq + PartialOrd + Debug + Display + Send + Sync + 'static
{
    const KIND: PrecisionKind;

    /// The atomic cell with the same size and alignment as `Self`.
    type Atomic: Send + Sync + Debug;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    /// Converts the value into another precision.
    fn cast<U: Precision>(self) -> U {
        U::from_f64(self.to_f64())
    }

    fn new_atomic(value: Self) -> Self::Atomic;

    fn load(cell: &Self::Atomic) -> Self;

    fn store(cell: &Self::Atomic, value: Self);

    /// Applies `f` to the cell with a compare-and-swap loop, `f` may be called more than once.
    fn fetch_update<F: FnMut(Self) -> Self>(cell: &Self::Atomic, f: F);

    /// Wraps a view of this precision in the matching `Param` variant.
    fn wrap(view: View<'_, Self>) -> Param<'_>;

    /// Borrows the view inside `param` if it is a leaf of this precision.
    fn view_of<'p, 'a>(param: &'p Param<'a>) -> Option<&'p View<'a, Self>>;
}

macro_rules! impl_precision {
    ($float:ty, $atomic:ty, $kind:ident, $variant:ident) => {
        impl Precision for $float {
            const KIND: PrecisionKind = PrecisionKind::$kind;

            type Atomic = $atomic;

            fn from_f64(value: f64) -> Self {
                value as $float
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn new_atomic(value: Self) -> Self::Atomic {
                <$atomic>::new(value.to_bits())
            }

            fn load(cell: &Self::Atomic) -> Self {
                <$float>::from_bits(cell.load(Ordering::Relaxed))
            }

            fn store(cell: &Self::Atomic, value: Self) {
                cell.store(value.to_bits(), Ordering::Relaxed);
            }

            fn fetch_update<F: FnMut(Self) -> Self>(cell: &Self::Atomic, mut f: F) {
                // The closure never returns `None`, the update can't fail.
                let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                    Some(f(<$float>::from_bits(bits)).to_bits())
                });
            }

            fn wrap(view: View<'_, Self>) -> Param<'_> {
                Param::$variant(view)
            }

            fn view_of<'p, 'a>(param: &'p Param<'a>) -> Option<&'p View<'a, Self>> {
                match param {
                    Param::$variant(view) => Some(view),
                    _ => None,
                }
            }
        }
    };
}

impl_precision!(f32, AtomicU32, Single, F32);
impl_precision!(f64, AtomicU64, Double, F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casting_single_to_double_is_lossless() {
        let x = 0.1f32;
        let y: f64 = x.cast();
        assert_eq!(y.cast::<f32>(), x);
    }

    #[test]
    fn atomic_cells_hold_the_bit_pattern() {
        let cell = f64::new_atomic(1.5);
        assert_eq!(f64::load(&cell), 1.5);

        f64::store(&cell, -2.25);
        assert_eq!(f64::load(&cell), -2.25);

        f64::fetch_update(&cell, |x| x * 2.);
        assert_eq!(f64::load(&cell), -4.5);
    }

    #[test]
    fn tags_round_trip() {
        for kind in [PrecisionKind::Single, PrecisionKind::Double] {
            assert_eq!(PrecisionKind::from_tag(kind.tag()), Some(kind));
        }

        assert_eq!(PrecisionKind::from_tag(7), None);
        assert_eq!(f32::KIND, PrecisionKind::Single);
        assert_eq!(f64::KIND, PrecisionKind::Double);
    }
}
