mod random;

pub use random::{RandomSource, symmetric_range};
