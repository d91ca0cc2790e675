use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::Result;

/// The randomness a parameter tree draws from when it's randomly filled.
pub trait RandomSource {
    /// Should draw a single value from `range`.
    ///
    /// # Arguments
    /// * `range` - The uniform distribution to sample.
    ///
    /// # Returns
    /// The drawn value.
    fn sample_uniform(&mut self, range: &Uniform<f64>) -> f64;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn sample_uniform(&mut self, range: &Uniform<f64>) -> f64 {
        range.sample(self)
    }
}

/// Creates the inclusive uniform distribution over `[-limit, limit]`.
///
/// # Arguments
/// * `limit` - The bound of the range.
///
/// # Returns
/// An `InvalidRange` error if `limit` is negative or not finite.
pub fn symmetric_range(limit: f64) -> Result<Uniform<f64>> {
    Ok(Uniform::new_inclusive(-limit, limit)?)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::error::ParamErr;

    /// Always yields the upper end of the range.
    struct Ceiling(f64);

    impl RandomSource for Ceiling {
        fn sample_uniform(&mut self, _: &Uniform<f64>) -> f64 {
            self.0
        }
    }

    #[test]
    fn rngs_are_random_sources() {
        let range = symmetric_range(1.).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let x = rng.sample_uniform(&range);
            assert!((-1.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn custom_sources_can_be_plugged_in() {
        let range = symmetric_range(0.5).unwrap();
        assert_eq!(Ceiling(0.5).sample_uniform(&range), 0.5);
    }

    #[test]
    fn zero_limit_is_a_constant() {
        let range = symmetric_range(0.).unwrap();
        assert_eq!(StdRng::seed_from_u64(0).sample_uniform(&range), 0.);
    }

    #[test]
    fn unusable_limits_are_rejected() {
        assert!(matches!(symmetric_range(-1.), Err(ParamErr::InvalidRange(_))));
        assert!(matches!(symmetric_range(f64::INFINITY), Err(ParamErr::InvalidRange(_))));
        assert!(matches!(symmetric_range(f64::NAN), Err(ParamErr::InvalidRange(_))));
    }
}
