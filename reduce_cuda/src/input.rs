use crate::error::{ReduceError, Result};
use rand::Rng;

/// A uniformly distributed integer in `[min, max]`.
pub fn random_in_range(rng: &mut impl Rng, min: i32, max: i32) -> Result<i32> {
    if min > max {
        return Err(ReduceError::InvalidRange { min, max });
    }
    Ok(rng.gen_range(min..=max))
}

/// Creates `len` random integers in `[min, max]`.
pub fn random_input(rng: &mut impl Rng, len: usize, min: i32, max: i32) -> Result<Vec<i32>> {
    (0..len).map(|_| random_in_range(rng, min, max)).collect()
}

/// Host-side reference sum. Overflow wraps, matching the device.
pub fn serial_sum(xs: &[i32]) -> i32 {
    xs.iter().fold(0i32, |acc, &x| acc.wrapping_add(x))
}
