//! Monte Carlo simulation of a member's beneficiaries
//!
//! Draws are split into fixed-size batches, each with its own RNG stream derived
//! from the run seed. Batches run in parallel and the output is identical for a
//! given seed regardless of how many threads execute them.

mod sampler;

pub use sampler::{BeneficiarySample, BeneficiarySampler, ClampCounts, SampleBatch, SamplerConfig};

/// SplitMix64 finaliser
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for an independent sub-stream of `base`
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    mix64(base ^ mix64(stream.wrapping_add(0x9E37_79B9_7F4A_7C15)))
}
