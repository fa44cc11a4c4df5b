//! Per-revision schedule of the ProgPoW inner loop.
//!
//! The shape of the mix state (lanes, registers, DAG loads) is fixed by the
//! crate constants in [`crate::progpow`]; what changes between revisions is
//! how often the program changes and how many cache and math operations each
//! loop issues.

pub trait ProgPowParams {
	/// Human readable revision name, used in log lines.
	const NAME: &'static str;
	/// Number of blocks between changes of the random program.
	const PERIOD: u64;
	/// Cached memory accesses per loop.
	const CNT_CACHE: usize;
	/// Random math operations per loop.
	const CNT_MATH: usize;
	/// Rounds of the Keccak-f800 permutation.
	const KECCAK_ROUNDS: usize;

	/// Seed of the random program for `block_number`.
	fn prog_seed(block_number: u64) -> u64 {
		block_number / Self::PERIOD
	}
}

/// ProgPoW 0.9.1 over the Ethash dataset.
#[derive(Debug, Clone, Copy)]
pub struct ProgPow091;

impl ProgPowParams for ProgPow091 {
	const NAME: &'static str = "progpow-0.9.1";
	const PERIOD: u64 = 50;
	const CNT_CACHE: usize = 12;
	const CNT_MATH: usize = 20;
	const KECCAK_ROUNDS: usize = 22;
}
