use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::types::H256;

/// True iff `result`, read as a big-endian 256-bit integer, is at most
/// `boundary`.
pub fn meets_target(result: &H256, boundary: &H256) -> bool {
	BigUint::from_bytes_be(result) <= BigUint::from_bytes_be(boundary)
}

/// `2^256 / difficulty` as a big-endian boundary. Difficulties of 0 and 1
/// saturate to the all-ones boundary.
pub fn boundary_from_difficulty(difficulty: u64) -> H256 {
	let difficulty = BigUint::from(difficulty);
	if difficulty.is_zero() || difficulty.is_one() {
		return [0xff; 32];
	}
	let boundary: BigUint = (BigUint::one() << 256usize) / difficulty;
	let bytes = boundary.to_bytes_be();
	let mut out = [0u8; 32];
	out[32 - bytes.len()..].copy_from_slice(&bytes);
	out
}
