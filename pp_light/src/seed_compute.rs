use crate::keccak::{keccak_256, H256};
use crate::shared;

use parking_lot::Mutex;

/// Memoizes the last `(epoch, seed)` pair so that walking forward through
/// epochs only hashes the difference.
pub struct SeedHashCompute {
	prev: Mutex<(u64, H256)>,
}

impl Default for SeedHashCompute {
	fn default() -> Self {
		SeedHashCompute {
			prev: Mutex::new((0, [0u8; 32])),
		}
	}
}

impl SeedHashCompute {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn hash_block_number(&self, block_number: u64) -> H256 {
		self.hash_epoch(shared::epoch(block_number))
	}

	pub fn hash_epoch(&self, epoch: u64) -> H256 {
		let mut prev = self.prev.lock();
		if epoch < prev.0 {
			trace!(target: "progpow", "seed memo reset, epoch {} < {}", epoch, prev.0);
			*prev = (0, [0u8; 32]);
		}
		if epoch > prev.0 {
			let seed = Self::resume_compute_seedhash(prev.1, prev.0, epoch);
			*prev = (epoch, seed);
		}
		prev.1
	}

	#[inline]
	pub fn resume_compute_seedhash(mut hash: H256, start_epoch: u64, end_epoch: u64) -> H256 {
		for _ in start_epoch..end_epoch {
			keccak_256::inplace(&mut hash);
		}
		hash
	}
}
