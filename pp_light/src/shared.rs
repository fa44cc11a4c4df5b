use std::cmp;

use byteorder::{ByteOrder, LittleEndian};
use primal::is_prime;

pub const DATASET_BYTES_INIT: u64 = 1 << 30;
pub const DATASET_BYTES_GROWTH: u64 = 1 << 23;
pub const CACHE_BYTES_INIT: u64 = 1 << 24;
pub const CACHE_BYTES_GROWTH: u64 = 1 << 17;

pub const ETHASH_EPOCH_LENGTH: u64 = 30000;
pub const ETHASH_CACHE_ROUNDS: usize = 3;
pub const ETHASH_MIX_BYTES: usize = 128;
pub const ETHASH_DATASET_PARENTS: u32 = 256;
pub const NODE_WORDS: usize = NODE_BYTES / 4;
pub const NODE_BYTES: usize = 64;

pub const FNV_PRIME: u32 = 0x0100_0193;
pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

pub type H256 = [u8; 32];
pub type NodeBytes = [u8; NODE_BYTES];
pub type NodeWords = [u32; NODE_WORDS];

pub fn epoch(block_number: u64) -> u64 {
	block_number / ETHASH_EPOCH_LENGTH
}

/// Sizes stop growing at this epoch, which keeps the size arithmetic in
/// 64 bits for every block number.
pub const MAX_SIZED_EPOCH: u64 = u32::MAX as u64;

fn sized_epoch(block_number: u64) -> u64 {
	cmp::min(epoch(block_number), MAX_SIZED_EPOCH)
}

pub fn get_cache_size(block_number: u64) -> usize {
	let mut sz: u64 = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * sized_epoch(block_number);
	sz -= NODE_BYTES as u64;
	while !is_prime(sz / NODE_BYTES as u64) {
		sz -= 2 * NODE_BYTES as u64;
	}
	sz as usize
}

pub fn get_data_size(block_number: u64) -> usize {
	let mut sz: u64 = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * sized_epoch(block_number);
	sz -= ETHASH_MIX_BYTES as u64;
	while !is_prime(sz / ETHASH_MIX_BYTES as u64) {
		sz -= 2 * ETHASH_MIX_BYTES as u64;
	}
	sz as usize
}

/// A cache size is usable when it is a whole, prime number of nodes.
pub fn is_valid_cache_size(size: usize) -> bool {
	size % NODE_BYTES == 0 && is_prime((size / NODE_BYTES) as u64)
}

/// A dataset size must be a prime number of mixes and hold at least the
/// ProgPoW L1 cache.
pub fn is_valid_data_size(size: usize) -> bool {
	size % ETHASH_MIX_BYTES == 0
		&& size >= crate::progpow::PROGPOW_CACHE_BYTES
		&& is_prime((size / ETHASH_MIX_BYTES) as u64)
}

/// FNV-1 step used by the Ethash dataset: multiply, then xor.
#[inline]
pub fn fnv_hash(x: u32, y: u32) -> u32 {
	x.wrapping_mul(FNV_PRIME) ^ y
}

/// FNV-1a step used by ProgPoW: xor, then multiply. `h` is updated in place.
#[inline]
pub fn fnv1a(h: &mut u32, d: u32) -> u32 {
	*h = (*h ^ d).wrapping_mul(FNV_PRIME);
	*h
}

/// One 64-byte item of the cache or the dataset, held as little-endian words.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Node {
	words: NodeWords,
}

impl Default for Node {
	fn default() -> Self {
		Node {
			words: [0; NODE_WORDS],
		}
	}
}

impl Node {
	pub fn from_bytes(bytes: &[u8]) -> Self {
		debug_assert_eq!(bytes.len(), NODE_BYTES);
		let mut words = [0u32; NODE_WORDS];
		LittleEndian::read_u32_into(bytes, &mut words);
		Node { words }
	}

	pub fn to_bytes(&self) -> NodeBytes {
		let mut bytes = [0u8; NODE_BYTES];
		LittleEndian::write_u32_into(&self.words, &mut bytes);
		bytes
	}

	#[inline]
	pub fn as_words(&self) -> &NodeWords {
		&self.words
	}

	#[inline]
	pub fn as_words_mut(&mut self) -> &mut NodeWords {
		&mut self.words
	}

	/// Word-wise xor of two nodes.
	pub fn xor(&self, other: &Node) -> Node {
		let mut out = *self;
		for (w, o) in out.words.iter_mut().zip(other.words.iter()) {
			*w ^= *o;
		}
		out
	}
}

impl std::fmt::Debug for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Node({:08x?})", &self.words[..])
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_get_cache_size() {
		assert_eq!(16776896usize, get_cache_size(0));
		assert_eq!(16776896usize, get_cache_size(1));
		assert_eq!(16776896usize, get_cache_size(ETHASH_EPOCH_LENGTH - 1));
		assert_eq!(16907456usize, get_cache_size(ETHASH_EPOCH_LENGTH));
		assert_eq!(16907456usize, get_cache_size(ETHASH_EPOCH_LENGTH + 1));
		assert_eq!(284950208usize, get_cache_size(2046 * ETHASH_EPOCH_LENGTH));
		assert_eq!(285081536usize, get_cache_size(2047 * ETHASH_EPOCH_LENGTH));
	}

	#[test]
	fn test_get_data_size() {
		assert_eq!(1073739904usize, get_data_size(0));
		assert_eq!(1073739904usize, get_data_size(1));
		assert_eq!(1073739904usize, get_data_size(ETHASH_EPOCH_LENGTH - 1));
		assert_eq!(1082130304usize, get_data_size(ETHASH_EPOCH_LENGTH));
		assert_eq!(1082130304usize, get_data_size(ETHASH_EPOCH_LENGTH + 1));
		assert_eq!(18236833408usize, get_data_size(2046 * ETHASH_EPOCH_LENGTH));
		assert_eq!(18245220736usize, get_data_size(2047 * ETHASH_EPOCH_LENGTH));
	}

	#[test]
	fn test_sizes_are_total() {
		let last = MAX_SIZED_EPOCH * ETHASH_EPOCH_LENGTH;
		assert_eq!(get_cache_size(u64::max_value()), get_cache_size(last));
		assert_eq!(get_data_size(u64::max_value()), get_data_size(last));
		assert!(is_valid_cache_size(get_cache_size(u64::max_value())));
		assert!(is_valid_data_size(get_data_size(u64::max_value())));
		assert!(get_data_size(last) > get_data_size(last - ETHASH_EPOCH_LENGTH));
	}

	#[test]
	fn test_sizes_grow_monotonically() {
		let mut prev = (0, 0);
		for e in 0..64 {
			let block = e * ETHASH_EPOCH_LENGTH;
			let cur = (get_cache_size(block), get_data_size(block));
			assert!(cur.0 >= prev.0 && cur.1 >= prev.1);
			assert!(is_valid_cache_size(cur.0));
			assert!(is_valid_data_size(cur.1));
			prev = cur;
		}
	}

	#[test]
	fn test_size_validation() {
		assert!(is_valid_cache_size(1021 * NODE_BYTES));
		assert!(!is_valid_cache_size(1024 * NODE_BYTES));
		assert!(!is_valid_cache_size(1021 * NODE_BYTES + 1));
		assert!(is_valid_data_size(4099 * ETHASH_MIX_BYTES));
		assert!(!is_valid_data_size(4096 * ETHASH_MIX_BYTES));
		// prime, but smaller than the L1 cache
		assert!(!is_valid_data_size(13 * ETHASH_MIX_BYTES));
	}

	#[test]
	fn test_fnv1a() {
		let mut h = FNV_OFFSET_BASIS;
		assert_eq!(fnv1a(&mut h, 0xDDD0A47B), 0xD37EE61A);
		assert_eq!(h, 0xD37EE61A);
	}

	#[test]
	fn test_node_bytes_are_little_endian() {
		let mut bytes = [0u8; NODE_BYTES];
		bytes[0] = 0x01;
		bytes[7] = 0x80;
		let node = Node::from_bytes(&bytes);
		assert_eq!(node.as_words()[0], 1);
		assert_eq!(node.as_words()[1], 0x8000_0000);
		assert_eq!(&node.to_bytes()[..], &bytes[..]);
	}
}
