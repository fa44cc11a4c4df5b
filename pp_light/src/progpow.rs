//! The ProgPoW mixing pipeline.
//!
//! A hash evaluation runs an entry sponge over `header .. nonce`, expands the
//! resulting seed into `PROGPOW_LANES` lanes of `PROGPOW_REGS` registers, runs
//! `PROGPOW_CNT_DAG` loops of the per-period random program (each loop reads
//! one 256-byte dataset entry and a number of words from the 16 KiB L1 cache)
//! and finally folds the registers into a 256-bit digest that feeds the exit
//! sponge.
//!
//! The loop only ever reads the dataset through [`DatasetLookup`], so light
//! (on-demand) and full (precomputed) evaluation share this code.

use byteorder::{ByteOrder, LittleEndian};
use std::cmp;

use crate::keccak::f800;
use crate::params::ProgPowParams;
use crate::shared::{fnv1a, Node, FNV_OFFSET_BASIS, H256, NODE_BYTES, NODE_WORDS};

pub const PROGPOW_LANES: usize = 16;
pub const PROGPOW_REGS: usize = 32;
pub const PROGPOW_DAG_LOADS: usize = 4;
pub const PROGPOW_CACHE_BYTES: usize = 16 * 1024;
pub const PROGPOW_CACHE_WORDS: usize = PROGPOW_CACHE_BYTES / 4;
pub const PROGPOW_CNT_DAG: usize = 64;

/// Bytes of dataset consumed by all lanes in one loop.
pub const PROGPOW_DAG_ENTRY_BYTES: usize = PROGPOW_LANES * PROGPOW_DAG_LOADS * 4;
const NODES_PER_ENTRY: usize = PROGPOW_DAG_ENTRY_BYTES / NODE_BYTES;

/// The L1 cache: the first `PROGPOW_CACHE_BYTES` of the dataset as words.
pub type CDag = [u32; PROGPOW_CACHE_WORDS];

type Mix = [[u32; PROGPOW_REGS]; PROGPOW_LANES];

/// Read access to the Ethash dataset.
pub trait DatasetLookup {
	/// Size of the whole dataset in bytes.
	fn full_size(&self) -> usize;

	/// The 64-byte dataset node at `index`.
	fn node(&self, index: u32) -> Node;

	/// The L1 cache derived from the head of the dataset.
	fn c_dag(&self) -> &CDag;
}

/// Marsaglia's KISS99 generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kiss99 {
	z: u32,
	w: u32,
	jsr: u32,
	jcong: u32,
}

impl Kiss99 {
	pub fn new(z: u32, w: u32, jsr: u32, jcong: u32) -> Self {
		Kiss99 { z, w, jsr, jcong }
	}

	pub fn next_u32(&mut self) -> u32 {
		self.z = 36969u32
			.wrapping_mul(self.z & 65535)
			.wrapping_add(self.z >> 16);
		self.w = 18000u32
			.wrapping_mul(self.w & 65535)
			.wrapping_add(self.w >> 16);
		let mwc = (self.z << 16).wrapping_add(self.w);
		self.jsr ^= self.jsr << 17;
		self.jsr ^= self.jsr >> 13;
		self.jsr ^= self.jsr << 5;
		self.jcong = self.jcong.wrapping_mul(69069).wrapping_add(1234567);
		(mwc ^ self.jcong).wrapping_add(self.jsr)
	}
}

/// Random math between two registers.
pub fn progpow_math(a: u32, b: u32, r: u32) -> u32 {
	match r % 11 {
		0 => a.wrapping_add(b),
		1 => a.wrapping_mul(b),
		2 => ((u64::from(a) * u64::from(b)) >> 32) as u32,
		3 => cmp::min(a, b),
		4 => a.rotate_left(b),
		5 => a.rotate_right(b),
		6 => a & b,
		7 => a | b,
		8 => a ^ b,
		9 => a.leading_zeros() + b.leading_zeros(),
		_ => a.count_ones() + b.count_ones(),
	}
}

/// Merge `b` into `a`. Every variant keeps the entropy already in `a` even
/// when `b` has none.
pub fn progpow_merge(a: &mut u32, b: u32, r: u32) {
	*a = match r % 4 {
		0 => a.wrapping_mul(33).wrapping_add(b),
		1 => (*a ^ b).wrapping_mul(33),
		2 => a.rotate_left((r >> 16) % 32) ^ b,
		_ => a.rotate_right((r >> 16) % 32) ^ b,
	};
}

/// One Keccak-f800 sponge call over `header .. seed .. digest`, returning the
/// first eight lanes of the permuted state.
pub fn keccak_f800_progpow<P: ProgPowParams>(
	header: &H256,
	seed: u64,
	digest: &[u32; 8],
) -> [u32; 8] {
	let mut st = [0u32; f800::STATE_WORDS];
	LittleEndian::read_u32_into(header, &mut st[..8]);
	st[8] = seed as u32;
	st[9] = (seed >> 32) as u32;
	st[10..18].copy_from_slice(digest);

	f800::permute(&mut st, P::KECCAK_ROUNDS);

	let mut out = [0u32; 8];
	out.copy_from_slice(&st[..8]);
	out
}

/// The 64-bit seed taken from a sponge output, byte 0 being the most
/// significant.
#[inline]
pub fn hash_seed(words: &[u32; 8]) -> u64 {
	(u64::from(words[0].swap_bytes()) << 32) | u64::from(words[1].swap_bytes())
}

pub fn words_to_hash(words: &[u32; 8]) -> H256 {
	let mut out = [0u8; 32];
	LittleEndian::write_u32_into(words, &mut out);
	out
}

pub fn hash_to_words(hash: &H256) -> [u32; 8] {
	let mut out = [0u32; 8];
	LittleEndian::read_u32_into(hash, &mut out);
	out
}

fn fill_mix(seed: u64, lane_id: u32) -> [u32; PROGPOW_REGS] {
	let mut h = FNV_OFFSET_BASIS;
	let z = fnv1a(&mut h, seed as u32);
	let w = fnv1a(&mut h, (seed >> 32) as u32);
	let jsr = fnv1a(&mut h, lane_id);
	let jcong = fnv1a(&mut h, lane_id);
	let mut st = Kiss99::new(z, w, jsr, jcong);

	let mut mix = [0u32; PROGPOW_REGS];
	for reg in mix.iter_mut() {
		*reg = st.next_u32();
	}
	mix
}

/// The random program of one period: the generator state after shuffling
/// and the register visiting orders it produced.
#[derive(Clone)]
struct Program {
	rng: Kiss99,
	mix_seq_dst: [usize; PROGPOW_REGS],
	mix_seq_src: [usize; PROGPOW_REGS],
}

fn progpow_init(prog_seed: u64) -> Program {
	let mut h = FNV_OFFSET_BASIS;
	let z = fnv1a(&mut h, prog_seed as u32);
	let w = fnv1a(&mut h, (prog_seed >> 32) as u32);
	let jsr = fnv1a(&mut h, prog_seed as u32);
	let jcong = fnv1a(&mut h, (prog_seed >> 32) as u32);
	let mut rng = Kiss99::new(z, w, jsr, jcong);

	let mut mix_seq_dst = [0usize; PROGPOW_REGS];
	let mut mix_seq_src = [0usize; PROGPOW_REGS];
	for i in 0..PROGPOW_REGS {
		mix_seq_dst[i] = i;
		mix_seq_src[i] = i;
	}
	// Fisher-Yates: every register is a destination once per pass and no
	// cache read repeats a source register
	for i in (1..PROGPOW_REGS).rev() {
		let j = rng.next_u32() as usize % (i + 1);
		mix_seq_dst.swap(i, j);
		let j = rng.next_u32() as usize % (i + 1);
		mix_seq_src.swap(i, j);
	}

	Program {
		rng,
		mix_seq_dst,
		mix_seq_src,
	}
}

fn progpow_loop<P: ProgPowParams, D: DatasetLookup>(
	program: &Program,
	loop_idx: usize,
	mix: &mut Mix,
	dataset: &D,
) {
	// The lane supplying the entry address rotates every loop; using its
	// mix[0] chains the previous loop's DAG data into this address.
	let num_entries = (dataset.full_size() / PROGPOW_DAG_ENTRY_BYTES) as u32;
	let dag_addr_base = mix[loop_idx % PROGPOW_LANES][0] % num_entries;

	let mut dag_entry = [0u32; PROGPOW_LANES * PROGPOW_DAG_LOADS];
	for (n, chunk) in dag_entry.chunks_mut(NODE_WORDS).enumerate() {
		let node = dataset.node(dag_addr_base * NODES_PER_ENTRY as u32 + n as u32);
		chunk.copy_from_slice(node.as_words());
	}

	let c_dag = dataset.c_dag();
	let mut rng = program.rng;
	let mut dst_cnt = 0;
	let mut src_cnt = 0;

	for i in 0..cmp::max(P::CNT_CACHE, P::CNT_MATH) {
		if i < P::CNT_CACHE {
			let src = program.mix_seq_src[src_cnt % PROGPOW_REGS];
			src_cnt += 1;
			let dst = program.mix_seq_dst[dst_cnt % PROGPOW_REGS];
			dst_cnt += 1;
			let sel = rng.next_u32();
			for lane in mix.iter_mut() {
				let offset = lane[src] as usize % PROGPOW_CACHE_WORDS;
				progpow_merge(&mut lane[dst], c_dag[offset], sel);
			}
		}
		if i < P::CNT_MATH {
			let src1 = rng.next_u32() as usize % PROGPOW_REGS;
			let src2 = rng.next_u32() as usize % PROGPOW_REGS;
			let sel1 = rng.next_u32();
			let dst = program.mix_seq_dst[dst_cnt % PROGPOW_REGS];
			dst_cnt += 1;
			let sel2 = rng.next_u32();
			for lane in mix.iter_mut() {
				let data = progpow_math(lane[src1], lane[src2], sel1);
				progpow_merge(&mut lane[dst], data, sel2);
			}
		}
	}

	// mix[0] always takes the first DAG word so it feeds the next address
	for i in 0..PROGPOW_DAG_LOADS {
		let dst = if i == 0 {
			0
		} else {
			let d = program.mix_seq_dst[dst_cnt % PROGPOW_REGS];
			dst_cnt += 1;
			d
		};
		let sel = rng.next_u32();
		for (l, lane) in mix.iter_mut().enumerate() {
			// lanes read a different slot of the entry every loop
			let slot = (l ^ loop_idx) % PROGPOW_LANES;
			progpow_merge(&mut lane[dst], dag_entry[slot * PROGPOW_DAG_LOADS + i], sel);
		}
	}
}

/// Runs the full pipeline. Returns `(digest, result)` as little-endian words.
pub fn progpow<P: ProgPowParams, D: DatasetLookup>(
	header_hash: &H256,
	nonce: u64,
	block_number: u64,
	dataset: &D,
) -> ([u32; 8], [u32; 8]) {
	let seed = hash_seed(&keccak_f800_progpow::<P>(header_hash, nonce, &[0u32; 8]));

	let mut mix: Mix = [[0u32; PROGPOW_REGS]; PROGPOW_LANES];
	for (l, lane) in mix.iter_mut().enumerate() {
		*lane = fill_mix(seed, l as u32);
	}

	let program = progpow_init(P::prog_seed(block_number));
	for l in 0..PROGPOW_CNT_DAG {
		progpow_loop::<P, D>(&program, l, &mut mix, dataset);
	}

	// Reduce each lane to a word, then all lanes to 256 bits
	let mut lane_hash = [0u32; PROGPOW_LANES];
	for (h, lane) in lane_hash.iter_mut().zip(mix.iter()) {
		*h = FNV_OFFSET_BASIS;
		for reg in lane.iter() {
			fnv1a(h, *reg);
		}
	}
	let mut digest = [FNV_OFFSET_BASIS; 8];
	for (l, h) in lane_hash.iter().enumerate() {
		fnv1a(&mut digest[l % 8], *h);
	}

	let result = keccak_f800_progpow::<P>(header_hash, seed, &digest);
	(digest, result)
}

/// Recomputes the final hash from a claimed mix digest without touching the
/// dataset.
pub fn quick_progpow<P: ProgPowParams>(
	header_hash: &H256,
	nonce: u64,
	mix_hash: &H256,
) -> [u32; 8] {
	let seed = hash_seed(&keccak_f800_progpow::<P>(header_hash, nonce, &[0u32; 8]));
	keccak_f800_progpow::<P>(header_hash, seed, &hash_to_words(mix_hash))
}
