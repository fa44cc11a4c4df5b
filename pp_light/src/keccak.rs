extern crate keccak_hash as hash;

pub type H256 = [u8; 32];

pub mod keccak_512 {
	use super::hash;

	pub fn write(input: &[u8], output: &mut [u8]) {
		hash::keccak_512(input, output);
	}

	pub fn inplace(input: &mut [u8]) {
		let mut out = [0u8; 64];
		hash::keccak_512(input, &mut out);
		input[..64].copy_from_slice(&out);
	}
}

pub mod keccak_256 {
	use super::hash;

	#[cfg(test)]
	pub fn write(input: &[u8], output: &mut [u8]) {
		hash::keccak_256(input, output);
	}

	pub fn inplace(input: &mut [u8]) {
		let mut out = [0u8; 32];
		hash::keccak_256(input, &mut out);
		input[..32].copy_from_slice(&out);
	}
}

/// Keccak-f[800]: 25 lanes of 32 bits.
pub mod f800 {
	pub const STATE_WORDS: usize = 25;

	const ROUND_CONSTANTS: [u32; 24] = [
		0x00000001, 0x00008082, 0x0000808a, 0x80008000, 0x0000808b, 0x80000001, 0x80008081,
		0x00008009, 0x0000008a, 0x00000088, 0x80008009, 0x8000000a, 0x8000808b, 0x0000008b,
		0x00008089, 0x00008003, 0x00008002, 0x00000080, 0x0000800a, 0x8000000a, 0x80008081,
		0x00008080, 0x80000001, 0x80008008,
	];

	// rho offsets are taken modulo the lane width by rotate_left
	const RHO: [u32; 24] = [
		1, 3, 6, 10, 15, 21, 28, 36, 45, 55, 2, 14, 27, 41, 56, 8, 25, 43, 62, 18, 39, 61, 20, 44,
	];

	const PI: [usize; 24] = [
		10, 7, 11, 17, 18, 3, 5, 16, 8, 21, 24, 4, 15, 23, 19, 13, 12, 2, 20, 14, 22, 9, 6, 1,
	];

	pub fn round(st: &mut [u32; STATE_WORDS], r: usize) {
		// Theta
		let mut bc = [0u32; 5];
		unroll! {
			for x in 0..5 {
				bc[x] = st[x] ^ st[x + 5] ^ st[x + 10] ^ st[x + 15] ^ st[x + 20];
			}
		}
		unroll! {
			for x in 0..5 {
				let t = bc[(x + 4) % 5] ^ bc[(x + 1) % 5].rotate_left(1);
				st[x] ^= t;
				st[x + 5] ^= t;
				st[x + 10] ^= t;
				st[x + 15] ^= t;
				st[x + 20] ^= t;
			}
		}

		// Rho Pi
		let mut t = st[1];
		for (&j, &rho) in PI.iter().zip(RHO.iter()) {
			let tmp = st[j];
			st[j] = t.rotate_left(rho);
			t = tmp;
		}

		// Chi
		for y in (0..STATE_WORDS).step_by(5) {
			let mut row = [0u32; 5];
			row.copy_from_slice(&st[y..y + 5]);
			unroll! {
				for x in 0..5 {
					st[y + x] = row[x] ^ (!row[(x + 1) % 5] & row[(x + 2) % 5]);
				}
			}
		}

		// Iota
		st[0] ^= ROUND_CONSTANTS[r];
	}

	/// Applies `rounds` rounds of the permutation to `st`.
	pub fn permute(st: &mut [u32; STATE_WORDS], rounds: usize) {
		for r in 0..rounds {
			round(st, r);
		}
	}
}
