use thiserror::Error;

pub type H256 = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hardware {
	CPU,
}

#[derive(Debug, Error)]
pub enum ProgPowError {
	#[error("no epoch context initialized")]
	NotInitialized,
	#[error("light cache unavailable: {0}")]
	Cache(#[source] progpow_cpu::Error),
	#[error("dataset unavailable: {0}")]
	Dag(#[source] progpow_cpu::Error),
}

/// Outcome of one evaluation. `success` is false when the epoch data the
/// evaluation needed could not be produced; both hashes are zero then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeResult {
	pub mix_hash: H256,
	pub result: H256,
	pub success: bool,
}

impl ComputeResult {
	pub fn failed() -> Self {
		Self::default()
	}
}

impl From<progpow_cpu::ProgPowResult> for ComputeResult {
	fn from(r: progpow_cpu::ProgPowResult) -> Self {
		ComputeResult {
			mix_hash: r.mix_hash,
			result: r.result,
			success: true,
		}
	}
}

pub trait PpCompute: Sized {
	fn init(&mut self) -> Result<(), ProgPowError>;
	fn hardware(&self) -> Hardware;
	/// Returns `(result, mix_hash)` for a candidate, building the epoch's
	/// light cache if needed.
	fn verify(
		&self,
		header_hash: &H256,
		height: u64,
		nonce: u64,
	) -> Result<(H256, H256), ProgPowError>;
	fn light_compute(&self, header_hash: &H256, height: u64, nonce: u64) -> ComputeResult;
	fn full_compute(&self, header_hash: &H256, height: u64, nonce: u64) -> ComputeResult;
}
