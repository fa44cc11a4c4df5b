use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{ComputeResult, Hardware, PpCompute, ProgPowError, H256};
use progpow_cpu::cache::NodeCacheBuilder;
use progpow_cpu::compute::{Full, Light};
use progpow_cpu::params::{ProgPow091, ProgPowParams};
use progpow_cpu::shared::epoch;

const CACHE_DIR: &str = "cache";
const PROGPOW_HOME: &str = ".progpow";

/// `~/.progpow/cache`, or a relative `.progpow/cache` when there is no home
/// directory.
pub fn default_cache_dir() -> PathBuf {
	let mut path = dirs::home_dir().unwrap_or_default();
	path.push(PROGPOW_HOME);
	path.push(CACHE_DIR);
	path
}

/// CPU engine holding the data of the current epoch. On an epoch change the
/// shared light cache and dataset are replaced wholesale; callers still
/// holding the old `Arc`s finish against the old epoch.
pub struct PpCPU<P: ProgPowParams = ProgPow091> {
	cache_builder: NodeCacheBuilder,
	cache_dir: PathBuf,
	light: RwLock<Option<Arc<Light>>>,
	full: RwLock<Option<(u64, Arc<Full>)>>,
	_params: PhantomData<fn() -> P>,
}

impl<P: ProgPowParams> PpCPU<P> {
	pub fn new() -> Self {
		Self::with_cache_dir(default_cache_dir())
	}

	pub fn with_cache_dir<T: Into<PathBuf>>(cache_dir: T) -> Self {
		PpCPU {
			cache_builder: NodeCacheBuilder::new(),
			cache_dir: cache_dir.into(),
			light: RwLock::new(None),
			full: RwLock::new(None),
			_params: PhantomData,
		}
	}

	pub fn cache_dir(&self) -> &Path {
		&self.cache_dir
	}

	/// Epoch of the light cache currently held.
	pub fn current_epoch(&self) -> Result<u64, ProgPowError> {
		self.light
			.read()
			.as_ref()
			.map(|light| light.epoch())
			.ok_or(ProgPowError::NotInitialized)
	}

	/// Light cache for the epoch of `height`, loaded from disk or built and
	/// then written back.
	pub fn light(&self, height: u64) -> Result<Arc<Light>, ProgPowError> {
		let epoch = epoch(height);
		if let Some(light) = self.light.read().as_ref() {
			if light.epoch() == epoch {
				return Ok(light.clone());
			}
		}

		let mut slot = self.light.write();
		if let Some(light) = slot.as_ref() {
			if light.epoch() == epoch {
				return Ok(light.clone());
			}
		}

		let light = match self.cache_builder.light_from_file(&self.cache_dir, height) {
			Ok(light) => light,
			Err(e) => {
				debug!(target: "progpow", "no light cache on disk for epoch {}: {}", epoch, e);
				let light = self
					.cache_builder
					.light(&self.cache_dir, height)
					.map_err(ProgPowError::Cache)?;
				if let Err(e) = light.to_file() {
					warn!(target: "progpow", "light cache file write error: {}", e);
				}
				light
			}
		};

		info!(target: "progpow", "{}: switched light cache to epoch {}", P::NAME, epoch);
		if let Some(old) = slot.take() {
			self.prune(&old);
		}
		let light = Arc::new(light);
		*slot = Some(light.clone());
		Ok(light)
	}

	/// Full dataset for the epoch of `height`. Mapped from disk when a
	/// complete file exists, generated and written otherwise.
	pub fn full(&self, height: u64) -> Result<Arc<Full>, ProgPowError> {
		let epoch = epoch(height);
		if let Some((held, full)) = self.full.read().as_ref() {
			if *held == epoch {
				return Ok(full.clone());
			}
		}

		let light = self.light(height)?;
		let mut slot = self.full.write();
		if let Some((held, full)) = slot.as_ref() {
			if *held == epoch {
				return Ok(full.clone());
			}
		}
		// release the old dataset before building the next one
		*slot = None;

		let full = match Full::from_file(&self.cache_dir, &light) {
			Ok(full) => full,
			Err(e) => {
				debug!(target: "progpow", "no dataset on disk for epoch {}: {}", epoch, e);
				let full = Full::new(&light).map_err(ProgPowError::Dag)?;
				if let Err(e) = full.to_file(&self.cache_dir) {
					warn!(target: "progpow", "dataset file write error: {}", e);
				}
				full
			}
		};

		info!(target: "progpow", "{}: switched dataset to epoch {}", P::NAME, epoch);
		let full = Arc::new(full);
		*slot = Some((epoch, full.clone()));
		Ok(full)
	}

	/// Removes the files of an epoch that is no longer current. Open maps of
	/// a removed dataset stay valid until dropped.
	fn prune(&self, old: &Light) {
		let dataset = Full::file_path(&self.cache_dir, old.seed());
		for path in old.cache_path().into_iter().chain(Some(dataset)) {
			match fs::remove_file(&path) {
				Ok(()) => debug!(target: "progpow", "removed {}", path.display()),
				Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => warn!(target: "progpow", "unable to remove {}: {}", path.display(), e),
			}
		}
	}
}

impl<P: ProgPowParams> Default for PpCPU<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: ProgPowParams> PpCompute for PpCPU<P> {
	fn init(&mut self) -> Result<(), ProgPowError> {
		fs::create_dir_all(&self.cache_dir).map_err(|e| ProgPowError::Cache(e.into()))
	}

	fn hardware(&self) -> Hardware {
		Hardware::CPU
	}

	fn verify(
		&self,
		header_hash: &H256,
		height: u64,
		nonce: u64,
	) -> Result<(H256, H256), ProgPowError> {
		let light = self.light(height)?;
		let out = light.compute::<P>(header_hash, nonce, height);
		Ok((out.result, out.mix_hash))
	}

	fn light_compute(&self, header_hash: &H256, height: u64, nonce: u64) -> ComputeResult {
		match self.light(height) {
			Ok(light) => light.compute::<P>(header_hash, nonce, height).into(),
			Err(e) => {
				warn!(target: "progpow", "light compute at height {} failed: {}", height, e);
				ComputeResult::failed()
			}
		}
	}

	fn full_compute(&self, header_hash: &H256, height: u64, nonce: u64) -> ComputeResult {
		match self.full(height) {
			Ok(full) => full.compute::<P>(header_hash, nonce, height).into(),
			Err(e) => {
				warn!(target: "progpow", "full compute at height {} failed: {}", height, e);
				ComputeResult::failed()
			}
		}
	}
}
