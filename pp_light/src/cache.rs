use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap::Mmap;
use rustc_hex::ToHex;

use crate::compute::Light;
use crate::error::{Error, Result};
use crate::keccak::{keccak_512, H256};
use crate::seed_compute::SeedHashCompute;
use crate::shared::{
	epoch, get_cache_size, is_valid_cache_size, Node, ETHASH_CACHE_ROUNDS, NODE_BYTES,
};

/// Builds light caches, sharing one seed memo between all of them.
#[derive(Clone, Default)]
pub struct NodeCacheBuilder {
	seedhash: Arc<SeedHashCompute>,
}

/// The light cache of one epoch.
pub struct NodeCache {
	cache_dir: Option<PathBuf>,
	seed: H256,
	epoch: u64,
	nodes: Vec<Node>,
}

impl NodeCacheBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seedhash(&self, block_number: u64) -> H256 {
		self.seedhash.hash_block_number(block_number)
	}

	pub fn light(&self, cache_dir: &Path, block_number: u64) -> Result<Light> {
		Light::new_with_builder(self, Some(cache_dir), block_number)
	}

	pub fn light_from_file(&self, cache_dir: &Path, block_number: u64) -> Result<Light> {
		Light::from_file_with_builder(self, cache_dir, block_number)
	}

	pub(crate) fn new_cache(
		&self,
		cache_dir: Option<&Path>,
		block_number: u64,
	) -> Result<NodeCache> {
		let seed = self.seedhash(block_number);
		let mut cache = NodeCache::new(get_cache_size(block_number), &seed)?;
		cache.epoch = epoch(block_number);
		cache.cache_dir = cache_dir.map(Path::to_path_buf);
		Ok(cache)
	}

	pub(crate) fn from_file(&self, cache_dir: &Path, block_number: u64) -> Result<NodeCache> {
		let seed = self.seedhash(block_number);
		let path = cache_path(cache_dir, &seed);
		let nodes = read_nodes(&path, get_cache_size(block_number))?;
		debug!(
			target: "progpow",
			"loaded light cache for epoch {} from {}",
			epoch(block_number),
			path.display()
		);
		Ok(NodeCache {
			cache_dir: Some(cache_dir.to_path_buf()),
			seed,
			epoch: epoch(block_number),
			nodes,
		})
	}
}

impl NodeCache {
	/// Builds a cache of `cache_size` bytes from `seed`, with no backing
	/// directory.
	pub fn new(cache_size: usize, seed: &H256) -> Result<Self> {
		if !is_valid_cache_size(cache_size) {
			return Err(Error::InvalidCacheSize(cache_size));
		}
		let nodes = make_memory_cache(cache_size / NODE_BYTES, seed)?;
		Ok(NodeCache {
			cache_dir: None,
			seed: *seed,
			epoch: 0,
			nodes,
		})
	}

	pub fn seed(&self) -> &H256 {
		&self.seed
	}

	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	pub fn cache_path(&self) -> Option<PathBuf> {
		self.cache_dir.as_ref().map(|dir| cache_path(dir, &self.seed))
	}

	/// Writes the cache under its directory, replacing any previous file.
	pub fn flush(&self) -> Result<PathBuf> {
		let dir = self.cache_dir.as_ref().ok_or_else(|| {
			Error::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				"light cache has no cache directory",
			))
		})?;
		fs::create_dir_all(dir)?;
		let path = cache_path(dir, &self.seed);
		let tmp = path.with_extension("tmp");
		{
			let mut out = BufWriter::new(File::create(&tmp)?);
			for node in &self.nodes {
				out.write_all(&node.to_bytes())?;
			}
			out.flush()?;
			out.get_ref().sync_all()?;
		}
		fs::rename(&tmp, &path)?;
		debug!(
			target: "progpow",
			"wrote light cache for epoch {} to {}",
			self.epoch,
			path.display()
		);
		Ok(path)
	}
}

impl AsRef<[Node]> for NodeCache {
	fn as_ref(&self) -> &[Node] {
		&self.nodes
	}
}

fn cache_path(dir: &Path, seed: &H256) -> PathBuf {
	let name: String = seed[..].to_hex();
	dir.join(name)
}

fn read_nodes(path: &Path, expected_size: usize) -> Result<Vec<Node>> {
	let file = File::open(path)?;
	if file.metadata()?.len() != expected_size as u64 {
		return Err(Error::CorruptFile(path.to_path_buf()));
	}
	let map = unsafe { Mmap::map(&file)? };
	let mut nodes = Vec::new();
	nodes
		.try_reserve_exact(expected_size / NODE_BYTES)
		.map_err(|_| Error::OutOfMemory(expected_size))?;
	nodes.extend(map.chunks_exact(NODE_BYTES).map(Node::from_bytes));
	Ok(nodes)
}

/// Sequential memory-hard construction: a Keccak-512 chain from the seed,
/// then `ETHASH_CACHE_ROUNDS` passes of RandMemoHash.
fn make_memory_cache(num_nodes: usize, seed: &H256) -> Result<Vec<Node>> {
	trace!(target: "progpow", "building light cache of {} nodes", num_nodes);
	let mut nodes: Vec<Node> = Vec::new();
	nodes
		.try_reserve_exact(num_nodes)
		.map_err(|_| Error::OutOfMemory(num_nodes * NODE_BYTES))?;

	let mut buf = [0u8; NODE_BYTES];
	keccak_512::write(&seed[..], &mut buf);
	nodes.push(Node::from_bytes(&buf));
	for i in 1..num_nodes {
		keccak_512::write(&nodes[i - 1].to_bytes(), &mut buf);
		nodes.push(Node::from_bytes(&buf));
	}

	for _ in 0..ETHASH_CACHE_ROUNDS {
		for i in 0..num_nodes {
			let idx = nodes[i].as_words()[0] as usize % num_nodes;
			let data = nodes[(num_nodes + i - 1) % num_nodes].xor(&nodes[idx]);
			keccak_512::write(&data.to_bytes(), &mut buf);
			nodes[i] = Node::from_bytes(&buf);
		}
	}

	trace!(target: "progpow", "light cache ready");
	Ok(nodes)
}
