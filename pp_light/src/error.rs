use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("cache size {0} is not a prime number of 64-byte nodes")]
	InvalidCacheSize(usize),
	#[error("dataset size {0} is not a prime number of 128-byte mixes")]
	InvalidDataSize(usize),
	#[error("unable to allocate {0} bytes")]
	OutOfMemory(usize),
	#[error("dataset generation aborted")]
	Aborted,
	#[error("corrupt or incomplete file {0}")]
	CorruptFile(PathBuf),
	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
