extern crate byteorder;
extern crate either;
extern crate memmap;
extern crate parking_lot;
extern crate primal;
extern crate rayon;
extern crate rustc_hex;
#[macro_use]
extern crate crunchy;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate serde_json;
#[cfg(test)]
extern crate tempdir;

pub mod cache;
pub mod compute;
pub mod error;
mod keccak;
pub mod params;
pub mod progpow;
mod seed_compute;
pub mod shared;

pub use crate::cache::{NodeCache, NodeCacheBuilder};
pub use crate::compute::{
	calculate_dag_item, full_compute, light_compute, quick_get_result, Full, Light, ProgPowResult,
};
pub use crate::error::{Error, Result};
pub use crate::params::{ProgPow091, ProgPowParams};
pub use crate::seed_compute::SeedHashCompute;
pub use crate::shared::{get_cache_size, get_data_size, H256};
