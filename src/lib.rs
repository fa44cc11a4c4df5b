#[macro_use]
extern crate log;

pub mod difficulty;
pub mod hardware;
pub mod types;

pub use difficulty::{boundary_from_difficulty, meets_target};
pub use hardware::PpCPU;
pub use progpow_cpu::{get_cache_size, get_data_size, quick_get_result, ProgPow091, ProgPowParams};
pub use types::{ComputeResult, Hardware, PpCompute, ProgPowError, H256};
