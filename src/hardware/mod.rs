pub mod cpu;

pub use self::cpu::PpCPU;
