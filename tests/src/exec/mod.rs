#[cfg(target_arch = "x86_64")]
mod differential;
mod helpers;
mod runtime;

use jit68_core::{JitConfig, TranslationUnit};

pub fn small_config() -> JitConfig {
    JitConfig {
        max_units: 8,
        hash_buckets: 4,
        hot_set_size: 2,
        code_buffer_size: 1 << 20,
        ..JitConfig::default()
    }
}

/// Bare unit covering guest `[low, high)` and host
/// `[host, host + 0x40)`.
pub fn unit(low: u32, high: u32, host: usize) -> TranslationUnit {
    let mut u = TranslationUnit::new(low);
    u.high = high;
    u.host_offset = host;
    u.host_size = 0x40;
    u
}
