//! Page and block checksums. Delegates to `crc32fast` (hardware-accelerated
//! when the target supports it) instead of hand-rolling SIMD intrinsics.

pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
