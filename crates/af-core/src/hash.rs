//! Stable hashing for filter identifiers
//!
//! Filter lists are identified by a hash of their subscription URL. The value
//! is persisted by the host application, so the function must never change:
//! two Murmur3 32-bit passes with fixed seeds, rendered as 16 hex digits.

/// 64-bit hash represented as two 32-bit parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash64 {
    pub lo: u32,
    pub hi: u32,
}

impl Hash64 {
    /// Convert to a single u64.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        ((self.hi as u64) << 32) | (self.lo as u64)
    }

    /// Lowercase hex rendering, always 16 characters.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.to_u64())
    }
}

const SEED_LO: u32 = 0x9e3779b9;
const SEED_HI: u32 = 0x85ebca6b;

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

#[inline]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^ (h >> 16)
}

/// Murmur3 32-bit hash.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut chunks = data.chunks_exact(4);

    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= scramble(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | (b as u32) << (8 * i));
        h ^= scramble(k);
    }

    fmix32(h ^ data.len() as u32)
}

/// Compute a 64-bit hash from two Murmur3 passes.
pub fn hash64(data: &[u8]) -> Hash64 {
    Hash64 {
        lo: murmur3_32(data, SEED_LO),
        hi: murmur3_32(data, SEED_HI),
    }
}
