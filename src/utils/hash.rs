//! Stable 32-bit hashing for seed derivation
//!
//! Channel shuffle and phase seeds default from a hash of the channel id so
//! they survive restarts without being stored, and setup-generated channels
//! derive their seeds from a stable strategy key. FNV-1a is used because the
//! output must not change across releases; `DefaultHasher` gives no such
//! guarantee.

use uuid::Uuid;

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a over the UTF-8 bytes of `input`.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Default seed for a channel, derived from its id.
pub fn seed_from_id(id: &Uuid) -> u32 {
    fnv1a_32(&id.simple().to_string())
}

/// Phase seed for a channel: offset from the shuffle seed so the two default
/// seeds of one channel differ.
pub fn phase_seed_from_id(id: &Uuid) -> u32 {
    fnv1a_32(&format!("phase:{}", id.simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        // Reference values for the 32-bit FNV-1a parameters.
        assert_eq!(fnv1a_32(""), 0x811C_9DC5);
        assert_eq!(fnv1a_32("a"), 0xE40C_292C);
        assert_eq!(fnv1a_32("foobar"), 0xBF9C_F968);
    }

    #[test]
    fn seeds_are_stable_per_id() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(seed_from_id(&id), seed_from_id(&id));
        assert_ne!(seed_from_id(&id), phase_seed_from_id(&id));
    }
}
