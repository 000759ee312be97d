//! Keccak-256, the only hash function this crate uses.

use sha3::{Digest, Keccak256};

pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
