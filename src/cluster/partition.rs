//! Key Partitioner
//!
//! Maps every key to exactly one primary node. Clients compute the same
//! mapping independently, so the hash must stay bit-for-bit stable.

use crate::error::{Error, Result};

/// 32-bit rolling hash over the key's code points (`h = h * 31 + c`, wrapping)
pub fn key_hash(key: &str) -> u32 {
    key.chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}

/// Return the primary node for `key` out of the sorted node ID list
pub fn primary_of<'a, S: AsRef<str>>(key: &str, sorted_node_ids: &'a [S]) -> Result<&'a str> {
    if sorted_node_ids.is_empty() {
        return Err(Error::Config("cluster table is empty".into()));
    }

    let index = key_hash(key) as usize % sorted_node_ids.len();
    Ok(sorted_node_ids[index].as_ref())
}
