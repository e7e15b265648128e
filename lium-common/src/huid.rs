//! Human-readable ids ("HUIDs") derived from opaque server ids.

use md5::{Digest, Md5};

/// Returned for an empty id.
pub const INVALID_HUID: &str = "invalid";

const ADJECTIVES: [&str; 30] = [
    "swift", "silent", "brave", "bright", "calm", "clever", "eager", "fierce", "gentle", "grand",
    "happy", "jolly", "kind", "lively", "merry", "noble", "proud", "silly", "witty", "zesty",
    "cosmic", "digital", "electric", "frozen", "golden", "hydro", "iron", "laser", "lunar",
    "solar",
];

const NOUNS: [&str; 30] = [
    "hawk", "lion", "tiger", "eagle", "fox", "wolf", "shark", "viper", "cobra", "falcon",
    "jaguar", "leopard", "lynx", "panther", "puma", "cougar", "condor", "raven", "photon",
    "quasar", "vector", "matrix", "cipher", "pixel", "comet", "nebula", "nova", "orbit", "axiom",
    "sphinx",
];

/// Map an id to `adjective-noun-xx`.
///
/// The MD5 digest of the id picks the adjective (hex chars 0..4), the noun
/// (hex chars 4..8) and supplies its last two hex chars as suffix, so the same
/// id always yields the same HUID.
pub fn generate_huid(id: &str) -> String {
    if id.is_empty() {
        return INVALID_HUID.to_string();
    }

    let digest = hex::encode(Md5::digest(id.as_bytes()));
    let adj_idx = usize::from_str_radix(&digest[0..4], 16).unwrap_or(0) % ADJECTIVES.len();
    let noun_idx = usize::from_str_radix(&digest[4..8], 16).unwrap_or(0) % NOUNS.len();
    let suffix = &digest[digest.len() - 2..];

    format!("{}-{}-{}", ADJECTIVES[adj_idx], NOUNS[noun_idx], suffix)
}
