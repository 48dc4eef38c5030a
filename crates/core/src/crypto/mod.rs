pub mod hashing;
pub mod signing;

pub use hashing::{canonical, chain, genesis_hash, hash, to_hex, Hash, HASH_LEN};
pub use signing::{decode_seed, verify_with_key, SigningService};
