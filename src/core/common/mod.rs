pub mod crc32; // Pure Rust CRC32 implementation, used by the router
pub mod decimal; // Exact decimal comparison and arithmetic for the N attribute type
pub mod error; // Consolidated error handling
pub mod key; // Canonical sortable primary-key encoding
pub mod traits;
pub mod value; // Tagged-variant attribute value type

pub use error::StoreError;
