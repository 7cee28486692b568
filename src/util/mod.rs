//! Basic shared types (errors, checksums).

mod checksum;
mod error;

pub use checksum::{mask, masked_crc32c, unmask};
pub use error::{Error, Result};
