//! Record format for the oocmap store
//!
//! Everything a value can be on disk fits in a single 9-byte record: eight
//! payload bytes plus one tag byte. This crate holds the pure, database-free
//! half of the system:
//! - The [`EncodedValue`] record and its tag layout
//! - The integer-magnitude codec (little-endian, trailing zeros trimmed)
//! - The string code-unit codec (1/2/4-byte units chosen from content)
//! - The 64-bit content hash used to key immutable payloads

pub mod encoded;
pub mod error;
pub mod hash;
pub mod num;
pub mod text;

pub use encoded::{hardcoded, type_code, EncodedValue, LIST_LENGTH_INDEX};
pub use error::FormatError;
pub use hash::content_hash;
pub use text::TextWidth;
