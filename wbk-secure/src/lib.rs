//! Cipher and digest primitives for SD-card save and content exports.
//!
//! Everything written to an export is either encrypted with the well-known
//! SD key in AES-128-CBC mode, hashed with MD5 (save blob and content
//! header self-hashes) or fed into a running SHA-1 (the signed archive
//! body). This crate keeps those three concerns apart from the archive
//! layout itself.

pub mod cbc;
pub mod error;
pub mod hash;
pub mod writer;

pub use crate::cbc::{SD_IV, SD_KEY, SdCipher};
pub use error::CipherError;
pub use writer::HashingWriter;
