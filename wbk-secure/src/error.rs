use thiserror::Error;

/// Errors raised by the block cipher helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("data length {0} is not a multiple of the AES block size")]
    UnalignedLength(usize),

    #[error("AES operation failed: {0}")]
    Aes(&'static str),
}
