//! Interfaces to the console services the codec runs on top of.
//!
//! Storage, the SD-key cipher and the device identity are separate traits so
//! each can be backed independently; [`Console`] bundles three
//! implementations into one [`Provider`].

use wbk_secure::SdCipher;

use crate::error::{FormatError, ProviderError};
use crate::structs::{ECC_CERT_SIZE, SIG_SIZE};

pub use crate::structs::FileMode;

/// Byte-oriented view of the console NAND filesystem.
///
/// Paths are absolute and `/`-separated, as on the console.
pub trait Storage {
    type File: StorageFile;

    /// Names of the immediate children of `path`, in provider order.
    fn list_directory(&self, path: &str) -> Result<Vec<String>, ProviderError>;

    fn get_metadata(&self, path: &str) -> Result<FileMode, ProviderError>;

    /// Open a regular file. Directories fail with [`ProviderError::IsDirectory`].
    fn open_for_read(&self, path: &str) -> Result<Self::File, ProviderError>;

    /// Directory holding the save data of `title_id`.
    fn data_directory(&self, title_id: u64) -> String;
}

/// An open file handle. Dropping it closes the file.
pub trait StorageFile {
    /// Read up to `buf.len()` bytes, returning 0 at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError>;

    fn length(&self) -> u32;

    /// Fill `buf` completely or fail with [`ProviderError::ShortRead`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProviderError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(ProviderError::ShortRead {
                    missing: buf.len() - filled,
                });
            }
            filled += n;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySelector {
    /// The shared SD-card export key.
    SdCard,
}

/// Chained AES-128-CBC encryption with a key held by the console.
pub trait DeviceCipher {
    /// Encrypt `data` in place. `data.len()` is a multiple of 64 and `iv`
    /// is left holding the last ciphertext block for the next call.
    fn encrypt(
        &self,
        key: KeySelector,
        iv: &mut [u8; 16],
        data: &mut [u8],
    ) -> Result<(), ProviderError>;
}

impl DeviceCipher for SdCipher {
    fn encrypt(
        &self,
        key: KeySelector,
        iv: &mut [u8; 16],
        data: &mut [u8],
    ) -> Result<(), ProviderError> {
        match key {
            KeySelector::SdCard => Ok(SdCipher::encrypt(self, iv, data)?),
        }
    }
}

/// Output of the device-bound signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDigest {
    pub signature: [u8; SIG_SIZE],
    /// Certificate of the one-off key the signature was made with.
    pub ap_certificate: [u8; ECC_CERT_SIZE],
}

/// Device identity and signing.
pub trait Identity {
    fn device_id(&self) -> Result<u32, ProviderError>;

    fn device_certificate(&self) -> Result<[u8; ECC_CERT_SIZE], ProviderError>;

    fn wireless_mac_address(&self) -> Result<[u8; 6], ProviderError>;

    fn sign(&self, digest: &[u8; 20]) -> Result<SignedDigest, ProviderError>;
}

/// Everything an export needs from the console.
pub trait Provider: Storage + DeviceCipher + Identity {}

impl<T: Storage + DeviceCipher + Identity> Provider for T {}

/// A [`Provider`] assembled from independent parts.
#[derive(Debug, Clone)]
pub struct Console<S, C, I> {
    pub storage: S,
    pub cipher: C,
    pub identity: I,
}

impl<S, C, I> Console<S, C, I> {
    pub const fn new(storage: S, cipher: C, identity: I) -> Self {
        Self {
            storage,
            cipher,
            identity,
        }
    }
}

impl<S: Storage, C, I> Storage for Console<S, C, I> {
    type File = S::File;

    fn list_directory(&self, path: &str) -> Result<Vec<String>, ProviderError> {
        self.storage.list_directory(path)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMode, ProviderError> {
        self.storage.get_metadata(path)
    }

    fn open_for_read(&self, path: &str) -> Result<Self::File, ProviderError> {
        self.storage.open_for_read(path)
    }

    fn data_directory(&self, title_id: u64) -> String {
        self.storage.data_directory(title_id)
    }
}

impl<S, C: DeviceCipher, I> DeviceCipher for Console<S, C, I> {
    fn encrypt(
        &self,
        key: KeySelector,
        iv: &mut [u8; 16],
        data: &mut [u8],
    ) -> Result<(), ProviderError> {
        self.cipher.encrypt(key, iv, data)
    }
}

impl<S, C, I: Identity> Identity for Console<S, C, I> {
    fn device_id(&self) -> Result<u32, ProviderError> {
        self.identity.device_id()
    }

    fn device_certificate(&self) -> Result<[u8; ECC_CERT_SIZE], ProviderError> {
        self.identity.device_certificate()
    }

    fn wireless_mac_address(&self) -> Result<[u8; 6], ProviderError> {
        self.identity.wireless_mac_address()
    }

    fn sign(&self, digest: &[u8; 20]) -> Result<SignedDigest, ProviderError> {
        self.identity.sign(digest)
    }
}

/// Join a directory path and a child name with a single `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Split `path` into its components, ignoring leading and trailing `/`.
///
/// Empty, `.` and `..` components are rejected so the result can be joined
/// below a host directory without leaving it.
pub fn path_components(path: &str) -> Result<Vec<&str>, FormatError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split('/')
        .map(|part| match part {
            "" | "." | ".." => Err(FormatError::UnsafePath(path.to_string())),
            part => Ok(part),
        })
        .collect()
}

/// NAND path of a title's save data directory.
pub fn title_data_path(title_id: u64) -> String {
    format!(
        "/title/{:08x}/{:08x}/data",
        (title_id >> 32) as u32,
        title_id as u32
    )
}
