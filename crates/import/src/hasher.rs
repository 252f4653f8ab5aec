use sha2::Digest;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hash algorithm: '{0}'")]
    InvalidAlgorithm(String),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Digest algorithms selectable by name, e.g. from `HASH_ALGORITHM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
}

const ALL: [HashAlgorithm; 8] = [
    HashAlgorithm::Md5,
    HashAlgorithm::Sha1,
    HashAlgorithm::Sha224,
    HashAlgorithm::Sha256,
    HashAlgorithm::Sha384,
    HashAlgorithm::Sha512,
    HashAlgorithm::Sha512_224,
    HashAlgorithm::Sha512_256,
];

impl HashAlgorithm {
    /// Case-insensitive lookup. Empty or unknown names are rejected.
    pub fn resolve(name: &str) -> Result<Self, HashError> {
        let wanted = name.trim();
        ALL.iter()
            .copied()
            .find(|a| !wanted.is_empty() && a.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HashError::InvalidAlgorithm(name.to_string()))
    }

    pub fn available() -> &'static [HashAlgorithm] {
        &ALL
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha512_224 => "sha512_224",
            HashAlgorithm::Sha512_256 => "sha512_256",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode(md5::compute(data).0),
            HashAlgorithm::Sha1 => hex_digest::<sha1::Sha1>(data),
            HashAlgorithm::Sha224 => hex_digest::<sha2::Sha224>(data),
            HashAlgorithm::Sha256 => hex_digest::<sha2::Sha256>(data),
            HashAlgorithm::Sha384 => hex_digest::<sha2::Sha384>(data),
            HashAlgorithm::Sha512 => hex_digest::<sha2::Sha512>(data),
            HashAlgorithm::Sha512_224 => hex_digest::<sha2::Sha512_224>(data),
            HashAlgorithm::Sha512_256 => hex_digest::<sha2::Sha512_256>(data),
        }
    }
}

fn hex_digest<D: Digest>(data: &[u8]) -> String {
    hex::encode(D::digest(data))
}

impl FromStr for HashAlgorithm {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Digest of the whole file, read into memory in one go.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<String, HashError> {
    if !path.is_file() {
        return Err(HashError::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    Ok(algorithm.digest_hex(&bytes))
}
