//! Common hash operations (often referred to as checksums) over files,
//! e.g. MD5 or SHA-256.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Secure hash or message digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(anyhow!("unknown hash algorithm '{other}'")),
        }
    }
}

fn digest<D: Digest + io::Write>(file: &mut File) -> Result<String> {
    let mut hasher = D::new();
    io::copy(file, &mut hasher).context("Failed to read file while hashing")?;
    Ok(hex::encode(hasher.finalize()))
}

/// Returns the lowercase hex digest for a given file and hash algorithm.
///
/// The file is streamed through the hasher, so arbitrarily large files are
/// fine.
pub fn file_hash(file_path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = File::open(file_path)
        .with_context(|| format!("Failed to open '{}' for hashing", file_path.display()))?;
    match algorithm {
        HashAlgorithm::Md5 => digest::<Md5>(&mut file),
        HashAlgorithm::Sha1 => digest::<Sha1>(&mut file),
        HashAlgorithm::Sha256 => digest::<Sha256>(&mut file),
        HashAlgorithm::Sha512 => digest::<Sha512>(&mut file),
    }
}

/// Returns true if the file's hash value matches the one provided for that
/// hash algorithm. The comparison is case-insensitive.
pub fn validate_file_hash(
    file_path: &Path,
    hash_value: &str,
    algorithm: HashAlgorithm,
) -> Result<bool> {
    let computed = file_hash(file_path, algorithm)?;
    Ok(computed.eq_ignore_ascii_case(hash_value))
}
