//! File fingerprints.
//!
//! The identification hash samples the head and tail of a file plus its size and
//! is only a change signal. The full hash covers every byte and is what the
//! metadata service is queried with.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Bytes sampled from each end of the file for the identification hash.
pub const SAMPLE_LEN: u64 = 64 * 1024;

/// Read buffer size for full hashing.
const CHUNK_LEN: usize = 64 * 1024;

/// Hex characters kept from the identification digest.
const IDENTIFICATION_HASH_LEN: usize = 16;

/// Failure to fingerprint one file.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} changed size while hashing ({expected} -> {actual} bytes)", path.display())]
    SizeChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl FingerprintError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Computes the identification hash: SHA-256 over the first and last
/// [`SAMPLE_LEN`] bytes and the little-endian file size, truncated to 16 hex chars.
///
/// Bytes strictly between the two sampled windows do not contribute.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn identify(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path).map_err(FingerprintError::io(path))?;
    let size = file.metadata().map_err(FingerprintError::io(path))?.len();
    let window = SAMPLE_LEN.min(size);

    let mut hasher = Sha256::new();

    let mut head = Vec::with_capacity(usize::try_from(window).unwrap_or(CHUNK_LEN));
    (&mut file)
        .take(window)
        .read_to_end(&mut head)
        .map_err(FingerprintError::io(path))?;
    hasher.update(&head);

    let mut tail = Vec::with_capacity(head.len());
    file.seek(SeekFrom::Start(size - window))
        .map_err(FingerprintError::io(path))?;
    file.take(window)
        .read_to_end(&mut tail)
        .map_err(FingerprintError::io(path))?;
    hasher.update(&tail);

    hasher.update(size.to_le_bytes());

    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(IDENTIFICATION_HASH_LEN);
    Ok(hash)
}

/// Computes the full SHA-256 of the file as lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its size changes while it is
/// being hashed.
pub fn verify(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path).map_err(FingerprintError::io(path))?;
    let expected = file.metadata().map_err(FingerprintError::io(path))?.len();

    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_LEN];
    let mut read_total: u64 = 0;

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(FingerprintError::io(path)(error)),
        };
        hasher.update(&buffer[..read]);
        read_total += read as u64;
    }

    let actual = file.metadata().map_err(FingerprintError::io(path))?.len();
    if read_total != expected || actual != expected {
        return Err(FingerprintError::SizeChanged {
            path: path.to_path_buf(),
            expected,
            actual: read_total.max(actual),
        });
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    /// Three sample windows long, so the middle window is never read.
    const LARGE_LEN: usize = 3 * 64 * 1024;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_identify_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "model.safetensors", &patterned(LARGE_LEN));

        let first = identify(&path).unwrap();
        assert_eq!(first, identify(&path).unwrap());
        assert_eq!(first.len(), IDENTIFICATION_HASH_LEN);

        let copy = write_temp(&dir, "copy.safetensors", &patterned(LARGE_LEN));
        assert_eq!(first, identify(&copy).unwrap());
    }

    #[test]
    fn test_identify_detects_head_and_tail_changes() {
        let dir = tempfile::tempdir().unwrap();
        let original = patterned(LARGE_LEN);
        let baseline = identify(&write_temp(&dir, "a.bin", &original)).unwrap();

        let mut head_changed = original.clone();
        head_changed[10] ^= 0xFF;
        assert_ne!(baseline, identify(&write_temp(&dir, "b.bin", &head_changed)).unwrap());

        let mut tail_changed = original.clone();
        tail_changed[LARGE_LEN - 1] ^= 0xFF;
        assert_ne!(baseline, identify(&write_temp(&dir, "c.bin", &tail_changed)).unwrap());
    }

    #[test]
    fn test_identify_ignores_unsampled_middle() {
        // Known limitation: only the head and tail windows are sampled.
        let dir = tempfile::tempdir().unwrap();
        let original = patterned(LARGE_LEN);
        let baseline = identify(&write_temp(&dir, "a.bin", &original)).unwrap();

        let mut middle_changed = original;
        middle_changed[LARGE_LEN / 2] ^= 0xFF;
        assert_eq!(baseline, identify(&write_temp(&dir, "b.bin", &middle_changed)).unwrap());
        assert_ne!(
            verify(&dir.path().join("a.bin")).unwrap(),
            verify(&dir.path().join("b.bin")).unwrap()
        );
    }

    #[test]
    fn test_identify_covers_size() {
        let dir = tempfile::tempdir().unwrap();
        let short = identify(&write_temp(&dir, "a.pt", &[0_u8; 16])).unwrap();
        let long = identify(&write_temp(&dir, "b.pt", &[0_u8; 17])).unwrap();
        assert_ne!(short, long);

        let empty = identify(&write_temp(&dir, "c.pt", &[])).unwrap();
        assert_eq!(empty.len(), IDENTIFICATION_HASH_LEN);
    }

    #[test]
    fn test_verify_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "abc.ckpt", b"abc");
        assert_eq!(
            verify(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.safetensors");
        assert!(matches!(identify(&missing), Err(FingerprintError::Io { .. })));
        assert!(matches!(verify(&missing), Err(FingerprintError::Io { .. })));
    }
}
