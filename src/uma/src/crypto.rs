//! Manifest key derivation and encryption detection
//!
//! The manifest database key is never stored in the clear. Each region has a
//! static secret which is XORed against a shared obfuscation mask to produce
//! the key handed to the cipher engine.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header of an unencrypted SQLite 3 database file (without the trailing NUL)
pub const SQLITE_HEADER: &[u8; 15] = b"SQLite format 3";

/// Number of header bytes inspected by [`is_encrypted`]
const HEADER_PROBE_LEN: u64 = 16;

/// Obfuscation mask shared by both regions
pub const DB_BASE_KEY: [u8; 16] = [
    0xF1, 0x70, 0xCE, 0xA4, 0xDF, 0xCE, 0xA3, 0xE1, 0xA5, 0xD8, 0xC7, 0x0B, 0xD1, 0x00, 0x00, 0x00,
];

/// Cycle length of the mask. Only the first 13 bytes of [`DB_BASE_KEY`] are
/// significant; the trailing zero bytes are padding and never applied.
pub const MASK_CYCLE: usize = 13;

/// Static secret for the Japanese client
pub const JP_DB_KEY: [u8; 32] = [
    0x6D, 0x5B, 0x65, 0x33, 0x63, 0x36, 0x63, 0x25, 0x54, 0x71, 0x2D, 0x73, 0x50, 0x53, 0x63, 0x38,
    0x6D, 0x34, 0x37, 0x7B, 0x35, 0x63, 0x70, 0x23, 0x37, 0x34, 0x53, 0x29, 0x73, 0x43, 0x36, 0x33,
];

/// Static secret for the Global client
pub const GLOBAL_DB_KEY: [u8; 12] = [
    0x56, 0x63, 0x6B, 0x63, 0x42, 0x72, 0x37, 0x76, 0x65, 0x70, 0x41, 0x62,
];

/// Derive the cipher key from a static secret
///
/// `out[i] = secret[i] ^ DB_BASE_KEY[i % MASK_CYCLE]`. Applying it twice
/// returns the input.
pub fn derive_key(secret: &[u8]) -> Vec<u8> {
    secret
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ DB_BASE_KEY[i % MASK_CYCLE])
        .collect()
}

/// Check whether a database file is page-encrypted
///
/// Plain SQLite files start with `"SQLite format 3\0"`. Anything else,
/// including a short or unreadable file, is reported as encrypted.
pub fn is_encrypted<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    match read_header(path) {
        Ok(header) => !header.starts_with(SQLITE_HEADER),
        Err(e) => {
            tracing::debug!("Could not read header of {}: {}", path.display(), e);
            true
        }
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_PROBE_LEN as usize);
    File::open(path)?
        .take(HEADER_PROBE_LEN)
        .read_to_end(&mut header)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_derive_key_per_index() {
        for secret in [&JP_DB_KEY[..], &GLOBAL_DB_KEY[..], &b"short"[..], &[0u8; 40][..]] {
            let key = derive_key(secret);
            assert_eq!(key.len(), secret.len());
            for (i, b) in key.iter().enumerate() {
                assert_eq!(*b, secret[i] ^ DB_BASE_KEY[i % MASK_CYCLE]);
            }
        }
    }

    #[test]
    fn test_derive_key_round_trip() {
        for secret in [&JP_DB_KEY[..], &GLOBAL_DB_KEY[..]] {
            assert_eq!(derive_key(&derive_key(secret)), secret);
        }
    }

    #[test]
    fn test_derive_global_key() {
        assert_eq!(
            derive_key(&GLOBAL_DB_KEY),
            vec![0xA7, 0x13, 0xA5, 0xC7, 0x9D, 0xBC, 0x94, 0x97, 0xC0, 0xA8, 0x86, 0x69]
        );
    }

    #[test]
    fn test_mask_wraps_after_cycle() {
        let key = derive_key(&JP_DB_KEY);
        // Index 13 wraps back to the first mask byte instead of the zero padding
        assert_eq!(key[13], 0x53 ^ 0xF1);
        assert_eq!(key[26], JP_DB_KEY[26] ^ 0xF1);
    }

    #[test]
    fn test_derive_empty() {
        assert!(derive_key(&[]).is_empty());
    }

    #[test]
    fn test_is_encrypted_plain_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        fs::write(&path, b"SQLite format 3\0rest of page").unwrap();
        assert!(!is_encrypted(&path));
    }

    #[test]
    fn test_is_encrypted_exact_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        fs::write(&path, SQLITE_HEADER).unwrap();
        assert!(!is_encrypted(&path));
    }

    #[test]
    fn test_is_encrypted_random_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        let garbage: Vec<u8> = (0u8..64).map(|b| b.wrapping_mul(37) ^ 0x8F).collect();
        fs::write(&path, garbage).unwrap();
        assert!(is_encrypted(&path));
    }

    #[test]
    fn test_is_encrypted_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        fs::write(&path, b"SQLite for").unwrap();
        assert!(is_encrypted(&path));

        fs::write(&path, b"").unwrap();
        assert!(is_encrypted(&path));
    }

    #[test]
    fn test_is_encrypted_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_encrypted(dir.path().join("does-not-exist")));
    }

    #[test]
    fn test_is_encrypted_real_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE a (n TEXT);").unwrap();
        drop(conn);
        assert!(!is_encrypted(&path));
    }
}
