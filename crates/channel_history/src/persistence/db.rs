//! The opaque DB primitive (§4.5a): a whole-file `nonce || ciphertext`
//! container, sealed with libsodium's `secretbox_xsalsa20poly1305`
//! construction via the host's own `sodium_secretbox` crate. The cipher is
//! deliberately isolated here so swapping it for a different opaque
//! primitive touches nothing in [`crate::persistence::codec`] or
//! [`crate::persistence::controller`].

use std::{
    fs,
    io,
    path::{
        Path,
        PathBuf,
    },
};

use sodium_secretbox::{
    gen_nonce,
    open,
    seal,
    Key,
    Nonce,
    NONCEBYTES,
};

/// Failure opening a file for reading, distinguishing "doesn't exist yet"
/// (not an error at boot) from everything else (a real I/O problem).
pub enum OpenError {
    NotFound,
    Other(anyhow::Error),
}

/// A short read, a truncated length prefix, or invalid UTF-8 while decoding
/// a length-prefixed string. Always maps to [`crate::error::HistoryError::Corrupt`]
/// at the codec layer: once the container decrypts, structural trouble
/// means the plaintext can't be trusted.
#[derive(Debug, thiserror::Error)]
pub enum DbReadError {
    #[error("unexpected end of data")]
    ShortRead,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
}

/// A positioned reader over the decrypted plaintext of one container.
pub struct SecretDbReader {
    buf: Vec<u8>,
    pos: usize,
}

impl SecretDbReader {
    pub fn open(path: &Path, secret: &Key) -> Result<Self, OpenError> {
        let raw = fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                OpenError::NotFound
            } else {
                OpenError::Other(e.into())
            }
        })?;
        if raw.len() < NONCEBYTES {
            return Err(OpenError::Other(anyhow::anyhow!(
                "file shorter than a nonce"
            )));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCEBYTES);
        let nonce = Nonce::from_slice(nonce_bytes)
            .ok_or_else(|| OpenError::Other(anyhow::anyhow!("malformed nonce")))?;
        let buf = open(ciphertext, &nonce, secret)
            .map_err(|_| OpenError::Other(anyhow::anyhow!("decryption failed")))?;
        Ok(Self { buf, pos: 0 })
    }

    fn take(&mut self, n: usize) -> Result<&[u8], DbReadError> {
        let end = self.pos.checked_add(n).ok_or(DbReadError::ShortRead)?;
        let slice = self.buf.get(self.pos..end).ok_or(DbReadError::ShortRead)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, DbReadError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked above");
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, DbReadError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked above");
        Ok(u64::from_be_bytes(bytes))
    }

    /// A length-prefixed string; a length of `-1` (encoded as `u32::MAX`)
    /// decodes to `None`, matching the opaque primitive's "distinguishable
    /// null value" contract.
    pub fn read_string(&mut self) -> Result<Option<String>, DbReadError> {
        let len = self.read_u32()?;
        if len == u32::MAX {
            return Ok(None);
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| DbReadError::InvalidUtf8)
    }
}

/// An accumulating writer; the container is only sealed and written to
/// disk on [`SecretDbWriter::close`].
pub struct SecretDbWriter {
    path: PathBuf,
    secret: Key,
    buf: Vec<u8>,
}

impl SecretDbWriter {
    pub fn create(path: &Path, secret: &Key) -> Self {
        Self {
            path: path.to_path_buf(),
            secret: secret.clone(),
            buf: Vec::new(),
        }
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_string(&mut self, v: Option<&str>) {
        match v {
            None => self.write_u32(u32::MAX),
            Some(s) => {
                self.write_u32(s.len() as u32);
                self.buf.extend_from_slice(s.as_bytes());
            },
        }
    }

    /// Seals the accumulated plaintext and writes `nonce || ciphertext` to
    /// `path`. Nothing reaches disk until this call, so a write failure
    /// part-way through framing never leaves a half-written file.
    pub fn close(self) -> anyhow::Result<()> {
        let nonce = gen_nonce();
        let ciphertext = seal(&self.buf, &nonce, &self.secret);
        let mut out = Vec::with_capacity(NONCEBYTES + ciphertext.len());
        out.extend_from_slice(&nonce.0);
        out.extend_from_slice(&ciphertext);
        fs::write(&self.path, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn test_key() -> Key {
        let bytes = [7u8; sodium_secretbox::KEYBYTES];
        Key::from_slice(&bytes).unwrap()
    }

    #[test]
    fn round_trips_typed_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let key = test_key();

        let mut w = SecretDbWriter::create(&path, &key);
        w.write_u32(42);
        w.write_u64(1_000_000_000_000);
        w.write_string(Some("hello"));
        w.write_string(None);
        w.close().unwrap();

        let mut r = SecretDbReader::open(&path, &key).ok().unwrap();
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_u64().unwrap(), 1_000_000_000_000);
        assert_eq!(r.read_string().unwrap().as_deref(), Some("hello"));
        assert_eq!(r.read_string().unwrap(), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.db");
        let key = test_key();
        match SecretDbReader::open(&path, &key) {
            Err(OpenError::NotFound) => {},
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let key = test_key();
        let mut w = SecretDbWriter::create(&path, &key);
        w.write_u32(1);
        w.close().unwrap();

        let wrong_key = Key::from_slice(&[9u8; sodium_secretbox::KEYBYTES]).unwrap();
        assert!(matches!(
            SecretDbReader::open(&path, &wrong_key),
            Err(OpenError::Other(_))
        ));
    }

    #[test]
    fn truncated_ciphertext_is_short_read_safe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let key = test_key();
        let mut w = SecretDbWriter::create(&path, &key);
        w.write_u32(1);
        w.write_string(Some("abc"));
        w.close().unwrap();

        let mut r = SecretDbReader::open(&path, &key).ok().unwrap();
        assert_eq!(r.read_u32().unwrap(), 1);
        // Ask for a field that was never written: must error, not panic.
        assert!(matches!(r.read_u64(), Err(DbReadError::ShortRead)));
    }
}
