//! Pluggable authentication step consulted during the `AUTH` handshake.
//!
//! The core never hardcodes a crypto backend: verifying a signature against
//! a known key is delegated to [`SignatureVerifier`], and the decision of
//! whether to trust a freshly-presented key is delegated to [`AuthProvider`].
//! `adbd-core` ships [`NoAuth`] (always authorized) and [`FileKeyStore`] (a
//! provider that persists accepted keys to a newline-delimited file).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, warn};

use crate::error::AuthError;

/// Length in bytes of the random token sent in `AUTH(TOKEN, ...)`.
pub const TOKEN_LEN: usize = 20;

pub fn random_token() -> [u8; TOKEN_LEN] {
    let mut token = [0u8; TOKEN_LEN];
    rand::rng().fill_bytes(&mut token);
    token
}

/// Verifies a signature over a token against one known public key. The
/// actual RSA/crypto primitive lives outside this crate; this trait is the
/// seam.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, token: &[u8; TOKEN_LEN], signature: &[u8], known_key: &[u8]) -> bool;
}

/// Drives the two AUTH sub-flows named in the handshake table: verifying a
/// peer-presented signature against trusted keys, and deciding whether to
/// trust a freshly-presented public key.
pub trait AuthProvider: Send {
    fn auth_required(&self) -> bool;

    fn verify_signature(&mut self, token: &[u8; TOKEN_LEN], signature: &[u8]) -> Result<(), AuthError>;

    fn accept_public_key(&mut self, key: &[u8]) -> Result<(), AuthError>;
}

/// Always authorizes; used when `auth_required = false` or in tests.
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn auth_required(&self) -> bool {
        false
    }

    fn verify_signature(&mut self, _token: &[u8; TOKEN_LEN], _signature: &[u8]) -> Result<(), AuthError> {
        Ok(())
    }

    fn accept_public_key(&mut self, _key: &[u8]) -> Result<(), AuthError> {
        Ok(())
    }
}

/// A provider backed by a flat, newline-delimited file of trusted public
/// keys (hex-encoded), matching the on-disk `adbkeys`-style trust store a
/// real daemon keeps. New keys are accepted-and-remembered by default
/// (there is no interactive prompt in a headless daemon); callers that want
/// stricter policy can implement [`AuthProvider`] directly instead.
pub struct FileKeyStore {
    path: PathBuf,
    verifier: Arc<dyn SignatureVerifier>,
    known_keys: Vec<Vec<u8>>,
}

impl FileKeyStore {
    pub fn open(path: impl Into<PathBuf>, verifier: Arc<dyn SignatureVerifier>) -> io::Result<Self> {
        let path = path.into();
        let known_keys = match fs::read_to_string(&path) {
            Ok(contents) => contents.lines().filter_map(|l| hex_decode(l.trim())).collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, verifier, known_keys })
    }

    fn persist(&self, key: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = fs::read_to_string(&self.path).unwrap_or_default();
        contents.push_str(&hex_encode(key));
        contents.push('\n');
        fs::write(&self.path, contents)
    }
}

impl AuthProvider for FileKeyStore {
    fn auth_required(&self) -> bool {
        true
    }

    fn verify_signature(&mut self, token: &[u8; TOKEN_LEN], signature: &[u8]) -> Result<(), AuthError> {
        let ok = self.known_keys.iter().any(|key| self.verifier.verify(token, signature, key));
        if ok {
            Ok(())
        } else {
            debug!("signature did not verify against {} known key(s)", self.known_keys.len());
            Err(AuthError::BadSignature)
        }
    }

    fn accept_public_key(&mut self, key: &[u8]) -> Result<(), AuthError> {
        if let Err(e) = self.persist(key) {
            warn!(?e, "couldn't persist accepted host key, trusting for this session only");
        }
        self.known_keys.push(key.to_vec());
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
