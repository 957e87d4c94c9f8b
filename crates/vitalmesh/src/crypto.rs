// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Asymmetric crypto primitives for the mesh.
//!
//! Every node carries an RSA-2048 keypair generated at startup. Bodies of
//! INTEREST/DATA packets are encrypted with OAEP-SHA256 under the recipient's
//! public key; HELLO identity fields are signed with PSS-SHA256 twice, once
//! with the node key and once with the shared membership key that proves
//! group membership.
//!
//! `decrypt` and `verify` report failure as `Option`/`bool` -- a bad frame
//! must never tear down the connection that carried it.
//!
//! # OAEP block layout
//!
//! A 2048-bit OAEP-SHA256 block carries at most 190 plaintext bytes.
//! Plaintext longer than that is split into 190-byte chunks, each chunk
//! encrypted separately, and the 256-byte ciphertext blocks concatenated:
//!
//! ```text
//! plaintext:  |----190----|----190----|--rest--|
//! ciphertext: |----256----|----256----|--256---|
//! ```

use base64::{engine::general_purpose, Engine as _};
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{BigUint, Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// RSA modulus size for all mesh keys.
pub const RSA_BITS: usize = 2048;

/// Public exponent used for key generation.
pub const RSA_EXPONENT: u64 = 65537;

/// Largest plaintext a single 2048-bit OAEP-SHA256 block can carry:
/// k - 2*hLen - 2 = 256 - 64 - 2.
const OAEP_MAX_PLAINTEXT: usize = 190;

/// Ciphertext block size for a 2048-bit modulus.
const OAEP_BLOCK: usize = 256;

/// Validity window stamped into freshly issued node certificates.
const CERT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A node's asymmetric identity: private key plus derived public key.
#[derive(Clone)]
pub struct NodeKeys {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl NodeKeys {
    /// Generate a fresh RSA-2048 keypair.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if prime generation fails.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let exponent = BigUint::from(RSA_EXPONENT);
        let private = RsaPrivateKey::new_with_exp(&mut rng, RSA_BITS, &exponent)
            .map_err(|err| Error::Crypto(format!("keypair generation: {}", err)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Wrap an already-loaded private key (membership / gateway keys).
    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    pub fn private(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }
}

/// Encrypt `plaintext` for the holder of `recipient`, chunking as needed.
///
/// # Errors
///
/// Returns `Error::Crypto` if the RSA operation itself fails (never because
/// of plaintext size).
pub fn encrypt(recipient: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut out = Vec::with_capacity((plaintext.len() / OAEP_MAX_PLAINTEXT + 1) * OAEP_BLOCK);
    let mut chunks = plaintext.chunks(OAEP_MAX_PLAINTEXT);
    // An empty plaintext still produces one block so the ciphertext is
    // never empty and decrypt round-trips.
    let first = chunks.next().unwrap_or(&[]);
    let block = recipient
        .encrypt(&mut rng, Oaep::new::<Sha256>(), first)
        .map_err(|err| Error::Crypto(format!("oaep encrypt: {}", err)))?;
    out.extend_from_slice(&block);
    for chunk in chunks {
        let block = recipient
            .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
            .map_err(|err| Error::Crypto(format!("oaep encrypt: {}", err)))?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Decrypt a chunked OAEP ciphertext. `None` on any failure: wrong key,
/// truncated block, tampered ciphertext.
pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Option<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % OAEP_BLOCK != 0 {
        return None;
    }
    let mut out = Vec::new();
    for block in ciphertext.chunks(OAEP_BLOCK) {
        let plain = key.decrypt(Oaep::new::<Sha256>(), block).ok()?;
        out.extend_from_slice(&plain);
    }
    Some(out)
}

/// PSS-SHA256 signature over `message`.
///
/// # Errors
///
/// Returns `Error::Crypto` if signing fails.
pub fn sign(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha256::digest(message);
    let mut rng = rand::thread_rng();
    key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)
        .map_err(|err| Error::Crypto(format!("pss sign: {}", err)))
}

/// Verify a PSS-SHA256 signature. `false` on any mismatch.
pub fn verify(key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let digest = Sha256::digest(message);
    key.verify(Pss::new::<Sha256>(), &digest, signature).is_ok()
}

/// Base64 (standard alphabet) -- the only byte-blob encoding that crosses
/// the wire, guaranteed free of the `[` `]` frame delimiters.
pub fn b64_encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 text; `None` on malformed input.
pub fn b64_decode(text: &str) -> Option<Vec<u8>> {
    general_purpose::STANDARD.decode(text).ok()
}

/// PEM-encode a public key for embedding in HELLO frames.
///
/// # Errors
///
/// Returns `Error::Crypto` on encoding failure.
pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|err| Error::Crypto(format!("public key pem: {}", err)))
}

/// Parse a peer public key from its PEM text. `None` on malformed input.
pub fn public_key_from_pem(pem: &str) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem).ok()
}

/// Load a PKCS#8 PEM private key (membership or gateway key file).
///
/// # Errors
///
/// Returns `Error::KeyFile` if the file is missing or not a valid key.
pub fn load_private_key_pem(path: &Path) -> Result<RsaPrivateKey> {
    RsaPrivateKey::read_pkcs8_pem_file(path)
        .map_err(|err| Error::KeyFile(format!("{}: {}", path.display(), err)))
}

/// Write a private key as PKCS#8 PEM (keygen tool).
///
/// # Errors
///
/// Returns `Error::KeyFile` on write failure.
pub fn save_private_key_pem(path: &Path, key: &RsaPrivateKey) -> Result<()> {
    key.write_pkcs8_pem_file(path, LineEnding::LF)
        .map_err(|err| Error::KeyFile(format!("{}: {}", path.display(), err)))
}

/// Self-signed node certificate carried in HELLO frames.
///
/// The forwarding plane treats certificate bytes as opaque; peers store them
/// alongside the FIB entry. The document is JSON so operators can inspect it
/// with standard tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCertificate {
    /// Network common name (e.g. "hospital-net").
    pub common_name: String,
    /// PEM of the subject public key.
    pub public_key_pem: String,
    /// Unix seconds, start of validity.
    pub not_before: u64,
    /// Unix seconds, end of validity.
    pub not_after: u64,
    /// Base64 PSS-SHA256 self-signature over the four fields above.
    pub signature: String,
}

impl NodeCertificate {
    /// Issue a self-signed certificate for `keys` under `common_name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` on signing or encoding failure.
    pub fn issue(keys: &NodeKeys, common_name: &str) -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let not_after = now + CERT_VALIDITY.as_secs();
        let public_key_pem = public_key_to_pem(keys.public())?;
        let signed = Self::signed_fields(common_name, &public_key_pem, now, not_after);
        let signature = b64_encode(&sign(keys.private(), signed.as_bytes())?);
        Ok(Self {
            common_name: common_name.to_string(),
            public_key_pem,
            not_before: now,
            not_after,
            signature,
        })
    }

    /// Serialized form carried in HELLO frames.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if JSON encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Crypto(format!("certificate json: {}", err)))
    }

    /// Parse certificate bytes. `None` on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Check the self-signature and validity window.
    pub fn is_valid_now(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now < self.not_before || now > self.not_after {
            return false;
        }
        let Some(key) = public_key_from_pem(&self.public_key_pem) else {
            return false;
        };
        let Some(sig) = b64_decode(&self.signature) else {
            return false;
        };
        let signed = Self::signed_fields(
            &self.common_name,
            &self.public_key_pem,
            self.not_before,
            self.not_after,
        );
        verify(&key, signed.as_bytes(), &sig)
    }

    fn signed_fields(common_name: &str, pem: &str, not_before: u64, not_after: u64) -> String {
        format!("{}|{}|{}|{}", common_name, pem, not_before, not_after)
    }
}
