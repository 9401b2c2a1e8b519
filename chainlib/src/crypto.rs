//! RSA key material, signing, and the canonical public-key encoding that
//! doubles as an account identifier everywhere else in this crate.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fs;
use std::path::Path;

const KEY_BITS: usize = 2048;
const PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
// The body is a subject-public-key-info DER structure, not a PKCS#1 one; the
// label is kept as "RSA PUBLIC KEY" to match what a peer's key files look
// like on disk, a mismatch inherited from the node this format was copied
// from. Readers only need the DER bytes, so it is harmless.
const PUBLIC_KEY_LABEL: &str = "RSA PUBLIC KEY";

#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

#[derive(Clone, Debug)]
pub struct PublicKey(RsaPublicKey);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl PrivateKey {
    pub fn generate() -> Result<(PrivateKey, PublicKey), CryptoError> {
        let key = RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|e| CryptoError::Key(e.to_string()))?;
        let public = PublicKey(key.to_public_key());
        Ok((PrivateKey(key), public))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let pem = fs::read_to_string(path.as_ref()).map_err(|e| CryptoError::Io(e.to_string()))?;
        let parsed = pem::parse(pem.as_bytes()).map_err(|e| CryptoError::Pem(e.to_string()))?;
        let key = RsaPrivateKey::from_pkcs1_der(parsed.contents())
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        Ok(PrivateKey(key))
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), CryptoError> {
        let der = self
            .0
            .to_pkcs1_der()
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        let pem = pem::Pem::new(PRIVATE_KEY_LABEL, der.as_bytes().to_vec());
        write_pem_with_mode(path, &pem)
    }

    /// SHA-256 the message, then RSA-PKCS#1 v1.5 sign the hash.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let hashed = Sha256::digest(message);
        let sig = self
            .0
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(Signature(sig))
    }
}

impl PublicKey {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let pem = fs::read_to_string(path.as_ref()).map_err(|e| CryptoError::Io(e.to_string()))?;
        let parsed = pem::parse(pem.as_bytes()).map_err(|e| CryptoError::Pem(e.to_string()))?;
        Self::decode(parsed.contents())
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), CryptoError> {
        let der = self.encode();
        let pem = pem::Pem::new(PUBLIC_KEY_LABEL, der);
        write_pem_with_mode(path, &pem)
    }

    /// Canonical subject-public-key-info DER encoding. This is the account's
    /// identity: two keys are the same account iff this encoding matches.
    pub fn encode(&self) -> Vec<u8> {
        self.0
            .to_public_key_der()
            .expect("a loaded RSA public key always re-encodes")
            .into_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_der(bytes).map_err(|e| CryptoError::Key(e.to_string()))?;
        Ok(PublicKey(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let hashed = Sha256::digest(message);
        self.0
            .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, &signature.0)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn flip_byte_for_test(&mut self, index: usize) {
        self.0[index] ^= 0xFF;
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}
impl Eq for PublicKey {}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes_vec(&self.encode(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        PublicKey::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

fn serde_bytes_vec<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(bytes)
}

#[cfg(unix)]
fn write_pem_with_mode(path: impl AsRef<Path>, pem: &pem::Pem) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    let encoded = pem::encode(pem);
    fs::write(path.as_ref(), encoded).map_err(|e| CryptoError::Io(e.to_string()))?;
    fs::set_permissions(path.as_ref(), fs::Permissions::from_mode(0o644))
        .map_err(|e| CryptoError::Io(e.to_string()))
}

#[cfg(not(unix))]
fn write_pem_with_mode(path: impl AsRef<Path>, pem: &pem::Pem) -> Result<(), CryptoError> {
    let encoded = pem::encode(pem);
    fs::write(path.as_ref(), encoded).map_err(|e| CryptoError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_public_key_encoding() {
        let (_, public) = PrivateKey::generate().unwrap();
        let decoded = PublicKey::decode(&public.encode()).unwrap();
        assert_eq!(public, decoded);
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let (priv_key, pub_key) = PrivateKey::generate().unwrap();
        let msg = b"some bytes to authenticate";
        let sig = priv_key.sign(msg).unwrap();
        assert!(pub_key.verify(msg, &sig).is_ok());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let (priv_key, pub_key) = PrivateKey::generate().unwrap();
        let msg = b"some bytes to authenticate";
        let mut sig = priv_key.sign(msg).unwrap();
        sig.flip_byte_for_test(0);
        assert!(pub_key.verify(msg, &sig).is_err());
    }

    #[test]
    fn different_keys_have_different_canonical_encodings() {
        let (_, a) = PrivateKey::generate().unwrap();
        let (_, b) = PrivateKey::generate().unwrap();
        assert_ne!(a.to_hex(), b.to_hex());
    }
}
