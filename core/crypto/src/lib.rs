//! Authenticated encryption of secrets stored in the external index.
//!
//! Break-glass grants persisted for cross-replica durability include the API keys and
//! bearer tokens they were observed with. These are sealed with AES-256-GCM before
//! they leave the process.
//!
//! The [`Envelope`] holds a ring of keys identified by a positive integer.
//! New ciphertexts are always produced with the newest (highest ID) key while older
//! keys remain available to decrypt records written before a rotation.
//! Key ID `0` is reserved to mark records that carry no secrets.
//!
//! Ciphertexts are laid out as `nonce || ciphertext || tag` and base64 encoded when
//! they need to travel inside JSON documents (see [`Envelope::seal`] and [`Envelope::open`]).
use std::collections::BTreeMap;
use std::sync::RwLock;

use aes_gcm::aead::Aead;
use aes_gcm::aead::AeadCore;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::OsRng;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use anyhow::Context;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde::Serialize;

pub mod error;

/// Length in bytes of the AES-GCM nonce prefixed to every ciphertext.
const NONCE_LEN: usize = 12;

/// Identifier of an encryption key in the [`Envelope`] key ring.
pub type KeyId = u32;

/// Key ID attached to records that carry no encrypted material.
pub const NO_KEY: KeyId = 0;

/// Configuration of the encryption keys available to the process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoConf {
    /// Encryption keys known to the process, in any order.
    #[serde(default)]
    pub keys: Vec<KeyConf>,
}

/// An individual encryption key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConf {
    /// Stable, monotonically increasing identifier of the key.
    pub id: KeyId,

    /// Base64 encoded 256-bit key material.
    pub key: String,
}

impl std::fmt::Debug for KeyConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConf")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Base64 encoded ciphertext along with the ID of the key that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    /// Base64 encoding of `nonce || ciphertext || tag`.
    pub ciphertext: String,

    /// Key used to encrypt the plaintext.
    pub key_id: KeyId,
}

/// Symmetric authenticated encryption with a ring of rotating keys.
pub struct Envelope {
    keys: RwLock<BTreeMap<KeyId, Aes256Gcm>>,
}

impl Envelope {
    /// Add a key to the ring, replacing any key with the same ID.
    ///
    /// Adding a key with an ID higher than all others rotates encryption onto it.
    pub fn add_key(&self, key_id: KeyId, key: &[u8]) -> Result<()> {
        if key_id == NO_KEY {
            anyhow::bail!(self::error::ReservedKeyId);
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| anyhow::anyhow!(self::error::InvalidKey(key_id)))?;
        self.keys
            .write()
            .expect("Envelope::keys lock poisoned")
            .insert(key_id, cipher);
        Ok(())
    }

    /// Decrypt a ciphertext produced by [`Envelope::encrypt`] with the given key.
    pub fn decrypt(&self, ciphertext: &[u8], key_id: KeyId) -> Result<Vec<u8>> {
        let keys = self.keys.read().expect("Envelope::keys lock poisoned");
        let cipher = keys
            .get(&key_id)
            .ok_or(self::error::UnknownKeyId(key_id))?;
        if ciphertext.len() < NONCE_LEN {
            anyhow::bail!(self::error::DecryptFailed(key_id));
        }
        let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow::anyhow!(self::error::DecryptFailed(key_id)))
    }

    /// Encrypt a plaintext with the newest key and return the ciphertext and the key ID.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, KeyId)> {
        let keys = self.keys.read().expect("Envelope::keys lock poisoned");
        let (key_id, cipher) = keys.iter().next_back().ok_or(self::error::NoKeys)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| anyhow::anyhow!(self::error::EncryptFailed(*key_id)))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok((sealed, *key_id))
    }

    /// Initialise an [`Envelope`] with the keys from the configuration.
    pub fn from_conf(conf: &CryptoConf) -> Result<Envelope> {
        if conf.keys.is_empty() {
            anyhow::bail!(self::error::NoKeys);
        }
        let envelope = Envelope::empty();
        for key in &conf.keys {
            let material = STANDARD
                .decode(key.key.trim())
                .map_err(anyhow::Error::from)
                .context(self::error::InvalidKey(key.id))?;
            envelope.add_key(key.id, &material)?;
        }
        Ok(envelope)
    }

    /// ID of the key new ciphertexts are encrypted with, if any key is known.
    pub fn newest_key(&self) -> Option<KeyId> {
        self.keys
            .read()
            .expect("Envelope::keys lock poisoned")
            .keys()
            .next_back()
            .copied()
    }

    /// Decode a base64 ciphertext and decrypt it into a UTF-8 string.
    pub fn open(&self, ciphertext: &str, key_id: KeyId) -> Result<String> {
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(anyhow::Error::from)
            .context(self::error::InvalidEncoding)?;
        let plaintext = self.decrypt(&ciphertext, key_id)?;
        String::from_utf8(plaintext)
            .map_err(anyhow::Error::from)
            .context(self::error::InvalidPlaintext)
    }

    /// Encrypt a string and base64 encode the result for storage in JSON documents.
    pub fn seal(&self, plaintext: &str) -> Result<Sealed> {
        let (ciphertext, key_id) = self.encrypt(plaintext.as_bytes())?;
        let ciphertext = STANDARD.encode(ciphertext);
        Ok(Sealed { ciphertext, key_id })
    }

    fn empty() -> Envelope {
        Envelope {
            keys: RwLock::new(BTreeMap::new()),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Envelope {
    /// [`Envelope`] with a single, well known, key for unit tests.
    pub fn fixture() -> Envelope {
        let envelope = Envelope::empty();
        envelope
            .add_key(1, &[7u8; 32])
            .expect("fixture key must be valid");
        envelope
    }
}
