//! Errors reported by the crypto envelope.

/// Unable to decrypt ciphertext (tag mismatch or corrupted input).
#[derive(Debug, thiserror::Error)]
#[error("unable to decrypt ciphertext with key {0}")]
pub struct DecryptFailed(pub u32);

/// Unable to encrypt plaintext.
#[derive(Debug, thiserror::Error)]
#[error("unable to encrypt plaintext with key {0}")]
pub struct EncryptFailed(pub u32);

/// Ciphertext is not valid base64.
#[derive(Debug, thiserror::Error)]
#[error("ciphertext is not valid base64")]
pub struct InvalidEncoding;

/// Key material is not a valid AES-256 key.
#[derive(Debug, thiserror::Error)]
#[error("key {0} is not a valid base64 encoded 256-bit key")]
pub struct InvalidKey(pub u32);

/// Decrypted plaintext is not valid UTF-8.
#[derive(Debug, thiserror::Error)]
#[error("decrypted plaintext is not valid UTF-8")]
pub struct InvalidPlaintext;

/// The envelope has no keys to encrypt with.
#[derive(Debug, thiserror::Error)]
#[error("no encryption keys configured")]
pub struct NoKeys;

/// Key ID zero marks unencrypted records and can't be assigned to a key.
#[derive(Debug, thiserror::Error)]
#[error("key ID 0 is reserved for unencrypted records")]
pub struct ReservedKeyId;

/// Ciphertext references a key the envelope does not know about.
#[derive(Debug, thiserror::Error)]
#[error("encryption key {0} is not known")]
pub struct UnknownKeyId(pub u32);
