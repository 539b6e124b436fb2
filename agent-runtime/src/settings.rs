//! Settings store (C2, §4.1): a `map<string, Any>` with opaque-at-rest secret encryption
//! and legacy-format migration. Ported from `elizaos.settings`.
//!
//! Two ciphertext formats are recognized on read:
//! - **v1 (legacy)**: `ivHex:ciphertextHex`, 16-byte IV, AES-256-CBC + PKCS#7.
//! - **v2 (current)**: `v2:ivHex:ciphertextHex:tagHex`, 12-byte IV, 16-byte tag, AES-256-GCM
//!   with AAD = the literal string `elizaos:settings:v2`.
//!
//! Both use `key = SHA-256(salt)[..32]`. Decryption is fail-open: anything that doesn't
//! decode or decrypt cleanly is returned unchanged rather than erroring (§7 `DecryptFailure`),
//! which also means a plaintext value that happens to match the hex shape of v1 ciphertext is
//! attempted as ciphertext and silently passed through on failure (§9 open question; preserved
//! deliberately, not a bug to fix here).

use std::collections::HashMap;

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::RuntimeError;

const V2_AAD: &[u8] = b"elizaos:settings:v2";
const DEFAULT_SALT_SENTINEL: &str = "secretsalt";

/// Resolves the settings-encryption salt from `env` (§4.1). Refuses to start with the
/// default sentinel salt in production unless `ELIZA_ALLOW_DEFAULT_SECRET_SALT=true` is
/// set, matching `settings.py`'s `raise RuntimeError(...)` in the same case (spec.md:101) —
/// this is a fatal config error (§7 `ConfigError`), not a warning.
pub fn get_salt(env: &HashMap<String, String>) -> Result<String, RuntimeError> {
    let salt = env
        .get("SECRET_SALT")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SALT_SENTINEL.to_string());
    let is_production = env.get("NODE_ENV").map(String::as_str) == Some("production");
    let allow_default = env
        .get("ELIZA_ALLOW_DEFAULT_SECRET_SALT")
        .is_some_and(|v| v == "true");
    if salt == DEFAULT_SALT_SENTINEL && is_production && !allow_default {
        return Err(RuntimeError::ConfigError(
            "SECRET_SALT is unset in production; refusing the default sentinel salt (set \
             ELIZA_ALLOW_DEFAULT_SECRET_SALT=true to override)"
                .to_string(),
        ));
    }
    Ok(salt)
}

fn derive_key(salt: &str) -> [u8; 32] {
    let digest = Sha256::digest(salt.as_bytes());
    digest.into()
}

/// True if `value` has the structural shape of v1 or v2 ciphertext (not a guarantee it
/// decrypts successfully under the current salt).
fn looks_encrypted(value: &str) -> bool {
    if let Some(rest) = value.strip_prefix("v2:") {
        let parts: Vec<&str> = rest.split(':').collect();
        return parts.len() == 2
            && parts[0].len() == 24
            && is_hex(parts[0])
            && is_hex(parts[1])
            && parts[1].len() % 2 == 0;
    }
    let parts: Vec<&str> = value.split(':').collect();
    parts.len() == 2 && parts[0].len() == 32 && is_hex(parts[0]) && is_hex(parts[1]) && parts[1].len() % 2 == 0
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Encrypts `plaintext` into v2 form: `v2:<iv-hex>:<ciphertext-hex>:<tag-hex>`.
pub fn encrypt_string_value(plaintext: &str, salt: &str) -> String {
    let key_bytes = derive_key(salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let mut iv = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);
    let ciphertext_and_tag = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: V2_AAD,
            },
        )
        .expect("AES-GCM encryption over an in-memory buffer cannot fail");
    let tag_at = ciphertext_and_tag.len() - 16;
    let (ciphertext, tag) = ciphertext_and_tag.split_at(tag_at);
    format!(
        "v2:{}:{}:{}",
        hex::encode(iv),
        hex::encode(ciphertext),
        hex::encode(tag)
    )
}

fn decrypt_v2(value: &str, salt: &str) -> Option<String> {
    let rest = value.strip_prefix("v2:")?;
    let mut parts = rest.split(':');
    let iv_hex = parts.next()?;
    let ct_hex = parts.next()?;
    let tag_hex = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let iv = hex::decode(iv_hex).ok()?;
    let ct = hex::decode(ct_hex).ok()?;
    let tag = hex::decode(tag_hex).ok()?;
    if iv.len() != 12 || tag.len() != 16 {
        return None;
    }
    let key_bytes = derive_key(salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let mut combined = ct;
    combined.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &combined,
                aad: V2_AAD,
            },
        )
        .ok()?;
    String::from_utf8(plaintext).ok()
}

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

fn decrypt_v1(value: &str, salt: &str) -> Option<String> {
    let mut parts = value.split(':');
    let iv_hex = parts.next()?;
    let ct_hex = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let iv = hex::decode(iv_hex).ok()?;
    let ct = hex::decode(ct_hex).ok()?;
    if iv.len() != 16 {
        return None;
    }
    let key_bytes = derive_key(salt);
    let decryptor = Aes256CbcDec::new_from_slices(&key_bytes, &iv).ok()?;
    let mut buf = ct;
    let plaintext = decryptor.decrypt_padded_mut::<Pkcs7>(&mut buf).ok()?;
    String::from_utf8(plaintext.to_vec()).ok()
}

fn encrypt_v1(plaintext: &str, salt: &str) -> String {
    let key_bytes = derive_key(salt);
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    let encryptor = Aes256CbcEnc::new_from_slices(&key_bytes, &iv)
        .expect("16-byte IV and 32-byte key always construct a CBC encryptor");
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
}

/// Decrypts `value` if it looks like v1 or v2 ciphertext; otherwise (or on any failure)
/// returns `value` unchanged — fail-open, per §4.1 / §7 `DecryptFailure`.
pub fn decrypt_string_value(value: &str, salt: &str) -> String {
    if !looks_encrypted(value) {
        return value.to_string();
    }
    if value.starts_with("v2:") {
        decrypt_v2(value, salt).unwrap_or_else(|| value.to_string())
    } else {
        decrypt_v1(value, salt).unwrap_or_else(|| value.to_string())
    }
}

/// Alias kept for parity with the source's `decrypt_secret`.
pub fn decrypt_secret(value: &str, salt: &str) -> String {
    decrypt_string_value(value, salt)
}

/// Re-encrypts a v1 value to v2; a v2 value (or a plain value) passes through unchanged.
pub fn migrate_encrypted_string_value(value: &str, salt: &str) -> String {
    if value.starts_with("v2:") || !looks_encrypted(value) {
        return value.to_string();
    }
    match decrypt_v1(value, salt) {
        Some(plain) => encrypt_string_value(&plain, salt),
        None => value.to_string(),
    }
}

fn encrypt_object_values(obj: &HashMap<String, Value>, salt: &str) -> HashMap<String, Value> {
    obj.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => Value::String(encrypt_string_value(s, salt)),
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect()
}

fn decrypt_object_values(obj: &HashMap<String, Value>, salt: &str) -> HashMap<String, Value> {
    obj.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => Value::String(decrypt_string_value(s, salt)),
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect()
}

fn migrate_object_values(obj: &HashMap<String, Value>, salt: &str) -> HashMap<String, Value> {
    obj.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => Value::String(migrate_encrypted_string_value(s, salt)),
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect()
}

/// Coerces `"true"` / `"false"` (case-insensitive) to a boolean; anything else passes through.
fn coerce_bool(plain: String) -> Value {
    match plain.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(plain),
    }
}

/// The runtime's settings table (§4.1, §6 `get_setting`/`set_setting`). Secret string
/// values are stored encrypted at rest (v2); plain settings are stored as-is. Both are
/// read uniformly through [`SettingsStore::get`], which transparently decrypts and
/// coerces boolean-looking strings.
pub struct SettingsStore {
    salt: String,
    values: HashMap<String, Value>,
}

impl SettingsStore {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            values: HashMap::new(),
        }
    }

    pub fn from_env(env: &HashMap<String, String>) -> Result<Self, RuntimeError> {
        Ok(Self::new(get_salt(env)?))
    }

    /// Stores a plain (non-secret) setting verbatim.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Encrypts `plaintext` to v2 and stores it under `key` (for `Character.secrets`).
    pub fn set_secret(&mut self, key: impl Into<String>, plaintext: &str) {
        self.values
            .insert(key.into(), Value::String(encrypt_string_value(plaintext, &self.salt)));
    }

    /// Loads a batch of secrets, encrypting each string value (§3 `Character.secrets`).
    pub fn load_secrets(&mut self, secrets: &HashMap<String, Value>) {
        for (k, v) in secrets {
            match v {
                Value::String(s) => self.set_secret(k, s),
                other => self.set(k.clone(), other.clone()),
            }
        }
    }

    /// Returns the decrypted, boolean-coerced value for `key` (§4.1).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| match v {
            Value::String(s) => coerce_bool(decrypt_string_value(s, &self.salt)),
            other => other.clone(),
        })
    }

    /// Re-encrypts any v1 string values in the store to v2, in place.
    pub fn migrate_all(&mut self) {
        self.values = migrate_object_values(&self.values, &self.salt);
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }
}
