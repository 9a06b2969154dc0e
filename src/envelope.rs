//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Session-cookie decryption and signed-message verification.
//!
//! [`SessionEnvelope`] reverses the source framework's "authenticated
//! encrypted cookie" scheme: percent-decoded, `--`-delimited base64
//! segments carrying an AES-256-GCM ciphertext, nonce and tag, wrapping a
//! JSON `_rails` envelope whose `message` field is itself a base64-encoded
//! object-graph payload. [`SignedMessage`] reverses the older HMAC-signed
//! cookie scheme that predates authenticated encryption.

use std::sync::Arc;

use aes_gcm::{AeadInPlace, Aes256Gcm, KeyInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::decoder;
use crate::error::EnvelopeError;
use crate::keygen::KeyGenerator;
use crate::secret::Secret;
use crate::value::Value;

/// PBKDF2 iteration count the source framework uses for its internal key
/// generators (`ActiveSupport::KeyGenerator` default).
const KEY_DERIVATION_ITERATIONS: u32 = 1000;

/// Salt the framework derives the AES session key under.
const SESSION_KEY_SALT: &str = "authenticated encrypted cookie";

/// AES-256-GCM key length in bits.
const SESSION_KEY_BITS: usize = 256;

/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Decrypts "authenticated encrypted cookie" session values: AES-256-GCM
/// envelopes whose key is derived from a deployment secret via PBKDF2.
///
/// Construct with the raw cookie text and the deployment's
/// `secret_key_base`; [`SessionEnvelope::decrypt`] does the rest. Each
/// instance owns a private [`KeyGenerator`] by default. A deployment that
/// decrypts many cookies against the same `secret_key_base` should instead
/// build one [`KeyGenerator`] and share it across envelopes with
/// [`SessionEnvelope::with_key_generator`], so the PBKDF2 cache actually
/// gets reused.
pub struct SessionEnvelope {
    cookie_value: String,
    keygen: Arc<KeyGenerator>,
}

impl SessionEnvelope {
    /// Construct an envelope with a private, unshared key generator.
    pub fn new(cookie_value: impl Into<String>, secret_key_base: impl Into<String>) -> Self {
        let keygen = Arc::new(KeyGenerator::new(
            secret_key_base,
            KEY_DERIVATION_ITERATIONS,
            true,
        ));
        Self::with_key_generator(cookie_value, keygen)
    }

    /// Construct an envelope that derives its session key through a
    /// caller-supplied, possibly shared, key generator.
    pub fn with_key_generator(cookie_value: impl Into<String>, keygen: Arc<KeyGenerator>) -> Self {
        Self {
            cookie_value: cookie_value.into(),
            keygen,
        }
    }

    /// Decrypt the cookie and decode its payload into a mapping.
    ///
    /// Fails closed: any malformed segment, authentication failure, or
    /// non-mapping payload is reported rather than silently producing a
    /// partial or empty result.
    #[tracing::instrument(skip_all)]
    pub fn decrypt(&self) -> Result<IndexMap<Value, Value>, EnvelopeError> {
        let decoded = percent_decode_str(&self.cookie_value)
            .decode_utf8()
            .map_err(|_| EnvelopeError::InvalidEnvelope("cookie value is not valid UTF-8"))?;

        let segments: Vec<&str> = decoded.split("--").collect();
        let [cipher_b64, iv_b64, tag_b64] = segments.as_slice() else {
            return Err(EnvelopeError::InvalidEnvelope(
                "cookie value must have exactly three ---delimited segments",
            ));
        };

        let mut ciphertext = STANDARD
            .decode(cipher_b64)
            .map_err(|_| EnvelopeError::InvalidEnvelope("ciphertext segment is not valid base64"))?;
        let iv = STANDARD
            .decode(iv_b64)
            .map_err(|_| EnvelopeError::InvalidEnvelope("iv segment is not valid base64"))?;
        let tag = STANDARD
            .decode(tag_b64)
            .map_err(|_| EnvelopeError::InvalidEnvelope("auth tag segment is not valid base64"))?;

        if iv.len() != NONCE_LEN {
            return Err(EnvelopeError::InvalidEnvelope("iv must be 12 bytes"));
        }

        let key = self.keygen.derive(SESSION_KEY_SALT, SESSION_KEY_BITS)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| EnvelopeError::InvalidEnvelope("derived session key has wrong length"))?;

        let nonce_array: &[u8; NONCE_LEN] = iv
            .as_slice()
            .try_into()
            .expect("length checked above");

        ciphertext.extend_from_slice(&tag);
        cipher
            .decrypt_in_place(nonce_array.into(), &[], &mut ciphertext)
            .map_err(|_| EnvelopeError::AuthFailure)?;

        let rails_json: serde_json::Value = serde_json::from_slice(&ciphertext)
            .map_err(|_| EnvelopeError::InvalidEnvelope("plaintext is not valid JSON"))?;

        let message_b64 = rails_json
            .get("_rails")
            .and_then(|r| r.get("message"))
            .and_then(|m| m.as_str())
            .ok_or(EnvelopeError::InvalidEnvelope(
                "plaintext JSON is missing _rails.message",
            ))?;

        let payload_bytes = STANDARD
            .decode(message_b64)
            .map_err(|_| EnvelopeError::InvalidEnvelope("_rails.message is not valid base64"))?;

        let value = decoder::decode(&payload_bytes)?;
        value.into_indexmap().ok_or(EnvelopeError::UnexpectedPayload)
    }
}

/// Verifies and generates HMAC-SHA256-signed, base64-framed messages: the
/// source framework's `ActiveSupport::MessageVerifier` scheme.
pub struct SignedMessage {
    secret: Secret<String>,
}

impl SignedMessage {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Secret::new(secret.into()),
        }
    }

    /// Verify `token` was produced by [`SignedMessage::generate`] for the
    /// given `purpose`, under this instance's secret.
    ///
    /// Never fails loudly: any malformed structure, signature mismatch, bad
    /// base64 or JSON, or purpose mismatch all collapse to `Value::Nil`, so
    /// the presence or absence of a fault can never be used to distinguish
    /// failure modes from the outside.
    pub fn verify(&self, token: &str, purpose: &str) -> Value {
        self.try_verify(token, purpose).unwrap_or(Value::Nil)
    }

    fn try_verify(&self, token: &str, purpose: &str) -> Option<Value> {
        let mut parts = token.splitn(3, "--");
        let data = parts.next()?;
        let tag_hex = parts.next()?;
        if parts.next().is_some() || data.is_empty() || tag_hex.is_empty() {
            return None;
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes()).ok()?;
        mac.update(data.as_bytes());
        let expected_hex = hex::encode(mac.finalize().into_bytes());

        if expected_hex.len() != tag_hex.len() {
            return None;
        }
        let equal: bool = expected_hex.as_bytes().ct_eq(tag_hex.as_bytes()).into();
        if !equal {
            return None;
        }

        let json_bytes = STANDARD.decode(data).ok()?;
        let parsed: serde_json::Value = serde_json::from_slice(&json_bytes).ok()?;
        let rails = parsed.get("_rails")?;
        if rails.get("pur").and_then(|p| p.as_str())? != purpose {
            return None;
        }
        let message_b64 = rails.get("message").and_then(|m| m.as_str())?;
        let message_bytes = STANDARD.decode(message_b64).ok()?;
        let message_text = String::from_utf8(message_bytes).ok()?;
        Some(Value::Str(message_text))
    }

    /// Sign `value` for `purpose`, producing a token [`SignedMessage::verify`]
    /// accepts.
    ///
    /// Unlike `verify`, algorithmic failures here are real faults (an HMAC
    /// key that somehow can't be constructed, a JSON serialization failure)
    /// and are propagated rather than swallowed.
    pub fn generate(&self, value: &str, purpose: &str) -> Result<String, EnvelopeError> {
        let envelope = serde_json::json!({
            "_rails": {
                "message": STANDARD.encode(value.as_bytes()),
                "exp": serde_json::Value::Null,
                "pur": purpose,
            }
        });
        let json_bytes = serde_json::to_vec(&envelope)
            .map_err(|_| EnvelopeError::SigningFailed("failed to serialize message envelope"))?;
        let data = STANDARD.encode(&json_bytes);

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| EnvelopeError::SigningFailed("failed to initialize HMAC key"))?;
        mac.update(data.as_bytes());
        let tag_hex = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{data}--{tag_hex}"))
    }
}
