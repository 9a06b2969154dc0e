//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Deterministic PBKDF2-HMAC-SHA1 key derivation with an optional, thread-safe
//! memoization table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sha1::Sha1;

use crate::error::KeyGenError;
use crate::secret::Secret;

/// Cache key: the salt bytes and the requested output bit length.
type CacheKey = (Vec<u8>, usize);

/// A deterministic key derivation service, matching the source framework's
/// default `ActiveSupport::KeyGenerator`: PBKDF2 with HMAC-SHA1, a
/// caller-fixed secret and iteration count.
///
/// Cheap to construct per request; expensive to call repeatedly without the
/// cache, since PBKDF2 iteration counts here are in the thousands. Intended
/// to be held behind an `Arc` and shared across threads — the cache is the
/// only mutable state and is safe for concurrent readers and writers.
pub struct KeyGenerator {
    secret: Secret<String>,
    iterations: u32,
    cache: Option<RwLock<HashMap<CacheKey, Arc<[u8]>>>>,
}

impl KeyGenerator {
    /// Construct a generator. `iterations` is clamped to at least 1 (the
    /// algorithm is undefined for zero rounds).
    pub fn new(secret: impl Into<String>, iterations: u32, cache_enabled: bool) -> Self {
        Self {
            secret: Secret::new(secret.into()),
            iterations: iterations.max(1),
            cache: cache_enabled.then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Derive `bit_length / 8` bytes for `salt`.
    ///
    /// The returned `Arc<[u8]>` is the mechanism by which two cached calls
    /// with the same `(salt, bit_length)` return buffer-identical results:
    /// both are clones of the same `Arc`, so `Arc::ptr_eq` holds between them.
    /// Without caching, results are still byte-identical but are freshly
    /// allocated on every call.
    pub fn derive(&self, salt: &str, bit_length: usize) -> Result<Arc<[u8]>, KeyGenError> {
        if bit_length == 0 || bit_length % 8 != 0 {
            return Err(KeyGenError::InvalidBitLength(bit_length));
        }
        let byte_len = bit_length / 8;

        let Some(cache) = &self.cache else {
            return Ok(self.derive_uncached(salt.as_bytes(), byte_len));
        };

        let key: CacheKey = (salt.as_bytes().to_vec(), bit_length);

        if let Some(hit) = cache.read().expect("key cache poisoned").get(&key) {
            tracing::debug!(bit_length, "key cache hit");
            return Ok(hit.clone());
        }

        // Compute outside the lock: a racing duplicate derivation is
        // acceptable (spec: "misses under contention are idempotent"); what
        // must not happen is a value changing once installed.
        let derived = self.derive_uncached(salt.as_bytes(), byte_len);

        let mut guard = cache.write().expect("key cache poisoned");
        let installed = guard.entry(key).or_insert(derived);
        tracing::debug!(bit_length, "key cache miss, derived and installed");
        Ok(installed.clone())
    }

    fn derive_uncached(&self, salt: &[u8], byte_len: usize) -> Arc<[u8]> {
        let mut out = vec![0u8; byte_len];
        pbkdf2::pbkdf2_hmac::<Sha1>(
            self.secret.expose_secret().as_bytes(),
            salt,
            self.iterations,
            &mut out,
        );
        Arc::from(out)
    }
}
