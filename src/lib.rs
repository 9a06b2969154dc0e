//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # rmarshal-core
//!
//! Decode, verify, and decrypt artifacts produced by a dynamic web
//! framework's binary object format (its "format 4.8" marshaling scheme)
//! and the cookie schemes built on top of it.
//!
//! ## Key Features
//!
//! - **Object-graph decoding**: a tagged, reference-counted binary format
//!   decoded into a language-neutral [`Value`] tree, with bounded recursion
//!   and allocation so untrusted input cannot exhaust memory or the stack.
//! - **Key derivation**: PBKDF2-HMAC-SHA1, matching the framework's default
//!   key generator, with an optional thread-safe memoization cache.
//! - **Session envelopes**: AES-256-GCM "authenticated encrypted cookie"
//!   decryption, chained straight into the object-graph decoder.
//! - **Signed messages**: HMAC-SHA256 verification and generation for the
//!   older signed-cookie scheme, with constant-time tag comparison.
//!
//! ## Quick Start
//!
//! ```rust
//! use rmarshal_core::SignedMessage;
//!
//! let signer = SignedMessage::new("a deployment secret");
//! let token = signer.generate("user-id-42", "session.id").unwrap();
//! assert_ne!(signer.verify(&token, "session.id"), rmarshal_core::Value::Nil);
//! ```
//!
//! ## Architecture
//!
//! - [`value`] - the decoded [`Value`] tree and its projections
//! - [`decoder`] - the format 4.8 object-graph decoder
//! - [`keygen`] - PBKDF2 key derivation with memoization
//! - [`envelope`] - session envelope decryption and signed-message verification
//! - [`error`] - the crate's unified error hierarchy
//! - [`secret`] - a zeroizing wrapper for in-memory secrets
//!
//! None of these subsystems touch the filesystem or the network; callers
//! supply bytes (a cookie value, a raw marshal payload) and get back a
//! [`Value`] tree or a typed error. Diagnostics are emitted through the
//! [`tracing`] crate rather than printed, so embedding applications control
//! where they end up.

pub mod decoder;
pub mod envelope;
pub mod error;
pub mod keygen;
pub mod secret;
pub mod value;

pub use decoder::decode;
pub use envelope::{SessionEnvelope, SignedMessage};
pub use error::{DecodeError, EnvelopeError, KeyGenError, RmarshalError};
pub use keygen::KeyGenerator;
pub use secret::Secret;
pub use value::{Value, WrapperKind};
