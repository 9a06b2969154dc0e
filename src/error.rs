//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Unified error hierarchy for the crate's three subsystems.

use thiserror::Error;

/// Top-level unified error type, aggregating the three subsystem errors.
///
/// Call sites that only care about one subsystem should generally return
/// that subsystem's narrower error type directly; this umbrella exists for
/// callers that want a single error type across the whole crate surface.
#[derive(Error, Debug)]
pub enum RmarshalError {
    #[error("object-graph decode failed")]
    Decode(#[from] DecodeError),

    #[error("key derivation failed")]
    KeyGen(#[from] KeyGenError),

    #[error("session envelope failed")]
    Envelope(#[from] EnvelopeError),
}

/// Errors produced by the format 4.8 object-graph decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported format version (expected 4.8)")]
    UnsupportedVersion,

    #[error("unexpected end of buffer at offset {0}")]
    UnexpectedEof(usize),

    #[error("unknown tag byte: {0}")]
    UnknownTag(u8),

    #[error("field exceeds size cap: {0}")]
    OversizedField(&'static str),

    #[error("recursion depth exceeded (max 1000)")]
    DepthExceeded,

    #[error("symbol back-reference {0} out of range")]
    BadReference(i64),

    #[error("invalid UTF-8 in decoded string or symbol")]
    EncodingError,
}

/// Errors produced by the PBKDF2 key generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyGenError {
    #[error("bit_length must be a positive multiple of 8, got {0}")]
    InvalidBitLength(usize),
}

/// Errors produced by the session envelope and signed-message verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    InvalidEnvelope(&'static str),

    #[error("AEAD authentication failed")]
    AuthFailure,

    #[error("decoded payload was not a mapping")]
    UnexpectedPayload,

    #[error("signed-message generation failed: {0}")]
    SigningFailed(&'static str),

    #[error("object-graph decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("key derivation failed: {0}")]
    KeyGen(#[from] KeyGenError),
}
