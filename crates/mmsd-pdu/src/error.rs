// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Codec errors.

use thiserror::Error;

/// Failure to decode a byte sequence into a PDU.
///
/// Decoding never yields a partially populated PDU: any of these aborts
/// the whole decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended before a complete value could be read.
    #[error("truncated input: needed {needed} octet(s), {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A length field is out of range for its encoding.
    #[error("invalid length for {context}: {length}")]
    InvalidLength { context: &'static str, length: u64 },

    /// A header required by the message type is absent, or the message type
    /// itself is not one we know.
    #[error("missing or unknown required header: {0}")]
    UnknownRequiredHeader(String),

    /// Octets that do not follow the WSP/MMS encoding rules.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),
}

/// Failure to encode a PDU into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A field the wire format requires is empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A value cannot be represented in the target encoding.
    #[error("unrepresentable value: {0}")]
    Unrepresentable(String),

    /// A value is longer than the encoding allows.
    #[error("{context} too long: {length}")]
    TooLong { context: &'static str, length: usize },
}

pub(crate) fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::MalformedEncoding(msg.into())
}
