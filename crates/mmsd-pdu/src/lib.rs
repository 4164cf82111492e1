// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMS encapsulation codec.
//!
//! Converts between raw bytes and typed [`Pdu`] values for the seven message
//! types the daemon exchanges with an MMSC, including the WSP primitives,
//! multipart bodies and the WAP push envelope they ride in. Decoding is
//! total: any input yields either a PDU or a [`DecodeError`], never a panic.

pub mod body;
pub mod charset;
pub mod content_type;
pub mod error;
pub mod header;
pub mod pdu;
pub mod push;
pub mod wsp;

pub use body::Part;
pub use charset::Charset;
pub use content_type::{ContentType, Param};
pub use error::{DecodeError, EncodeError};
pub use header::{
    MessageClass, MessageType, MmsStatus, MmsVersion, Priority, RawHeader, ResponseStatus,
    TimeValue,
};
pub use pdu::{
    AcknowledgeInd, DeliveryInd, FromAddress, MAX_PDU_SIZE, NotificationInd, NotifyRespInd, Pdu,
    RetrieveConf, SendConf, SendReq,
};
pub use push::{decode_push, encode_push};
pub use wsp::EncodedString;

/// Decodes a bare MMS PDU.
pub fn decode(input: &[u8]) -> Result<Pdu, DecodeError> {
    Pdu::decode(input)
}

/// Encodes a PDU into its wire form.
pub fn encode(pdu: &Pdu) -> Result<Vec<u8>, EncodeError> {
    pdu.encode()
}
