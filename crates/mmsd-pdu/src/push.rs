// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectionless WSP push envelope carrying an MMS PDU.

use bytes::{BufMut, BytesMut};

use crate::content_type::{ContentType, MMS_MESSAGE};
use crate::error::{DecodeError, EncodeError, malformed};
use crate::header::MESSAGE_TYPE_OCTET;
use crate::pdu::Pdu;
use crate::wsp;

pub const PDU_TYPE_PUSH: u8 = 0x06;
pub const PDU_TYPE_CONFIRMED_PUSH: u8 = 0x07;

/// Decodes a push message as handed over by the modem.
///
/// Input that starts with the X-Mms-Message-Type octet is treated as a bare
/// PDU without an envelope.
pub fn decode_push(input: &[u8]) -> Result<Pdu, DecodeError> {
    if input.first() == Some(&MESSAGE_TYPE_OCTET) {
        return Pdu::decode(input);
    }
    let mut buf = input;
    let _tid = wsp::get_u8(&mut buf)?;
    let pdu_type = wsp::get_u8(&mut buf)?;
    if pdu_type != PDU_TYPE_PUSH && pdu_type != PDU_TYPE_CONFIRMED_PUSH {
        return Err(malformed(format!("wsp pdu type {pdu_type:#04x} is not a push")));
    }
    let headers_len = wsp::get_uintvar(&mut buf)? as usize;
    let mut headers = wsp::take(&mut buf, headers_len)?;
    let content_type = ContentType::decode(&mut headers)?;
    if !content_type.media_type.eq_ignore_ascii_case(MMS_MESSAGE) {
        return Err(malformed(format!(
            "push content type {} is not an MMS PDU",
            content_type.media_type
        )));
    }
    // Remaining push headers (X-Wap-Application-Id and friends) are not needed.
    Pdu::decode(buf)
}

/// Wraps an encoded PDU in an unconfirmed push envelope.
pub fn encode_push(tid: u8, pdu: &Pdu) -> Result<Vec<u8>, EncodeError> {
    let body = pdu.encode()?;
    let mut headers = BytesMut::new();
    ContentType::new(MMS_MESSAGE).encode(&mut headers)?;

    let mut buf = BytesMut::with_capacity(body.len() + headers.len() + 8);
    buf.put_u8(tid);
    buf.put_u8(PDU_TYPE_PUSH);
    let headers_len = u32::try_from(headers.len()).map_err(|_| EncodeError::TooLong {
        context: "push headers",
        length: headers.len(),
    })?;
    wsp::put_uintvar(&mut buf, headers_len);
    buf.put_slice(&headers);
    buf.put_slice(&body);
    Ok(buf.to_vec())
}
