// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WSP multipart body (WAP-230 section 8.5).

use bytes::{BufMut, BytesMut};

use crate::content_type::ContentType;
use crate::error::{DecodeError, EncodeError};
use crate::header::{RawHeader, part_field};
use crate::wsp;

/// Smallest possible entry: headers length, data length, one content-type octet.
const MIN_ENTRY_SIZE: usize = 3;

/// One entry of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub content_type: ContentType,
    pub content_id: Option<String>,
    pub content_location: Option<String>,
    pub headers: Vec<RawHeader>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn new(content_type: ContentType, data: Vec<u8>) -> Self {
        Self {
            content_type,
            content_id: None,
            content_location: None,
            headers: Vec::new(),
            data,
        }
    }
}

fn len_u32(context: &'static str, len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::TooLong {
        context,
        length: len,
    })
}

pub fn decode_multipart(mut buf: &[u8]) -> Result<Vec<Part>, DecodeError> {
    let count = wsp::get_uintvar(&mut buf)? as usize;
    if count.saturating_mul(MIN_ENTRY_SIZE) > buf.len() {
        return Err(DecodeError::InvalidLength {
            context: "multipart entry count",
            length: count as u64,
        });
    }

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let headers_len = wsp::get_uintvar(&mut buf)? as usize;
        let data_len = wsp::get_uintvar(&mut buf)? as usize;
        let mut headers = wsp::take(&mut buf, headers_len)?;
        let data = wsp::take(&mut buf, data_len)?;

        let mut part = Part::new(ContentType::decode(&mut headers)?, data.to_vec());
        while !headers.is_empty() {
            match wsp::peek_u8(headers)? & 0x7F {
                part_field::CONTENT_ID if headers[0] & 0x80 != 0 => {
                    wsp::get_u8(&mut headers)?;
                    part.content_id = Some(wsp::get_text_value(&mut headers)?);
                }
                part_field::CONTENT_LOCATION if headers[0] & 0x80 != 0 => {
                    wsp::get_u8(&mut headers)?;
                    part.content_location = Some(wsp::get_text_string(&mut headers)?);
                }
                _ => part.headers.push(RawHeader::decode(&mut headers)?),
            }
        }
        parts.push(part);
    }
    Ok(parts)
}

pub fn encode_multipart(parts: &[Part], buf: &mut BytesMut) -> Result<(), EncodeError> {
    wsp::put_uintvar(buf, len_u32("multipart entry count", parts.len())?);
    for part in parts {
        let mut headers = BytesMut::new();
        part.content_type.encode(&mut headers)?;
        if let Some(id) = &part.content_id {
            wsp::put_short_integer(&mut headers, part_field::CONTENT_ID);
            wsp::put_quoted_string(&mut headers, id)?;
        }
        if let Some(location) = &part.content_location {
            wsp::put_short_integer(&mut headers, part_field::CONTENT_LOCATION);
            wsp::put_text_string(&mut headers, location)?;
        }
        for header in &part.headers {
            header.encode(&mut headers)?;
        }

        wsp::put_uintvar(buf, len_u32("part headers", headers.len())?);
        wsp::put_uintvar(buf, len_u32("part data", part.data.len())?);
        buf.put_slice(&headers);
        buf.put_slice(&part.data);
    }
    Ok(())
}
