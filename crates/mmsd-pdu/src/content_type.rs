// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-type-value with typed parameters (WAP-230 8.4.2.24).

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::charset::Charset;
use crate::error::{DecodeError, EncodeError, malformed};
use crate::wsp;

/// Well-known media types, indexed by their assigned number.
const WELL_KNOWN_MEDIA: &[&str] = &[
    "*/*",
    "text/*",
    "text/html",
    "text/plain",
    "text/x-hdml",
    "text/x-ttml",
    "text/x-vCalendar",
    "text/x-vCard",
    "text/vnd.wap.wml",
    "text/vnd.wap.wmlscript",
    "text/vnd.wap.wta-event",
    "multipart/*",
    "multipart/mixed",
    "multipart/form-data",
    "multipart/byterantes",
    "multipart/alternative",
    "application/*",
    "application/java-vm",
    "application/x-www-form-urlencoded",
    "application/x-hdmlc",
    "application/vnd.wap.wmlc",
    "application/vnd.wap.wmlscriptc",
    "application/vnd.wap.wta-eventc",
    "application/vnd.wap.uaprof",
    "application/vnd.wap.wtls-ca-certificate",
    "application/vnd.wap.wtls-user-certificate",
    "application/x-x509-ca-cert",
    "application/x-x509-user-cert",
    "image/*",
    "image/gif",
    "image/jpeg",
    "image/tiff",
    "image/png",
    "image/vnd.wap.wbmp",
    "application/vnd.wap.multipart.*",
    "application/vnd.wap.multipart.mixed",
    "application/vnd.wap.multipart.form-data",
    "application/vnd.wap.multipart.byteranges",
    "application/vnd.wap.multipart.alternative",
    "application/xml",
    "text/xml",
    "application/vnd.wap.wbxml",
    "application/x-x968-cross-cert",
    "application/x-x968-ca-cert",
    "application/x-x968-user-cert",
    "text/vnd.wap.si",
    "application/vnd.wap.sic",
    "text/vnd.wap.sl",
    "application/vnd.wap.slc",
    "text/vnd.wap.co",
    "application/vnd.wap.coc",
    "application/vnd.wap.multipart.related",
    "application/vnd.wap.sia",
    "text/vnd.wap.connectivity-xml",
    "application/vnd.wap.connectivity-wbxml",
    "application/pkcs7-mime",
    "application/vnd.wap.hashed-certificate",
    "application/vnd.wap.signed-certificate",
    "application/vnd.wap.cert-response",
    "application/xhtml+xml",
    "application/wml+xml",
    "text/css",
    "application/vnd.wap.mms-message",
    "application/vnd.wap.rollover-certificate",
];

pub const MMS_MESSAGE: &str = "application/vnd.wap.mms-message";
pub const MULTIPART_MIXED: &str = "application/vnd.wap.multipart.mixed";
pub const MULTIPART_RELATED: &str = "application/vnd.wap.multipart.related";
pub const SMIL: &str = "application/smil";

mod param {
    pub const CHARSET: u8 = 0x01;
    pub const NAME_V1: u8 = 0x05;
    pub const FILENAME_V1: u8 = 0x06;
    pub const TYPE: u8 = 0x09;
    pub const START_V1: u8 = 0x0A;
    pub const NAME: u8 = 0x17;
    pub const FILENAME: u8 = 0x18;
    pub const START: u8 = 0x19;
}

fn well_known_code(media: &str) -> Option<u8> {
    WELL_KNOWN_MEDIA
        .iter()
        .position(|m| *m == media)
        .map(|i| i as u8)
}

fn well_known_media(code: u64) -> Result<String, DecodeError> {
    usize::try_from(code)
        .ok()
        .and_then(|i| WELL_KNOWN_MEDIA.get(i))
        .map(|m| m.to_string())
        .ok_or_else(|| malformed(format!("unknown well-known media type {code:#04x}")))
}

/// Value of an untyped (token-named) parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntypedValue {
    Integer(u64),
    Text(String),
}

/// One content-type parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Charset(Charset),
    /// Root media type of a multipart/related body.
    Type(String),
    /// Content-ID of the root part of a multipart/related body.
    Start(String),
    Name(String),
    Filename(String),
    /// A well-known parameter we do not interpret, kept as raw octets.
    Raw { code: u8, value: Vec<u8> },
    Untyped { name: String, value: UntypedValue },
}

/// A media type with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: String,
    pub params: Vec<Param>,
}

impl ContentType {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn is_multipart(&self) -> bool {
        let media = self.media_type.to_ascii_lowercase();
        media.starts_with("multipart/") || media.starts_with("application/vnd.wap.multipart.")
    }

    pub fn charset(&self) -> Option<Charset> {
        self.params.iter().find_map(|p| match p {
            Param::Charset(c) => Some(*c),
            _ => None,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Name(n) | Param::Filename(n) => Some(n.as_str()),
            _ => None,
        })
    }

    /// Parses a textual `type/subtype; key=value` form.
    ///
    /// `charset`, `type`, `start`, `name` and `filename` become typed
    /// parameters; anything else is kept as an untyped text parameter.
    pub fn parse(s: &str) -> Self {
        let mut pieces = s.split(';');
        let media_type = pieces.next().unwrap_or_default().trim().to_string();
        let mut ct = ContentType::new(media_type);
        for piece in pieces {
            let Some((key, value)) = piece.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').to_string();
            let param = match key.to_ascii_lowercase().as_str() {
                "charset" => match Charset::from_name(&value) {
                    Some(cs) => Param::Charset(cs),
                    None => Param::Untyped {
                        name: key.to_string(),
                        value: UntypedValue::Text(value),
                    },
                },
                "type" => Param::Type(value),
                "start" => Param::Start(value),
                "name" => Param::Name(value),
                "filename" => Param::Filename(value),
                _ => Param::Untyped {
                    name: key.to_string(),
                    value: UntypedValue::Text(value),
                },
            };
            ct.params.push(param);
        }
        ct
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let first = wsp::peek_u8(buf)?;
        if first & 0x80 != 0 {
            let code = wsp::get_short_integer(buf)?;
            return Ok(ContentType::new(well_known_media(u64::from(code))?));
        }
        if first > wsp::LENGTH_QUOTE {
            return Ok(ContentType::new(wsp::get_text_string(buf)?));
        }

        let mut value = wsp::get_length_framed(buf)?;
        let media_first = wsp::peek_u8(value)?;
        let media_type = if media_first & 0x80 != 0 || media_first <= 30 {
            well_known_media(wsp::get_integer_value(&mut value)?)?
        } else {
            wsp::get_text_string(&mut value)?
        };
        let mut params = Vec::new();
        while !value.is_empty() {
            params.push(decode_param(&mut value)?);
        }
        Ok(ContentType { media_type, params })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        if self.media_type.is_empty() {
            return Err(EncodeError::MissingField("content-type"));
        }
        let code = well_known_code(&self.media_type);
        if self.params.is_empty() {
            return match code {
                Some(code) => {
                    wsp::put_short_integer(buf, code);
                    Ok(())
                }
                None => wsp::put_text_string(buf, &self.media_type),
            };
        }

        let mut inner = BytesMut::new();
        match code {
            Some(code) => wsp::put_short_integer(&mut inner, code),
            None => wsp::put_text_string(&mut inner, &self.media_type)?,
        }
        for param in &self.params {
            encode_param(&mut inner, param)?;
        }
        wsp::put_length_framed(buf, &inner)
    }
}

fn decode_param(buf: &mut &[u8]) -> Result<Param, DecodeError> {
    if wsp::peek_u8(buf)? & 0x80 == 0 {
        let name = wsp::get_text_string(buf)?;
        let first = wsp::peek_u8(buf)?;
        let value = if first & 0x80 != 0 || (1..=30).contains(&first) {
            UntypedValue::Integer(wsp::get_integer_value(buf)?)
        } else {
            UntypedValue::Text(wsp::get_text_value(buf)?)
        };
        return Ok(Param::Untyped { name, value });
    }

    let code = wsp::get_short_integer(buf)?;
    let param = match code {
        param::CHARSET => {
            let first = wsp::peek_u8(buf)?;
            if first & 0x80 == 0 && first > wsp::LENGTH_QUOTE {
                // Some encoders write the charset as a name.
                let name = wsp::get_text_string(buf)?;
                let charset = Charset::from_name(&name)
                    .ok_or_else(|| malformed(format!("unknown charset {name:?}")))?;
                Param::Charset(charset)
            } else {
                let mib = wsp::get_integer_value(buf)?;
                let mib = u32::try_from(mib)
                    .map_err(|_| malformed(format!("charset {mib} out of range")))?;
                Param::Charset(Charset(mib))
            }
        }
        param::TYPE => {
            if wsp::peek_u8(buf)? & 0x80 != 0 {
                let code = wsp::get_short_integer(buf)?;
                Param::Type(well_known_media(u64::from(code))?)
            } else {
                Param::Type(wsp::get_text_string(buf)?)
            }
        }
        param::START | param::START_V1 => Param::Start(wsp::get_text_value(buf)?),
        param::NAME | param::NAME_V1 => Param::Name(wsp::get_text_value(buf)?),
        param::FILENAME | param::FILENAME_V1 => Param::Filename(wsp::get_text_value(buf)?),
        _ => Param::Raw {
            code,
            value: wsp::get_raw_value(buf)?.to_vec(),
        },
    };
    Ok(param)
}

fn encode_param(buf: &mut BytesMut, param: &Param) -> Result<(), EncodeError> {
    match param {
        Param::Charset(charset) => {
            wsp::put_short_integer(buf, param::CHARSET);
            wsp::put_integer_value(buf, u64::from(charset.0));
        }
        Param::Type(media) => {
            wsp::put_short_integer(buf, param::TYPE);
            match well_known_code(media) {
                Some(code) => wsp::put_short_integer(buf, code),
                None => wsp::put_text_string(buf, media)?,
            }
        }
        Param::Start(v) => {
            wsp::put_short_integer(buf, param::START_V1);
            wsp::put_text_value(buf, v)?;
        }
        Param::Name(v) => {
            wsp::put_short_integer(buf, param::NAME_V1);
            wsp::put_text_value(buf, v)?;
        }
        Param::Filename(v) => {
            wsp::put_short_integer(buf, param::FILENAME_V1);
            wsp::put_text_value(buf, v)?;
        }
        Param::Raw { code, value } => {
            if *code >= 0x80 || value.is_empty() {
                return Err(EncodeError::Unrepresentable(format!(
                    "raw parameter {code:#04x}"
                )));
            }
            wsp::put_short_integer(buf, *code);
            buf.put_slice(value);
        }
        Param::Untyped { name, value } => {
            wsp::put_text_string(buf, name)?;
            match value {
                UntypedValue::Integer(n) => wsp::put_integer_value(buf, *n),
                UntypedValue::Text(t) => wsp::put_text_value(buf, t)?,
            }
        }
    }
    Ok(())
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        for param in &self.params {
            match param {
                Param::Charset(c) => write!(f, "; charset={c}")?,
                Param::Type(t) => write!(f, "; type=\"{t}\"")?,
                Param::Start(s) => write!(f, "; start=\"{s}\"")?,
                Param::Name(n) => write!(f, "; name=\"{n}\"")?,
                Param::Filename(n) => write!(f, "; filename=\"{n}\"")?,
                Param::Raw { .. } => {}
                Param::Untyped { name, value } => match value {
                    UntypedValue::Integer(n) => write!(f, "; {name}={n}")?,
                    UntypedValue::Text(t) => write!(f, "; {name}=\"{t}\"")?,
                },
            }
        }
        Ok(())
    }
}
