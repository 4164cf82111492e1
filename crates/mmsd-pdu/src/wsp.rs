// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WSP primitive encodings (WAP-230 section 8.4.2).
//!
//! Readers take a `&mut &[u8]` cursor and advance it past what they consume.
//! Every read checks the remaining length first, so malformed input turns
//! into a [`DecodeError`] instead of a panic or an oversized allocation.

use bytes::{Buf, BufMut, BytesMut};

use crate::charset::Charset;
use crate::error::{DecodeError, EncodeError, malformed};

/// Longest uintvar we accept: 5 octets carry 35 bits, enough for u32.
pub const MAX_UINTVAR_OCTETS: usize = 5;
/// Octet introducing a uintvar length in Value-length.
pub const LENGTH_QUOTE: u8 = 31;
/// Quote octet before a Text-string whose first character is >= 0x80.
pub const TEXT_QUOTE: u8 = 0x7F;
/// Octet introducing a Quoted-string.
pub const QUOTED_STRING: u8 = 0x22;

/// A string with an optional explicit charset (Encoded-string-value).
///
/// `charset: None` is the plain Text-string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedString {
    pub charset: Option<Charset>,
    pub text: String,
}

impl EncodedString {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            charset: None,
            text: text.into(),
        }
    }

    pub fn utf8(text: impl Into<String>) -> Self {
        Self {
            charset: Some(Charset::UTF_8),
            text: text.into(),
        }
    }
}

pub(crate) fn truncated(needed: usize, remaining: usize) -> DecodeError {
    DecodeError::Truncated { needed, remaining }
}

pub fn peek_u8(buf: &[u8]) -> Result<u8, DecodeError> {
    buf.first().copied().ok_or_else(|| truncated(1, 0))
}

pub fn get_u8(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    if buf.is_empty() {
        return Err(truncated(1, 0));
    }
    Ok(buf.get_u8())
}

/// Splits `n` octets off the front of the cursor.
pub fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    let rest: &'a [u8] = *buf;
    if rest.len() < n {
        return Err(truncated(n, rest.len()));
    }
    let (head, tail) = rest.split_at(n);
    *buf = tail;
    Ok(head)
}

// --- integers ---

pub fn get_uintvar(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    let mut value: u64 = 0;
    for _ in 0..MAX_UINTVAR_OCTETS {
        let octet = get_u8(buf)?;
        value = (value << 7) | u64::from(octet & 0x7F);
        if octet & 0x80 == 0 {
            return u32::try_from(value).map_err(|_| DecodeError::InvalidLength {
                context: "uintvar",
                length: value,
            });
        }
    }
    Err(DecodeError::InvalidLength {
        context: "uintvar",
        length: value,
    })
}

pub fn put_uintvar(buf: &mut BytesMut, value: u32) {
    let mut octets = [0u8; MAX_UINTVAR_OCTETS];
    let mut n = 0;
    let mut v = value;
    loop {
        octets[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        buf.put_u8(octets[i] | continuation);
    }
}

pub fn get_short_integer(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    let octet = get_u8(buf)?;
    if octet & 0x80 == 0 {
        return Err(malformed(format!(
            "expected short-integer, found {octet:#04x}"
        )));
    }
    Ok(octet & 0x7F)
}

pub fn put_short_integer(buf: &mut BytesMut, value: u8) {
    buf.put_u8(0x80 | (value & 0x7F));
}

pub fn get_long_integer(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let len = get_u8(buf)?;
    if len == 0 || len > 8 {
        return Err(DecodeError::InvalidLength {
            context: "long-integer",
            length: u64::from(len),
        });
    }
    let octets = take(buf, usize::from(len))?;
    Ok(octets
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

pub fn put_long_integer(buf: &mut BytesMut, value: u64) {
    let octets = value.to_be_bytes();
    let skip = octets.iter().take_while(|&&b| b == 0).count().min(7);
    buf.put_u8((octets.len() - skip) as u8);
    buf.put_slice(&octets[skip..]);
}

/// Integer-value: Short-integer or Long-integer.
pub fn get_integer_value(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    if peek_u8(buf)? & 0x80 != 0 {
        Ok(u64::from(get_short_integer(buf)?))
    } else {
        get_long_integer(buf)
    }
}

pub fn put_integer_value(buf: &mut BytesMut, value: u64) {
    if value < 0x80 {
        put_short_integer(buf, value as u8);
    } else {
        put_long_integer(buf, value);
    }
}

// --- lengths ---

/// Value-length: Short-length (0..=30) or Length-quote followed by a uintvar.
///
/// The returned length is guaranteed to fit in what remains of `buf`.
pub fn get_value_length(buf: &mut &[u8]) -> Result<usize, DecodeError> {
    let octet = get_u8(buf)?;
    let len = match octet {
        0..=30 => usize::from(octet),
        LENGTH_QUOTE => get_uintvar(buf)? as usize,
        _ => {
            return Err(malformed(format!(
                "expected value-length, found {octet:#04x}"
            )));
        }
    };
    if len > buf.len() {
        return Err(truncated(len, buf.len()));
    }
    Ok(len)
}

/// Reads a Value-length and returns the slice it frames.
pub fn get_length_framed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = get_value_length(buf)?;
    take(buf, len)
}

pub fn put_value_length(buf: &mut BytesMut, len: usize) -> Result<(), EncodeError> {
    if len <= 30 {
        buf.put_u8(len as u8);
    } else {
        let len32 = u32::try_from(len).map_err(|_| EncodeError::TooLong {
            context: "value-length",
            length: len,
        })?;
        buf.put_u8(LENGTH_QUOTE);
        put_uintvar(buf, len32);
    }
    Ok(())
}

/// Writes `inner` prefixed with its Value-length.
pub fn put_length_framed(buf: &mut BytesMut, inner: &[u8]) -> Result<(), EncodeError> {
    put_value_length(buf, inner.len())?;
    buf.put_slice(inner);
    Ok(())
}

// --- strings ---

fn get_nul_terminated<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| truncated(buf.len() + 1, buf.len()))?;
    let text = take(buf, end)?;
    buf.advance(1);
    Ok(text)
}

/// Raw octets of a Text-string, without the quote and terminator.
pub fn get_text_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    if peek_u8(buf)? == TEXT_QUOTE {
        buf.advance(1);
    }
    get_nul_terminated(buf)
}

pub fn get_text_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    Ok(String::from_utf8_lossy(get_text_bytes(buf)?).into_owned())
}

pub fn put_text_bytes(buf: &mut BytesMut, bytes: &[u8]) -> Result<(), EncodeError> {
    if bytes.contains(&0) {
        return Err(EncodeError::Unrepresentable("text contains NUL".into()));
    }
    // A leading control octet would read back as a length.
    if bytes.first().is_some_and(|&b| b <= LENGTH_QUOTE) {
        return Err(EncodeError::Unrepresentable(
            "text starts with a control character".into(),
        ));
    }
    if bytes.first().is_some_and(|&b| b >= TEXT_QUOTE) {
        buf.put_u8(TEXT_QUOTE);
    }
    buf.put_slice(bytes);
    buf.put_u8(0);
    Ok(())
}

pub fn put_text_string(buf: &mut BytesMut, text: &str) -> Result<(), EncodeError> {
    put_text_bytes(buf, text.as_bytes())
}

pub fn get_quoted_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let octet = get_u8(buf)?;
    if octet != QUOTED_STRING {
        return Err(malformed(format!(
            "expected quoted-string, found {octet:#04x}"
        )));
    }
    Ok(String::from_utf8_lossy(get_nul_terminated(buf)?).into_owned())
}

pub fn put_quoted_string(buf: &mut BytesMut, text: &str) -> Result<(), EncodeError> {
    if text.contains('\0') {
        return Err(EncodeError::Unrepresentable("text contains NUL".into()));
    }
    buf.put_u8(QUOTED_STRING);
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Text-value: No-value, Token-text, or Quoted-string.
pub fn get_text_value(buf: &mut &[u8]) -> Result<String, DecodeError> {
    match peek_u8(buf)? {
        0 => {
            buf.advance(1);
            Ok(String::new())
        }
        QUOTED_STRING => get_quoted_string(buf),
        _ => get_text_string(buf),
    }
}

pub fn put_text_value(buf: &mut BytesMut, text: &str) -> Result<(), EncodeError> {
    if text.is_empty() {
        buf.put_u8(0);
        Ok(())
    } else if text.starts_with('"') {
        put_quoted_string(buf, text)
    } else {
        put_text_string(buf, text)
    }
}

pub fn get_encoded_string(buf: &mut &[u8]) -> Result<EncodedString, DecodeError> {
    let first = peek_u8(buf)?;
    if first == 0 || first > LENGTH_QUOTE {
        return Ok(EncodedString::new(get_text_string(buf)?));
    }
    let mut value = get_length_framed(buf)?;
    let mib = get_integer_value(&mut value)?;
    let mib = u32::try_from(mib).map_err(|_| malformed(format!("charset {mib} out of range")))?;
    let charset = Charset(mib);
    let mut text = value;
    if text.first() == Some(&TEXT_QUOTE) {
        text = &text[1..];
    }
    Ok(EncodedString {
        charset: Some(charset),
        text: charset.decode(text),
    })
}

pub fn put_encoded_string(buf: &mut BytesMut, value: &EncodedString) -> Result<(), EncodeError> {
    let Some(charset) = value.charset else {
        return put_text_string(buf, &value.text);
    };
    let text = charset.encode(&value.text)?;
    let mut inner = BytesMut::with_capacity(text.len() + 4);
    put_integer_value(&mut inner, u64::from(charset.0));
    if text.first().is_some_and(|&b| b >= TEXT_QUOTE) {
        inner.put_u8(TEXT_QUOTE);
    }
    inner.put_slice(&text);
    inner.put_u8(0);
    put_length_framed(buf, &inner)
}

/// Skips over one generically encoded header value and returns its octets.
///
/// WSP values are self-delimiting by their first octet: a length prefix,
/// a NUL-terminated string, or a single short-integer octet.
pub fn get_raw_value<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let start: &'a [u8] = *buf;
    match peek_u8(buf)? {
        0..=LENGTH_QUOTE => {
            get_length_framed(buf)?;
        }
        32..=127 => {
            get_text_bytes(buf)?;
        }
        _ => buf.advance(1),
    }
    let consumed = start.len() - buf.len();
    Ok(&start[..consumed])
}
