// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IANA MIBenum charsets used by Encoded-string-value and the charset parameter.

use std::fmt;

use crate::error::EncodeError;

/// A character set identified by its IANA MIBenum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Charset(pub u32);

const NAMES: &[(u32, &str)] = &[
    (0, "*"),
    (3, "us-ascii"),
    (4, "iso-8859-1"),
    (5, "iso-8859-2"),
    (6, "iso-8859-3"),
    (7, "iso-8859-4"),
    (8, "iso-8859-5"),
    (9, "iso-8859-6"),
    (10, "iso-8859-7"),
    (11, "iso-8859-8"),
    (12, "iso-8859-9"),
    (17, "shift_jis"),
    (38, "euc-kr"),
    (106, "utf-8"),
    (1000, "iso-10646-ucs-2"),
    (1013, "utf-16be"),
    (1015, "utf-16"),
    (2025, "gb2312"),
    (2026, "big5"),
];

const ALIASES: &[(&str, u32)] = &[
    ("ascii", 3),
    ("latin1", 4),
    ("utf8", 106),
    ("ucs-2", 1000),
    ("ucs2", 1000),
];

impl Charset {
    pub const ANY: Charset = Charset(0);
    pub const US_ASCII: Charset = Charset(3);
    pub const ISO_8859_1: Charset = Charset(4);
    pub const UTF_8: Charset = Charset(106);
    pub const UCS_2: Charset = Charset(1000);
    pub const UTF_16BE: Charset = Charset(1013);
    pub const UTF_16: Charset = Charset(1015);

    /// Preferred MIME name, if the MIBenum is in the table.
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(mib, _)| *mib == self.0)
            .map(|(_, name)| *name)
    }

    /// Looks a charset up by MIME name or common alias, ignoring case.
    pub fn from_name(name: &str) -> Option<Charset> {
        let name = name.trim();
        NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(mib, _)| Charset(*mib))
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(name))
                    .map(|(_, mib)| Charset(*mib))
            })
    }

    fn is_wide(self) -> bool {
        matches!(self, Charset::UCS_2 | Charset::UTF_16BE | Charset::UTF_16)
    }

    /// Decodes text stored in this charset. Never fails: bytes that do not
    /// fit are replaced with U+FFFD, and unsupported charsets are read as UTF-8.
    ///
    /// Decoding stops at the first NUL character.
    pub fn decode(self, bytes: &[u8]) -> String {
        if self.is_wide() {
            return decode_wide(self, bytes);
        }
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let bytes = &bytes[..end];
        match self {
            Charset::ISO_8859_1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Charset::US_ASCII => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Encodes `text` in this charset, without terminator.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodeError> {
        if text.contains('\0') {
            return Err(EncodeError::Unrepresentable("text contains NUL".into()));
        }
        match self {
            Charset::UTF_8 => Ok(text.as_bytes().to_vec()),
            Charset::US_ASCII => {
                if text.is_ascii() {
                    Ok(text.as_bytes().to_vec())
                } else {
                    Err(unrepresentable(self, text))
                }
            }
            Charset::ISO_8859_1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| unrepresentable(self, text)))
                .collect(),
            Charset::UCS_2 => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let unit =
                        u16::try_from(u32::from(c)).map_err(|_| unrepresentable(self, text))?;
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                Ok(out)
            }
            Charset::UTF_16BE | Charset::UTF_16 => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect()),
            _ => Err(unrepresentable(self, text)),
        }
    }
}

fn unrepresentable(charset: Charset, text: &str) -> EncodeError {
    EncodeError::Unrepresentable(format!("{text:?} in charset {charset}"))
}

fn decode_wide(charset: Charset, bytes: &[u8]) -> String {
    let mut little_endian = false;
    let mut bytes = bytes;
    if charset == Charset::UTF_16 && bytes.len() >= 2 {
        match (bytes[0], bytes[1]) {
            (0xFE, 0xFF) => bytes = &bytes[2..],
            (0xFF, 0xFE) => {
                little_endian = true;
                bytes = &bytes[2..];
            }
            _ => {}
        }
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "mib-{}", self.0),
        }
    }
}
