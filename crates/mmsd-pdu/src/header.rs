// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMS header field codes and enumerated header values (OMA-MMS-ENC).

use bytes::{BufMut, BytesMut};

use crate::error::{DecodeError, EncodeError};
use crate::wsp;

/// Field codes, without the high bit set on the wire.
pub mod field {
    pub const BCC: u8 = 0x01;
    pub const CC: u8 = 0x02;
    pub const CONTENT_LOCATION: u8 = 0x03;
    pub const CONTENT_TYPE: u8 = 0x04;
    pub const DATE: u8 = 0x05;
    pub const DELIVERY_REPORT: u8 = 0x06;
    pub const EXPIRY: u8 = 0x08;
    pub const FROM: u8 = 0x09;
    pub const MESSAGE_CLASS: u8 = 0x0A;
    pub const MESSAGE_ID: u8 = 0x0B;
    pub const MESSAGE_TYPE: u8 = 0x0C;
    pub const MMS_VERSION: u8 = 0x0D;
    pub const MESSAGE_SIZE: u8 = 0x0E;
    pub const PRIORITY: u8 = 0x0F;
    pub const READ_REPORT: u8 = 0x10;
    pub const REPORT_ALLOWED: u8 = 0x11;
    pub const RESPONSE_STATUS: u8 = 0x12;
    pub const RESPONSE_TEXT: u8 = 0x13;
    pub const STATUS: u8 = 0x15;
    pub const SUBJECT: u8 = 0x16;
    pub const TO: u8 = 0x17;
    pub const TRANSACTION_ID: u8 = 0x18;
    pub const RETRIEVE_STATUS: u8 = 0x19;
    pub const RETRIEVE_TEXT: u8 = 0x1A;
}

/// WSP header codes used inside multipart entries.
pub mod part_field {
    pub const CONTENT_LOCATION: u8 = 0x0E;
    pub const CONTENT_ID: u8 = 0x40;
}

/// Octet value of the X-Mms-Message-Type header field on the wire.
pub const MESSAGE_TYPE_OCTET: u8 = 0x80 | field::MESSAGE_TYPE;

pub(crate) const YES: u8 = 0x80;
pub(crate) const NO: u8 = 0x81;

/// X-Mms-Message-Type values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SendReq,
    SendConf,
    NotificationInd,
    NotifyRespInd,
    RetrieveConf,
    AcknowledgeInd,
    DeliveryInd,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x80 => Some(MessageType::SendReq),
            0x81 => Some(MessageType::SendConf),
            0x82 => Some(MessageType::NotificationInd),
            0x83 => Some(MessageType::NotifyRespInd),
            0x84 => Some(MessageType::RetrieveConf),
            0x85 => Some(MessageType::AcknowledgeInd),
            0x86 => Some(MessageType::DeliveryInd),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            MessageType::SendReq => 0x80,
            MessageType::SendConf => 0x81,
            MessageType::NotificationInd => 0x82,
            MessageType::NotifyRespInd => 0x83,
            MessageType::RetrieveConf => 0x84,
            MessageType::AcknowledgeInd => 0x85,
            MessageType::DeliveryInd => 0x86,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::SendReq => "m-send-req",
            MessageType::SendConf => "m-send-conf",
            MessageType::NotificationInd => "m-notification-ind",
            MessageType::NotifyRespInd => "m-notifyresp-ind",
            MessageType::RetrieveConf => "m-retrieve-conf",
            MessageType::AcknowledgeInd => "m-acknowledge-ind",
            MessageType::DeliveryInd => "m-delivery-ind",
        }
    }
}

/// X-Mms-MMS-Version, encoded as a short-integer `0bMMMmmmm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmsVersion {
    pub major: u8,
    pub minor: u8,
}

impl MmsVersion {
    pub const V1_0: MmsVersion = MmsVersion { major: 1, minor: 0 };
    pub const V1_1: MmsVersion = MmsVersion { major: 1, minor: 1 };
    pub const V1_2: MmsVersion = MmsVersion { major: 1, minor: 2 };
    pub const V1_3: MmsVersion = MmsVersion { major: 1, minor: 3 };

    pub fn from_short(value: u8) -> Self {
        Self {
            major: (value >> 4) & 0x07,
            minor: value & 0x0F,
        }
    }

    pub fn to_short(self) -> u8 {
        ((self.major & 0x07) << 4) | (self.minor & 0x0F)
    }

    /// Parses `"1.2"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.trim().split_once('.')?;
        let major: u8 = major.parse().ok()?;
        let minor: u8 = minor.parse().ok()?;
        (major <= 7 && minor <= 15).then_some(Self { major, minor })
    }
}

impl std::fmt::Display for MmsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// X-Mms-Message-Class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Personal,
    Advertisement,
    Informational,
    Auto,
    Other(String),
}

impl MessageClass {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x80 => Some(MessageClass::Personal),
            0x81 => Some(MessageClass::Advertisement),
            0x82 => Some(MessageClass::Informational),
            0x83 => Some(MessageClass::Auto),
            _ => None,
        }
    }

    pub(crate) fn as_byte(&self) -> Option<u8> {
        match self {
            MessageClass::Personal => Some(0x80),
            MessageClass::Advertisement => Some(0x81),
            MessageClass::Informational => Some(0x82),
            MessageClass::Auto => Some(0x83),
            MessageClass::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageClass::Personal => "personal",
            MessageClass::Advertisement => "advertisement",
            MessageClass::Informational => "informational",
            MessageClass::Auto => "auto",
            MessageClass::Other(s) => s,
        }
    }
}

/// X-Mms-Priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x80 => Some(Priority::Low),
            0x81 => Some(Priority::Normal),
            0x82 => Some(Priority::High),
            _ => None,
        }
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Priority::Low => 0x80,
            Priority::Normal => 0x81,
            Priority::High => 0x82,
        }
    }
}

/// X-Mms-Status, as carried by NotifyResp-Ind and Delivery-Ind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmsStatus {
    Expired,
    Retrieved,
    Rejected,
    Deferred,
    Unrecognised,
    Indeterminate,
    Forwarded,
    Unreachable,
    Other(u8),
}

impl MmsStatus {
    pub(crate) fn from_byte(b: u8) -> Self {
        match b {
            0x80 => MmsStatus::Expired,
            0x81 => MmsStatus::Retrieved,
            0x82 => MmsStatus::Rejected,
            0x83 => MmsStatus::Deferred,
            0x84 => MmsStatus::Unrecognised,
            0x85 => MmsStatus::Indeterminate,
            0x86 => MmsStatus::Forwarded,
            0x87 => MmsStatus::Unreachable,
            other => MmsStatus::Other(other),
        }
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            MmsStatus::Expired => 0x80,
            MmsStatus::Retrieved => 0x81,
            MmsStatus::Rejected => 0x82,
            MmsStatus::Deferred => 0x83,
            MmsStatus::Unrecognised => 0x84,
            MmsStatus::Indeterminate => 0x85,
            MmsStatus::Forwarded => 0x86,
            MmsStatus::Unreachable => 0x87,
            MmsStatus::Other(b) => b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MmsStatus::Expired => "expired",
            MmsStatus::Retrieved => "retrieved",
            MmsStatus::Rejected => "rejected",
            MmsStatus::Deferred => "deferred",
            MmsStatus::Unrecognised => "unrecognised",
            MmsStatus::Indeterminate => "indeterminate",
            MmsStatus::Forwarded => "forwarded",
            MmsStatus::Unreachable => "unreachable",
            MmsStatus::Other(_) => "unknown",
        }
    }
}

/// X-Mms-Response-Status or X-Mms-Retrieve-Status octet.
///
/// Values 0xC0..=0xDF are transient failures, 0xE0..=0xFF permanent ones.
/// The MMS 1.0 codes 0x81..=0x88 predate that split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseStatus(pub u8);

impl ResponseStatus {
    pub const OK: ResponseStatus = ResponseStatus(0x80);
    pub const ERROR_UNSPECIFIED: ResponseStatus = ResponseStatus(0x81);
    pub const ERROR_SERVICE_DENIED: ResponseStatus = ResponseStatus(0x82);
    pub const ERROR_MESSAGE_FORMAT_CORRUPT: ResponseStatus = ResponseStatus(0x83);
    pub const ERROR_SENDING_ADDRESS_UNRESOLVED: ResponseStatus = ResponseStatus(0x84);
    pub const ERROR_MESSAGE_NOT_FOUND: ResponseStatus = ResponseStatus(0x85);
    pub const ERROR_NETWORK_PROBLEM: ResponseStatus = ResponseStatus(0x86);
    pub const ERROR_CONTENT_NOT_ACCEPTED: ResponseStatus = ResponseStatus(0x87);
    pub const ERROR_UNSUPPORTED_MESSAGE: ResponseStatus = ResponseStatus(0x88);
    pub const ERROR_TRANSIENT_FAILURE: ResponseStatus = ResponseStatus(0xC0);
    pub const ERROR_TRANSIENT_SENDING_ADDRESS_UNRESOLVED: ResponseStatus = ResponseStatus(0xC1);
    pub const ERROR_TRANSIENT_MESSAGE_NOT_FOUND: ResponseStatus = ResponseStatus(0xC2);
    pub const ERROR_TRANSIENT_NETWORK_PROBLEM: ResponseStatus = ResponseStatus(0xC3);
    pub const ERROR_PERMANENT_FAILURE: ResponseStatus = ResponseStatus(0xE0);
    pub const ERROR_PERMANENT_SERVICE_DENIED: ResponseStatus = ResponseStatus(0xE1);
    pub const ERROR_PERMANENT_MESSAGE_FORMAT_CORRUPT: ResponseStatus = ResponseStatus(0xE2);
    pub const ERROR_PERMANENT_SENDING_ADDRESS_UNRESOLVED: ResponseStatus = ResponseStatus(0xE3);
    pub const ERROR_PERMANENT_MESSAGE_NOT_FOUND: ResponseStatus = ResponseStatus(0xE4);
    pub const ERROR_PERMANENT_CONTENT_NOT_ACCEPTED: ResponseStatus = ResponseStatus(0xE5);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// A later attempt of the same request may succeed.
    pub fn is_transient(self) -> bool {
        (0xC0..=0xDF).contains(&self.0) || self == Self::ERROR_NETWORK_PROBLEM
    }

    pub fn is_permanent(self) -> bool {
        !self.is_ok() && !self.is_transient()
    }

    pub fn name(self) -> String {
        let known = match self.0 {
            0x80 => "Ok",
            0x81 => "Error-unspecified",
            0x82 => "Error-service-denied",
            0x83 => "Error-message-format-corrupt",
            0x84 => "Error-sending-address-unresolved",
            0x85 => "Error-message-not-found",
            0x86 => "Error-network-problem",
            0x87 => "Error-content-not-accepted",
            0x88 => "Error-unsupported-message",
            0xC0 => "Error-transient-failure",
            0xC1 => "Error-transient-sending-address-unresolved",
            0xC2 => "Error-transient-message-not-found",
            0xC3 => "Error-transient-network-problem",
            0xC4 => "Error-transient-partial-success",
            0xE0 => "Error-permanent-failure",
            0xE1 => "Error-permanent-service-denied",
            0xE2 => "Error-permanent-message-format-corrupt",
            0xE3 => "Error-permanent-sending-address-unresolved",
            0xE4 => "Error-permanent-message-not-found",
            0xE5 => "Error-permanent-content-not-accepted",
            0xE6 => "Error-permanent-reply-charging-limitations-not-met",
            0xE7 => "Error-permanent-reply-charging-request-not-accepted",
            0xE8 => "Error-permanent-reply-charging-forwarding-denied",
            0xE9 => "Error-permanent-reply-charging-not-supported",
            0xEA => "Error-permanent-address-hiding-not-supported",
            0xEB => "Error-permanent-lack-of-prepaid",
            _ => return format!("status-{:#04x}", self.0),
        };
        known.to_string()
    }
}

/// X-Mms-Expiry and similar: an absolute date or a delta from now, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeValue {
    Absolute(u64),
    Relative(u64),
}

pub(crate) const ABSOLUTE_TOKEN: u8 = 0x80;
pub(crate) const RELATIVE_TOKEN: u8 = 0x81;

pub(crate) const ADDRESS_PRESENT_TOKEN: u8 = 0x80;
pub(crate) const INSERT_ADDRESS_TOKEN: u8 = 0x81;

/// A header kept verbatim because this codec does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHeader {
    /// Binary-coded field with its raw value octets.
    WellKnown { code: u8, value: Vec<u8> },
    /// Textual `Name: value` application header.
    Application { name: String, value: String },
}

impl RawHeader {
    pub(crate) fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        if wsp::peek_u8(buf)? & 0x80 != 0 {
            let code = wsp::get_short_integer(buf)?;
            let value = wsp::get_raw_value(buf)?.to_vec();
            Ok(RawHeader::WellKnown { code, value })
        } else {
            let name = wsp::get_text_string(buf)?;
            let value = wsp::get_text_string(buf)?;
            Ok(RawHeader::Application { name, value })
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            RawHeader::WellKnown { code, value } => {
                let mut check = value.as_slice();
                let self_delimiting = *code < 0x80
                    && wsp::get_raw_value(&mut check).is_ok()
                    && check.is_empty();
                if !self_delimiting {
                    return Err(EncodeError::Unrepresentable(format!(
                        "raw header {code:#04x}"
                    )));
                }
                wsp::put_short_integer(buf, *code);
                buf.put_slice(value);
            }
            RawHeader::Application { name, value } => {
                if name.is_empty() {
                    return Err(EncodeError::MissingField("application header name"));
                }
                wsp::put_text_string(buf, name)?;
                wsp::put_text_string(buf, value)?;
            }
        }
        Ok(())
    }
}
