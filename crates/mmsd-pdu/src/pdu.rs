// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMS PDUs and their header-level encoding.
//!
//! Every PDU starts with X-Mms-Message-Type, X-Mms-Transaction-Id (where the
//! type has one) and X-Mms-MMS-Version. Content-Type, when present, is the
//! last header and is followed by the body. Body-less PDUs are written with
//! a required header last, so a truncated encoding is always missing
//! something the decoder insists on.

use bytes::{BufMut, BytesMut};

use crate::body::{self, Part};
use crate::content_type::ContentType;
use crate::error::{DecodeError, EncodeError, malformed};
use crate::header::{
    ABSOLUTE_TOKEN, ADDRESS_PRESENT_TOKEN, INSERT_ADDRESS_TOKEN, MESSAGE_TYPE_OCTET, MessageClass,
    MessageType, MmsStatus, MmsVersion, NO, Priority, RELATIVE_TOKEN, RawHeader, ResponseStatus,
    TimeValue, YES, field,
};
use crate::wsp::{self, EncodedString};

/// Upper bound on a PDU we are willing to decode or produce.
pub const MAX_PDU_SIZE: usize = 16 * 1024 * 1024;

/// Value of the From header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromAddress {
    Present(EncodedString),
    /// Ask the MMSC to fill in the sender's address.
    Insert,
}

impl FromAddress {
    pub fn address(&self) -> Option<&str> {
        match self {
            FromAddress::Present(s) => Some(&s.text),
            FromAddress::Insert => None,
        }
    }
}

/// M-Notification.ind: an MMSC announcing a message waiting for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationInd {
    pub transaction_id: String,
    pub version: MmsVersion,
    pub from: Option<FromAddress>,
    pub subject: Option<EncodedString>,
    pub delivery_report: Option<bool>,
    pub message_class: MessageClass,
    pub message_size: u64,
    pub expiry: TimeValue,
    pub content_location: String,
    pub extra_headers: Vec<RawHeader>,
}

/// M-NotifyResp.ind: the client's answer to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRespInd {
    pub transaction_id: String,
    pub version: MmsVersion,
    pub status: MmsStatus,
    pub report_allowed: Option<bool>,
    pub extra_headers: Vec<RawHeader>,
}

/// M-Retrieve.conf: the message content fetched from the content location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveConf {
    pub transaction_id: Option<String>,
    pub version: MmsVersion,
    pub message_id: Option<String>,
    pub date: u64,
    pub from: Option<FromAddress>,
    pub to: Vec<EncodedString>,
    pub cc: Vec<EncodedString>,
    pub subject: Option<EncodedString>,
    pub message_class: Option<MessageClass>,
    pub priority: Option<Priority>,
    pub delivery_report: Option<bool>,
    pub read_report: Option<bool>,
    pub retrieve_status: Option<ResponseStatus>,
    pub retrieve_text: Option<EncodedString>,
    pub extra_headers: Vec<RawHeader>,
    pub content_type: ContentType,
    pub parts: Vec<Part>,
}

/// M-Send.req: a message submitted to the MMSC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReq {
    pub transaction_id: String,
    pub version: MmsVersion,
    pub date: Option<u64>,
    pub from: FromAddress,
    pub to: Vec<EncodedString>,
    pub cc: Vec<EncodedString>,
    pub bcc: Vec<EncodedString>,
    pub subject: Option<EncodedString>,
    pub message_class: Option<MessageClass>,
    pub expiry: Option<TimeValue>,
    pub priority: Option<Priority>,
    pub delivery_report: Option<bool>,
    pub read_report: Option<bool>,
    pub extra_headers: Vec<RawHeader>,
    pub content_type: ContentType,
    pub parts: Vec<Part>,
}

/// M-Send.conf: the MMSC's verdict on a Send-Req.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendConf {
    pub transaction_id: String,
    pub version: MmsVersion,
    pub response_status: ResponseStatus,
    pub response_text: Option<EncodedString>,
    pub message_id: Option<String>,
    pub extra_headers: Vec<RawHeader>,
}

/// M-Acknowledge.ind: acknowledges a deferred retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgeInd {
    pub transaction_id: String,
    pub version: MmsVersion,
    pub report_allowed: Option<bool>,
    pub extra_headers: Vec<RawHeader>,
}

/// M-Delivery.ind: delivery report for a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryInd {
    pub version: MmsVersion,
    pub message_id: String,
    pub to: Vec<EncodedString>,
    pub date: u64,
    pub status: MmsStatus,
    pub extra_headers: Vec<RawHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    SendReq(SendReq),
    SendConf(SendConf),
    NotificationInd(NotificationInd),
    NotifyRespInd(NotifyRespInd),
    RetrieveConf(RetrieveConf),
    AcknowledgeInd(AcknowledgeInd),
    DeliveryInd(DeliveryInd),
}

impl Pdu {
    pub fn message_type(&self) -> MessageType {
        match self {
            Pdu::SendReq(_) => MessageType::SendReq,
            Pdu::SendConf(_) => MessageType::SendConf,
            Pdu::NotificationInd(_) => MessageType::NotificationInd,
            Pdu::NotifyRespInd(_) => MessageType::NotifyRespInd,
            Pdu::RetrieveConf(_) => MessageType::RetrieveConf,
            Pdu::AcknowledgeInd(_) => MessageType::AcknowledgeInd,
            Pdu::DeliveryInd(_) => MessageType::DeliveryInd,
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Pdu::SendReq(p) => Some(&p.transaction_id),
            Pdu::SendConf(p) => Some(&p.transaction_id),
            Pdu::NotificationInd(p) => Some(&p.transaction_id),
            Pdu::NotifyRespInd(p) => Some(&p.transaction_id),
            Pdu::RetrieveConf(p) => p.transaction_id.as_deref(),
            Pdu::AcknowledgeInd(p) => Some(&p.transaction_id),
            Pdu::DeliveryInd(_) => None,
        }
    }

    pub fn decode(input: &[u8]) -> Result<Pdu, DecodeError> {
        if input.len() > MAX_PDU_SIZE {
            return Err(DecodeError::InvalidLength {
                context: "pdu",
                length: input.len() as u64,
            });
        }
        let mut buf = input;
        if wsp::get_u8(&mut buf)? != MESSAGE_TYPE_OCTET {
            return Err(DecodeError::UnknownRequiredHeader(
                "X-Mms-Message-Type must be the first header".into(),
            ));
        }
        let type_octet = wsp::get_u8(&mut buf)?;
        let message_type = MessageType::from_byte(type_octet).ok_or_else(|| {
            DecodeError::UnknownRequiredHeader(format!("X-Mms-Message-Type {type_octet:#04x}"))
        })?;

        let fields = Fields::read(message_type, &mut buf)?;
        match message_type {
            MessageType::SendReq => fields.send_req(buf).map(Pdu::SendReq),
            MessageType::RetrieveConf => fields.retrieve_conf(buf).map(Pdu::RetrieveConf),
            other => {
                if fields.content_type.is_some() {
                    return Err(malformed(format!("unexpected body in {}", other.name())));
                }
                match other {
                    MessageType::SendConf => fields.send_conf().map(Pdu::SendConf),
                    MessageType::NotificationInd => {
                        fields.notification_ind().map(Pdu::NotificationInd)
                    }
                    MessageType::NotifyRespInd => fields.notify_resp_ind().map(Pdu::NotifyRespInd),
                    MessageType::AcknowledgeInd => {
                        fields.acknowledge_ind().map(Pdu::AcknowledgeInd)
                    }
                    _ => fields.delivery_ind().map(Pdu::DeliveryInd),
                }
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_u8(MESSAGE_TYPE_OCTET);
        buf.put_u8(self.message_type().as_byte());
        match self {
            Pdu::SendReq(p) => encode_send_req(&mut buf, p)?,
            Pdu::SendConf(p) => {
                put_text(&mut buf, field::TRANSACTION_ID, &p.transaction_id)?;
                put_version(&mut buf, p.version);
                if let Some(text) = &p.response_text {
                    put_encoded(&mut buf, field::RESPONSE_TEXT, text)?;
                }
                if let Some(id) = &p.message_id {
                    put_text(&mut buf, field::MESSAGE_ID, id)?;
                }
                put_extra(&mut buf, &p.extra_headers)?;
                put_status_octet(&mut buf, field::RESPONSE_STATUS, p.response_status.0)?;
            }
            Pdu::NotificationInd(p) => {
                put_text(&mut buf, field::TRANSACTION_ID, &p.transaction_id)?;
                put_version(&mut buf, p.version);
                if let Some(from) = &p.from {
                    put_from(&mut buf, from)?;
                }
                if let Some(subject) = &p.subject {
                    put_encoded(&mut buf, field::SUBJECT, subject)?;
                }
                if let Some(flag) = p.delivery_report {
                    put_bool(&mut buf, field::DELIVERY_REPORT, flag);
                }
                put_class(&mut buf, &p.message_class)?;
                put_long(&mut buf, field::MESSAGE_SIZE, p.message_size);
                put_time(&mut buf, field::EXPIRY, p.expiry)?;
                put_extra(&mut buf, &p.extra_headers)?;
                put_text(&mut buf, field::CONTENT_LOCATION, &p.content_location)?;
            }
            Pdu::NotifyRespInd(p) => {
                put_text(&mut buf, field::TRANSACTION_ID, &p.transaction_id)?;
                put_version(&mut buf, p.version);
                if let Some(flag) = p.report_allowed {
                    put_bool(&mut buf, field::REPORT_ALLOWED, flag);
                }
                put_extra(&mut buf, &p.extra_headers)?;
                put_status_octet(&mut buf, field::STATUS, p.status.as_byte())?;
            }
            Pdu::RetrieveConf(p) => encode_retrieve_conf(&mut buf, p)?,
            Pdu::AcknowledgeInd(p) => {
                put_text(&mut buf, field::TRANSACTION_ID, &p.transaction_id)?;
                put_version(&mut buf, p.version);
                if let Some(flag) = p.report_allowed {
                    put_bool(&mut buf, field::REPORT_ALLOWED, flag);
                }
                put_extra(&mut buf, &p.extra_headers)?;
            }
            Pdu::DeliveryInd(p) => {
                put_version(&mut buf, p.version);
                put_text(&mut buf, field::MESSAGE_ID, &p.message_id)?;
                if p.to.is_empty() {
                    return Err(EncodeError::MissingField("To"));
                }
                for to in &p.to {
                    put_encoded(&mut buf, field::TO, to)?;
                }
                put_long(&mut buf, field::DATE, p.date);
                put_extra(&mut buf, &p.extra_headers)?;
                put_status_octet(&mut buf, field::STATUS, p.status.as_byte())?;
            }
        }
        if buf.len() > MAX_PDU_SIZE {
            return Err(EncodeError::TooLong {
                context: "pdu",
                length: buf.len(),
            });
        }
        Ok(buf.to_vec())
    }
}

// --- encoding ---

fn encode_send_req(buf: &mut BytesMut, p: &SendReq) -> Result<(), EncodeError> {
    put_text(buf, field::TRANSACTION_ID, &p.transaction_id)?;
    put_version(buf, p.version);
    if let Some(date) = p.date {
        put_long(buf, field::DATE, date);
    }
    put_from(buf, &p.from)?;
    if p.to.is_empty() && p.cc.is_empty() && p.bcc.is_empty() {
        return Err(EncodeError::MissingField("To"));
    }
    for (code, list) in [(field::TO, &p.to), (field::CC, &p.cc), (field::BCC, &p.bcc)] {
        for addr in list {
            put_encoded(buf, code, addr)?;
        }
    }
    if let Some(subject) = &p.subject {
        put_encoded(buf, field::SUBJECT, subject)?;
    }
    if let Some(class) = &p.message_class {
        put_class(buf, class)?;
    }
    if let Some(expiry) = p.expiry {
        put_time(buf, field::EXPIRY, expiry)?;
    }
    if let Some(priority) = p.priority {
        put_octet(buf, field::PRIORITY, priority.as_byte());
    }
    if let Some(flag) = p.delivery_report {
        put_bool(buf, field::DELIVERY_REPORT, flag);
    }
    if let Some(flag) = p.read_report {
        put_bool(buf, field::READ_REPORT, flag);
    }
    put_extra(buf, &p.extra_headers)?;
    put_body(buf, &p.content_type, &p.parts)
}

fn encode_retrieve_conf(buf: &mut BytesMut, p: &RetrieveConf) -> Result<(), EncodeError> {
    if let Some(tid) = &p.transaction_id {
        put_text(buf, field::TRANSACTION_ID, tid)?;
    }
    put_version(buf, p.version);
    if let Some(id) = &p.message_id {
        put_text(buf, field::MESSAGE_ID, id)?;
    }
    put_long(buf, field::DATE, p.date);
    if let Some(from) = &p.from {
        put_from(buf, from)?;
    }
    for (code, list) in [(field::TO, &p.to), (field::CC, &p.cc)] {
        for addr in list {
            put_encoded(buf, code, addr)?;
        }
    }
    if let Some(subject) = &p.subject {
        put_encoded(buf, field::SUBJECT, subject)?;
    }
    if let Some(class) = &p.message_class {
        put_class(buf, class)?;
    }
    if let Some(priority) = p.priority {
        put_octet(buf, field::PRIORITY, priority.as_byte());
    }
    if let Some(flag) = p.delivery_report {
        put_bool(buf, field::DELIVERY_REPORT, flag);
    }
    if let Some(flag) = p.read_report {
        put_bool(buf, field::READ_REPORT, flag);
    }
    if let Some(status) = p.retrieve_status {
        put_status_octet(buf, field::RETRIEVE_STATUS, status.0)?;
    }
    if let Some(text) = &p.retrieve_text {
        put_encoded(buf, field::RETRIEVE_TEXT, text)?;
    }
    put_extra(buf, &p.extra_headers)?;
    put_body(buf, &p.content_type, &p.parts)
}

fn put_body(buf: &mut BytesMut, content_type: &ContentType, parts: &[Part]) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, field::CONTENT_TYPE);
    content_type.encode(buf)?;
    if content_type.is_multipart() {
        return body::encode_multipart(parts, buf);
    }
    match parts {
        [single] => {
            buf.put_slice(&single.data);
            Ok(())
        }
        _ => Err(EncodeError::Unrepresentable(format!(
            "{} parts under non-multipart {}",
            parts.len(),
            content_type.media_type
        ))),
    }
}

fn put_octet(buf: &mut BytesMut, code: u8, value: u8) {
    wsp::put_short_integer(buf, code);
    buf.put_u8(value);
}

fn put_status_octet(buf: &mut BytesMut, code: u8, value: u8) -> Result<(), EncodeError> {
    if value & 0x80 == 0 {
        return Err(EncodeError::Unrepresentable(format!(
            "status value {value:#04x}"
        )));
    }
    put_octet(buf, code, value);
    Ok(())
}

fn put_bool(buf: &mut BytesMut, code: u8, value: bool) {
    put_octet(buf, code, if value { YES } else { NO });
}

fn put_version(buf: &mut BytesMut, version: MmsVersion) {
    wsp::put_short_integer(buf, field::MMS_VERSION);
    wsp::put_short_integer(buf, version.to_short());
}

fn put_text(buf: &mut BytesMut, code: u8, value: &str) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, code);
    wsp::put_text_string(buf, value)
}

fn put_encoded(buf: &mut BytesMut, code: u8, value: &EncodedString) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, code);
    wsp::put_encoded_string(buf, value)
}

fn put_long(buf: &mut BytesMut, code: u8, value: u64) {
    wsp::put_short_integer(buf, code);
    wsp::put_long_integer(buf, value);
}

fn put_from(buf: &mut BytesMut, from: &FromAddress) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, field::FROM);
    let mut inner = BytesMut::new();
    match from {
        FromAddress::Present(addr) => {
            inner.put_u8(ADDRESS_PRESENT_TOKEN);
            wsp::put_encoded_string(&mut inner, addr)?;
        }
        FromAddress::Insert => inner.put_u8(INSERT_ADDRESS_TOKEN),
    }
    wsp::put_length_framed(buf, &inner)
}

fn put_time(buf: &mut BytesMut, code: u8, value: TimeValue) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, code);
    let mut inner = BytesMut::new();
    match value {
        TimeValue::Absolute(t) => {
            inner.put_u8(ABSOLUTE_TOKEN);
            wsp::put_long_integer(&mut inner, t);
        }
        TimeValue::Relative(t) => {
            inner.put_u8(RELATIVE_TOKEN);
            wsp::put_long_integer(&mut inner, t);
        }
    }
    wsp::put_length_framed(buf, &inner)
}

fn put_class(buf: &mut BytesMut, class: &MessageClass) -> Result<(), EncodeError> {
    wsp::put_short_integer(buf, field::MESSAGE_CLASS);
    match class.as_byte() {
        Some(b) => {
            buf.put_u8(b);
            Ok(())
        }
        None => wsp::put_text_string(buf, class.as_str()),
    }
}

fn put_extra(buf: &mut BytesMut, headers: &[RawHeader]) -> Result<(), EncodeError> {
    for header in headers {
        header.encode(buf)?;
    }
    Ok(())
}

// --- decoding ---

/// Which fields a message type interprets. Anything else is kept raw.
fn accepts(message_type: MessageType, code: u8) -> bool {
    use field::*;
    let allowed: &[u8] = match message_type {
        MessageType::SendReq => &[
            TRANSACTION_ID,
            MMS_VERSION,
            DATE,
            FROM,
            TO,
            CC,
            BCC,
            SUBJECT,
            MESSAGE_CLASS,
            EXPIRY,
            PRIORITY,
            DELIVERY_REPORT,
            READ_REPORT,
        ],
        MessageType::SendConf => &[
            TRANSACTION_ID,
            MMS_VERSION,
            RESPONSE_STATUS,
            RESPONSE_TEXT,
            MESSAGE_ID,
        ],
        MessageType::NotificationInd => &[
            TRANSACTION_ID,
            MMS_VERSION,
            FROM,
            SUBJECT,
            DELIVERY_REPORT,
            MESSAGE_CLASS,
            MESSAGE_SIZE,
            EXPIRY,
            CONTENT_LOCATION,
        ],
        MessageType::NotifyRespInd => &[TRANSACTION_ID, MMS_VERSION, STATUS, REPORT_ALLOWED],
        MessageType::RetrieveConf => &[
            TRANSACTION_ID,
            MMS_VERSION,
            MESSAGE_ID,
            DATE,
            FROM,
            TO,
            CC,
            SUBJECT,
            MESSAGE_CLASS,
            PRIORITY,
            DELIVERY_REPORT,
            READ_REPORT,
            RETRIEVE_STATUS,
            RETRIEVE_TEXT,
        ],
        MessageType::AcknowledgeInd => &[TRANSACTION_ID, MMS_VERSION, REPORT_ALLOWED],
        MessageType::DeliveryInd => &[MMS_VERSION, MESSAGE_ID, TO, DATE, STATUS],
    };
    allowed.contains(&code)
}

/// Headers of one PDU, interpreted according to its message type.
#[derive(Default)]
struct Fields {
    transaction_id: Option<String>,
    version: Option<MmsVersion>,
    date: Option<u64>,
    from: Option<FromAddress>,
    to: Vec<EncodedString>,
    cc: Vec<EncodedString>,
    bcc: Vec<EncodedString>,
    subject: Option<EncodedString>,
    message_class: Option<MessageClass>,
    expiry: Option<TimeValue>,
    priority: Option<Priority>,
    delivery_report: Option<bool>,
    read_report: Option<bool>,
    report_allowed: Option<bool>,
    message_size: Option<u64>,
    content_location: Option<String>,
    message_id: Option<String>,
    response_status: Option<ResponseStatus>,
    response_text: Option<EncodedString>,
    status: Option<MmsStatus>,
    retrieve_status: Option<ResponseStatus>,
    retrieve_text: Option<EncodedString>,
    extra_headers: Vec<RawHeader>,
    content_type: Option<ContentType>,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, DecodeError> {
    value.ok_or_else(|| DecodeError::UnknownRequiredHeader(name.to_string()))
}

impl Fields {
    /// Reads headers up to and including Content-Type, leaving `buf` at the body.
    fn read(message_type: MessageType, buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut fields = Fields::default();
        while !buf.is_empty() {
            let first = wsp::peek_u8(buf)?;
            if first & 0x80 == 0 {
                fields.extra_headers.push(RawHeader::decode(buf)?);
                continue;
            }
            let code = first & 0x7F;
            if code == field::CONTENT_TYPE {
                wsp::get_u8(buf)?;
                fields.content_type = Some(ContentType::decode(buf)?);
                break;
            }
            if !accepts(message_type, code) {
                fields.extra_headers.push(RawHeader::decode(buf)?);
                continue;
            }
            wsp::get_u8(buf)?;
            fields.apply(code, buf)?;
        }
        Ok(fields)
    }

    fn apply(&mut self, code: u8, buf: &mut &[u8]) -> Result<(), DecodeError> {
        match code {
            field::TRANSACTION_ID => self.transaction_id = Some(wsp::get_text_string(buf)?),
            field::MMS_VERSION => {
                self.version = Some(MmsVersion::from_short(wsp::get_short_integer(buf)?));
            }
            field::DATE => self.date = Some(wsp::get_integer_value(buf)?),
            field::FROM => self.from = Some(get_from(buf)?),
            field::TO => self.to.push(wsp::get_encoded_string(buf)?),
            field::CC => self.cc.push(wsp::get_encoded_string(buf)?),
            field::BCC => self.bcc.push(wsp::get_encoded_string(buf)?),
            field::SUBJECT => self.subject = Some(wsp::get_encoded_string(buf)?),
            field::MESSAGE_CLASS => self.message_class = Some(get_class(buf)?),
            field::EXPIRY => self.expiry = Some(get_time(buf)?),
            field::PRIORITY => {
                let octet = wsp::get_u8(buf)?;
                self.priority = Some(
                    Priority::from_byte(octet)
                        .ok_or_else(|| malformed(format!("priority {octet:#04x}")))?,
                );
            }
            field::DELIVERY_REPORT => self.delivery_report = Some(get_bool(buf)?),
            field::READ_REPORT => self.read_report = Some(get_bool(buf)?),
            field::REPORT_ALLOWED => self.report_allowed = Some(get_bool(buf)?),
            field::MESSAGE_SIZE => self.message_size = Some(wsp::get_integer_value(buf)?),
            field::CONTENT_LOCATION => self.content_location = Some(wsp::get_text_string(buf)?),
            field::MESSAGE_ID => self.message_id = Some(wsp::get_text_string(buf)?),
            field::RESPONSE_STATUS => {
                self.response_status = Some(ResponseStatus(get_status_octet(buf)?));
            }
            field::RESPONSE_TEXT => self.response_text = Some(wsp::get_encoded_string(buf)?),
            field::STATUS => self.status = Some(MmsStatus::from_byte(get_status_octet(buf)?)),
            field::RETRIEVE_STATUS => {
                self.retrieve_status = Some(ResponseStatus(get_status_octet(buf)?));
            }
            field::RETRIEVE_TEXT => self.retrieve_text = Some(wsp::get_encoded_string(buf)?),
            other => return Err(malformed(format!("unhandled field {other:#04x}"))),
        }
        Ok(())
    }

    fn version(&mut self) -> Result<MmsVersion, DecodeError> {
        required(self.version.take(), "X-Mms-MMS-Version")
    }

    fn transaction_id(&mut self) -> Result<String, DecodeError> {
        required(self.transaction_id.take(), "X-Mms-Transaction-Id")
    }

    fn body(&mut self, rest: &[u8]) -> Result<(ContentType, Vec<Part>), DecodeError> {
        let content_type = required(self.content_type.take(), "Content-Type")?;
        let parts = if content_type.is_multipart() {
            body::decode_multipart(rest)?
        } else {
            vec![Part::new(content_type.clone(), rest.to_vec())]
        };
        Ok((content_type, parts))
    }

    fn send_req(mut self, rest: &[u8]) -> Result<SendReq, DecodeError> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(DecodeError::UnknownRequiredHeader("To".into()));
        }
        let (content_type, parts) = self.body(rest)?;
        Ok(SendReq {
            transaction_id: self.transaction_id()?,
            version: self.version()?,
            date: self.date,
            from: required(self.from, "From")?,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            message_class: self.message_class,
            expiry: self.expiry,
            priority: self.priority,
            delivery_report: self.delivery_report,
            read_report: self.read_report,
            extra_headers: self.extra_headers,
            content_type,
            parts,
        })
    }

    fn retrieve_conf(mut self, rest: &[u8]) -> Result<RetrieveConf, DecodeError> {
        let (content_type, parts) = self.body(rest)?;
        let version = self.version()?;
        Ok(RetrieveConf {
            transaction_id: self.transaction_id,
            version,
            message_id: self.message_id,
            date: required(self.date, "Date")?,
            from: self.from,
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            message_class: self.message_class,
            priority: self.priority,
            delivery_report: self.delivery_report,
            read_report: self.read_report,
            retrieve_status: self.retrieve_status,
            retrieve_text: self.retrieve_text,
            extra_headers: self.extra_headers,
            content_type,
            parts,
        })
    }

    fn send_conf(mut self) -> Result<SendConf, DecodeError> {
        Ok(SendConf {
            transaction_id: self.transaction_id()?,
            version: self.version()?,
            response_status: required(self.response_status, "X-Mms-Response-Status")?,
            response_text: self.response_text,
            message_id: self.message_id,
            extra_headers: self.extra_headers,
        })
    }

    fn notification_ind(mut self) -> Result<NotificationInd, DecodeError> {
        Ok(NotificationInd {
            transaction_id: self.transaction_id()?,
            version: self.version()?,
            from: self.from,
            subject: self.subject,
            delivery_report: self.delivery_report,
            message_class: required(self.message_class, "X-Mms-Message-Class")?,
            message_size: required(self.message_size, "X-Mms-Message-Size")?,
            expiry: required(self.expiry, "X-Mms-Expiry")?,
            content_location: required(self.content_location, "X-Mms-Content-Location")?,
            extra_headers: self.extra_headers,
        })
    }

    fn notify_resp_ind(mut self) -> Result<NotifyRespInd, DecodeError> {
        Ok(NotifyRespInd {
            transaction_id: self.transaction_id()?,
            version: self.version()?,
            status: required(self.status, "X-Mms-Status")?,
            report_allowed: self.report_allowed,
            extra_headers: self.extra_headers,
        })
    }

    fn acknowledge_ind(mut self) -> Result<AcknowledgeInd, DecodeError> {
        Ok(AcknowledgeInd {
            transaction_id: self.transaction_id()?,
            version: self.version()?,
            report_allowed: self.report_allowed,
            extra_headers: self.extra_headers,
        })
    }

    fn delivery_ind(mut self) -> Result<DeliveryInd, DecodeError> {
        if self.to.is_empty() {
            return Err(DecodeError::UnknownRequiredHeader("To".into()));
        }
        Ok(DeliveryInd {
            version: self.version()?,
            message_id: required(self.message_id, "Message-ID")?,
            to: self.to,
            date: required(self.date, "Date")?,
            status: required(self.status, "X-Mms-Status")?,
            extra_headers: self.extra_headers,
        })
    }
}

fn get_status_octet(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    let octet = wsp::get_u8(buf)?;
    if octet & 0x80 == 0 {
        return Err(malformed(format!("status value {octet:#04x}")));
    }
    Ok(octet)
}

fn get_bool(buf: &mut &[u8]) -> Result<bool, DecodeError> {
    match wsp::get_u8(buf)? {
        YES => Ok(true),
        NO => Ok(false),
        other => Err(malformed(format!("yes/no value {other:#04x}"))),
    }
}

fn get_from(buf: &mut &[u8]) -> Result<FromAddress, DecodeError> {
    let mut inner = wsp::get_length_framed(buf)?;
    match wsp::get_u8(&mut inner)? {
        ADDRESS_PRESENT_TOKEN => Ok(FromAddress::Present(wsp::get_encoded_string(&mut inner)?)),
        INSERT_ADDRESS_TOKEN => Ok(FromAddress::Insert),
        other => Err(malformed(format!("from token {other:#04x}"))),
    }
}

fn get_time(buf: &mut &[u8]) -> Result<TimeValue, DecodeError> {
    let mut inner = wsp::get_length_framed(buf)?;
    match wsp::get_u8(&mut inner)? {
        ABSOLUTE_TOKEN => Ok(TimeValue::Absolute(wsp::get_integer_value(&mut inner)?)),
        RELATIVE_TOKEN => Ok(TimeValue::Relative(wsp::get_integer_value(&mut inner)?)),
        other => Err(malformed(format!("time token {other:#04x}"))),
    }
}

fn get_class(buf: &mut &[u8]) -> Result<MessageClass, DecodeError> {
    let first = wsp::peek_u8(buf)?;
    if first & 0x80 != 0 {
        wsp::get_u8(buf)?;
        return MessageClass::from_byte(first)
            .ok_or_else(|| malformed(format!("message class {first:#04x}")));
    }
    Ok(MessageClass::Other(wsp::get_text_string(buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::Charset;
    use crate::content_type::{MULTIPART_RELATED, Param, SMIL};

    fn notification() -> NotificationInd {
        NotificationInd {
            transaction_id: "T12345".into(),
            version: MmsVersion::V1_2,
            from: Some(FromAddress::Present(EncodedString::new(
                "+15551234567/TYPE=PLMN",
            ))),
            subject: Some(EncodedString::utf8("Photos")),
            delivery_report: Some(true),
            message_class: MessageClass::Personal,
            message_size: 31_337,
            expiry: TimeValue::Relative(86_400),
            content_location: "http://mmsc.example/x1".into(),
            extra_headers: Vec::new(),
        }
    }

    #[test]
    fn notification_header_layout() {
        let bytes = Pdu::NotificationInd(notification()).encode().unwrap();
        assert_eq!(&bytes[..2], [0x8C, 0x82]);
        assert_eq!(bytes[2], 0x98);
        assert_eq!(&bytes[3..10], b"T12345\0");
        assert_eq!(&bytes[10..12], [0x8D, 0x92]);
    }

    #[test]
    fn notification_round_trip() {
        let pdu = Pdu::NotificationInd(notification());
        let bytes = pdu.encode().unwrap();
        assert_eq!(Pdu::decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn message_type_must_come_first() {
        let mut bytes = Pdu::NotificationInd(notification()).encode().unwrap();
        bytes.swap(0, 2);
        assert!(matches!(
            Pdu::decode(&bytes),
            Err(DecodeError::UnknownRequiredHeader(_))
        ));
        assert!(matches!(
            Pdu::decode(&[0x8C, 0x99]),
            Err(DecodeError::UnknownRequiredHeader(_))
        ));
    }

    #[test]
    fn missing_content_location_is_reported() {
        let mut bytes = vec![0x8C, 0x82];
        bytes.extend_from_slice(&[0x98]);
        bytes.extend_from_slice(b"T1\0");
        bytes.extend_from_slice(&[0x8D, 0x92, 0x8A, 0x80, 0x8E, 0x01, 0x10]);
        bytes.extend_from_slice(&[0x88, 0x03, 0x81, 0x01, 0x10]);
        let err = Pdu::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownRequiredHeader("X-Mms-Content-Location".into())
        );
    }

    #[test]
    fn unknown_headers_survive_round_trip() {
        let mut ind = notification();
        ind.extra_headers = vec![
            RawHeader::WellKnown {
                code: 0x3A,
                value: vec![0x83],
            },
            RawHeader::Application {
                name: "X-Carrier".into(),
                value: "example".into(),
            },
        ];
        let pdu = Pdu::NotificationInd(ind);
        let decoded = Pdu::decode(&pdu.encode().unwrap()).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn header_foreign_to_type_is_kept_raw() {
        // A Send-Conf carrying an X-Mms-Content-Location header.
        let mut bytes = vec![0x8C, 0x81, 0x98, b'A', 0x00, 0x8D, 0x92, 0x92, 0x80];
        bytes.extend_from_slice(&[0x83]);
        bytes.extend_from_slice(b"http://x\0");
        let Pdu::SendConf(conf) = Pdu::decode(&bytes).unwrap() else {
            panic!("expected send-conf");
        };
        assert!(conf.response_status.is_ok());
        assert_eq!(conf.extra_headers.len(), 1);
    }

    fn send_req() -> SendReq {
        let mut smil = Part::new(ContentType::new(SMIL), b"<smil/>".to_vec());
        smil.content_id = Some("<smil>".into());
        let mut text = Part::new(
            ContentType::new("text/plain").with_param(Param::Charset(Charset::UTF_8)),
            "héllo".as_bytes().to_vec(),
        );
        text.content_location = Some("text.txt".into());
        SendReq {
            transaction_id: "ABCDEF0123456789".into(),
            version: MmsVersion::V1_1,
            date: Some(1_700_000_000),
            from: FromAddress::Insert,
            to: vec![EncodedString::new("+15550001111/TYPE=PLMN")],
            cc: vec![],
            bcc: vec![EncodedString::new("a@example.com")],
            subject: Some(EncodedString::utf8("héllo")),
            message_class: Some(MessageClass::Personal),
            expiry: Some(TimeValue::Relative(604_800)),
            priority: Some(Priority::Normal),
            delivery_report: Some(false),
            read_report: Some(false),
            extra_headers: Vec::new(),
            content_type: ContentType::new(MULTIPART_RELATED)
                .with_param(Param::Start("<smil>".into()))
                .with_param(Param::Type(SMIL.into())),
            parts: vec![smil, text],
        }
    }

    #[test]
    fn send_req_round_trip() {
        let pdu = Pdu::SendReq(send_req());
        let bytes = pdu.encode().unwrap();
        assert_eq!(Pdu::decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn send_req_without_recipients_does_not_encode() {
        let mut req = send_req();
        req.to.clear();
        req.bcc.clear();
        assert_eq!(
            Pdu::SendReq(req).encode(),
            Err(EncodeError::MissingField("To"))
        );
    }

    #[test]
    fn single_part_body() {
        let conf = RetrieveConf {
            transaction_id: None,
            version: MmsVersion::V1_0,
            message_id: Some("m-1".into()),
            date: 1_700_000_000,
            from: None,
            to: vec![],
            cc: vec![],
            subject: None,
            message_class: None,
            priority: None,
            delivery_report: None,
            read_report: None,
            retrieve_status: Some(ResponseStatus::OK),
            retrieve_text: None,
            extra_headers: vec![],
            content_type: ContentType::new("text/plain"),
            parts: vec![Part::new(ContentType::new("text/plain"), b"just text".to_vec())],
        };
        let pdu = Pdu::RetrieveConf(conf);
        assert_eq!(Pdu::decode(&pdu.encode().unwrap()).unwrap(), pdu);
    }

    #[test]
    fn status_octets_must_have_high_bit() {
        let conf = SendConf {
            transaction_id: "x".into(),
            version: MmsVersion::V1_2,
            response_status: ResponseStatus(0x10),
            response_text: None,
            message_id: None,
            extra_headers: vec![],
        };
        assert!(Pdu::SendConf(conf).encode().is_err());
    }

    #[test]
    fn oversized_input_rejected() {
        let big = vec![0u8; MAX_PDU_SIZE + 1];
        assert!(matches!(
            Pdu::decode(&big),
            Err(DecodeError::InvalidLength { context: "pdu", .. })
        ));
    }
}
