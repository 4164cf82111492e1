// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client send requests: validation, addressing and Send-Req assembly.

use chrono::{DateTime, Utc};
use mmsd_config::model::ServiceConfig;
use mmsd_core::{ContentPart, MessageHeaders, MmsdError, Priority};
use mmsd_pdu::content_type::{MULTIPART_MIXED, MULTIPART_RELATED, SMIL};
use mmsd_pdu::{
    ContentType, EncodedString, FromAddress, MmsVersion, Param, SendReq, TimeValue,
};
use rand::Rng;

use crate::convert::{content_to_part, priority_to_pdu};

const PLMN_SUFFIX: &str = "/TYPE=PLMN";
const TRANSACTION_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRANSACTION_ID_LEN: usize = 16;
const SMIL_CONTENT_ID: &str = "<smil>";

/// One file to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Content-ID, with or without angle brackets. Generated when absent.
    pub content_id: Option<String>,
    pub content_type: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_id: None,
            content_type: content_type.into(),
            filename: None,
            data,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// What a local client asks to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    /// Presentation document; sent as the root of a multipart/related body.
    pub smil: Option<String>,
    pub attachments: Vec<Attachment>,
    pub delivery_report: bool,
    pub read_report: bool,
    pub priority: Option<Priority>,
}

impl SendRequest {
    pub fn to(recipient: impl Into<String>) -> Self {
        Self {
            recipients: vec![recipient.into()],
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A fresh 16-character uppercase alphanumeric transaction ID.
pub fn generate_transaction_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TRANSACTION_ID_LEN)
        .map(|_| TRANSACTION_ID_CHARS[rng.gen_range(0..TRANSACTION_ID_CHARS.len())] as char)
        .collect()
}

/// `+<digits>/TYPE=PLMN` for phone numbers; email addresses pass through.
pub fn normalize_recipient(recipient: &str) -> Result<String, MmsdError> {
    let recipient = recipient.trim();
    if recipient.contains('@') {
        return Ok(recipient.to_string());
    }
    let number = recipient.strip_suffix(PLMN_SUFFIX).unwrap_or(recipient);
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(MmsdError::InvalidRequest(format!(
            "recipient `{recipient}` is neither a phone number nor an email address"
        )));
    }
    Ok(format!("+{digits}{PLMN_SUFFIX}"))
}

/// Sender address for outgoing messages.
pub(crate) fn sender(modem_number: Option<&str>) -> FromAddress {
    match modem_number.map(str::trim).filter(|n| !n.is_empty()) {
        Some(number) => {
            let number = number.strip_suffix(PLMN_SUFFIX).unwrap_or(number);
            FromAddress::Present(EncodedString::new(format!("{number}{PLMN_SUFFIX}")))
        }
        None => FromAddress::Insert,
    }
}

fn bracketed(id: &str) -> String {
    let id = id.trim().trim_start_matches('<').trim_end_matches('>');
    format!("<{id}>")
}

/// Checks the request against `[service]` limits.
pub(crate) fn validate(request: &SendRequest, limits: &ServiceConfig) -> Result<(), MmsdError> {
    if request.recipients.iter().all(|r| r.trim().is_empty()) {
        return Err(MmsdError::InvalidRequest("no recipients".into()));
    }
    if request.attachments.len() > limits.max_attachments {
        return Err(MmsdError::InvalidRequest(format!(
            "{} attachments exceed the limit of {}",
            request.attachments.len(),
            limits.max_attachments
        )));
    }
    let total: usize = request.attachments.iter().map(|a| a.data.len()).sum();
    if total > limits.total_max_attachment_size {
        return Err(MmsdError::InvalidRequest(format!(
            "attachments total {total} bytes, limit is {}",
            limits.total_max_attachment_size
        )));
    }
    if request
        .attachments
        .iter()
        .any(|a| a.content_type.trim().is_empty())
    {
        return Err(MmsdError::InvalidRequest(
            "attachment without a content type".into(),
        ));
    }
    Ok(())
}

/// Everything needed to store and submit one outgoing message.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub send_req: SendReq,
    pub headers: MessageHeaders,
    pub parts: Vec<ContentPart>,
}

/// Assembles a Send-Req. `request` must already be validated.
pub(crate) fn build(
    request: &SendRequest,
    transaction_id: &str,
    from: FromAddress,
    version: MmsVersion,
    expiry_secs: u64,
    now: DateTime<Utc>,
) -> Result<Outgoing, MmsdError> {
    let recipients = request
        .recipients
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| normalize_recipient(r))
        .collect::<Result<Vec<_>, _>>()?;

    let mut parts = Vec::with_capacity(request.attachments.len() + 1);
    if let Some(smil) = &request.smil {
        parts.push(ContentPart {
            content_type: format!("{SMIL}; charset=utf-8"),
            content_id: Some(SMIL_CONTENT_ID.to_string()),
            filename: Some("smil.smil".to_string()),
            data: smil.as_bytes().to_vec(),
        });
    }
    for (index, attachment) in request.attachments.iter().enumerate() {
        let content_id = match &attachment.content_id {
            Some(id) => bracketed(id),
            None => bracketed(
                attachment
                    .filename
                    .as_deref()
                    .unwrap_or(&format!("part{index}")),
            ),
        };
        parts.push(ContentPart {
            content_type: attachment.content_type.clone(),
            content_id: Some(content_id),
            filename: attachment.filename.clone(),
            data: attachment.data.clone(),
        });
    }

    let content_type = if request.smil.is_some() {
        ContentType::new(MULTIPART_RELATED)
            .with_param(Param::Type(SMIL.to_string()))
            .with_param(Param::Start(SMIL_CONTENT_ID.to_string()))
    } else {
        ContentType::new(MULTIPART_MIXED)
    };

    let headers = MessageHeaders {
        subject: request.subject.clone(),
        from: from.address().map(str::to_string),
        to: recipients.clone(),
        priority: request.priority,
        delivery_report: request.delivery_report,
        read_report: request.read_report,
        date: Some(now),
        ..MessageHeaders::default()
    };

    let send_req = SendReq {
        transaction_id: transaction_id.to_string(),
        version,
        date: u64::try_from(now.timestamp()).ok(),
        from,
        to: recipients.into_iter().map(EncodedString::new).collect(),
        cc: Vec::new(),
        bcc: Vec::new(),
        subject: request.subject.as_deref().map(EncodedString::utf8),
        message_class: None,
        expiry: Some(TimeValue::Relative(expiry_secs)),
        priority: request.priority.map(priority_to_pdu),
        delivery_report: Some(request.delivery_report),
        read_report: Some(request.read_report),
        extra_headers: Vec::new(),
        content_type,
        parts: parts.iter().map(content_to_part).collect(),
    };

    Ok(Outgoing {
        send_req,
        headers,
        parts,
    })
}
