// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping between codec PDUs and the stored message model.

use chrono::{DateTime, Utc};
use mmsd_core::{ContentPart, Direction, Message, MessageId, Priority};
use mmsd_pdu::{ContentType, FromAddress, NotificationInd, Part, RetrieveConf, TimeValue};

/// Strips control characters and `"` from a header taken off the air.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) fn timestamp(secs: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
}

/// Resolves an expiry against `now`.
pub(crate) fn expiry_at(expiry: TimeValue, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match expiry {
        TimeValue::Absolute(secs) => timestamp(secs),
        TimeValue::Relative(secs) => {
            let delta = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
            now.checked_add_signed(delta)
        }
    }
}

pub(crate) fn priority_from_pdu(p: mmsd_pdu::Priority) -> Priority {
    match p {
        mmsd_pdu::Priority::Low => Priority::Low,
        mmsd_pdu::Priority::Normal => Priority::Normal,
        mmsd_pdu::Priority::High => Priority::High,
    }
}

pub(crate) fn priority_to_pdu(p: Priority) -> mmsd_pdu::Priority {
    match p {
        Priority::Low => mmsd_pdu::Priority::Low,
        Priority::Normal => mmsd_pdu::Priority::Normal,
        Priority::High => mmsd_pdu::Priority::High,
    }
}

fn from_address(from: Option<&FromAddress>) -> Option<String> {
    from.and_then(FromAddress::address)
        .map(sanitize)
        .filter(|s| !s.is_empty())
}

/// A new inbound message for a notification, or `None` when the
/// notification is unusable once sanitized.
pub fn notification_message(
    notification: &NotificationInd,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Option<Message> {
    let id = sanitize(&notification.transaction_id);
    let location = sanitize(&notification.content_location);
    if id.is_empty() || location.is_empty() {
        return None;
    }

    let mut msg = Message::new(MessageId(id), Direction::Inbound, max_attempts, now);
    msg.headers.content_location = Some(location);
    msg.headers.from = from_address(notification.from.as_ref());
    msg.headers.subject = notification.subject.as_ref().map(|s| s.text.clone());
    msg.headers.message_size = Some(notification.message_size);
    msg.headers.message_class = Some(notification.message_class.as_str().to_string());
    msg.headers.delivery_report = notification.delivery_report.unwrap_or(false);
    msg.expires_at = expiry_at(notification.expiry, now);
    Some(msg)
}

pub fn part_to_content(part: &Part) -> ContentPart {
    ContentPart {
        content_type: part.content_type.to_string(),
        content_id: part.content_id.clone(),
        filename: part
            .content_location
            .clone()
            .or_else(|| part.content_type.name().map(str::to_string)),
        data: part.data.clone(),
    }
}

pub fn content_to_part(content: &ContentPart) -> Part {
    let mut part = Part::new(ContentType::parse(&content.content_type), content.data.clone());
    part.content_id = content.content_id.clone();
    part.content_location = content.filename.clone();
    part
}

/// Copies the retrieved headers and body onto `msg`.
///
/// Fields the Retrieve-Conf omits keep what the notification said. The
/// delivery-report flag always stays as the notification set it.
pub fn apply_retrieve_conf(msg: &mut Message, conf: &RetrieveConf) {
    let headers = &mut msg.headers;
    if let Some(from) = from_address(conf.from.as_ref()) {
        headers.from = Some(from);
    }
    headers.to = conf.to.iter().map(|a| a.text.clone()).collect();
    headers.cc = conf.cc.iter().map(|a| a.text.clone()).collect();
    if let Some(subject) = &conf.subject {
        headers.subject = Some(subject.text.clone());
    }
    if let Some(class) = &conf.message_class {
        headers.message_class = Some(class.as_str().to_string());
    }
    headers.priority = conf.priority.map(priority_from_pdu);
    headers.message_id = conf.message_id.clone();
    headers.date = timestamp(conf.date);
    if let Some(report) = conf.read_report {
        headers.read_report = report;
    }
    msg.parts = conf.parts.iter().map(part_to_content).collect();
}
