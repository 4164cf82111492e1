// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mmsd decode` command implementation.
//!
//! Reads a file holding either a bare MMS PDU or a WAP-Push envelope and
//! prints its headers and body parts.

use std::fmt::Write as _;
use std::path::Path;

use mmsd_core::MmsdError;
use mmsd_pdu::{EncodedString, FromAddress, Part, Pdu, TimeValue};

/// Runs the `mmsd decode` command.
pub fn run_decode(path: &Path) -> Result<(), MmsdError> {
    let data = std::fs::read(path)
        .map_err(|e| MmsdError::Internal(format!("cannot read {}: {e}", path.display())))?;
    let pdu = mmsd_pdu::decode_push(&data).map_err(|e| MmsdError::Codec(e.to_string()))?;
    print!("{}", describe(&pdu));
    Ok(())
}

/// Renders a PDU as indented `Name: value` lines.
fn describe(pdu: &Pdu) -> String {
    let mut out = String::new();
    line(&mut out, "Message-Type", pdu.message_type().name());
    if let Some(tid) = pdu.transaction_id() {
        line(&mut out, "Transaction-Id", tid);
    }

    match pdu {
        Pdu::SendReq(p) => {
            line(&mut out, "From", &from(&p.from));
            addresses(&mut out, "To", &p.to);
            addresses(&mut out, "Cc", &p.cc);
            addresses(&mut out, "Bcc", &p.bcc);
            optional(&mut out, "Subject", p.subject.as_ref().map(|s| s.text.as_str()));
            if let Some(expiry) = p.expiry {
                line(&mut out, "Expiry", &time(expiry));
            }
            flag(&mut out, "Delivery-Report", p.delivery_report);
            body(&mut out, &p.content_type.to_string(), &p.parts);
        }
        Pdu::SendConf(p) => {
            line(&mut out, "Response-Status", &p.response_status.name());
            optional(
                &mut out,
                "Response-Text",
                p.response_text.as_ref().map(|t| t.text.as_str()),
            );
            optional(&mut out, "Message-Id", p.message_id.as_deref());
        }
        Pdu::NotificationInd(p) => {
            if let Some(sender) = &p.from {
                line(&mut out, "From", &from(sender));
            }
            optional(&mut out, "Subject", p.subject.as_ref().map(|s| s.text.as_str()));
            line(&mut out, "Message-Class", p.message_class.as_str());
            line(&mut out, "Message-Size", &p.message_size.to_string());
            line(&mut out, "Expiry", &time(p.expiry));
            flag(&mut out, "Delivery-Report", p.delivery_report);
            line(&mut out, "Content-Location", &p.content_location);
        }
        Pdu::NotifyRespInd(p) => {
            line(&mut out, "Status", p.status.name());
            flag(&mut out, "Report-Allowed", p.report_allowed);
        }
        Pdu::RetrieveConf(p) => {
            optional(&mut out, "Message-Id", p.message_id.as_deref());
            line(&mut out, "Date", &p.date.to_string());
            if let Some(sender) = &p.from {
                line(&mut out, "From", &from(sender));
            }
            addresses(&mut out, "To", &p.to);
            addresses(&mut out, "Cc", &p.cc);
            optional(&mut out, "Subject", p.subject.as_ref().map(|s| s.text.as_str()));
            if let Some(status) = p.retrieve_status {
                line(&mut out, "Retrieve-Status", &status.name());
            }
            body(&mut out, &p.content_type.to_string(), &p.parts);
        }
        Pdu::AcknowledgeInd(p) => {
            flag(&mut out, "Report-Allowed", p.report_allowed);
        }
        Pdu::DeliveryInd(p) => {
            line(&mut out, "Message-Id", &p.message_id);
            addresses(&mut out, "To", &p.to);
            line(&mut out, "Date", &p.date.to_string());
            line(&mut out, "Status", p.status.name());
        }
    }
    out
}

fn line(out: &mut String, name: &str, value: &str) {
    let _ = writeln!(out, "{name}: {value}");
}

fn optional(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        line(out, name, value);
    }
}

fn flag(out: &mut String, name: &str, value: Option<bool>) {
    if let Some(value) = value {
        line(out, name, if value { "Yes" } else { "No" });
    }
}

fn addresses(out: &mut String, name: &str, list: &[EncodedString]) {
    for address in list {
        line(out, name, &address.text);
    }
}

fn from(address: &FromAddress) -> String {
    address
        .address()
        .map(str::to_string)
        .unwrap_or_else(|| "<insert-address>".to_string())
}

fn time(value: TimeValue) -> String {
    match value {
        TimeValue::Absolute(at) => format!("at {at}"),
        TimeValue::Relative(secs) => format!("+{secs}s"),
    }
}

fn body(out: &mut String, content_type: &str, parts: &[Part]) {
    line(out, "Content-Type", content_type);
    for (index, part) in parts.iter().enumerate() {
        let _ = write!(out, "  [{index}] {} ({} bytes)", part.content_type, part.data.len());
        if let Some(id) = &part.content_id {
            let _ = write!(out, " id={id}");
        }
        if let Some(location) = &part.content_location {
            let _ = write!(out, " location={location}");
        }
        out.push('\n');
    }
}
