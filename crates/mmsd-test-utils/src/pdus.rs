// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for carrier-side PDUs.

use mmsd_pdu::content_type::{MULTIPART_MIXED, MULTIPART_RELATED, SMIL};
use mmsd_pdu::{
    ContentType, DeliveryInd, EncodedString, FromAddress, MessageClass, MmsStatus, MmsVersion,
    NotificationInd, Param, Part, Pdu, ResponseStatus, RetrieveConf, SendConf, TimeValue,
};

/// Sender used in carrier-side PDUs.
pub const PEER: &str = "+15550001111/TYPE=PLMN";

fn encoded(pdu: Pdu) -> Vec<u8> {
    mmsd_pdu::encode(&pdu).expect("test PDU should encode")
}

pub fn notification(tid: &str, location: &str) -> NotificationInd {
    NotificationInd {
        transaction_id: tid.to_string(),
        version: MmsVersion::V1_2,
        from: Some(FromAddress::Present(EncodedString::new(PEER))),
        subject: Some(EncodedString::utf8("Holiday pictures")),
        delivery_report: Some(false),
        message_class: MessageClass::Personal,
        message_size: 4096,
        expiry: TimeValue::Relative(7 * 24 * 3600),
        content_location: location.to_string(),
        extra_headers: Vec::new(),
    }
}

/// A Notification-Ind wrapped in a WAP-Push envelope.
pub fn notification_push(notification: NotificationInd) -> Vec<u8> {
    mmsd_pdu::encode_push(0x01, &Pdu::NotificationInd(notification))
        .expect("test push should encode")
}

/// A Delivery-Ind wrapped in a WAP-Push envelope.
pub fn delivery_push(message_id: &str, status: MmsStatus) -> Vec<u8> {
    let pdu = Pdu::DeliveryInd(DeliveryInd {
        version: MmsVersion::V1_2,
        message_id: message_id.to_string(),
        to: vec![EncodedString::new(PEER)],
        date: 1_767_225_600,
        status,
        extra_headers: Vec::new(),
    });
    mmsd_pdu::encode_push(0x02, &pdu).expect("test push should encode")
}

pub fn send_conf(status: ResponseStatus, message_id: Option<&str>) -> Vec<u8> {
    encoded(Pdu::SendConf(SendConf {
        transaction_id: "TID".to_string(),
        version: MmsVersion::V1_2,
        response_status: status,
        response_text: None,
        message_id: message_id.map(str::to_string),
        extra_headers: Vec::new(),
    }))
}

/// A text part and a small image.
pub fn text_and_image() -> Vec<Part> {
    let mut text = Part::new(
        ContentType::new("text/plain").with_param(Param::Charset(mmsd_pdu::Charset::UTF_8)),
        b"Greetings from the beach".to_vec(),
    );
    text.content_id = Some("<text1>".to_string());
    text.content_location = Some("text1.txt".to_string());

    let mut image = Part::new(
        ContentType::new("image/jpeg").with_param(Param::Name("beach.jpg".to_string())),
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46],
    );
    image.content_id = Some("<image1>".to_string());
    image.content_location = Some("beach.jpg".to_string());

    vec![text, image]
}

pub fn retrieve_conf(message_id: &str, parts: Vec<Part>) -> RetrieveConf {
    RetrieveConf {
        transaction_id: Some("TID".to_string()),
        version: MmsVersion::V1_2,
        message_id: Some(message_id.to_string()),
        date: 1_767_225_600,
        from: Some(FromAddress::Present(EncodedString::new(PEER))),
        to: vec![EncodedString::new("+15552223333/TYPE=PLMN")],
        cc: Vec::new(),
        subject: Some(EncodedString::utf8("Holiday pictures")),
        message_class: Some(MessageClass::Personal),
        priority: None,
        delivery_report: None,
        read_report: None,
        retrieve_status: None,
        retrieve_text: None,
        extra_headers: Vec::new(),
        content_type: ContentType::new(MULTIPART_MIXED),
        parts,
    }
}

pub fn retrieve_conf_bytes(conf: RetrieveConf) -> Vec<u8> {
    encoded(Pdu::RetrieveConf(conf))
}

/// Content type of a body rooted at a SMIL part.
pub fn related_with_smil() -> ContentType {
    ContentType::new(MULTIPART_RELATED)
        .with_param(Param::Type(SMIL.to_string()))
        .with_param(Param::Start("<smil>".to_string()))
}
