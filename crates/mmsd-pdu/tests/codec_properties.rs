// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the MMS codec.

use mmsd_pdu::content_type::{MULTIPART_MIXED, MULTIPART_RELATED, SMIL};
use mmsd_pdu::{
    AcknowledgeInd, Charset, ContentType, DeliveryInd, EncodedString, FromAddress, MessageClass,
    MmsStatus, MmsVersion, NotificationInd, NotifyRespInd, Param, Part, Pdu, Priority, RawHeader,
    ResponseStatus, RetrieveConf, SendConf, SendReq, TimeValue, decode, decode_push, encode,
    encode_push,
};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

fn token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9+./=@-]{1,24}"
}

fn encoded_string() -> impl Strategy<Value = EncodedString> {
    prop_oneof![
        token().prop_map(EncodedString::new),
        "[a-zA-Z0-9 éüß]{1,16}".prop_map(EncodedString::utf8),
    ]
}

fn version() -> impl Strategy<Value = MmsVersion> {
    (0u8..=3).prop_map(|minor| MmsVersion { major: 1, minor })
}

fn message_class() -> impl Strategy<Value = MessageClass> {
    prop_oneof![
        Just(MessageClass::Personal),
        Just(MessageClass::Advertisement),
        Just(MessageClass::Informational),
        Just(MessageClass::Auto),
        "[a-z]{1,10}".prop_map(MessageClass::Other),
    ]
}

fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High)
    ]
}

fn time_value() -> impl Strategy<Value = TimeValue> {
    prop_oneof![
        any::<u64>().prop_map(TimeValue::Absolute),
        any::<u64>().prop_map(TimeValue::Relative),
    ]
}

fn mms_status() -> impl Strategy<Value = MmsStatus> {
    prop_oneof![
        Just(MmsStatus::Expired),
        Just(MmsStatus::Retrieved),
        Just(MmsStatus::Rejected),
        Just(MmsStatus::Deferred),
        Just(MmsStatus::Unrecognised),
        Just(MmsStatus::Indeterminate),
        Just(MmsStatus::Forwarded),
        Just(MmsStatus::Unreachable),
        (0x88u8..=0xFF).prop_map(MmsStatus::Other),
    ]
}

fn response_status() -> impl Strategy<Value = ResponseStatus> {
    (0x80u8..=0xFF).prop_map(ResponseStatus)
}

fn from_address() -> impl Strategy<Value = FromAddress> {
    prop_oneof![
        Just(FromAddress::Insert),
        encoded_string().prop_map(FromAddress::Present),
    ]
}

/// Headers no message type interprets, so they always land in `extra_headers`.
fn raw_header() -> impl Strategy<Value = RawHeader> {
    let well_known_value = prop_oneof![
        (0x80u8..=0xFF).prop_map(|b| vec![b]),
        "[a-z]{1,8}".prop_map(|s| {
            let mut v = s.into_bytes();
            v.push(0);
            v
        }),
        vec(any::<u8>(), 0..=30).prop_map(|data| {
            let mut v = vec![data.len() as u8];
            v.extend(data);
            v
        }),
    ];
    prop_oneof![
        (0x30u8..=0x3F, well_known_value)
            .prop_map(|(code, value)| RawHeader::WellKnown { code, value }),
        ("X-[A-Za-z]{1,8}", "[a-z0-9]{1,8}")
            .prop_map(|(name, value)| RawHeader::Application { name, value }),
    ]
}

fn extra_headers() -> impl Strategy<Value = Vec<RawHeader>> {
    vec(raw_header(), 0..3)
}

fn part() -> impl Strategy<Value = Part> {
    let content_type = prop_oneof![
        Just(ContentType::new("text/plain").with_param(Param::Charset(Charset::UTF_8))),
        Just(ContentType::new("image/jpeg")),
        Just(ContentType::new(SMIL)),
        "[a-z]{1,8}\\.png"
            .prop_map(|name| ContentType::new("image/png").with_param(Param::Name(name))),
    ];
    (
        content_type,
        option::of("<[a-z0-9]{1,8}>"),
        option::of("[a-z0-9]{1,8}\\.bin"),
        vec(any::<u8>(), 0..64),
    )
        .prop_map(|(content_type, content_id, content_location, data)| {
            let mut part = Part::new(content_type, data);
            part.content_id = content_id;
            part.content_location = content_location;
            part
        })
}

fn multipart_body() -> impl Strategy<Value = (ContentType, Vec<Part>)> {
    let content_type = prop_oneof![
        Just(ContentType::new(MULTIPART_MIXED)),
        Just(
            ContentType::new(MULTIPART_RELATED)
                .with_param(Param::Start("<smil>".into()))
                .with_param(Param::Type(SMIL.into()))
        ),
    ];
    (content_type, vec(part(), 0..4))
}

fn single_part_body() -> impl Strategy<Value = (ContentType, Vec<Part>)> {
    vec(any::<u8>(), 0..64).prop_map(|data| {
        let ct = ContentType::new("text/plain");
        (ct.clone(), vec![Part::new(ct, data)])
    })
}

fn notification_ind() -> impl Strategy<Value = Pdu> {
    (
        (token(), version(), option::of(from_address())),
        (
            option::of(encoded_string()),
            option::of(any::<bool>()),
            message_class(),
        ),
        (any::<u64>(), time_value(), token(), extra_headers()),
    )
        .prop_map(
            |(
                (transaction_id, version, from),
                (subject, delivery_report, message_class),
                (message_size, expiry, content_location, extra_headers),
            )| {
                Pdu::NotificationInd(NotificationInd {
                    transaction_id,
                    version,
                    from,
                    subject,
                    delivery_report,
                    message_class,
                    message_size,
                    expiry,
                    content_location,
                    extra_headers,
                })
            },
        )
}

fn notify_resp_ind() -> impl Strategy<Value = Pdu> {
    (
        token(),
        version(),
        mms_status(),
        option::of(any::<bool>()),
        extra_headers(),
    )
        .prop_map(
            |(transaction_id, version, status, report_allowed, extra_headers)| {
                Pdu::NotifyRespInd(NotifyRespInd {
                    transaction_id,
                    version,
                    status,
                    report_allowed,
                    extra_headers,
                })
            },
        )
}

fn send_conf() -> impl Strategy<Value = Pdu> {
    (
        token(),
        version(),
        response_status(),
        option::of(encoded_string()),
        option::of(token()),
        extra_headers(),
    )
        .prop_map(
            |(transaction_id, version, response_status, response_text, message_id, extra_headers)| {
                Pdu::SendConf(SendConf {
                    transaction_id,
                    version,
                    response_status,
                    response_text,
                    message_id,
                    extra_headers,
                })
            },
        )
}

fn delivery_ind() -> impl Strategy<Value = Pdu> {
    (
        version(),
        token(),
        vec(encoded_string(), 1..3),
        any::<u64>(),
        mms_status(),
        extra_headers(),
    )
        .prop_map(|(version, message_id, to, date, status, extra_headers)| {
            Pdu::DeliveryInd(DeliveryInd {
                version,
                message_id,
                to,
                date,
                status,
                extra_headers,
            })
        })
}

fn acknowledge_ind(optional_tail: bool) -> impl Strategy<Value = Pdu> {
    let report_allowed = if optional_tail {
        option::of(any::<bool>()).boxed()
    } else {
        Just(None).boxed()
    };
    let extras = if optional_tail {
        extra_headers().boxed()
    } else {
        Just(Vec::new()).boxed()
    };
    (token(), version(), report_allowed, extras).prop_map(
        |(transaction_id, version, report_allowed, extra_headers)| {
            Pdu::AcknowledgeInd(AcknowledgeInd {
                transaction_id,
                version,
                report_allowed,
                extra_headers,
            })
        },
    )
}

fn send_req(
    body: impl Strategy<Value = (ContentType, Vec<Part>)>,
) -> impl Strategy<Value = Pdu> {
    (
        (token(), version(), option::of(any::<u64>()), from_address()),
        (
            vec(encoded_string(), 1..3),
            vec(encoded_string(), 0..2),
            vec(encoded_string(), 0..2),
        ),
        (
            option::of(encoded_string()),
            option::of(message_class()),
            option::of(time_value()),
            option::of(priority()),
        ),
        (
            option::of(any::<bool>()),
            option::of(any::<bool>()),
            extra_headers(),
        ),
        body,
    )
        .prop_map(
            |(
                (transaction_id, version, date, from),
                (to, cc, bcc),
                (subject, message_class, expiry, priority),
                (delivery_report, read_report, extra_headers),
                (content_type, parts),
            )| {
                Pdu::SendReq(SendReq {
                    transaction_id,
                    version,
                    date,
                    from,
                    to,
                    cc,
                    bcc,
                    subject,
                    message_class,
                    expiry,
                    priority,
                    delivery_report,
                    read_report,
                    extra_headers,
                    content_type,
                    parts,
                })
            },
        )
}

fn retrieve_conf(
    body: impl Strategy<Value = (ContentType, Vec<Part>)>,
) -> impl Strategy<Value = Pdu> {
    (
        (
            option::of(token()),
            version(),
            option::of(token()),
            any::<u64>(),
            option::of(from_address()),
        ),
        (
            vec(encoded_string(), 0..3),
            vec(encoded_string(), 0..2),
            option::of(encoded_string()),
            option::of(message_class()),
            option::of(priority()),
        ),
        (
            option::of(any::<bool>()),
            option::of(any::<bool>()),
            option::of(response_status()),
            option::of(encoded_string()),
            extra_headers(),
        ),
        body,
    )
        .prop_map(
            |(
                (transaction_id, version, message_id, date, from),
                (to, cc, subject, message_class, priority),
                (delivery_report, read_report, retrieve_status, retrieve_text, extra_headers),
                (content_type, parts),
            )| {
                Pdu::RetrieveConf(RetrieveConf {
                    transaction_id,
                    version,
                    message_id,
                    date,
                    from,
                    to,
                    cc,
                    subject,
                    message_class,
                    priority,
                    delivery_report,
                    read_report,
                    retrieve_status,
                    retrieve_text,
                    extra_headers,
                    content_type,
                    parts,
                })
            },
        )
}

fn any_pdu() -> impl Strategy<Value = Pdu> {
    prop_oneof![
        notification_ind(),
        notify_resp_ind(),
        send_conf(),
        delivery_ind(),
        acknowledge_ind(true),
        send_req(prop_oneof![multipart_body(), single_part_body()]),
        retrieve_conf(prop_oneof![multipart_body(), single_part_body()]),
    ]
}

/// PDUs whose encoding carries enough framing to detect truncation anywhere.
///
/// A single-part body has no length of its own and an Acknowledge-Ind may end
/// in optional headers, so a cut at those boundaries still reads as valid.
fn framed_pdu() -> impl Strategy<Value = Pdu> {
    prop_oneof![
        notification_ind(),
        notify_resp_ind(),
        send_conf(),
        delivery_ind(),
        acknowledge_ind(false),
        send_req(multipart_body()),
        retrieve_conf(multipart_body()),
    ]
}

proptest! {
    #[test]
    fn decode_inverts_encode(pdu in any_pdu()) {
        let bytes = encode(&pdu).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn push_envelope_inverts(pdu in any_pdu(), tid in 0u8..0x80) {
        let bytes = encode_push(tid, &pdu).unwrap();
        prop_assert_eq!(decode_push(&bytes).unwrap(), pdu);
    }

    #[test]
    fn every_strict_prefix_is_an_error(pdu in framed_pdu()) {
        let bytes = encode(&pdu).unwrap();
        for len in 0..bytes.len() {
            prop_assert!(decode(&bytes[..len]).is_err(), "prefix of {} octets decoded", len);
        }
    }

    #[test]
    fn arbitrary_input_never_panics(bytes in vec(any::<u8>(), 0..512)) {
        let _ = decode(&bytes);
        let _ = decode_push(&bytes);
    }

    #[test]
    fn arbitrary_headers_never_panic(
        message_type in 0x80u8..=0x86,
        rest in vec(any::<u8>(), 0..512),
    ) {
        let mut bytes = vec![0x8C, message_type];
        bytes.extend(rest);
        let _ = decode(&bytes);
    }
}

#[test]
fn decodes_captured_notification() {
    let bytes = hex::decode(
        "8c82985431008d928918802b31353535313233343536372f545950453d504c4d4e008a808e020b20\
         88058103093a8083687474703a2f2f6d6d73632e6578616d706c652f543100",
    )
    .unwrap();
    let Pdu::NotificationInd(ind) = decode(&bytes).unwrap() else {
        panic!("expected a notification");
    };
    assert_eq!(ind.transaction_id, "T1");
    assert_eq!(ind.version, MmsVersion::V1_2);
    assert_eq!(
        ind.from.as_ref().and_then(FromAddress::address),
        Some("+15551234567/TYPE=PLMN")
    );
    assert_eq!(ind.message_class, MessageClass::Personal);
    assert_eq!(ind.message_size, 2848);
    assert_eq!(ind.expiry, TimeValue::Relative(604_800));
    assert_eq!(ind.content_location, "http://mmsc.example/T1");
    assert!(ind.extra_headers.is_empty());
}
