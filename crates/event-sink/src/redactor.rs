// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Strips large payload-bearing fields from events before they are batched.
//!
//! The two "unrecognised" variants are always annotated with
//! `payload_length`, whether or not stripping is enabled. Every other known
//! variant is only touched when stripping is enabled, and unknown actions are
//! never touched.
//!
//! Redacting an already-redacted unrecognised event re-derives the length
//! from the now-empty payload, so `payload_length` becomes 0 on the second
//! pass. The output of a second pass is otherwise identical to the first.

use crate::event::{Event, EventKind, UnrecognisedDetail};

#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor {
    strip_payload: bool,
}

impl Redactor {
    #[must_use]
    pub fn new(strip_payload: bool) -> Self {
        Redactor { strip_payload }
    }

    /// Redacts `event` in place. Returns whether it was changed and needs to
    /// be re-encoded.
    pub fn redact(&self, event: &mut Event) -> bool {
        match &mut event.kind {
            EventKind::UnrecognisedStream(detail) | EventKind::UnrecognisedDatagram(detail) => {
                self.annotate(detail);
                true
            }
            _ if !self.strip_payload => false,
            EventKind::Icmp(detail) => clear(&mut detail.payload),
            EventKind::HttpRequest(detail) | EventKind::HttpResponse(detail) => {
                clear(&mut detail.body)
            }
            EventKind::SipRequest(detail) | EventKind::SipResponse(detail) => {
                clear(&mut detail.payload)
            }
            EventKind::SmtpData(detail) => clear(&mut detail.data),
            EventKind::Other(_) => false,
        }
    }

    fn annotate(&self, detail: &mut UnrecognisedDetail) {
        detail.payload_length = Some(detail.payload.len());
        if self.strip_payload {
            detail.payload.clear();
        }
    }
}

fn clear(field: &mut String) -> bool {
    field.clear();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn event(value: Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    fn to_value(event: &Event) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn unrecognised_stream_is_annotated_without_stripping() {
        let mut e = event(json!({
            "action": "unrecognised_stream",
            "unrecognised_stream": {"payload": "aGVsbG8gd29ybGQ=", "position": 0}
        }));
        assert!(Redactor::new(false).redact(&mut e));
        assert_eq!(
            to_value(&e)["unrecognised_stream"],
            json!({"payload": "aGVsbG8gd29ybGQ=", "payload_length": 16, "position": 0})
        );
    }

    #[test]
    fn unrecognised_datagram_is_annotated_and_stripped() {
        let mut e = event(json!({
            "action": "unrecognised_datagram",
            "id": "x",
            "unrecognised_datagram": {"payload": "AAECAw=="}
        }));
        assert!(Redactor::new(true).redact(&mut e));
        assert_eq!(
            to_value(&e),
            json!({
                "action": "unrecognised_datagram",
                "id": "x",
                "unrecognised_datagram": {"payload": "", "payload_length": 8}
            })
        );
    }

    #[test]
    fn named_variants_untouched_when_disabled() {
        let cases = [
            json!({"action": "icmp", "icmp": {"type": 8, "code": 0, "payload": "cGluZw=="}}),
            json!({"action": "http_request", "http_request": {"method": "GET", "body": "e30="}}),
            json!({"action": "http_response", "http_response": {"code": 200, "body": "PGh0bWw+"}}),
            json!({"action": "sip_request", "sip_request": {"method": "INVITE", "payload": "djA="}}),
            json!({"action": "sip_response", "sip_response": {"code": 180, "payload": "djA="}}),
            json!({"action": "smtp_data", "smtp_data": {"from": "a@b", "data": "SGk="}}),
        ];
        for case in cases {
            let mut e = event(case.clone());
            assert!(!Redactor::new(false).redact(&mut e), "{case}");
            assert_eq!(to_value(&e), case);
        }
    }

    #[test]
    fn named_variants_strip_exactly_their_field() {
        let cases = [
            (
                json!({"action": "icmp", "id": "1", "icmp": {"type": 8, "payload": "cGluZw=="}}),
                "/icmp/payload",
            ),
            (
                json!({"action": "http_request", "http_request": {"method": "GET", "body": "e30="}}),
                "/http_request/body",
            ),
            (
                json!({"action": "http_response", "http_response": {"code": 200, "body": "PGh0bWw+"}}),
                "/http_response/body",
            ),
            (
                json!({"action": "sip_request", "sip_request": {"from": "a", "payload": "djA="}}),
                "/sip_request/payload",
            ),
            (
                json!({"action": "sip_response", "sip_response": {"to": "b", "payload": "djA="}}),
                "/sip_response/payload",
            ),
            (
                json!({"action": "smtp_data", "smtp_data": {"to": ["c@d"], "data": "SGk="}}),
                "/smtp_data/data",
            ),
        ];
        for (case, pointer) in cases {
            let mut e = event(case.clone());
            assert!(Redactor::new(true).redact(&mut e), "{case}");

            let mut expected = case.clone();
            *expected.pointer_mut(pointer).unwrap() = json!("");
            assert_eq!(to_value(&e), expected);
        }
    }

    #[test]
    fn unknown_actions_pass_through() {
        let case = json!({"action": "dns_message", "dns_message": {"payload": "keep me"}});
        for strip in [false, true] {
            let mut e = event(case.clone());
            assert!(!Redactor::new(strip).redact(&mut e));
            assert_eq!(to_value(&e), case);
        }
    }

    #[test]
    fn second_pass_resets_length_to_zero() {
        let redactor = Redactor::new(true);
        let mut e = event(json!({
            "action": "unrecognised_stream",
            "unrecognised_stream": {"payload": "AAAA"}
        }));
        redactor.redact(&mut e);
        redactor.redact(&mut e);
        let EventKind::UnrecognisedStream(detail) = &e.kind else {
            panic!("unexpected kind");
        };
        assert_eq!(detail.payload_length, Some(0));
        assert!(detail.payload.is_empty());
    }

    proptest! {
        #[test]
        fn unrecognised_length_matches_original(payload in ".*", strip in any::<bool>()) {
            let mut e = event(json!({
                "action": "unrecognised_datagram",
                "unrecognised_datagram": {"payload": payload.clone()}
            }));
            Redactor::new(strip).redact(&mut e);
            let EventKind::UnrecognisedDatagram(detail) = &e.kind else {
                panic!("unexpected kind");
            };
            prop_assert_eq!(detail.payload_length, Some(payload.len()));
            if strip {
                prop_assert!(detail.payload.is_empty());
            } else {
                prop_assert_eq!(&detail.payload, &payload);
            }
        }

        #[test]
        fn stripping_named_variants_is_idempotent(body in ".*", method in "[A-Z]{3,7}") {
            let redactor = Redactor::new(true);
            let mut once = event(json!({
                "action": "http_request",
                "http_request": {"method": method, "body": body}
            }));
            redactor.redact(&mut once);
            let mut twice = once.clone();
            redactor.redact(&mut twice);
            prop_assert_eq!(once, twice);
        }
    }
}
