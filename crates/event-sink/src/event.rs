// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded probe events.
//!
//! An event on the wire is a JSON object tagged by `action`, with the
//! protocol-specific fields nested under a key named after the action:
//!
//! ```json
//! {"action":"http_request","id":"...","http_request":{"method":"GET","body":"..."}}
//! ```
//!
//! [`Event`] keeps the protocol-specific object as a typed [`EventKind`] and
//! every other top-level field untouched in [`Event::metadata`], so an event can
//! be re-encoded after redaction without losing unrelated fields.

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const ACTION: &str = "action";

pub const ICMP: &str = "icmp";
pub const HTTP_REQUEST: &str = "http_request";
pub const HTTP_RESPONSE: &str = "http_response";
pub const SIP_REQUEST: &str = "sip_request";
pub const SIP_RESPONSE: &str = "sip_response";
pub const SMTP_DATA: &str = "smtp_data";
pub const UNRECOGNISED_STREAM: &str = "unrecognised_stream";
pub const UNRECOGNISED_DATAGRAM: &str = "unrecognised_datagram";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcmpDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Shared by `http_request` and `http_response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Shared by `sip_request` and `sip_response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SipDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpDataDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Shared by `unrecognised_stream` and `unrecognised_datagram`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnrecognisedDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: String,
    /// Length in bytes of `payload` as it was before redaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_length: Option<usize>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Icmp(IcmpDetail),
    HttpRequest(HttpDetail),
    HttpResponse(HttpDetail),
    SipRequest(SipDetail),
    SipResponse(SipDetail),
    SmtpData(SmtpDataDetail),
    UnrecognisedStream(UnrecognisedDetail),
    UnrecognisedDatagram(UnrecognisedDetail),
    /// Any other action. Its fields stay in [`Event::metadata`].
    Other(String),
}

impl EventKind {
    pub fn action(&self) -> &str {
        match self {
            EventKind::Icmp(_) => ICMP,
            EventKind::HttpRequest(_) => HTTP_REQUEST,
            EventKind::HttpResponse(_) => HTTP_RESPONSE,
            EventKind::SipRequest(_) => SIP_REQUEST,
            EventKind::SipResponse(_) => SIP_RESPONSE,
            EventKind::SmtpData(_) => SMTP_DATA,
            EventKind::UnrecognisedStream(_) => UNRECOGNISED_STREAM,
            EventKind::UnrecognisedDatagram(_) => UNRECOGNISED_DATAGRAM,
            EventKind::Other(action) => action,
        }
    }

    /// Pulls the variant object for `action` out of `fields`.
    fn decode(action: String, fields: &mut Map<String, Value>) -> Result<Self, serde_json::Error> {
        let known = match action.as_str() {
            ICMP => Some(EventKind::Icmp(detail(fields, ICMP)?)),
            HTTP_REQUEST => Some(EventKind::HttpRequest(detail(fields, HTTP_REQUEST)?)),
            HTTP_RESPONSE => Some(EventKind::HttpResponse(detail(fields, HTTP_RESPONSE)?)),
            SIP_REQUEST => Some(EventKind::SipRequest(detail(fields, SIP_REQUEST)?)),
            SIP_RESPONSE => Some(EventKind::SipResponse(detail(fields, SIP_RESPONSE)?)),
            SMTP_DATA => Some(EventKind::SmtpData(detail(fields, SMTP_DATA)?)),
            UNRECOGNISED_STREAM => Some(EventKind::UnrecognisedStream(detail(
                fields,
                UNRECOGNISED_STREAM,
            )?)),
            UNRECOGNISED_DATAGRAM => Some(EventKind::UnrecognisedDatagram(detail(
                fields,
                UNRECOGNISED_DATAGRAM,
            )?)),
            _ => None,
        };
        Ok(known.unwrap_or(EventKind::Other(action)))
    }
}

fn detail<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &'static str,
) -> Result<T, serde_json::Error> {
    let value = fields
        .remove(key)
        .ok_or_else(|| serde_json::Error::missing_field(key))?;
    serde_json::from_value(value)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single probe event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Every top-level field except `action` and the variant object.
    pub metadata: Map<String, Value>,
}

impl Event {
    pub fn action(&self) -> &str {
        self.kind.action()
    }

    pub fn from_slice(msg: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(msg)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut metadata = Map::<String, Value>::deserialize(deserializer)?;
        let action = match metadata.remove(ACTION) {
            Some(Value::String(action)) => action,
            Some(_) => return Err(D::Error::custom("field `action` must be a string")),
            None => return Err(D::Error::missing_field(ACTION)),
        };
        let kind = EventKind::decode(action, &mut metadata).map_err(D::Error::custom)?;
        Ok(Event { kind, metadata })
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(ACTION, self.action())?;
        match &self.kind {
            EventKind::Icmp(detail) => map.serialize_entry(ICMP, detail)?,
            EventKind::HttpRequest(detail) => map.serialize_entry(HTTP_REQUEST, detail)?,
            EventKind::HttpResponse(detail) => map.serialize_entry(HTTP_RESPONSE, detail)?,
            EventKind::SipRequest(detail) => map.serialize_entry(SIP_REQUEST, detail)?,
            EventKind::SipResponse(detail) => map.serialize_entry(SIP_RESPONSE, detail)?,
            EventKind::SmtpData(detail) => map.serialize_entry(SMTP_DATA, detail)?,
            EventKind::UnrecognisedStream(detail) => {
                map.serialize_entry(UNRECOGNISED_STREAM, detail)?
            }
            EventKind::UnrecognisedDatagram(detail) => {
                map.serialize_entry(UNRECOGNISED_DATAGRAM, detail)?
            }
            EventKind::Other(_) => {}
        }
        for (key, value) in &self.metadata {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
