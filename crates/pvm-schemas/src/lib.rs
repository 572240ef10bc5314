//! Typed records for the four marketplace broker topics.
//!
//! Every inbound payload goes through one decode step
//! ([`InboundEvent::decode`]) that validates required fields once and yields
//! either a typed record or a [`DecodeError`]. Handlers never touch untyped
//! JSON maps.

pub mod coerce;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::coerce::{coerce_bool, coerce_int, coerce_string, coerce_timestamp};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// The four logical channels the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Info,
    Requests,
    Validation,
    Auctions,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::Info,
        Topic::Requests,
        Topic::Validation,
        Topic::Auctions,
    ];
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle status of a purchase request.
///
/// `PENDING -> OK -> {ACCEPTED, REJECTED, ERROR}`; ERROR is also reachable
/// directly from ACCEPTED (insufficient-funds abort) and from PENDING
/// (outbound publication failure at the API layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    Ok,
    Accepted,
    Rejected,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Ok => "OK",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Error => "ERROR",
        }
    }

    /// Case-insensitive parse; foreign groups are not consistent about casing.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(RequestStatus::Pending),
            "OK" => Some(RequestStatus::Ok),
            "ACCEPTED" => Some(RequestStatus::Accepted),
            "REJECTED" => Some(RequestStatus::Rejected),
            "ERROR" => Some(RequestStatus::Error),
            _ => None,
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted | RequestStatus::Rejected | RequestStatus::Error
        )
    }
}

/// Phase of a peer-to-peer slot-exchange negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuctionOp {
    Offer,
    Proposal,
    Acceptance,
    Rejection,
}

impl AuctionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionOp::Offer => "offer",
            AuctionOp::Proposal => "proposal",
            AuctionOp::Acceptance => "acceptance",
            AuctionOp::Rejection => "rejection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offer" => Some(AuctionOp::Offer),
            "proposal" => Some(AuctionOp::Proposal),
            "acceptance" => Some(AuctionOp::Acceptance),
            "rejection" => Some(AuctionOp::Rejection),
            _ => None,
        }
    }
}

/// Negotiation status of one auction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionStatus {
    Active,
    Accepted,
    Rejected,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Accepted => "accepted",
            AuctionStatus::Rejected => "rejected",
        }
    }
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// A listing announcement on `properties/info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingInfo {
    pub url: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub m2: Option<i64>,
    /// Normalized as `{"address": <raw location>}`.
    pub location: Option<Value>,
    pub img: Option<String>,
    pub is_project: bool,
    pub timestamp: Option<DateTime<Utc>>,
    /// Initial slot capacity; absent means "use the default" (3).
    pub visit_slots: Option<i64>,
}

/// A purchase-intent announcement on `properties/requests` (self-originated
/// or foreign).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAnnouncement {
    pub request_id: String,
    pub group_id: String,
    pub url: String,
    pub origin: i64,
    pub operation: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A validation outcome on `properties/validation`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub request_id: String,
    pub status: RequestStatus,
    pub group_id: Option<String>,
    /// Selling group, when the validator names one.
    pub seller: Option<String>,
    pub reason: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One phase of a three-phase exchange on `properties/auctions`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionMessage {
    pub auction_id: String,
    /// Empty on offers; set on proposals and decisions.
    pub proposal_id: Option<String>,
    pub url: String,
    pub quantity: i64,
    pub group_id: String,
    pub operation: AuctionOp,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A decoded inbound broker message, tagged by topic.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Info(ListingInfo),
    Request(RequestAnnouncement),
    Validation(ValidationOutcome),
    Auction(AuctionMessage),
}

impl InboundEvent {
    /// Decode one raw payload for a topic into a typed record.
    ///
    /// Required-field validation happens here, once; downstream handlers
    /// never see a payload this function rejected.
    pub fn decode(topic: Topic, payload: &str) -> Result<Self, DecodeError> {
        match topic {
            Topic::Info => {
                let wire: InfoWire = serde_json::from_str(payload)?;
                Ok(InboundEvent::Info(wire.try_into()?))
            }
            Topic::Requests => {
                let wire: RequestWire = serde_json::from_str(payload)?;
                Ok(InboundEvent::Request(wire.try_into()?))
            }
            Topic::Validation => {
                let wire: ValidationWire = serde_json::from_str(payload)?;
                Ok(InboundEvent::Validation(wire.try_into()?))
            }
            Topic::Auctions => {
                let wire: AuctionWire = serde_json::from_str(payload)?;
                Ok(InboundEvent::Auction(wire.try_into()?))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Why an inbound payload could not be turned into a typed record.
///
/// A decode failure is not fatal to the engine: the message is logged and
/// dropped without any state mutation.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload was not a JSON object at all.
    Json(serde_json::Error),
    /// A field the topic contract requires was absent or null.
    MissingField(&'static str),
    /// An enum-like field carried a value outside its vocabulary.
    InvalidValue { field: &'static str, value: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "payload is not valid JSON: {e}"),
            DecodeError::MissingField(name) => write!(f, "missing required field `{name}`"),
            DecodeError::InvalidValue { field, value } => {
                write!(f, "field `{field}` has invalid value {value:?}")
            }
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e)
    }
}

// ---------------------------------------------------------------------------
// Wire structs: loose shapes as other groups actually send them
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InfoWire {
    url: Option<String>,
    name: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    bedrooms: Option<Value>,
    bathrooms: Option<Value>,
    m2: Option<Value>,
    location: Option<Value>,
    img: Option<String>,
    is_project: Option<Value>,
    timestamp: Option<String>,
    visit_slots: Option<Value>,
}

impl TryFrom<InfoWire> for ListingInfo {
    type Error = DecodeError;

    fn try_from(w: InfoWire) -> Result<Self, DecodeError> {
        let url = require_str(w.url, "url")?;
        Ok(ListingInfo {
            url,
            name: w.name,
            price: w.price,
            currency: w.currency.unwrap_or_else(|| "CLP".to_string()),
            bedrooms: w.bedrooms.as_ref().and_then(coerce_int),
            bathrooms: w.bathrooms.as_ref().and_then(coerce_int),
            m2: w.m2.as_ref().and_then(coerce_int),
            location: w.location.map(|loc| serde_json::json!({ "address": loc })),
            img: w.img,
            is_project: w.is_project.as_ref().map(coerce_bool).unwrap_or(false),
            timestamp: w.timestamp.as_deref().and_then(coerce_timestamp),
            visit_slots: w.visit_slots.as_ref().and_then(coerce_int),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RequestWire {
    request_id: Option<Value>,
    group_id: Option<Value>,
    url: Option<String>,
    origin: Option<Value>,
    operation: Option<String>,
    timestamp: Option<String>,
}

impl TryFrom<RequestWire> for RequestAnnouncement {
    type Error = DecodeError;

    fn try_from(w: RequestWire) -> Result<Self, DecodeError> {
        let request_id = w
            .request_id
            .as_ref()
            .and_then(coerce_string)
            .ok_or(DecodeError::MissingField("request_id"))?;
        let url = require_str(w.url, "url")?;
        Ok(RequestAnnouncement {
            request_id,
            group_id: w.group_id.as_ref().and_then(coerce_string).unwrap_or_default(),
            url,
            origin: w.origin.as_ref().and_then(coerce_int).unwrap_or(0),
            operation: w.operation.unwrap_or_else(|| "BUY".to_string()),
            timestamp: w.timestamp.as_deref().and_then(coerce_timestamp),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValidationWire {
    request_id: Option<Value>,
    status: Option<String>,
    group_id: Option<Value>,
    seller: Option<Value>,
    reason: Option<String>,
    timestamp: Option<String>,
}

impl TryFrom<ValidationWire> for ValidationOutcome {
    type Error = DecodeError;

    fn try_from(w: ValidationWire) -> Result<Self, DecodeError> {
        let request_id = w
            .request_id
            .as_ref()
            .and_then(coerce_string)
            .ok_or(DecodeError::MissingField("request_id"))?;
        let raw_status = w.status.ok_or(DecodeError::MissingField("status"))?;
        let status = RequestStatus::parse(&raw_status).ok_or(DecodeError::InvalidValue {
            field: "status",
            value: raw_status,
        })?;
        Ok(ValidationOutcome {
            request_id,
            status,
            group_id: w.group_id.as_ref().and_then(coerce_string),
            seller: w.seller.as_ref().and_then(coerce_string),
            reason: w.reason,
            timestamp: w.timestamp.as_deref().and_then(coerce_timestamp),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuctionWire {
    auction_id: Option<Value>,
    proposal_id: Option<Value>,
    url: Option<String>,
    quantity: Option<Value>,
    group_id: Option<Value>,
    operation: Option<String>,
    timestamp: Option<String>,
}

impl TryFrom<AuctionWire> for AuctionMessage {
    type Error = DecodeError;

    fn try_from(w: AuctionWire) -> Result<Self, DecodeError> {
        let auction_id = w
            .auction_id
            .as_ref()
            .and_then(coerce_string)
            .ok_or(DecodeError::MissingField("auction_id"))?;
        let url = require_str(w.url, "url")?;
        let raw_op = w.operation.unwrap_or_else(|| "offer".to_string());
        let operation = AuctionOp::parse(&raw_op).ok_or(DecodeError::InvalidValue {
            field: "operation",
            value: raw_op,
        })?;
        // Offers circulate with proposal_id = ""; normalize that to None.
        let proposal_id = w
            .proposal_id
            .as_ref()
            .and_then(coerce_string)
            .filter(|s| !s.is_empty());
        Ok(AuctionMessage {
            auction_id,
            proposal_id,
            url,
            quantity: w.quantity.as_ref().and_then(coerce_int).unwrap_or(1),
            group_id: w.group_id.as_ref().and_then(coerce_string).unwrap_or_default(),
            operation,
            timestamp: w.timestamp.as_deref().and_then(coerce_timestamp),
        })
    }
}

fn require_str(v: Option<String>, name: &'static str) -> Result<String, DecodeError> {
    match v {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(DecodeError::MissingField(name)),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn info_with_noisy_numbers_coerces() {
        let payload = json!({
            "url": "https://casas.example/p/42",
            "name": "Depto centro",
            "price": 85_000_000.0,
            "bedrooms": "3 dormitorios",
            "bathrooms": 2,
            "m2": "aprox 120 m2",
            "location": "Av. Siempre Viva 742",
            "is_project": false,
            "visit_slots": 5
        })
        .to_string();

        let ev = InboundEvent::decode(Topic::Info, &payload).unwrap();
        let InboundEvent::Info(info) = ev else {
            panic!("expected Info");
        };
        assert_eq!(info.bedrooms, Some(3));
        assert_eq!(info.bathrooms, Some(2));
        assert_eq!(info.m2, Some(120));
        assert_eq!(info.visit_slots, Some(5));
        assert_eq!(info.currency, "CLP");
        assert_eq!(
            info.location,
            Some(json!({"address": "Av. Siempre Viva 742"}))
        );
    }

    #[test]
    fn info_without_url_is_rejected() {
        let payload = json!({"name": "sin url", "price": 1000.0}).to_string();
        let err = InboundEvent::decode(Topic::Info, &payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("url")));
    }

    #[test]
    fn info_field_with_no_embedded_integer_resolves_absent() {
        let payload = json!({
            "url": "https://casas.example/p/1",
            "bedrooms": "studio"
        })
        .to_string();
        let InboundEvent::Info(info) = InboundEvent::decode(Topic::Info, &payload).unwrap()
        else {
            panic!("expected Info");
        };
        assert_eq!(info.bedrooms, None);
    }

    #[test]
    fn request_accepts_numeric_group_id() {
        let payload = json!({
            "request_id": "req-123",
            "group_id": 14,
            "url": "https://casas.example/p/42",
            "origin": 0,
            "operation": "BUY"
        })
        .to_string();
        let InboundEvent::Request(req) =
            InboundEvent::decode(Topic::Requests, &payload).unwrap()
        else {
            panic!("expected Request");
        };
        assert_eq!(req.group_id, "14");
        assert_eq!(req.operation, "BUY");
    }

    #[test]
    fn validation_status_parse_is_case_insensitive() {
        let payload = json!({
            "request_id": "req-123",
            "status": "accepted"
        })
        .to_string();
        let InboundEvent::Validation(v) =
            InboundEvent::decode(Topic::Validation, &payload).unwrap()
        else {
            panic!("expected Validation");
        };
        assert_eq!(v.status, RequestStatus::Accepted);
    }

    #[test]
    fn validation_carries_seller_and_reason() {
        let payload = json!({
            "request_id": "req-123",
            "status": "REJECTED",
            "seller": 14,
            "reason": "no financing"
        })
        .to_string();
        let InboundEvent::Validation(v) =
            InboundEvent::decode(Topic::Validation, &payload).unwrap()
        else {
            panic!("expected Validation");
        };
        assert_eq!(v.seller.as_deref(), Some("14"));
        assert_eq!(v.reason.as_deref(), Some("no financing"));
    }

    #[test]
    fn validation_with_unknown_status_is_invalid() {
        let payload = json!({"request_id": "r", "status": "MAYBE"}).to_string();
        let err = InboundEvent::decode(Topic::Validation, &payload).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue { field: "status", .. }
        ));
    }

    #[test]
    fn auction_requires_auction_id_and_url() {
        let payload = json!({"url": "https://casas.example/p/9"}).to_string();
        let err = InboundEvent::decode(Topic::Auctions, &payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("auction_id")));

        let payload = json!({"auction_id": "a-1"}).to_string();
        let err = InboundEvent::decode(Topic::Auctions, &payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("url")));
    }

    #[test]
    fn auction_empty_proposal_id_normalizes_to_none() {
        let payload = json!({
            "auction_id": "a-1",
            "proposal_id": "",
            "url": "https://casas.example/p/9",
            "quantity": 2,
            "group_id": 7,
            "operation": "offer"
        })
        .to_string();
        let InboundEvent::Auction(a) = InboundEvent::decode(Topic::Auctions, &payload).unwrap()
        else {
            panic!("expected Auction");
        };
        assert_eq!(a.proposal_id, None);
        assert_eq!(a.quantity, 2);
        assert_eq!(a.operation, AuctionOp::Offer);
    }

    #[test]
    fn non_json_payload_is_a_json_error() {
        let err = InboundEvent::decode(Topic::Info, "not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Error.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Ok.is_terminal());
    }
}
