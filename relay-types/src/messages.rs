//! NIP-01 protocol messages.
//!
//! Both directions are JSON arrays carried in WebSocket text frames:
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | client → relay | `["EVENT", event]`, `["REQ", sub_id, filter...]`, `["CLOSE", sub_id]` |
//! | relay → client | `["EVENT", sub_id, event]`, `["OK", event_id, accepted, message]`, `["EOSE", sub_id]`, `["CLOSED", sub_id, message]`, `["NOTICE", message]`, `["AUTH", challenge]` |

use serde_json::{json, Value};

use crate::{Event, Filter, SubscriptionId, TypesError};

/// A message sent from client to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Publish an event.
    Event(Event),
    /// Open a subscription.
    Req {
        /// Subscription id.
        sub_id: SubscriptionId,
        /// One or more filters (OR-ed by the relay).
        filters: Vec<Filter>,
    },
    /// Close a subscription.
    Close(SubscriptionId),
}

impl ClientMessage {
    /// Render as a JSON text frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req { sub_id, filters } => {
                let mut arr = vec![json!("REQ"), json!(sub_id.as_str())];
                for filter in filters {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close(sub_id) => json!(["CLOSE", sub_id.as_str()]),
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Parse a client frame (used by relay-side test harnesses).
    pub fn parse(text: &str) -> Result<Self, TypesError> {
        let arr = parse_array(text)?;
        match str_at(&arr, 0)? {
            "EVENT" => {
                let ev = arr
                    .get(1)
                    .cloned()
                    .ok_or_else(|| malformed("EVENT without event"))?;
                Ok(ClientMessage::Event(serde_json::from_value(ev)?))
            }
            "REQ" => {
                let sub_id = SubscriptionId::new(str_at(&arr, 1)?);
                let filters = arr[2..]
                    .iter()
                    .cloned()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req { sub_id, filters })
            }
            "CLOSE" => Ok(ClientMessage::Close(SubscriptionId::new(str_at(&arr, 1)?))),
            other => Err(malformed(&format!("unknown client message {other}"))),
        }
    }
}

/// A message received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// An event delivered for a subscription.
    Event {
        /// Subscription the event belongs to.
        sub_id: SubscriptionId,
        /// The event (not yet verified).
        event: Box<Event>,
    },
    /// Publish acknowledgment.
    Ok {
        /// Id of the event being acknowledged.
        event_id: String,
        /// Whether the relay stored the event.
        accepted: bool,
        /// Machine-prefixed human-readable message.
        message: String,
    },
    /// End of stored events for a subscription.
    Eose(SubscriptionId),
    /// The relay ended a subscription.
    Closed {
        /// Subscription id.
        sub_id: SubscriptionId,
        /// Reason given by the relay.
        message: String,
    },
    /// Human-readable notice.
    Notice(String),
    /// Authentication challenge.
    Auth(String),
}

impl RelayMessage {
    /// Parse a relay frame.
    pub fn parse(text: &str) -> Result<Self, TypesError> {
        let arr = parse_array(text)?;
        match str_at(&arr, 0)? {
            "EVENT" => {
                let sub_id = SubscriptionId::new(str_at(&arr, 1)?);
                let ev = arr
                    .get(2)
                    .cloned()
                    .ok_or_else(|| malformed("EVENT without event"))?;
                Ok(RelayMessage::Event {
                    sub_id,
                    event: Box::new(serde_json::from_value(ev)?),
                })
            }
            "OK" => {
                let event_id = str_at(&arr, 1)?.to_string();
                let accepted = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| malformed("OK without accepted flag"))?;
                let message = arr.get(3).and_then(Value::as_str).unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose(SubscriptionId::new(str_at(&arr, 1)?))),
            "CLOSED" => Ok(RelayMessage::Closed {
                sub_id: SubscriptionId::new(str_at(&arr, 1)?),
                message: arr.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice(str_at(&arr, 1)?.to_string())),
            "AUTH" => Ok(RelayMessage::Auth(str_at(&arr, 1)?.to_string())),
            other => Err(malformed(&format!("unknown relay message {other}"))),
        }
    }

    /// Render as a JSON text frame (used by relay-side test harnesses).
    pub fn to_json(&self) -> Result<String, TypesError> {
        let value = match self {
            RelayMessage::Event { sub_id, event } => json!(["EVENT", sub_id.as_str(), event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Eose(sub_id) => json!(["EOSE", sub_id.as_str()]),
            RelayMessage::Closed { sub_id, message } => {
                json!(["CLOSED", sub_id.as_str(), message])
            }
            RelayMessage::Notice(message) => json!(["NOTICE", message]),
            RelayMessage::Auth(challenge) => json!(["AUTH", challenge]),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

fn parse_array(text: &str) -> Result<Vec<Value>, TypesError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(arr) => Ok(arr),
        _ => Err(malformed("frame is not a JSON array")),
    }
}

fn str_at(arr: &[Value], idx: usize) -> Result<&str, TypesError> {
    arr.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&format!("expected string at position {idx}")))
}

fn malformed(msg: &str) -> TypesError {
    TypesError::MalformedMessage(msg.to_string())
}
