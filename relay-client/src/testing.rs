//! Scripted remote signer for tests.
//!
//! [`FakeBunker`] sits behind a [`MockTransport`] and answers NIP-46
//! requests the way a signer app would: `connect` gets `ack`,
//! `get_public_key` the user's key, `sign_event` an event signed with the
//! user's key. Knobs make it refuse, stay silent, or lie.

use relay_core::{
    kind, BunkerPointer, ConnectSecret, Method, NostrConnectUri, RemoteRequest, RemoteResponse,
    ACK, PONG,
};
use relay_types::{
    ClientMessage, Event, Keys, PublicKey, RelayMessage, SubscriptionId, Tag, UnsignedEvent,
};
use std::sync::{Arc, Mutex};

use crate::crypto::{self, ConversationKey};
use crate::transport::MockTransport;

#[derive(Default)]
struct Script {
    subs: Vec<(SubscriptionId, Vec<String>)>,
    requests: Vec<Method>,
    reject_connect: Option<String>,
    silent: bool,
    auth_url_first: Option<String>,
    reported_user: Option<PublicKey>,
    meddle: bool,
}

/// A remote signer holding `user_keys`, reachable over one mock relay.
#[derive(Clone)]
pub(crate) struct FakeBunker {
    signer_keys: Keys,
    user_keys: Keys,
    script: Arc<Mutex<Script>>,
    relay: MockTransport,
}

impl FakeBunker {
    /// A bunker for a fresh user.
    pub fn new() -> Self {
        Self::for_user(Keys::generate())
    }

    /// A bunker holding `user_keys`.
    pub fn for_user(user_keys: Keys) -> Self {
        let signer_keys = Keys::generate();
        let script = Arc::new(Mutex::new(Script::default()));
        let relay = MockTransport::silent();
        let bunker = Self {
            signer_keys,
            user_keys,
            script,
            relay,
        };
        let responder = bunker.clone();
        bunker.relay.set_responder(move |frame| responder.answer(frame));
        bunker
    }

    /// The relay this bunker listens on. Register it with a
    /// [`MockConnector`](crate::transport::MockConnector).
    pub fn relay(&self) -> MockTransport {
        self.relay.clone()
    }

    pub fn signer_pubkey(&self) -> PublicKey {
        self.signer_keys.public_key()
    }

    pub fn user_pubkey(&self) -> PublicKey {
        self.user_keys.public_key()
    }

    /// `bunker://` URI for this signer.
    pub fn bunker_uri(&self, relays: &[&str], secret: Option<&str>) -> String {
        BunkerPointer {
            remote_pubkey: self.signer_pubkey(),
            relays: relays.iter().map(|r| r.to_string()).collect(),
            secret: secret.map(ConnectSecret::new),
        }
        .to_uri()
    }

    pub fn reject_connect(&self, error: &str) {
        self.script.lock().unwrap().reject_connect = Some(error.to_string());
    }

    /// Read requests but never answer.
    pub fn go_silent(&self) {
        self.script.lock().unwrap().silent = true;
    }

    /// Answer the next request with an `auth_url` challenge before the
    /// real result.
    pub fn auth_url_first(&self, url: &str) {
        self.script.lock().unwrap().auth_url_first = Some(url.to_string());
    }

    /// Claim `pubkey` in `get_public_key` answers.
    pub fn report_user(&self, pubkey: PublicKey) {
        self.script.lock().unwrap().reported_user = Some(pubkey);
    }

    /// Alter drafts before signing them.
    pub fn meddle(&self) {
        self.script.lock().unwrap().meddle = true;
    }

    /// Methods received so far, in order.
    pub fn requests(&self) -> Vec<Method> {
        self.script.lock().unwrap().requests.clone()
    }

    /// Approve a `nostrconnect://` URI the way a signer app does after the
    /// user scans it: echo the secret to the client key.
    pub fn approve(&self, uri: &NostrConnectUri) {
        let response = RemoteResponse::ok(hex_id(), uri.secret.as_str());
        let envelope = self.envelope(&uri.client_pubkey, &response);
        self.relay.queue_response(deliver(&self.relay, &envelope));
    }

    /// Encrypted envelope carrying `response` to `client`.
    pub fn envelope(&self, client: &PublicKey, response: &RemoteResponse) -> Event {
        let key = ConversationKey::derive(&self.signer_keys.secret_key(), client).unwrap();
        let content = crypto::encrypt(&key, &response.to_json().unwrap()).unwrap();
        let draft = UnsignedEvent::new(kind::NOSTR_CONNECT, content)
            .tag(Tag::new(["p".to_string(), client.to_hex()]));
        self.signer_keys.sign(draft).unwrap()
    }

    fn answer(&self, frame: &str) -> Vec<String> {
        match ClientMessage::parse(frame) {
            Ok(ClientMessage::Req { sub_id, filters }) => {
                let targets = filters
                    .iter()
                    .filter_map(|f| f.tags.get("#p"))
                    .flatten()
                    .cloned()
                    .collect();
                self.script
                    .lock()
                    .unwrap()
                    .subs
                    .push((sub_id.clone(), targets));
                vec![RelayMessage::Eose(sub_id).to_json().unwrap()]
            }
            Ok(ClientMessage::Close(sub_id)) => {
                self.script
                    .lock()
                    .unwrap()
                    .subs
                    .retain(|(id, _)| *id != sub_id);
                Vec::new()
            }
            Ok(ClientMessage::Event(event)) if event.kind() == kind::NOSTR_CONNECT => {
                self.handle_request(&event)
            }
            _ => Vec::new(),
        }
    }

    fn handle_request(&self, event: &Event) -> Vec<String> {
        let ok = RelayMessage::Ok {
            event_id: event.id().to_string(),
            accepted: true,
            message: String::new(),
        }
        .to_json()
        .unwrap();
        let mut frames = vec![ok];

        let key = ConversationKey::derive(&self.signer_keys.secret_key(), event.pubkey()).unwrap();
        let Ok(json) = crypto::decrypt(&key, event.content()) else {
            return frames;
        };
        let Ok(request) = RemoteRequest::from_json(&json) else {
            return frames;
        };

        let mut script = self.script.lock().unwrap();
        script.requests.push(request.method);
        if script.silent {
            return frames;
        }
        let Some(sub_id) = script
            .subs
            .iter()
            .rev()
            .find(|(_, targets)| targets.contains(&event.pubkey().to_hex()))
            .map(|(id, _)| id.clone())
        else {
            return frames;
        };

        let mut responses = Vec::new();
        if let Some(url) = script.auth_url_first.take() {
            responses.push(RemoteResponse::auth_url(&request.id, url));
        }
        let reply = match request.method {
            Method::Connect => match &script.reject_connect {
                Some(error) => RemoteResponse::err(&request.id, error),
                None => RemoteResponse::ok(&request.id, ACK),
            },
            Method::GetPublicKey => {
                let user = script.reported_user.unwrap_or(self.user_keys.public_key());
                RemoteResponse::ok(&request.id, user.to_hex())
            }
            Method::SignEvent => {
                let mut draft: UnsignedEvent =
                    serde_json::from_str(request.params.first().map_or("", |p| p.as_str()))
                        .unwrap();
                if script.meddle {
                    draft.content.push_str(" (edited)");
                }
                let signed = self.user_keys.sign(draft).unwrap();
                RemoteResponse::ok(&request.id, signed.to_json().unwrap())
            }
            Method::Ping => RemoteResponse::ok(&request.id, PONG),
        };
        responses.push(reply);
        drop(script);

        for response in responses {
            let envelope = self.envelope(event.pubkey(), &response);
            frames.push(event_frame(&sub_id, envelope));
        }
        frames
    }
}

/// EVENT frame for `event` on the latest subscription the client opened
/// on `relay`.
pub(crate) fn deliver(relay: &MockTransport, event: &Event) -> String {
    let sub_id = relay
        .sent_messages()
        .iter()
        .rev()
        .find_map(|frame| match ClientMessage::parse(frame) {
            Ok(ClientMessage::Req { sub_id, .. }) => Some(sub_id),
            _ => None,
        })
        .expect("client never subscribed on this relay");
    event_frame(&sub_id, event.clone())
}

fn event_frame(sub_id: &SubscriptionId, event: Event) -> String {
    RelayMessage::Event {
        sub_id: sub_id.clone(),
        event: Box::new(event),
    }
    .to_json()
    .unwrap()
}

fn hex_id() -> String {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).unwrap();
    hex::encode(bytes)
}
