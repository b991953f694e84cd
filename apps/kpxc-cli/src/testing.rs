//! In-process stand-in for the password manager's browser socket

use std::collections::HashMap;
use std::time::Duration;

use crypto_session::{
    BoxNonce, CryptoSession, KeyPair, decode_bytes, decode_public_key, encode_bytes, encode_key,
};
use ipc_transport::JsonChannel;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, duplex};
use tokio::task::JoinHandle;

use crate::session::Session;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Site the fake serves its entries for
pub const SITE: &str = "example.com";

/// Scripted peer answering one client connection
pub struct FakePeer {
    pub hash: String,
    /// Identities the peer accepts, id to identity key
    pub known: HashMap<String, String>,
    pub entries: Vec<(String, String)>,
    pub locked: bool,
    pub tamper_logins: bool,
    pub skew_nonce: bool,
    /// Answer `get-logins` with the wrong reply nonce
    pub skew_logins_nonce: bool,
    /// Answer `get-logins` under an action name the client never sent
    pub mislabel_logins: bool,
    pub reject_association: bool,
    pub notify_before_reply: bool,
    actions: Vec<String>,
    issued: usize,
    keys: KeyPair,
    crypto: Option<CryptoSession>,
}

impl FakePeer {
    pub fn new(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            known: HashMap::new(),
            entries: Vec::new(),
            locked: false,
            tamper_logins: false,
            skew_nonce: false,
            skew_logins_nonce: false,
            mislabel_logins: false,
            reject_association: false,
            notify_before_reply: false,
            actions: Vec::new(),
            issued: 0,
            keys: KeyPair::generate(),
            crypto: None,
        }
    }

    pub fn knowing(mut self, id: &str, id_key: &str) -> Self {
        self.known.insert(id.to_string(), id_key.to_string());
        self
    }

    pub fn with_entries(mut self, entries: &[(&str, &str)]) -> Self {
        self.entries = entries
            .iter()
            .map(|(login, password)| (login.to_string(), password.to_string()))
            .collect();
        self
    }

    /// Actions received so far, in order
    pub fn seen(&self) -> Vec<String> {
        self.actions.clone()
    }

    /// Answer requests until the client hangs up
    pub async fn serve<S>(mut self, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut channel = JsonChannel::new(stream, TIMEOUT);

        while let Ok(frame) = channel.receive().await {
            let request: Value = serde_json::from_slice(&frame).unwrap();
            let action = request["action"].as_str().unwrap().to_string();
            self.actions.push(action.clone());

            let reply = if action == "change-public-keys" {
                self.exchange_keys(&request)
            } else {
                self.answer(&action, &request)
            };

            if self.notify_before_reply {
                channel.send(br#"{"action":"database-unlocked"}"#).await.unwrap();
            }
            channel.send(&serde_json::to_vec(&reply).unwrap()).await.unwrap();
        }

        self
    }

    fn exchange_keys(&mut self, request: &Value) -> Value {
        let client_key = decode_public_key(request["publicKey"].as_str().unwrap()).unwrap();
        self.crypto = Some(CryptoSession::new(&client_key, self.keys.secret_key()));

        let mut nonce = BoxNonce::from_base64(request["nonce"].as_str().unwrap())
            .unwrap()
            .increment();
        if self.skew_nonce {
            nonce = nonce.increment();
        }

        json!({
            "action": "change-public-keys",
            "version": "2.7.9",
            "publicKey": encode_key(self.keys.public_key()),
            "nonce": nonce.to_base64(),
            "success": "true",
        })
    }

    fn answer(&mut self, action: &str, request: &Value) -> Value {
        let nonce = BoxNonce::from_base64(request["nonce"].as_str().unwrap()).unwrap();
        let ciphertext = decode_bytes(request["message"].as_str().unwrap()).unwrap();
        let crypto = self.crypto.as_mut().unwrap();
        let plaintext = crypto.open(&nonce, &ciphertext).unwrap();
        let payload: Value = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(payload["action"], action);

        let body = match action {
            "get-databasehash" if self.locked => {
                return error_reply(action, 1, "Database not opened");
            }
            "get-databasehash" => json!({ "hash": self.hash }),
            "associate" if self.reject_association => {
                return error_reply(action, 6, "Action cancelled or denied");
            }
            "associate" => {
                self.issued += 1;
                let id = format!("kpxc-cli-{}", self.issued);
                let id_key = payload["idKey"].as_str().unwrap().to_string();
                self.known.insert(id.clone(), id_key);
                json!({ "id": id, "hash": self.hash })
            }
            "test-associate" => {
                let id = payload["id"].as_str().unwrap();
                if self.known.get(id).map(String::as_str) != payload["key"].as_str() {
                    return error_reply(action, 8, "KeePassXC association failed, try again");
                }
                json!({ "id": id, "hash": self.hash })
            }
            "get-logins" => {
                let url = payload["url"].as_str().unwrap();
                let keys = payload["keys"].as_array().unwrap();
                let accepted = keys.iter().any(|k| {
                    self.known.get(k["id"].as_str().unwrap()).map(String::as_str)
                        == k["key"].as_str()
                });
                assert!(accepted, "get-logins sent without a known identity");

                if !url.contains(SITE) || self.entries.is_empty() {
                    return error_reply(action, 15, "No logins found");
                }
                let entries: Vec<Value> = self
                    .entries
                    .iter()
                    .map(|(login, password)| {
                        json!({ "login": login, "password": password, "name": SITE, "uuid": "0" })
                    })
                    .collect();
                json!({ "count": entries.len(), "entries": entries, "hash": self.hash })
            }
            other => panic!("fake peer got unexpected action {other}"),
        };

        let mut body = body;
        body["action"] = json!(action);
        body["success"] = json!("true");
        body["version"] = json!("2.7.9");

        let mut reply_nonce = nonce.increment();
        if action == "get-logins" && self.skew_logins_nonce {
            reply_nonce = reply_nonce.increment();
        }
        let crypto = self.crypto.as_mut().unwrap();
        let mut sealed = crypto
            .encrypt_with_nonce(&reply_nonce, &serde_json::to_vec(&body).unwrap())
            .unwrap();
        if action == "get-logins" && self.tamper_logins {
            sealed[0] ^= 0x01;
        }

        let action = if action == "get-logins" && self.mislabel_logins {
            "generate-password"
        } else {
            action
        };

        json!({
            "action": action,
            "message": encode_bytes(&sealed),
            "nonce": reply_nonce.to_base64(),
        })
    }
}

fn error_reply(action: &str, code: u32, message: &str) -> Value {
    json!({
        "action": action,
        "error": message,
        "errorCode": code.to_string(),
    })
}

/// Start `peer` on one end of an in-memory pipe and a session on the other
pub fn connect(peer: FakePeer) -> (Session<DuplexStream>, JoinHandle<FakePeer>) {
    let (client, server) = duplex(64 * 1024);
    let handle = tokio::spawn(peer.serve(server));
    let session = Session::new(JsonChannel::new(client, TIMEOUT));
    (session, handle)
}
