use std::string::FromUtf8Error;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use crate::config::WebhookConfig;
use crate::crypto::{CryptoError, WebhookCrypto};
use crate::token::TokenCell;
use crate::voice::Transcriber;

pub const POLL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Signature mismatch")]
    Signature,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Decrypted payload is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error)
}

/// Signed query parameters of one callback exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookMessage {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echo_str: String,
    pub encrypt: String
}
impl WebhookMessage {
    /// Verification probe proving knowledge of the shared key and secret word.
    pub fn probe(crypto: &WebhookCrypto, secret_word: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();
        let nonce = rand::random::<u64>().to_string();
        let echo_str = crypto.encrypt(secret_word.as_bytes());
        let signature = crypto.sign(&timestamp, &nonce, &echo_str);

        Self {
            signature,
            timestamp,
            nonce,
            echo_str,
            encrypt: String::new()
        }
    }

    /// Handshakes sign the echo string, deliveries sign the encrypted body.
    pub fn payload(&self) -> &str {
        if self.encrypt.is_empty() {
            &self.echo_str
        } else {
            &self.encrypt
        }
    }

    pub fn verify(&self, crypto: &WebhookCrypto) -> bool {
        crypto.verify(&self.signature, &self.timestamp, &self.nonce, self.payload())
    }

    pub fn query(&self) -> [(&'static str, &str); 4] {
        [
            ("msg_signature", &self.signature),
            ("timestamp", &self.timestamp),
            ("nonce", &self.nonce),
            ("echostr", &self.echo_str)
        ]
    }
}

/// Outer XML of a callback delivery.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ToUserName", default)]
    pub to_user_name: String,
    #[serde(rename = "Encrypt", default)]
    pub encrypt: String,
    #[serde(rename = "AgentID", default)]
    pub agent_id: String
}

/// Decrypted message from the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "MsgType", default)]
    pub msg_type: String,
    #[serde(rename = "MediaId", default)]
    pub media_id: String,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "Format", default)]
    pub format: String
}

/// Relay side of the GET handshake: check the signature, then reveal the echo.
pub fn verify_handshake(crypto: &WebhookCrypto, query: &WebhookMessage) -> Result<Vec<u8>, WebhookError> {
    if !query.verify(crypto) {
        return Err(WebhookError::Signature);
    }
    Ok(crypto.decrypt(&query.echo_str)?)
}

/// Relay side of a POST delivery: the signature covers the `Encrypt` element.
pub fn accept_delivery(crypto: &WebhookCrypto, query: &WebhookMessage, body: &str) -> Result<Envelope, WebhookError> {
    let envelope: Envelope = quick_xml::de::from_str(body)?;
    let signed = WebhookMessage {
        encrypt: envelope.encrypt.clone(),
        ..query.clone()
    };
    if !signed.verify(crypto) {
        return Err(WebhookError::Signature);
    }
    Ok(envelope)
}

/// Decrypt a delivery handed back by the relay. Empty and decoy bodies mean
/// nothing is waiting.
pub fn open_relayed(crypto: &WebhookCrypto, body: &str, fake_body: &str) -> Result<Option<InboundMessage>, WebhookError> {
    if body.trim().is_empty() || body == fake_body {
        return Ok(None);
    }

    let envelope: Envelope = quick_xml::de::from_str(body)?;
    let plain = String::from_utf8(crypto.decrypt(&envelope.encrypt)?)?;
    Ok(Some(quick_xml::de::from_str(&plain)?))
}

/// Long-running client of the callback relay.
pub struct WebhookPoller {
    agent: ureq::Agent,
    crypto: Arc<WebhookCrypto>,
    config: WebhookConfig
}
impl WebhookPoller {
    pub fn new(crypto: Arc<WebhookCrypto>, config: WebhookConfig) -> Self {
        Self {
            agent: ureq::Agent::new(),
            crypto,
            config
        }
    }

    fn poll_once(&self) -> Result<Option<InboundMessage>> {
        let probe = WebhookMessage::probe(&self.crypto, &self.config.secret_word);
        let request = probe
            .query()
            .into_iter()
            .fold(self.agent.get(&self.config.target_url), |request, (k, v)| request.query(k, v));

        let response = match request.call() {
            Ok(response) if response.status() == 200 => response,
            Ok(response) => {
                debug!("Relay answered {}", response.status());
                return Ok(None);
            }
            Err(ureq::Error::Status(code, _)) => {
                debug!("Relay answered {code}");
                return Ok(None);
            }
            Err(e) => return Err(e.into())
        };

        let body = response.into_string()?;
        Ok(open_relayed(&self.crypto, &body, &self.config.fake_body)?)
    }

    pub fn run(self, messages: Sender<InboundMessage>) {
        info!("Webhook poller started for {}", self.config.target_url);
        loop {
            match self.poll_once() {
                Ok(Some(message)) => {
                    debug!("Received {} message", message.msg_type);
                    if messages.send(message).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Dropping webhook poll: {e:#}")
            }
            sleep(POLL_DELAY);
        }
    }
}

/// Text messages are commands as-is; voice messages are transcribed first.
/// Text is dropped while the chat token is missing, since no reply could be sent.
pub fn extract_command(message: &InboundMessage, transcriber: Option<&dyn Transcriber>, chat_token: &TokenCell) -> Option<String> {
    match message.msg_type.as_str() {
        "text" if chat_token.is_empty() => {
            warn!("Chat access token not ready, dropping text command");
            None
        }
        "text" => Some(message.content.clone()),
        "voice" => {
            let Some(transcriber) = transcriber else {
                warn!("Voice message received but speech recognition is not configured");
                return None;
            };
            transcriber
                .transcribe(&message.media_id, &message.format)
                .inspect_err(|e| warn!("Failed to transcribe voice message: {e:#}"))
                .ok()
        }
        other => {
            debug!("Ignoring {other} message");
            None
        }
    }
}

pub fn route(
    messages: Receiver<InboundMessage>,
    commands: Sender<String>,
    transcriber: Option<Arc<dyn Transcriber>>,
    chat_token: TokenCell
) {
    for message in messages {
        let Some(command) = extract_command(&message, transcriber.as_deref(), &chat_token) else {
            continue;
        };
        if commands.send(command).is_err() {
            return;
        }
    }
}
