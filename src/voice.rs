use std::sync::Arc;
use std::thread::sleep;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::config::VoiceConfig;
use crate::token::{refresh_delay, TokenCell, RETRY_AFTER_FAILURE};
use crate::wecom::WeComClient;

const OAUTH_URL: &str = "https://openapi.baidu.com/oauth/2.0/token";
const RECOGNIZE_URL: &str = "http://vop.baidu.com/server_api";
const SAMPLE_RATE: u32 = 8000;
const MANDARIN_MODEL: u32 = 1537;

/// Turns a voice message into the command text it contains.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, media_id: &str, format: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct OAuthResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    format: &'a str,
    rate: u32,
    channel: u32,
    cuid: &'a str,
    dev_pid: u32,
    token: &'a str,
    speech: String,
    len: usize
}

#[derive(Deserialize)]
struct RecognizeResponse {
    err_no: i64,
    #[serde(default)]
    err_msg: String,
    #[serde(default)]
    result: Vec<String>
}
impl RecognizeResponse {
    fn into_text(self) -> Result<String> {
        if self.err_no != 0 {
            return Err(anyhow!("Speech recognition failed with {}: {}", self.err_no, self.err_msg));
        }
        self.result.into_iter().next().ok_or_else(|| anyhow!("Speech recognition returned no result"))
    }
}

/// Speech-to-text provider fed with voice messages pulled from the chat platform.
pub struct SpeechClient {
    agent: ureq::Agent,
    config: VoiceConfig,
    token: TokenCell,
    media: Arc<WeComClient>
}
impl SpeechClient {
    pub fn new(config: VoiceConfig, media: Arc<WeComClient>) -> Self {
        Self {
            agent: ureq::Agent::new(),
            config,
            token: TokenCell::default(),
            media
        }
    }

    fn fetch_token(&self) -> Result<OAuthResponse> {
        self.agent
            .get(OAUTH_URL)
            .query("grant_type", "client_credentials")
            .query("client_id", &self.config.api_key)
            .query("client_secret", &self.config.secret_key)
            .call()?
            .into_json()
            .context("Malformed speech token response")
    }

    pub fn refresh_loop(&self) {
        loop {
            let delay = match self.fetch_token() {
                Ok(response) => {
                    info!("Refreshed speech access token, expires in {}s", response.expires_in);
                    self.token.set(response.access_token);
                    refresh_delay(response.expires_in)
                }
                Err(e) => {
                    warn!("Failed to refresh speech access token: {e:#}");
                    RETRY_AFTER_FAILURE
                }
            };
            sleep(delay);
        }
    }

    fn recognize(&self, audio: &[u8], format: &str) -> Result<String> {
        let token = self.token.get();
        let request = RecognizeRequest {
            format,
            rate: SAMPLE_RATE,
            channel: 1,
            cuid: &self.config.cuid,
            dev_pid: MANDARIN_MODEL,
            token: &token,
            speech: STANDARD.encode(audio),
            len: audio.len()
        };

        let response: RecognizeResponse = self.agent
            .post(RECOGNIZE_URL)
            .send_json(&request)?
            .into_json()
            .context("Malformed speech recognition response")?;
        response.into_text()
    }
}
impl Transcriber for SpeechClient {
    fn transcribe(&self, media_id: &str, format: &str) -> Result<String> {
        let audio = self.media.fetch_media(media_id)?;
        self.recognize(&audio, format)
    }
}
