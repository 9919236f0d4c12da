use std::io::Read;
use std::thread::sleep;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::config::WeComConfig;
use crate::notify::Notifier;
use crate::token::{refresh_delay, TokenCell, RETRY_AFTER_FAILURE};

const API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin";

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    status: ApiStatus,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64
}

impl ApiStatus {
    fn check(&self, call: &str) -> Result<()> {
        match self.errcode {
            0 => Ok(()),
            code => Err(anyhow!("{call} failed with {code}: {}", self.errmsg))
        }
    }
}

/// Chat push body. Heading tags are only meaningful for mail, so they go.
pub fn text_message(user: &str, agent_id: u64, content: &str) -> Value {
    let content = content.replace("<h3>", "").replace("</h3>", "");
    json!({
        "msgtype": "text",
        "touser": user,
        "agentid": agent_id,
        "text": { "content": content }
    })
}

/// Enterprise chat application: token upkeep, message push, media download.
pub struct WeComClient {
    agent: ureq::Agent,
    config: WeComConfig,
    token: TokenCell
}
impl WeComClient {
    pub fn new(config: WeComConfig) -> Self {
        Self {
            agent: ureq::Agent::new(),
            config,
            token: TokenCell::default()
        }
    }

    /// Shared view of the access token, empty until the first refresh succeeds.
    pub fn token(&self) -> TokenCell {
        self.token.clone()
    }

    fn fetch_token(&self) -> Result<TokenResponse> {
        let response: TokenResponse = self.agent
            .get(&format!("{API_BASE}/gettoken"))
            .query("corpid", &self.config.corp_id)
            .query("corpsecret", &self.config.corp_secret)
            .call()?
            .into_json()
            .context("Malformed token response")?;
        response.status.check("gettoken")?;
        Ok(response)
    }

    /// Keeps the access token fresh forever. The only writer of `token`.
    pub fn refresh_loop(&self) {
        loop {
            let delay = match self.fetch_token() {
                Ok(response) => {
                    info!("Refreshed chat access token, expires in {}s", response.expires_in);
                    self.token.set(response.access_token);
                    refresh_delay(response.expires_in)
                }
                Err(e) => {
                    warn!("Failed to refresh chat access token: {e:#}");
                    RETRY_AFTER_FAILURE
                }
            };
            sleep(delay);
        }
    }

    pub fn send_text(&self, content: &str) -> Result<()> {
        let status: ApiStatus = self.agent
            .post(&format!("{API_BASE}/message/send"))
            .query("access_token", &self.token.get())
            .send_json(text_message(&self.config.user, self.config.agent_id, content))?
            .into_json()
            .context("Malformed message/send response")?;
        status.check("message/send")
    }

    /// Raw bytes of an uploaded media item (voice messages).
    pub fn fetch_media(&self, media_id: &str) -> Result<Vec<u8>> {
        let response = self.agent
            .get(&format!("{API_BASE}/media/get"))
            .query("access_token", &self.token.get())
            .query("media_id", media_id)
            .call()?;

        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes).context("Failed to download media")?;
        Ok(bytes)
    }
}
impl Notifier for WeComClient {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn notify(&self, text: &str) -> Result<()> {
        self.send_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_shape() {
        let body = text_message("ops", 1000002, "<h3>Alert</h3>\nbody");
        assert_eq!(body, json!({
            "msgtype": "text",
            "touser": "ops",
            "agentid": 1000002,
            "text": { "content": "Alert\nbody" }
        }));
    }

    #[test]
    fn token_response_errors_are_reported() {
        let response: TokenResponse = serde_json::from_str(r#"{"errcode":40013,"errmsg":"invalid corpid"}"#).unwrap();
        assert!(response.status.check("gettoken").is_err());

        let response: TokenResponse = serde_json::from_str(
            r#"{"errcode":0,"errmsg":"ok","access_token":"abc","expires_in":7200}"#
        ).unwrap();
        assert!(response.status.check("gettoken").is_ok());
        assert_eq!(response.access_token, "abc");
        assert_eq!(response.expires_in, 7200);
    }
}
