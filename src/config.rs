use std::env::var;
use std::path::PathBuf;
use anyhow::{Context, Result};

pub struct Config {
    pub modem_port: String,
    pub modem_baud: u32,
    pub command_file: PathBuf,
    pub webhook: WebhookConfig,
    pub wecom: WeComConfig,
    pub voice: Option<VoiceConfig>,
    pub mail: Option<MailConfig>
}

pub struct WebhookConfig {
    pub target_url: String,
    pub token: String,
    pub aes_key: String,
    pub secret_word: String,
    pub fake_body: String
}

pub struct WeComConfig {
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: u64,
    pub user: String
}

pub struct VoiceConfig {
    pub api_key: String,
    pub secret_key: String,
    pub cuid: String
}

pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub from: String,
    pub to: String,
    pub password: String
}

fn get_env_var(key: &'static str) -> Result<String> {
    var(key).with_context(|| format!("Missing environment variable {}", key))
}

fn get_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T> {
    match var(key) {
        Ok(v) => v.parse::<T>().map_err(|_| anyhow::anyhow!("Failed to parse {}", key)),
        Err(_) => Ok(default)
    }
}

/// Optional sections are enabled by their first variable being set.
fn voice_from_env() -> Result<Option<VoiceConfig>> {
    if var("BRIDGE_VOICE_API_KEY").is_err() {
        return Ok(None);
    }
    Ok(Some(VoiceConfig {
        api_key: get_env_var("BRIDGE_VOICE_API_KEY")?,
        secret_key: get_env_var("BRIDGE_VOICE_SECRET_KEY")?,
        cuid: get_env_var("BRIDGE_VOICE_CUID")?
    }))
}

fn mail_from_env() -> Result<Option<MailConfig>> {
    if var("BRIDGE_MAIL_SERVER").is_err() {
        return Ok(None);
    }
    Ok(Some(MailConfig {
        server: get_env_var("BRIDGE_MAIL_SERVER")?,
        port: get_parsed_or("BRIDGE_MAIL_PORT", 465)?,
        from: get_env_var("BRIDGE_MAIL_FROM")?,
        to: get_env_var("BRIDGE_MAIL_TO")?,
        password: get_env_var("BRIDGE_MAIL_PASSWORD")?
    }))
}

pub fn from_env() -> Result<Config> {
    Ok(Config {
        modem_port: get_env_var("BRIDGE_MODEM_PORT")?,
        modem_baud: get_env_var("BRIDGE_MODEM_BAUD")
            .map(|v| v.parse::<u32>().context("Failed to parse BRIDGE_MODEM_BAUD as u32"))
            .unwrap_or_else(|_| Ok(115200))?,
        command_file: get_env_var("BRIDGE_COMMAND_FILE")?.into(),
        webhook: WebhookConfig {
            target_url: get_env_var("BRIDGE_WEBHOOK_URL")?,
            token: get_env_var("BRIDGE_WEBHOOK_TOKEN")?,
            aes_key: get_env_var("BRIDGE_WEBHOOK_AES_KEY")?,
            secret_word: get_env_var("BRIDGE_WEBHOOK_SECRET_WORD")?,
            fake_body: var("BRIDGE_WEBHOOK_FAKE_BODY").unwrap_or_default()
        },
        wecom: WeComConfig {
            corp_id: get_env_var("BRIDGE_WECOM_CORP_ID")?,
            corp_secret: get_env_var("BRIDGE_WECOM_CORP_SECRET")?,
            agent_id: get_env_var("BRIDGE_WECOM_AGENT_ID")?
                .parse()
                .context("Failed to parse BRIDGE_WECOM_AGENT_ID as u64")?,
            user: get_env_var("BRIDGE_WECOM_USER")?
        },
        voice: voice_from_env()?,
        mail: mail_from_env()?
    })
}
