use std::process::exit;
use std::sync::Arc;
use std::thread;
use anyhow::{Context, Result};
use crossbeam::channel::bounded;
use env_logger::Env;
use log::{error, info, warn};
use modem_bridge::config;
use modem_bridge::crypto::WebhookCrypto;
use modem_bridge::dispatcher::CommandDispatcher;
use modem_bridge::notify::{MailNotifier, Notifier, Notifiers};
use modem_bridge::parser::process_results;
use modem_bridge::poller::Poller;
use modem_bridge::serial::{SerialSession, IO_TIMEOUT};
use modem_bridge::voice::{SpeechClient, Transcriber};
use modem_bridge::webhook::{self, WebhookPoller};
use modem_bridge::wecom::WeComClient;

const TASK_QUEUE: usize = 100;
const RESULT_QUEUE: usize = 100;
const INBOUND_QUEUE: usize = 10;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    let config = config::from_env()?;
    let crypto = Arc::new(
        WebhookCrypto::new(&config.webhook.token, &config.webhook.aes_key)
            .context("Invalid webhook AES key")?
    );

    let port = serialport::new(&config.modem_port, config.modem_baud)
        .timeout(IO_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open serial port {}", config.modem_port))?;
    info!("Opened modem on {} at {} baud", config.modem_port, config.modem_baud);

    let wecom = Arc::new(WeComClient::new(config.wecom));
    let mut sinks: Vec<Arc<dyn Notifier>> = vec![wecom.clone()];
    if let Some(mail) = &config.mail {
        sinks.push(Arc::new(MailNotifier::new(mail)?));
    }
    let notifiers = Notifiers::new(sinks);

    let transcriber = config.voice.map(|voice| Arc::new(SpeechClient::new(voice, wecom.clone())));
    if transcriber.is_none() {
        warn!("Speech recognition is not configured, voice commands will be ignored");
    }

    let (task_tx, task_rx) = bounded(TASK_QUEUE);
    let (result_tx, result_rx) = bounded(RESULT_QUEUE);
    let (message_tx, message_rx) = bounded(INBOUND_QUEUE);
    let (command_tx, command_rx) = bounded(INBOUND_QUEUE);

    {
        let wecom = wecom.clone();
        thread::spawn(move || wecom.refresh_loop());
    }
    if let Some(speech) = &transcriber {
        let speech = speech.clone();
        thread::spawn(move || speech.refresh_loop());
    }

    let poller_tasks = task_tx.clone();
    thread::spawn(move || Poller::default().run(poller_tasks));

    let result_notifiers = notifiers.clone();
    thread::spawn(move || process_results(result_rx, result_notifiers));

    let poller = WebhookPoller::new(crypto, config.webhook);
    thread::spawn(move || poller.run(message_tx));

    let transcriber = transcriber.map(|speech| speech as Arc<dyn Transcriber>);
    let chat_token = wecom.token();
    thread::spawn(move || webhook::route(message_rx, command_tx, transcriber, chat_token));

    let dispatcher = CommandDispatcher::new(config.command_file, task_tx);
    thread::spawn(move || dispatcher.run(command_rx, notifiers));

    // Serial errors leave in-flight framing unknown, so they end the process.
    let executor = thread::spawn(move || SerialSession::new(port).run(task_rx, result_tx));
    match executor.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Modem I/O failed: {e:#}");
            exit(1);
        }
        Err(_) => {
            error!("Serial executor panicked");
            exit(1);
        }
    }
}
