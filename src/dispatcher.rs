use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, warn};
use regex::Regex;
use crate::dictionary::{self, CommandDictionary};
use crate::notify::Notifiers;
use crate::pdu;
use crate::task::{AtTask, CMD_CHARSET_UCS2, CMD_SMS_PARAMS, CMD_TEXT_MODE};

const PREFIX_CMD: &str = "cmd::";
const PREFIX_DIAL: &str = "dial::";
const PREFIX_SMS: &str = "sms::";
const HANG_UP_SENTINEL: &str = "ath";

pub const INVALID_PHONE: &str = "Sorry, invalid phone number";
pub const INVALID_SMS: &str = "Sorry, SMS format is sms::<phone>::<text>";

/// Punctuation that voice transcription likes to add to commands.
const STRIPPED: [&str; 3] = ["。", "，", ","];

#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Result text to push straight to the operator.
    Immediate(String),

    /// Number of tasks queued; the outcome arrives via the result queue.
    Queued(usize)
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\+)?\d+").expect("Phone pattern is valid"))
}

pub fn normalize(command: &str) -> String {
    STRIPPED.iter().fold(command.trim().to_string(), |acc, p| acc.replace(p, ""))
}

fn is_url(action: &str) -> bool {
    action.starts_with("http://") || action.starts_with("https://")
}

pub struct CommandDispatcher {
    dictionary_path: PathBuf,
    tasks: Sender<AtTask>,
    agent: ureq::Agent
}
impl CommandDispatcher {
    pub fn new(dictionary_path: PathBuf, tasks: Sender<AtTask>) -> Self {
        Self {
            dictionary_path,
            tasks,
            agent: ureq::Agent::new()
        }
    }

    fn load_dictionary(&self) -> CommandDictionary {
        dictionary::load(&self.dictionary_path).unwrap_or_else(|e| {
            warn!("{e:#}, continuing with built-in commands only");
            CommandDictionary::new()
        })
    }

    pub fn dispatch(&self, command: &str) -> Dispatch {
        let command = normalize(command);
        let dictionary = self.load_dictionary();

        match dictionary.get(&command) {
            Some(action) if is_url(action) => Dispatch::Immediate(self.fetch(action)),
            Some(action) => {
                debug!("Expanding {command} to {action}");
                self.dispatch_builtin(action).unwrap_or_else(|| Self::not_found(&command))
            }
            None => self.dispatch_builtin(&command).unwrap_or_else(|| Self::not_found(&command))
        }
    }

    fn not_found(command: &str) -> Dispatch {
        Dispatch::Immediate(format!("Sorry, command not found: {command}"))
    }

    fn dispatch_builtin(&self, command: &str) -> Option<Dispatch> {
        if let Some(rest) = command.strip_prefix(PREFIX_CMD) {
            return Some(Dispatch::Immediate(run_program(rest)));
        }
        if let Some(target) = command.strip_prefix(PREFIX_DIAL) {
            return Some(self.dial(target));
        }
        if let Some(rest) = command.strip_prefix(PREFIX_SMS) {
            return Some(self.send_sms(rest));
        }
        None
    }

    fn fetch(&self, url: &str) -> String {
        info!("Fetching {url}");
        match self.agent.get(url).call() {
            Ok(response) => response.into_string().unwrap_or_else(|e| e.to_string()),
            Err(e) => e.to_string()
        }
    }

    fn enqueue(&self, tasks: Vec<AtTask>) -> Dispatch {
        let count = tasks.len();
        for task in tasks {
            debug!("Queueing {}", task.display());
            if self.tasks.send(task).is_err() {
                return Dispatch::Immediate("Modem is not available".to_string());
            }
        }
        Dispatch::Queued(count)
    }

    fn dial(&self, target: &str) -> Dispatch {
        if target.eq_ignore_ascii_case(HANG_UP_SENTINEL) {
            return self.enqueue(vec![AtTask::hang_up()]);
        }
        if !phone_pattern().is_match(target) {
            return Dispatch::Immediate(INVALID_PHONE.to_string());
        }
        self.enqueue(vec![AtTask::dial(target)])
    }

    fn send_sms(&self, rest: &str) -> Dispatch {
        let Some((phone, body)) = rest.split_once(dictionary::SEPARATOR) else {
            return Dispatch::Immediate(INVALID_SMS.to_string());
        };
        if !phone_pattern().is_match(phone) {
            return Dispatch::Immediate(INVALID_PHONE.to_string());
        }

        self.enqueue(vec![
            AtTask::setup(CMD_TEXT_MODE),
            AtTask::setup(CMD_CHARSET_UCS2),
            AtTask::setup(CMD_SMS_PARAMS),
            AtTask::send_sms(&pdu::encode(phone), &pdu::encode(body))
        ])
    }

    /// Consume commands until the inbound side closes.
    pub fn run(self, commands: Receiver<String>, notifiers: Notifiers) {
        info!("Command dispatcher started");
        for command in commands {
            info!("Dispatching command: {command}");
            match self.dispatch(&command) {
                Dispatch::Immediate(text) => notifiers.broadcast(text),
                Dispatch::Queued(n) => debug!("Queued {n} modem task(s)")
            }
        }
    }
}

/// `program args..`, split on whitespace. Failures come back as text.
fn run_program(line: &str) -> String {
    let line = line.trim();
    let (program, args) = line.split_once(' ').unwrap_or((line, ""));

    info!("Running {line}");
    match Command::new(program).args(args.split_whitespace()).output() {
        Ok(output) if !output.status.success() => {
            format!("{program} failed ({}): {}", output.status, String::from_utf8_lossy(&output.stderr).trim())
        }
        Ok(output) if output.stdout.is_empty() => format!("{line} executed successfully."),
        Ok(output) => String::from_utf8_lossy(&output.stdout).to_string(),
        Err(e) => format!("Failed to run {program}: {e}")
    }
}
