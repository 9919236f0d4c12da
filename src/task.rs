use std::time::Duration;
use crate::parser;

pub const CMD_TEXT_MODE: &str = "AT+CMGF=1";
pub const CMD_CHARSET_UCS2: &str = "AT+CSCS=\"UCS2\"";
pub const CMD_SMS_PARAMS: &str = "AT+CSMP=17,71,0,8"; // UCS-2 data coding scheme
pub const CMD_LIST_UNREAD: &str = "AT+CMGL=\"REC UNREAD\"";
pub const CMD_PURGE_READ: &str = "AT+CMGD=1,3";       // Delete read and sent messages
pub const CMD_SEND_SMS: &str = "AT+CMGS=\"";
pub const CMD_DIAL: &str = "ATD";
pub const CMD_HANG_UP: &str = "ATH";
pub const CRLF: &str = "\r\n";
pub const CTRL_Z: u8 = 0x1A;
pub const ESC: u8 = 0x1B;       // Abandons SMS text input

pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);
pub const SMS_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Setup,
    ListUnread,
    PurgeRead,
    Dial,
    HangUp,

    /// Two-phase send: the command is the `AT+CMGS` header, `body` is written
    /// once the modem has had time to show its `>` prompt.
    SendSms { body: Vec<u8> }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtTask {
    pub command: Vec<u8>,
    pub kind: TaskKind,
    pub settle: Duration
}
impl AtTask {
    fn line(command: &str, kind: TaskKind, settle: Duration) -> Self {
        Self {
            command: format!("{command}{CRLF}").into_bytes(),
            kind,
            settle
        }
    }

    pub fn setup(command: &str) -> Self {
        Self::line(command, TaskKind::Setup, DEFAULT_SETTLE)
    }

    pub fn list_unread() -> Self {
        Self::line(CMD_LIST_UNREAD, TaskKind::ListUnread, DEFAULT_SETTLE)
    }

    pub fn purge_read() -> Self {
        Self::line(CMD_PURGE_READ, TaskKind::PurgeRead, DEFAULT_SETTLE)
    }

    pub fn dial(phone: &str) -> Self {
        Self::line(&format!("{CMD_DIAL}{phone};"), TaskKind::Dial, DEFAULT_SETTLE)
    }

    pub fn hang_up() -> Self {
        Self::line(CMD_HANG_UP, TaskKind::HangUp, DEFAULT_SETTLE)
    }

    /// Both arguments must already be UCS-2 hex encoded.
    pub fn send_sms(phone_ucs2: &str, body_ucs2: &str) -> Self {
        Self {
            command: format!("{CMD_SEND_SMS}{phone_ucs2}\"\r").into_bytes(),
            kind: TaskKind::SendSms { body: body_ucs2.as_bytes().to_vec() },
            settle: SMS_SETTLE
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Command text without the line terminator, for logging.
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.command).trim_end().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct AtResult {
    pub kind: TaskKind,
    pub command: Vec<u8>,
    pub raw: Vec<u8>
}
impl AtResult {
    pub fn response(&self) -> String {
        String::from_utf8_lossy(&self.raw).to_string()
    }

    /// Human readable outcome, if this kind of task produces one.
    pub fn message(&self) -> Option<String> {
        parser::describe(&self.kind, &self.response())
    }
}
