use std::fmt;
use crossbeam::channel::Receiver;
use log::{debug, info, warn};
use crate::notify::Notifiers;
use crate::pdu;
use crate::task::{AtResult, TaskKind};

const LIST_MARKER: &str = "+CMGL:";
const UNREAD_FLAG: &str = "UNREAD";
const FIELD_SEPARATOR: &str = ",\"";
const STATUS_OK: &str = "OK";
const STATUS_ERROR: &str = "ERROR";

pub const DIAL_SUCCESS: &str = "Call placed successfully";
pub const DIAL_FAILURE: &str = "Failed to place call";
pub const HANG_UP_SUCCESS: &str = "Call ended";
pub const HANG_UP_FAILURE: &str = "Failed to end call";
pub const SMS_SUCCESS: &str = "SMS sent successfully";
pub const SMS_FAILURE: &str = "Failed to send SMS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    pub sender: String,
    pub timestamp: String,
    pub body: String
}
impl fmt::Display for SmsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source: {} time: {}\n{}", self.sender, self.timestamp, self.body)
    }
}

/// Parse a `+CMGL:` header line. The sender field may itself be UCS-2 encoded.
fn parse_header(line: &str) -> Option<(String, String)> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < 4 {
        return None;
    }

    let sender = fields[2].replace(['"', ','], "");
    let timestamp = fields[3].replace('"', "");
    Some((pdu::decode_or_raw(&sender), timestamp))
}

/// Extract every unread message from a `AT+CMGL` response.
pub fn parse_unread(response: &str) -> Vec<SmsRecord> {
    let lines: Vec<&str> = response.split("\r\n").collect();
    let mut records = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with(LIST_MARKER) || !line.contains(UNREAD_FLAG) {
            continue;
        }

        // A header without its body line means the read was cut short.
        let Some(body) = lines.get(i + 1).filter(|next| !next.starts_with(LIST_MARKER)) else {
            continue;
        };
        if let Some((sender, timestamp)) = parse_header(line) {
            records.push(SmsRecord {
                sender,
                timestamp,
                body: pdu::decode_or_raw(body)
            });
        }
    }

    records
}

pub fn format_records(records: &[SmsRecord]) -> String {
    records
        .iter()
        .map(SmsRecord::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Reduce a raw response to the text the operator should see.
pub fn describe(kind: &TaskKind, response: &str) -> Option<String> {
    let outcome = |ok: bool, success: &str, failure: &str| {
        Some(if ok { success } else { failure }.to_string())
    };

    match kind {
        TaskKind::ListUnread => {
            if !response.contains(STATUS_OK) {
                return None;
            }
            let records = parse_unread(response);
            (!records.is_empty()).then(|| format_records(&records))
        }
        TaskKind::Dial => outcome(response.contains(STATUS_OK), DIAL_SUCCESS, DIAL_FAILURE),
        TaskKind::HangUp => outcome(response.contains(STATUS_OK), HANG_UP_SUCCESS, HANG_UP_FAILURE),
        TaskKind::SendSms { .. } => outcome(!response.contains(STATUS_ERROR), SMS_SUCCESS, SMS_FAILURE),
        TaskKind::Setup | TaskKind::PurgeRead => None
    }
}

/// Turn executor results into notifications, in queue order.
pub fn process_results(results: Receiver<AtResult>, notifiers: Notifiers) {
    info!("Result processor started");
    for result in results {
        let response = result.response();
        match result.message() {
            Some(message) => notifiers.broadcast(message),
            None if response.contains(STATUS_ERROR) => {
                warn!("Modem rejected {}: {}", String::from_utf8_lossy(&result.command).trim_end(), response.trim())
            }
            None => debug!("Nothing to report for {:?}", result.kind)
        }
    }
}
