use std::io::{ErrorKind, Read, Write};
use std::thread::sleep;
use std::time::Duration;
use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, warn};
use crate::task::{AtResult, AtTask, TaskKind, CTRL_Z, ESC};

pub const IO_TIMEOUT: Duration = Duration::from_secs(2);
pub const PROMPT_DELAY: Duration = Duration::from_secs(1); // Wait for the `>` prompt after AT+CMGS
const RESPONSE_BUFFER: usize = 8 * 1024;
const PROMPT: u8 = b'>';

/// Exclusive owner of the modem handle. Runs one task at a time.
pub struct SerialSession<P: Read + Write> {
    port: P,
    prompt_delay: Duration
}
impl<P: Read + Write> SerialSession<P> {
    pub fn new(port: P) -> Self {
        Self { port, prompt_delay: PROMPT_DELAY }
    }

    pub fn with_prompt_delay(mut self, prompt_delay: Duration) -> Self {
        self.prompt_delay = prompt_delay;
        self
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes).context("Failed to write to modem")?;
        self.port.flush().context("Failed to flush modem writes")
    }

    /// Single fixed-size read. Anything the modem emits past the buffer is lost.
    fn read(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0; RESPONSE_BUFFER];
        match self.port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock) => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read from modem")
        }
    }

    pub fn execute(&mut self, task: AtTask) -> Result<AtResult> {
        debug!("Sending command: {}", task.display());

        let raw = match &task.kind {
            TaskKind::SendSms { body } => {
                self.write(&task.command)?;
                sleep(self.prompt_delay);
                let mut raw = self.read()?;

                self.write(body)?;
                if raw.contains(&PROMPT) {
                    self.write(&[CTRL_Z])?;
                } else {
                    // A late prompt would leave the modem swallowing the next commands as text.
                    warn!("No prompt from modem, cancelling message input");
                    self.write(&[ESC])?;
                }
                sleep(task.settle);
                raw.extend(self.read()?);
                raw
            }
            _ => {
                self.write(&task.command)?;
                sleep(task.settle);
                self.read()?
            }
        };

        debug!("Command response: {}", String::from_utf8_lossy(&raw).replace("\r\n", " | "));
        Ok(AtResult {
            kind: task.kind,
            command: task.command,
            raw
        })
    }

    /// Drain the task queue until every producer hangs up. I/O errors end the
    /// loop so the caller can treat them as fatal.
    pub fn run(mut self, tasks: Receiver<AtTask>, results: Sender<AtResult>) -> Result<()> {
        info!("Serial executor started");
        for task in tasks {
            let result = self.execute(task)?;
            if results.send(result).is_err() {
                break;
            }
        }

        info!("Serial executor stopped");
        Ok(())
    }
}
