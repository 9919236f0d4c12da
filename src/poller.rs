use std::thread::sleep;
use std::time::Duration;
use crossbeam::channel::Sender;
use log::{debug, info};
use crate::task::{AtTask, CMD_CHARSET_UCS2, CMD_TEXT_MODE};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const PURGE_EVERY: u32 = 12; // Cycles between clearing read messages off the SIM

/// Unconditional heartbeat that asks the modem for unread messages.
pub struct Poller {
    interval: Duration,
    purge_every: u32,
    cycle: u32
}
impl Default for Poller {
    fn default() -> Self {
        Self::new(POLL_INTERVAL, PURGE_EVERY)
    }
}
impl Poller {
    pub fn new(interval: Duration, purge_every: u32) -> Self {
        Self {
            interval,
            purge_every: purge_every.max(1),
            cycle: 0
        }
    }

    /// Listing needs text mode, and UCS-2 so every header and body arrives as hex
    /// whatever charset the modem was left in.
    pub fn startup_tasks() -> Vec<AtTask> {
        vec![AtTask::setup(CMD_TEXT_MODE), AtTask::setup(CMD_CHARSET_UCS2)]
    }

    /// Tasks for the next cycle: always a listing, plus a purge every Nth cycle.
    pub fn cycle(&mut self) -> Vec<AtTask> {
        self.cycle = self.cycle % self.purge_every + 1;

        let mut tasks = vec![AtTask::list_unread()];
        if self.cycle == self.purge_every {
            debug!("Scheduling purge of read messages");
            tasks.push(AtTask::purge_read());
        }
        tasks
    }

    /// Runs until the executor side of the queue goes away.
    pub fn run(mut self, tasks: Sender<AtTask>) {
        info!("Poller started, interval {:?}", self.interval);
        for task in Self::startup_tasks() {
            if tasks.send(task).is_err() {
                return;
            }
        }

        loop {
            for task in self.cycle() {
                if tasks.send(task).is_err() {
                    info!("Task queue closed, poller stopping");
                    return;
                }
            }
            sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;
    use crate::task::TaskKind;
    use super::*;

    fn count(tasks: &[AtTask], kind: TaskKind) -> usize {
        tasks.iter().filter(|t| t.kind == kind).count()
    }

    #[test]
    fn twelve_cycles_have_one_purge() {
        let mut poller = Poller::default();
        let tasks: Vec<AtTask> = (0..12).flat_map(|_| poller.cycle()).collect();
        assert_eq!(count(&tasks, TaskKind::ListUnread), 12);
        assert_eq!(count(&tasks, TaskKind::PurgeRead), 1);
    }

    #[test]
    fn any_window_of_twelve_has_one_purge() {
        let mut poller = Poller::default();
        let cycles: Vec<Vec<AtTask>> = (0..40).map(|_| poller.cycle()).collect();
        for window in cycles.windows(12) {
            let tasks: Vec<AtTask> = window.concat();
            assert_eq!(count(&tasks, TaskKind::PurgeRead), 1);
        }
    }

    #[test]
    fn purge_follows_listing() {
        let mut poller = Poller::new(Duration::ZERO, 2);
        assert_eq!(poller.cycle().len(), 1);
        let second = poller.cycle();
        assert_eq!(second[0].kind, TaskKind::ListUnread);
        assert_eq!(second[1].kind, TaskKind::PurgeRead);
    }

    #[test]
    fn run_enqueues_startup_then_cycles() {
        let (tx, rx) = bounded(4);
        let handle = std::thread::spawn(move || Poller::new(Duration::ZERO, 12).run(tx));

        let first: Vec<AtTask> = rx.iter().take(4).collect();
        drop(rx);
        handle.join().unwrap();

        assert_eq!(first[0].command, b"AT+CMGF=1\r\n".to_vec());
        assert_eq!(first[1].command, b"AT+CSCS=\"UCS2\"\r\n".to_vec());
        assert_eq!(first[2].kind, TaskKind::ListUnread);
        assert_eq!(first[3].kind, TaskKind::ListUnread);
    }

    #[test]
    fn startup_selects_ucs2_charset() {
        let commands: Vec<String> = Poller::startup_tasks().iter().map(AtTask::display).collect();
        assert_eq!(commands, vec!["AT+CMGF=1", "AT+CSCS=\"UCS2\""]);
    }
}
