// SPDX-License-Identifier: CEPL-1.0
//! Developer console plumbing.
//!
//! Lines arrive on whatever thread reads input and are queued in a
//! [`CommandQueue`]. The thread that owns the [`Console`] drains the queue
//! and dispatches each line to a registered handler.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("empty command line")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("command key `{0}` must be non-empty and contain no whitespace")]
    InvalidKey(String),
    #[error("command `{0}` is already registered")]
    Duplicate(String),
}

/// `cmd arg1 arg2` split into the key and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCommand {
    pub key: String,
    pub args: Vec<String>,
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace().map(str::to_owned);
        let key = parts.next().ok_or(ConsoleError::Empty)?;
        Ok(Self {
            key,
            args: parts.collect(),
        })
    }
}

/// Multi-producer queue of raw console lines.
#[derive(Clone, Default)]
pub struct CommandQueue {
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut q = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        q.push_back(line.into());
    }

    /// Takes every queued line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut q = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        q.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .map(|q| q.is_empty())
            .unwrap_or_else(|e| e.into_inner().is_empty())
    }
}

type Handler = Box<dyn FnMut(&[String]) + Send>;

struct Entry {
    key: String,
    usage: String,
    func: Handler,
}

/// Registry of commands plus the history of executed lines.
pub struct Console {
    entries: Vec<Entry>,
    history: Vec<String>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn add_command(
        &mut self,
        key: &str,
        usage: &str,
        func: impl FnMut(&[String]) + Send + 'static,
    ) -> Result<(), ConsoleError> {
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(ConsoleError::InvalidKey(key.to_owned()));
        }
        if key == "help" || self.entries.iter().any(|e| e.key == key) {
            return Err(ConsoleError::Duplicate(key.to_owned()));
        }
        self.entries.push(Entry {
            key: key.to_owned(),
            usage: usage.to_owned(),
            func: Box::new(func),
        });
        Ok(())
    }

    /// Parses and runs one line. `help` and `help <cmd>` are built in.
    pub fn run(&mut self, line: &str) -> Result<(), ConsoleError> {
        let cmd: ConsoleCommand = line.parse()?;
        self.history.push(line.trim().to_owned());

        if cmd.key == "help" {
            for line in self.help_lines(cmd.args.first().map(String::as_str))? {
                info!("{line}");
            }
            return Ok(());
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == cmd.key)
            .ok_or_else(|| ConsoleError::Unknown(cmd.key.clone()))?;
        (entry.func)(&cmd.args);
        Ok(())
    }

    /// Runs everything pending in `queue`; failures are logged, not returned.
    pub fn run_pending(&mut self, queue: &CommandQueue) {
        for line in queue.drain() {
            if let Err(e) = self.run(&line) {
                warn!("console: {e}");
            }
        }
    }

    pub fn help_lines(&self, key: Option<&str>) -> Result<Vec<String>, ConsoleError> {
        match key {
            None => Ok(self
                .entries
                .iter()
                .map(|e| format!("{} - {}", e.key, e.usage))
                .collect()),
            Some(k) => self
                .entries
                .iter()
                .find(|e| e.key == k)
                .map(|e| vec![format!("Usage: {}", e.usage)])
                .ok_or_else(|| ConsoleError::Unknown(k.to_owned())),
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn parses_key_and_args() {
        let cmd: ConsoleCommand = "  vkdiag   queue extra ".parse().unwrap();
        assert_eq!(cmd.key, "vkdiag");
        assert_eq!(cmd.args, vec!["queue".to_owned(), "extra".to_owned()]);
    }

    #[test]
    fn blank_line_is_rejected() {
        assert_eq!("   ".parse::<ConsoleCommand>(), Err(ConsoleError::Empty));
    }

    #[test]
    fn dispatches_to_registered_handler() {
        let (tx, rx) = mpsc::channel();
        let mut console = Console::new();
        console
            .add_command("vkdiag", "vkdiag ext|gpu|queue", move |args| {
                tx.send(args.to_vec()).unwrap();
            })
            .unwrap();

        console.run("vkdiag gpu").unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec!["gpu".to_owned()]);
        assert_eq!(console.history(), ["vkdiag gpu"]);
    }

    #[test]
    fn unknown_and_invalid_keys() {
        let mut console = Console::new();
        assert_eq!(
            console.run("nope"),
            Err(ConsoleError::Unknown("nope".to_owned()))
        );
        assert!(matches!(
            console.add_command("two words", "", |_| {}),
            Err(ConsoleError::InvalidKey(_))
        ));
        console.add_command("quit", "quit", |_| {}).unwrap();
        assert!(matches!(
            console.add_command("quit", "quit", |_| {}),
            Err(ConsoleError::Duplicate(_))
        ));
    }

    #[test]
    fn help_lists_usage() {
        let mut console = Console::new();
        console.add_command("quit", "quit - exit", |_| {}).unwrap();
        assert_eq!(console.help_lines(None).unwrap(), ["quit - quit - exit"]);
        assert_eq!(
            console.help_lines(Some("quit")).unwrap(),
            ["Usage: quit - exit"]
        );
        assert!(console.run("help").is_ok());
    }

    #[test]
    fn queue_drains_in_order_across_threads() {
        let queue = CommandQueue::new();
        let producer = queue.clone();
        std::thread::spawn(move || {
            producer.push("a");
            producer.push("b");
        })
        .join()
        .unwrap();

        assert_eq!(queue.drain(), ["a", "b"]);
        assert!(queue.is_empty());
    }
}
