use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Daemon event hooks; every method defaults to doing nothing.
pub trait Logger: Send + Sync {
    fn listening(&self, _bind: &str, _root: &Path) {}
    fn connected(&self, _peer: &str) {}
    fn store_start(&self, _peer: &str, _name: &str, _size: u64) {}
    fn store_done(&self, _peer: &str, _name: &str, _bytes: u64, _seconds: f64) {}
    fn retrieve_start(&self, _peer: &str, _name: &str) {}
    fn retrieve_done(&self, _peer: &str, _name: &str, _bytes: u64, _seconds: f64) {}
    fn error(&self, _peer: &str, _context: &str, _msg: &str) {}
    fn disconnected(&self, _peer: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

enum Sink {
    Stderr,
    File(Mutex<File>),
}

/// One timestamped line per event, to stderr or an append-only file
pub struct TextLogger {
    sink: Sink,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Sink::File(Mutex::new(f)),
        })
    }

    pub fn stderr() -> Self {
        Self { sink: Sink::Stderr }
    }

    fn line(&self, s: &str) {
        match &self.sink {
            Sink::Stderr => eprintln!("[{}] {}", Utc::now().to_rfc3339(), s),
            Sink::File(file) => {
                if let Ok(mut f) = file.lock() {
                    let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
                }
            }
        }
    }
}

impl Logger for TextLogger {
    fn listening(&self, bind: &str, root: &Path) {
        self.line(&format!("LISTEN bind={} root={}", bind, root.display()));
    }
    fn connected(&self, peer: &str) {
        self.line(&format!("ACCEPT peer={}", peer));
    }
    fn store_start(&self, peer: &str, name: &str, size: u64) {
        self.line(&format!("STORE peer={} name={} size={}", peer, name, size));
    }
    fn store_done(&self, peer: &str, name: &str, bytes: u64, seconds: f64) {
        self.line(&format!(
            "STORED peer={peer} name={name} bytes={bytes} seconds={seconds:.3}"
        ));
    }
    fn retrieve_start(&self, peer: &str, name: &str) {
        self.line(&format!("RETRIEVE peer={} name={}", peer, name));
    }
    fn retrieve_done(&self, peer: &str, name: &str, bytes: u64, seconds: f64) {
        self.line(&format!(
            "RETRIEVED peer={peer} name={name} bytes={bytes} seconds={seconds:.3}"
        ));
    }
    fn error(&self, peer: &str, context: &str, msg: &str) {
        self.line(&format!("ERROR peer={} ctx={} msg={}", peer, context, msg));
    }
    fn disconnected(&self, peer: &str) {
        self.line(&format!("DISCONNECT peer={}", peer));
    }
}

/// Fans every event out to several loggers
pub struct TeeLogger {
    loggers: Vec<Arc<dyn Logger>>,
}

impl TeeLogger {
    pub fn new(loggers: Vec<Arc<dyn Logger>>) -> Self {
        Self { loggers }
    }
}

impl Logger for TeeLogger {
    fn listening(&self, bind: &str, root: &Path) {
        self.loggers.iter().for_each(|l| l.listening(bind, root));
    }
    fn connected(&self, peer: &str) {
        self.loggers.iter().for_each(|l| l.connected(peer));
    }
    fn store_start(&self, peer: &str, name: &str, size: u64) {
        self.loggers.iter().for_each(|l| l.store_start(peer, name, size));
    }
    fn store_done(&self, peer: &str, name: &str, bytes: u64, seconds: f64) {
        self.loggers
            .iter()
            .for_each(|l| l.store_done(peer, name, bytes, seconds));
    }
    fn retrieve_start(&self, peer: &str, name: &str) {
        self.loggers.iter().for_each(|l| l.retrieve_start(peer, name));
    }
    fn retrieve_done(&self, peer: &str, name: &str, bytes: u64, seconds: f64) {
        self.loggers
            .iter()
            .for_each(|l| l.retrieve_done(peer, name, bytes, seconds));
    }
    fn error(&self, peer: &str, context: &str, msg: &str) {
        self.loggers.iter().for_each(|l| l.error(peer, context, msg));
    }
    fn disconnected(&self, peer: &str) {
        self.loggers.iter().for_each(|l| l.disconnected(peer));
    }
}
