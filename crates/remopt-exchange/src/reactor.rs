//! Single-threaded multiplexer over every client session.
//!
//! Each sweep visits the sessions in order:
//! 1. A session with no complete announce is skipped without blocking.
//! 2. A session with an announce is served for one full block before the sweep moves on.
//! 3. A session that errors is closed; its siblings are unaffected.
//!
//! A sweep that serves nothing is followed by a short sleep instead of spinning.

use std::os::unix::net::UnixStream;

use remopt_block::Optimizer;

use crate::config::ExchangeConfig;
use crate::endpoint::{Endpoint, Endpoints};
use crate::session::{Progress, Session};

/// Totals over the life of a [`Reactor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorReport {
    pub blocks_served: u64,
    /// Instructions received across all blocks.
    pub instructions: u64,
    /// Patch entries sent across all blocks, sentinels excluded.
    pub patches: u64,
    /// Connections closed by the terminate handshake.
    pub terminated: usize,
    /// Connections closed because of an error.
    pub aborted: usize,
}

pub struct Reactor<E: Endpoint = UnixStream> {
    sessions: Vec<Session<E>>,
    optimizer: Box<dyn Optimizer>,
    config: ExchangeConfig,
    report: ReactorReport,
}

impl<E: Endpoint> Reactor<E> {
    pub fn new(optimizer: Box<dyn Optimizer>, config: ExchangeConfig) -> Self {
        Self {
            sessions: Vec::new(),
            optimizer,
            config,
            report: ReactorReport::default(),
        }
    }

    /// Register a client. Returns the id used in log fields.
    pub fn add_connection(&mut self, endpoints: Endpoints<E>) -> usize {
        let id = self.sessions.len();
        self.sessions.push(Session::new(id, endpoints, &self.config));
        tracing::info!(connection = id, "client connected");
        id
    }

    pub fn open_connections(&self) -> usize {
        self.sessions.iter().filter(|s| !s.is_closed()).count()
    }

    pub fn report(&self) -> ReactorReport {
        self.report
    }

    /// One sweep over every open session. Returns whether any session made progress.
    pub fn poll_once(&mut self) -> bool {
        let mut progressed = false;
        for session in self.sessions.iter_mut().filter(|s| !s.is_closed()) {
            match session.step(&mut *self.optimizer) {
                Ok(Progress::Idle) => {}
                Ok(Progress::Served {
                    instructions,
                    patches,
                }) => {
                    self.report.blocks_served += 1;
                    self.report.instructions += u64::from(instructions);
                    self.report.patches += patches as u64;
                    progressed = true;
                }
                Ok(Progress::Terminated) => {
                    self.report.terminated += 1;
                    progressed = true;
                }
                // The session has already closed itself and logged why.
                Err(_) => {
                    self.report.aborted += 1;
                    progressed = true;
                }
            }
        }
        progressed
    }

    /// Serve until every connection has closed.
    pub fn run(&mut self) -> ReactorReport {
        while self.open_connections() > 0 {
            if !self.poll_once() {
                std::thread::sleep(self.config.idle_backoff);
            }
        }
        tracing::info!(
            blocks = self.report.blocks_served,
            terminated = self.report.terminated,
            aborted = self.report.aborted,
            "all connections closed"
        );
        self.report
    }
}
