//! Optimizer side of one client connection.
//!
//! A session waits for an announce without blocking. Once one arrives it serves the whole
//! block with blocking round trips, each read bounded by the configured exchange timeout, and
//! goes back to waiting.

use std::io::{self, Read};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use remopt_block::{BlockModel, Optimizer};
use remopt_protocol::patch::{write_patch, PatchFrame};
use remopt_protocol::wire::{read_i32, read_record, write_fallthrough, write_i32};
use remopt_protocol::{Announce, Limits, SENTINEL};

use crate::config::ExchangeConfig;
use crate::endpoint::{Endpoint, Endpoints};
use crate::error::{ExchangeError, Result};

/// Upper bound on the up-front reservation for a block; the announce count is peer-controlled.
const MAX_RESERVED_INSTRUCTIONS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingAnnounce,
    ReceivingInstructions,
    RunningOptimizer,
    SendingPatches,
    SendingFallthrough,
    Closed,
}

/// What one [`Session::step`] accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// No complete announce was available.
    Idle,
    Served { instructions: u32, patches: usize },
    Terminated,
}

pub struct Session<E: Endpoint = UnixStream> {
    id: usize,
    endpoints: Option<Endpoints<E>>,
    phase: Phase,
    announce: [u8; 4],
    announce_len: usize,
    limits: Limits,
    exchange_timeout: Option<Duration>,
}

impl<E: Endpoint> Session<E> {
    pub fn new(id: usize, endpoints: Endpoints<E>, config: &ExchangeConfig) -> Self {
        Self {
            id,
            endpoints: Some(endpoints),
            phase: Phase::AwaitingAnnounce,
            announce: [0; 4],
            announce_len: 0,
            limits: config.limits,
            exchange_timeout: config.exchange_timeout,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Advance the connection by at most one block.
    ///
    /// Any error aborts the connection: the endpoints are released and the session is closed.
    pub fn step(&mut self, optimizer: &mut dyn Optimizer) -> Result<Progress> {
        if self.is_closed() {
            return Err(ExchangeError::Closed);
        }
        let result = match self.poll_announce() {
            Ok(None) => Ok(Progress::Idle),
            Ok(Some(Announce::Terminate)) => self.terminate(),
            Ok(Some(Announce::Block { count })) => self.serve_block(count, optimizer),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            tracing::warn!(
                connection = self.id,
                phase = ?self.phase,
                kind = ?err.kind(),
                "aborting connection: {err}"
            );
            self.abort();
        }
        result
    }

    /// Release the endpoints without a handshake.
    pub fn abort(&mut self) {
        self.endpoints = None;
        self.phase = Phase::Closed;
    }

    fn poll_announce(&mut self) -> Result<Option<Announce>> {
        let endpoints = self.endpoints.as_mut().ok_or(ExchangeError::Closed)?;
        let reader = &mut endpoints.reader;
        reader.set_nonblocking(true)?;
        while self.announce_len < self.announce.len() {
            match reader.read(&mut self.announce[self.announce_len..]) {
                Ok(0) => return Err(ExchangeError::PeerHungUp),
                Ok(n) => self.announce_len += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.announce_len = 0;

        // The rest of the cycle is blocking. With a shared socket this also covers the writer.
        reader.set_nonblocking(false)?;
        reader.set_read_timeout(self.exchange_timeout)?;
        endpoints.writer.set_nonblocking(false)?;

        let announce = Announce::from_wire(i32::from_le_bytes(self.announce))?;
        Ok(Some(announce))
    }

    fn terminate(&mut self) -> Result<Progress> {
        let endpoints = self.endpoints.as_mut().ok_or(ExchangeError::Closed)?;
        write_i32(&mut endpoints.writer, SENTINEL)?;
        self.endpoints = None;
        self.phase = Phase::Closed;
        tracing::info!(connection = self.id, "client terminated");
        Ok(Progress::Terminated)
    }

    fn serve_block(&mut self, count: u32, optimizer: &mut dyn Optimizer) -> Result<Progress> {
        let Endpoints { reader, writer } =
            self.endpoints.as_mut().ok_or(ExchangeError::Closed)?;
        let connection = self.id;

        self.phase = Phase::ReceivingInstructions;
        write_i32(writer, count as i32)?;
        let reserve = (count as usize).min(MAX_RESERVED_INSTRUCTIONS);
        let mut block = BlockModel::with_capacity(reserve);
        for index in 0..count {
            let record = read_record(reader, &self.limits)?;
            write_i32(writer, index as i32)?;
            tracing::trace!(connection, index, address = record.address(), "instruction");
            block.push_original(record);
        }
        read_i32(reader)?;
        tracing::debug!(connection, count, "block received");

        self.phase = Phase::RunningOptimizer;
        if let Err(err) = optimizer.optimize(&mut block) {
            tracing::warn!(connection, %err, "optimizer failed, returning block unchanged");
            block.restore_original();
        }

        self.phase = Phase::SendingPatches;
        let patches = block.patch_set();
        let sent = patches.len();
        for entry in patches {
            write_patch(writer, &PatchFrame::Entry(entry), block.originals(), &self.limits)?;
            read_i32(reader)?;
        }
        write_patch(writer, &PatchFrame::End, block.originals(), &self.limits)?;
        read_i32(reader)?;

        self.phase = Phase::SendingFallthrough;
        write_fallthrough(writer, block.fallthrough())?;
        tracing::debug!(connection, patches = sent, "block served");

        self.phase = Phase::AwaitingAnnounce;
        Ok(Progress::Served {
            instructions: count,
            patches: sent,
        })
    }
}
