//! Client side of the exchange.
//!
//! The bridge sends a host block to the optimizer and applies the returned patches. Nothing
//! reaches the host until the whole reply has arrived, so a failed exchange leaves the host
//! block untouched.

use std::os::unix::net::UnixStream;

use remopt_protocol::patch::{read_patch, PatchFrame};
use remopt_protocol::wire::{read_fallthrough, read_i32, write_announce, write_i32, write_record};
use remopt_protocol::{Announce, InstructionRecord, Limits, PatchSet, SENTINEL};

use crate::endpoint::{Endpoint, Endpoints};
use crate::error::{ExchangeError, Result};

/// The instrumentation host's live block.
pub trait HostBlock {
    fn snapshot(&self) -> Vec<InstructionRecord>;

    fn replace_contents(&mut self, records: Vec<InstructionRecord>);

    fn set_fallthrough(&mut self, target: u64);
}

/// In-memory [`HostBlock`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VecBlock {
    pub instructions: Vec<InstructionRecord>,
    pub fallthrough: Option<u64>,
}

impl VecBlock {
    pub fn new(instructions: Vec<InstructionRecord>) -> Self {
        Self {
            instructions,
            fallthrough: None,
        }
    }
}

impl HostBlock for VecBlock {
    fn snapshot(&self) -> Vec<InstructionRecord> {
        self.instructions.clone()
    }

    fn replace_contents(&mut self, records: Vec<InstructionRecord>) {
        self.instructions = records;
    }

    fn set_fallthrough(&mut self, target: u64) {
        self.fallthrough = Some(target);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    /// Length of the rewritten block.
    pub instructions: usize,
    /// New fallthrough target, if the optimizer set one.
    pub fallthrough: Option<u64>,
}

pub struct ClientBridge<E: Endpoint = UnixStream> {
    endpoints: Option<Endpoints<E>>,
    limits: Limits,
}

impl<E: Endpoint> ClientBridge<E> {
    pub fn new(endpoints: Endpoints<E>, limits: Limits) -> Self {
        Self {
            endpoints: Some(endpoints),
            limits,
        }
    }

    pub fn is_open(&self) -> bool {
        self.endpoints.is_some()
    }

    /// Run one block through the optimizer and install the result into `host`.
    ///
    /// A block that cannot be sent is refused before anything is written and the connection
    /// stays usable. Any later failure closes the connection.
    pub fn exchange<H: HostBlock + ?Sized>(&mut self, host: &mut H) -> Result<BlockOutcome> {
        if self.endpoints.is_none() {
            return Err(ExchangeError::Closed);
        }
        let originals = host.snapshot();
        let announce = Announce::for_block(originals.len())?;
        for record in &originals {
            self.limits.check(record.encoded_len())?;
        }

        match self.round_trip(announce, &originals) {
            Ok((patches, fallthrough)) => {
                let rewritten = patches.apply(&originals)?;
                let outcome = BlockOutcome {
                    instructions: rewritten.len(),
                    fallthrough,
                };
                host.replace_contents(rewritten);
                if let Some(target) = fallthrough {
                    host.set_fallthrough(target);
                }
                tracing::debug!(
                    sent = originals.len(),
                    received = outcome.instructions,
                    ?fallthrough,
                    "block rewritten"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), "block exchange failed: {err}");
                self.endpoints = None;
                Err(err)
            }
        }
    }

    fn round_trip(
        &mut self,
        announce: Announce,
        originals: &[InstructionRecord],
    ) -> Result<(PatchSet, Option<u64>)> {
        let Endpoints { reader, writer } =
            self.endpoints.as_mut().ok_or(ExchangeError::Closed)?;

        write_announce(writer, announce)?;
        read_i32(reader)?;
        for record in originals {
            write_record(writer, record, &self.limits)?;
            read_i32(reader)?;
        }
        write_i32(writer, 0)?;

        let mut patches = PatchSet::new();
        loop {
            match read_patch(reader, originals, &self.limits)? {
                PatchFrame::Entry(entry) => {
                    write_i32(writer, entry.original_index as i32)?;
                    patches.push(entry);
                }
                PatchFrame::End => {
                    write_i32(writer, SENTINEL)?;
                    break;
                }
            }
        }
        let fallthrough = read_fallthrough(reader)?;
        Ok((patches, fallthrough))
    }

    /// Terminate handshake. Releases the endpoints whether or not the handshake succeeds;
    /// calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(Endpoints {
            mut reader,
            mut writer,
        }) = self.endpoints.take()
        else {
            return Ok(());
        };
        write_announce(&mut writer, Announce::Terminate)?;
        read_i32(&mut reader)?;
        tracing::debug!("exchange terminated");
        Ok(())
    }
}

impl<E: Endpoint> Drop for ClientBridge<E> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::debug!("terminate handshake failed: {err}");
        }
    }
}
