use std::io;

use remopt_protocol::{ErrorKind, WireError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("peer closed its end of the channel")]
    PeerHungUp,

    #[error("connection is closed")]
    Closed,
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::Wire(err) => err.kind(),
            ExchangeError::PeerHungUp | ExchangeError::Closed => ErrorKind::Channel,
        }
    }
}

impl From<io::Error> for ExchangeError {
    fn from(err: io::Error) -> Self {
        ExchangeError::Wire(WireError::Io(err))
    }
}

pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;
