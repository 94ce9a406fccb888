#![forbid(unsafe_code)]

//! Both ends of the block exchange: the optimizer's [`Reactor`] serving many clients, and the
//! [`ClientBridge`] an instrumented process uses to submit blocks.

pub mod bridge;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod reactor;
pub mod session;

pub use bridge::{BlockOutcome, ClientBridge, HostBlock, VecBlock};
pub use config::{ConfigError, ExchangeConfig};
pub use endpoint::{pipe_pair, Endpoint, Endpoints};
pub use error::{ExchangeError, Result};
pub use reactor::{Reactor, ReactorReport};
pub use session::{Phase, Progress, Session};
