//! Naimi–Trehel token-based distributed mutual exclusion with
//! Naimi–Arnould failure recovery, simulated over an in-process
//! asynchronous network.
//!
//! See the module docs on [`node`] and [`supervisor`] for the algorithm
//! itself; [`transport`] and [`message`] model the wire.

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod node;
pub mod sentinel;
pub mod supervisor;
pub mod transport;

pub use config::Config;
pub use error::{CodecError, ConfigError, NodeError, TransportError};
pub use message::{Message, NodeId};
pub use metrics::Counters;
pub use node::Node;
pub use sentinel::ResourceSentinel;
pub use supervisor::{Supervisor, SupervisorBuilder};
pub use transport::Transport;
