//! A base stackable stream endpoint: a state machine that composes a
//! lower-level transport (`LowerLayer`) with an optional byte-transforming
//! `Filter` behind one uniform read/write/open/close interface.
//!
//! See `endpoint::Endpoint` for the entry point. `ll`/`filter`/`handlers`
//! define the seams an embedder implements; `arbiter` and `action` are
//! internal plumbing kept public within the crate for test access.

mod action;
pub mod arbiter;
mod config;
mod endpoint;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod host;
pub mod ll;
#[cfg(any(test, loom))]
mod lifetime;
pub mod state;

pub use config::EndpointConfig;
pub use endpoint::Endpoint;
pub use error::{EndpointError, ErrorKind};
pub use filter::{Filter, Sink, TryStepOutcome};
pub use handlers::{CloseDone, EndpointHandlers, OpenDone};
pub use host::{StdTimer, ThreadRunner};
pub use ll::{DeferredRunner, LlCloseCompletion, LlOpenCompletion, LowerLayer, PeerDescriptor, SingleShotTimer};
pub use state::State;
