//! Action list executed with the lock dropped — the precise set (§5) of "the
//! only operations invoked with the lock dropped": user callbacks,
//! completion callbacks, and the filter's `timeout()` hook. Everything else
//! (LL open/close/write/enable toggles, filter handshake steps, timer
//! arm/cancel, deferred-op submission) is cheap and non-blocking by contract
//! (§6), so the transition functions in `endpoint.rs` call it directly while
//! still holding the lock.
//!
//! Every lock-held transition function returns a `Vec<Action>` for the small
//! remaining set of lock-dropped calls instead of invoking them directly.
//! The caller drains that list strictly after releasing the lock, making
//! "no user callback is invoked while the lock is held" (§8 property 3) a
//! property of the call graph rather than something each transition has to
//! remember to uphold.
use crate::error::EndpointError;
use crate::handlers::{CloseDone, OpenDone};

pub enum Action {
    /// Deliver bytes (or a read error) to the user's read callback.
    CallUserRead { data: Result<Vec<u8>, EndpointError> },
    /// Notify the user that a write is likely to make progress now.
    CallUserWrite,
    /// Forward an out-of-band notification to the user.
    CallUserUrgent,
    /// Fire an `open_done` completion, exactly once.
    FireOpenDone(OpenDone, Result<(), EndpointError>),
    /// Fire a `close_done` completion, exactly once.
    FireCloseDone(CloseDone),
    /// Invoke the filter's `timeout()` hook (§4.6, `Open` state tick).
    FilterTimeout,
}

pub(crate) type ActionList = Vec<Action>;
