//! Lifecycle states (§3 "Data model" / §4.1 "State controller").
//!
//! Exactly one of these is current at any time (invariant 1); transitions are
//! only those named in the table in §4.1, enforced by construction: nothing
//! outside `crate::endpoint` constructs a `State` value directly from user
//! input, every transition goes through a named method on `Bookkeeping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    OpeningLl,
    OpeningFilter,
    Open,
    CloseWaitDrain,
    ClosingFilter,
    ClosingLl,
}

impl State {
    /// States in which the filter handshake still needs raw bytes to
    /// progress (§4.3 enable arbiter, second read-enable disjunct).
    pub fn is_handshaking(self) -> bool {
        matches!(self, State::OpeningFilter | State::ClosingFilter)
    }

    /// States reachable only via `open()`, used by the close-while-opening
    /// tie-break in §4.1.
    pub fn is_opening(self) -> bool {
        matches!(self, State::OpeningLl | State::OpeningFilter)
    }

    /// States reachable only via `close()`/teardown.
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            State::CloseWaitDrain | State::ClosingFilter | State::ClosingLl
        )
    }
}
