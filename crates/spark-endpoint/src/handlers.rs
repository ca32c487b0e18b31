//! User-facing callback surface: one-shot `open_done`/`close_done`
//! completions (§3), plus the Endpoint-facing steady-state API (§6).
use crate::error::EndpointError;

/// The three steady-state notifications a user installs for the life of an
/// `Endpoint` (as opposed to `open`/`close`'s one-shot completions).
pub trait EndpointHandlers: Send + Sync + 'static {
    /// `read_callback(err, buf, len) -> consumed`. Invoked only while
    /// `state == Open` and reads are enabled (§4.2's `read_data_handler`
    /// rule); never invoked while the endpoint's lock is held.
    fn on_read(&self, data: Result<&[u8], &EndpointError>) -> usize;

    /// `write_callback()`. Fired when the filter has no pending LL-bound
    /// bytes and the endpoint is `Open` (§4.2, LL write-ready step 6).
    fn on_write_ready(&self);

    /// `urgent_callback()`. Out-of-band notification passthrough (§4.2).
    fn on_urgent(&self);
}

/// One-shot completion for `open()`. Never invoked more than once per
/// attempt (invariant 2).
pub type OpenDone = Box<dyn FnOnce(Result<(), EndpointError>) + Send>;

/// One-shot completion for `close()`. Close never surfaces an error (§7):
/// it always succeeds into `Closed`, gracefully or forced.
pub type CloseDone = Box<dyn FnOnce() + Send>;
