//! Enable arbiter (§4.3). A single pure routine computing LL
//! read/write interest, called at every exit point of the event router and
//! state controller so enable/disable decisions live in exactly one place.
use crate::filter::Filter;
use crate::state::State;

/// Inputs the arbiter needs; intentionally decoupled from `Bookkeeping` so
/// it stays a pure function of a snapshot, easy to property-test in
/// isolation (see `tests/proptest_state.rs`).
#[derive(Debug, Clone, Copy)]
pub struct ArbiterSnapshot {
    pub state: State,
    pub read_enabled: bool,
    pub xmit_enabled: bool,
    pub tmp_xmit_enabled: bool,
    pub in_read: bool,
}

/// LL write should be enabled if: filter has LL-bound bytes pending, OR
/// `xmit_enabled`, OR `tmp_xmit_enabled`.
pub fn desired_ll_write(snap: ArbiterSnapshot, filter: Option<&dyn Filter>) -> bool {
    let filter_pending = filter.is_some_and(Filter::ll_write_pending);
    filter_pending || snap.xmit_enabled || snap.tmp_xmit_enabled
}

/// LL read should be enabled if `!in_read` AND either:
/// - `state == Open` and ((`read_enabled` and no UL-pending bytes) or the
///   filter signals `ll_read_needed`), or
/// - `state` is mid-handshake (`OpeningFilter`/`ClosingFilter`).
pub fn desired_ll_read(snap: ArbiterSnapshot, filter: Option<&dyn Filter>) -> bool {
    if snap.in_read {
        return false;
    }
    match snap.state {
        State::Open => {
            let ul_pending = filter.is_some_and(Filter::ul_read_pending);
            let read_needed = filter.is_some_and(Filter::ll_read_needed);
            (snap.read_enabled && !ul_pending) || read_needed
        }
        s if s.is_handshaking() => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFilter {
        ul_pending: bool,
        ll_pending: bool,
        read_needed: bool,
    }

    impl crate::filter::Filter for StubFilter {
        fn setup(&self) -> Result<(), crate::error::EndpointError> {
            Ok(())
        }
        fn cleanup(&self) {}
        fn ul_read_pending(&self) -> bool {
            self.ul_pending
        }
        fn ll_write_pending(&self) -> bool {
            self.ll_pending
        }
        fn ll_read_needed(&self) -> bool {
            self.read_needed
        }
        fn check_open_done(&self) -> Result<(), crate::error::EndpointError> {
            Ok(())
        }
        fn try_connect(&self) -> crate::filter::TryStepOutcome {
            crate::filter::TryStepOutcome::Done
        }
        fn try_disconnect(&self) -> crate::filter::TryStepOutcome {
            crate::filter::TryStepOutcome::Done
        }
        fn ul_write(
            &self,
            buf: &[u8],
            _sink: &mut crate::filter::Sink<'_>,
        ) -> Result<usize, crate::error::EndpointError> {
            Ok(buf.len())
        }
        fn ll_write(
            &self,
            buf: &[u8],
            _sink: &mut crate::filter::Sink<'_>,
        ) -> Result<usize, crate::error::EndpointError> {
            Ok(buf.len())
        }
    }

    fn base_snapshot(state: State) -> ArbiterSnapshot {
        ArbiterSnapshot {
            state,
            read_enabled: false,
            xmit_enabled: false,
            tmp_xmit_enabled: false,
            in_read: false,
        }
    }

    #[test]
    fn write_enabled_when_filter_has_pending_bytes() {
        let filter = StubFilter {
            ul_pending: false,
            ll_pending: true,
            read_needed: false,
        };
        assert!(desired_ll_write(base_snapshot(State::Open), Some(&filter)));
    }

    #[test]
    fn write_enabled_when_tmp_xmit_bootstraps_server_handshake() {
        let mut snap = base_snapshot(State::OpeningFilter);
        snap.tmp_xmit_enabled = true;
        assert!(desired_ll_write(snap, None));
    }

    #[test]
    fn write_disabled_when_nothing_wants_it() {
        assert!(!desired_ll_write(base_snapshot(State::Open), None));
    }

    #[test]
    fn read_disabled_while_in_read_regardless_of_state() {
        let mut snap = base_snapshot(State::Open);
        snap.in_read = true;
        snap.read_enabled = true;
        assert!(!desired_ll_read(snap, None));
    }

    #[test]
    fn read_enabled_during_handshake_states() {
        assert!(desired_ll_read(
            base_snapshot(State::OpeningFilter),
            None
        ));
        assert!(desired_ll_read(
            base_snapshot(State::ClosingFilter),
            None
        ));
    }

    #[test]
    fn read_enabled_in_open_when_user_wants_it_and_no_ul_backlog() {
        let mut snap = base_snapshot(State::Open);
        snap.read_enabled = true;
        let filter = StubFilter {
            ul_pending: false,
            ll_pending: false,
            read_needed: false,
        };
        assert!(desired_ll_read(snap, Some(&filter)));
    }

    #[test]
    fn read_disabled_in_open_when_ul_backlog_present_and_not_needed() {
        let mut snap = base_snapshot(State::Open);
        snap.read_enabled = true;
        let filter = StubFilter {
            ul_pending: true,
            ll_pending: false,
            read_needed: false,
        };
        assert!(!desired_ll_read(snap, Some(&filter)));
    }

    #[test]
    fn read_enabled_when_filter_needs_bytes_even_if_user_disabled_reads() {
        let snap = base_snapshot(State::Open);
        let filter = StubFilter {
            ul_pending: false,
            ll_pending: false,
            read_needed: true,
        };
        assert!(desired_ll_read(snap, Some(&filter)));
    }

    #[test]
    fn read_disabled_when_closed() {
        assert!(!desired_ll_read(base_snapshot(State::Closed), None));
    }
}
