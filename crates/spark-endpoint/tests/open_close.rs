//! Runs the open/close lifecycle contract suite (scenarios S1, S2) against
//! this crate's own state machine, via the shared contract test kit.

#[spark_endpoint_tck::spark_endpoint_tck(suites(open_close))]
mod open_close {}
