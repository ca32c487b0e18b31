//! Runs the write-backpressure / drain-on-close contract suite
//! (scenarios S5, S6) against this crate's own state machine.

#[spark_endpoint_tck::spark_endpoint_tck(suites(backpressure))]
mod backpressure {}
