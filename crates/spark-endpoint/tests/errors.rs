//! Runs the error-propagation contract suite (scenario S4, plus
//! write-error idempotence) against this crate's own state machine.

#[spark_endpoint_tck::spark_endpoint_tck(suites(errors))]
mod errors {}
