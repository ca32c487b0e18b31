//! Runs the handshake-retry contract suite (scenario S3) against this
//! crate's own state machine.

#[spark_endpoint_tck::spark_endpoint_tck(suites(retries))]
mod retries {}
