//! HTTP agent construction for the metrics publisher.
//!
//! The publisher sends best-effort posts from its own thread, so the agent
//! is built inside that thread and owned by it exclusively. Timeouts are
//! short enough that a dead collector costs one dropped message, not a
//! stalled reporting loop.

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(50);
const REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) fn build_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}
