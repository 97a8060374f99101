//! Keep-alive based reachability of actuator nodes.

use std::time::{SystemTime, UNIX_EPOCH};

use hivekeeper_state::Node;

/// Missed keep-alive periods tolerated by default.
pub const DEFAULT_MAX_FAILED_KEEPALIVE: u32 = 3;

/// A node is unreachable once it has been silent for strictly longer than
/// `keep_alive × max_failed_keepalive` seconds.
pub fn is_unreachable(node: &Node, now: u64, max_failed_keepalive: u32) -> bool {
    let budget = u64::from(node.keep_alive_secs) * u64::from(max_failed_keepalive);
    now.saturating_sub(node.last_seen) > budget
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
