//! Register Wire Protocol
//!
//! Routes and query parameters of the HTTP contract. Bodies are plain decimal text, not
//! JSON, so any HTTP client (curl included) can talk to a node.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::register::RegisterState;

// --- API Endpoints ---

/// Public read of the current value (version is not exposed).
pub const ENDPOINT_GET: &str = "/get";
/// Peer push: `/notify/{curVal}/{curGeneration}?notifier={origin}`.
pub const ENDPOINT_NOTIFY: &str = "/notify";

/// Public local write: `/set/{newVal}`.
pub(crate) const ROUTE_SET: &str = "/set/:new_val";
pub(crate) const ROUTE_NOTIFY: &str = "/notify/:cur_val/:cur_generation";

/// Query string of a push.
///
/// `notifier` only feeds the log line written when a push is accepted.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotifyParams {
    pub notifier: Option<String>,
}

/// URL of a push without its query string.
pub fn notify_url(http_addr: SocketAddr, state: RegisterState) -> String {
    format!(
        "http://{}{}/{}/{}",
        http_addr, ENDPOINT_NOTIFY, state.value, state.version
    )
}
