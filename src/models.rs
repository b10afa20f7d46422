use serde::{Deserialize, Serialize};

/// Outcome of a single ICMP reachability check.
///
/// `rc` follows the iputils exit convention: 0 means an echo reply came
/// back, 1 means no reply within the timeout, 2 covers every other failure
/// (name resolution, sockets, missing permissions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub host: String,
    pub success: bool,
    pub rc: i32,
    pub error: Option<String>,
}

/// Outcome of a single portal login attempt. `status` is the HTTP status
/// code, or -1 when the request never produced a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResult {
    pub success: bool,
    pub status: i32,
    pub body: Option<String>,
    pub error: Option<String>,
}

/// Snapshot of the watchdog for display. Only the most recent probe and
/// login outcomes are retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorState {
    pub running: bool,
    pub consecutive_failures: u32,
    pub last_ping: Option<PingResult>,
    pub last_login: Option<LoginResult>,
}
