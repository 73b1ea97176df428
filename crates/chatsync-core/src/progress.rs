//! Progress lines and liveness signals.
//!
//! Long loops (garbage collection batches, chunk accumulation, user listing)
//! call `Heartbeat::beat` so the host running the unit can tell it apart
//! from a hung one. `ProgressHeartbeat` turns beats into
//! `CHATSYNC_PROGRESS:{json}` lines on stdout.

use std::io::Write;

/// Emit a progress update to stdout.
///
/// Output format: `CHATSYNC_PROGRESS:{"provider":"slack","status":"syncing",...}\n`
pub fn emit_progress(provider: &str, status: &str, message: &str, docs: Option<usize>) {
    let payload = serde_json::json!({
        "provider": provider,
        "status": status,
        "message": message,
        "documents_processed": docs
    });
    if let Ok(line) = serde_json::to_string(&payload) {
        println!("CHATSYNC_PROGRESS:{}", line);
        let _ = std::io::stdout().flush();
    }
}

/// Liveness signal provided by the host that runs a sync unit.
pub trait Heartbeat: Send + Sync {
    fn beat(&self, details: &str);
}

/// Heartbeat that reports through progress lines.
#[derive(Debug, Clone)]
pub struct ProgressHeartbeat {
    provider: &'static str,
}

impl ProgressHeartbeat {
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }
}

impl Heartbeat for ProgressHeartbeat {
    fn beat(&self, details: &str) {
        emit_progress(self.provider, "heartbeat", details, None);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHeartbeat;

impl Heartbeat for NoopHeartbeat {
    fn beat(&self, _details: &str) {}
}
