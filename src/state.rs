//! Shell Session State: the single process-wide value mutated by every shell
//! execution and read by magic-fix and the agent's context builder.

use std::sync::{Arc, Mutex};

/// Stderr capture is bounded at 64 KiB (SPEC_FULL §4.1, §5).
pub const MAX_STDERR_CAPTURE: usize = 64 * 1024;

/// Process-wide shell session state.
#[derive(Debug, Clone)]
pub struct ShellState {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    last_command: String,
    last_exit_code: i32,
    last_stderr: Vec<u8>,
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellState {
    /// Create session state with the invariant default of exit -1 ("no
    /// command has run yet", reused for internal failures per SPEC_FULL §3).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                last_command: String::new(),
                last_exit_code: -1,
                last_stderr: Vec::new(),
            })),
        }
    }

    pub fn last_command(&self) -> String {
        self.inner.lock().unwrap().last_command.clone()
    }

    pub fn last_exit_code(&self) -> i32 {
        self.inner.lock().unwrap().last_exit_code
    }

    pub fn last_stderr(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap().last_stderr).into_owned()
    }

    /// Record the command about to run, resetting the stderr capture buffer.
    pub fn begin_command(&self, command: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_command = command.to_string();
        inner.last_stderr.clear();
    }

    /// Append bytes to the bounded stderr capture buffer. Bytes beyond the
    /// cap are silently dropped but the caller must still forward them to the
    /// real stderr stream (SPEC_FULL §5).
    pub fn capture_stderr(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let remaining = MAX_STDERR_CAPTURE.saturating_sub(inner.last_stderr.len());
        if remaining == 0 {
            return;
        }
        let take = remaining.min(bytes.len());
        inner.last_stderr.extend_from_slice(&bytes[..take]);
    }

    /// Record the exit code of the command that just finished.
    pub fn finish_command(&self, exit_code: i32) {
        self.inner.lock().unwrap().last_exit_code = exit_code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_sentinel_exit_code() {
        let state = ShellState::new();
        assert_eq!(state.last_exit_code(), -1);
        assert_eq!(state.last_command(), "");
        assert_eq!(state.last_stderr(), "");
    }

    #[test]
    fn stderr_capture_never_exceeds_cap() {
        let state = ShellState::new();
        state.begin_command("noisy");
        let chunk = vec![b'e'; MAX_STDERR_CAPTURE / 2];
        state.capture_stderr(&chunk);
        state.capture_stderr(&chunk);
        state.capture_stderr(&chunk);
        assert_eq!(state.last_stderr().len(), MAX_STDERR_CAPTURE);
    }

    #[test]
    fn begin_command_resets_stderr() {
        let state = ShellState::new();
        state.begin_command("first");
        state.capture_stderr(b"boom");
        state.finish_command(1);
        state.begin_command("second");
        assert_eq!(state.last_stderr(), "");
        assert_eq!(state.last_command(), "second");
    }

    #[test]
    fn clone_shares_state() {
        let state = ShellState::new();
        let clone = state.clone();
        clone.begin_command("shared");
        clone.finish_command(42);
        assert_eq!(state.last_command(), "shared");
        assert_eq!(state.last_exit_code(), 42);
    }
}
