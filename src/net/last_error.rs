//! Per-connection record of the most recent error.
//!
//! Created when a worker starts and lent to the handler on every `process`
//! call, so a handler can report an earlier failure back to the client.

#[derive(Debug, Clone, Default)]
pub struct LastError {
    code: Option<u32>,
    message: Option<String>,
    requests_since: u32,
    disabled: bool,
}

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. Ignored while disabled.
    pub fn record(&mut self, code: u32, message: impl Into<String>) {
        if self.disabled {
            return;
        }
        self.code = Some(code);
        self.message = Some(message.into());
        self.requests_since = 0;
    }

    /// Called by the worker before each dispatch.
    pub fn start_request(&mut self) {
        if self.is_set() {
            self.requests_since = self.requests_since.saturating_add(1);
        }
    }

    pub fn reset(&mut self) {
        self.code = None;
        self.message = None;
        self.requests_since = 0;
    }

    /// Stop recording until [`LastError::enable`] is called.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_set(&self) -> bool {
        self.code.is_some()
    }

    pub fn code(&self) -> Option<u32> {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Requests dispatched since the error was recorded.
    pub fn requests_since(&self) -> Option<u32> {
        self.code.map(|_| self.requests_since)
    }
}
