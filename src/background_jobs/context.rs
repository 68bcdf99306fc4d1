use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// What started this run ("schedule", "manual", "hook:OnStartup").
    pub triggered_by: String,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, triggered_by: impl Into<String>) -> Self {
        Self {
            cancellation_token,
            triggered_by: triggered_by.into(),
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs should periodically check this during long-running operations
    /// and return early with `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
