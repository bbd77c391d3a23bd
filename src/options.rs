/// Configures per-request timeout and identification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds. `0` disables it.
    pub timeout_ms: u64,
    /// `User-Agent` sent with every request, applied before default headers.
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: None,
        }
    }
}
