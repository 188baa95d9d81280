//! Courier configuration.

use std::time::Duration;

/// Process-wide delivery settings, owned by the [`Manager`].
///
/// Built once before the manager and passed into `Manager::new`; there are
/// no global setters. Connection fields (`brokers`, credentials) are handed
/// to the `Transport` implementation at construction time and are not read
/// by the core itself.
///
/// [`Manager`]: crate::app::manager::Manager
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Instance identity. A subscription's executor string is
    /// `"{name},{group}"`.
    pub name: String,

    pub brokers: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Wait applied by the default retry handler before republishing.
    pub retry_delay: Duration,

    /// Handler budget stamped onto freshly decoded envelopes.
    pub handle_timeout: Duration,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            name: "courier".to_string(),
            brokers: Vec::new(),
            username: None,
            password: None,
            retry_delay: Duration::from_secs(3),
            handle_timeout: Duration::from_secs(25),
        }
    }
}

impl CourierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_brokers(mut self, brokers: Vec<String>) -> Self {
        self.brokers = brokers;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }
}
