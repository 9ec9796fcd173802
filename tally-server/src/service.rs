use std::fmt;
use std::sync::Arc;

use tally_config::Config;

use crate::services::allow_list::AllowListCache;

#[derive(Debug)]
struct StateInner {
    config: Arc<Config>,
    allow_lists: Arc<AllowListCache>,
}

/// Server state shared by all request handlers.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates the state from the config and the shared allow-list cache.
    pub fn new(config: Arc<Config>, allow_lists: Arc<AllowListCache>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                config,
                allow_lists,
            }),
        }
    }

    /// Returns the collector configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the allow-list cache consulted for every report.
    pub fn allow_lists(&self) -> &AllowListCache {
        &self.inner.allow_lists
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("listen_addr", &self.config().listen_addr())
            .field("ready", &self.allow_lists().is_ready())
            .finish()
    }
}
