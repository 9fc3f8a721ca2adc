//! Shared state every `/api/v4` handler is built against: the
//! cooperative-async connection pool, the Capabilities Cache, and the
//! subset of settings handlers need directly.

use std::sync::Arc;

use vmctl_config::Settings;
use vmctl_store::conn::AsyncPool;

use crate::capabilities::Capabilities;

/// Cloned into every Axum handler via `Extension`/`State`; internals
/// are behind `Arc` so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool: AsyncPool,
    pub capabilities: Arc<Capabilities>,
    pub settings: Arc<Settings>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: AsyncPool, settings: Settings) -> Self {
        let capabilities = Arc::new(Capabilities::new(&settings));
        Self {
            pool,
            capabilities,
            settings: Arc::new(settings),
        }
    }
}
