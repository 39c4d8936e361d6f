//! Optional process-global runtime for the simple API.
//!
//! Wraps one started [`Pool`] behind `init`/`shutdown` so callers that do
//! not want to manage a pool can submit with [`execute`]. The pool type
//! remains directly usable; this layer is a convenience veneer.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{Pool, RawTask};
use parking_lot::RwLock;
use std::sync::Arc;

/// A started pool plus the configuration it was built from.
#[derive(Debug)]
pub struct Runtime {
    pool: Pool,
    config: Config,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Pool::with_config(config.clone())?;
        pool.start()?;

        Ok(Self { pool, config })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

static GLOBAL_RUNTIME: RwLock<Option<Arc<Runtime>>> = RwLock::new(None);

/// Initialize the global runtime with default configuration.
pub fn init() -> Result<()> {
    init_with_config(Config::default())
}

/// Initialize the global runtime with the given configuration.
pub fn init_with_config(config: Config) -> Result<()> {
    let mut runtime = GLOBAL_RUNTIME.write();

    if runtime.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    *runtime = Some(Arc::new(Runtime::new(config)?));
    Ok(())
}

/// Submit a batch to the global runtime and block until it completes.
pub fn execute(tasks: Vec<RawTask>) -> Result<()> {
    let runtime = current_runtime().ok_or(Error::NotInitialized)?;
    runtime.pool().execute(tasks);
    Ok(())
}

/// Tear down the global runtime, terminating its pool and joining the
/// worker threads. No-op when not initialized.
pub fn shutdown() {
    let mut runtime = GLOBAL_RUNTIME.write();
    *runtime = None;
}

pub(crate) fn current_runtime() -> Option<Arc<Runtime>> {
    GLOBAL_RUNTIME.read().clone()
}
