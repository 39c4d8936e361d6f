//! Convenient re-exports for common corvid types and functions.
//!
//! This module provides a single import for most use cases:
//! ```
//! use corvid::prelude::*;
//! ```

pub use crate::config::{Config, ConfigBuilder, StealPolicy};
pub use crate::error::{Error, Result};
pub use crate::executor::{generate_n_tasks, Pool, RawTask, Task, Worker};

#[doc(inline)]
pub use crate::{execute, init, init_with_config, shutdown};
