use crate::error::{Error, Result};

/// How many tasks a worker donates when it answers a steal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealPolicy {
    /// Donate the single oldest stealable task.
    One,
    /// Donate half of the stealable tasks, rounded up, oldest first.
    Half,
}

impl Default for StealPolicy {
    fn default() -> Self {
        StealPolicy::Half
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: Option<usize>,
    pub steal_policy: StealPolicy,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: None,
            steal_policy: StealPolicy::default(),
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "corvid-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_workers {
            if n == 0 {
                return Err(Error::config("num_workers must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("num_workers too large (max 1024)"));
            }
        }

        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.config.num_workers = Some(n);
        self
    }

    pub fn steal_policy(mut self, policy: StealPolicy) -> Self {
        self.config.steal_policy = policy;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
