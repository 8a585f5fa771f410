use super::{
    CONCURRENCY_ENV_VAR, ConcurrencyOption, DEPRECATED_CONCURRENCY_ENV_VAR, EnvSource, ProcessEnv,
};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default worker count: half the logical CPUs, rounded up, and never less
/// than one.
pub fn default_concurrency() -> usize {
    num_cpus::get().div_ceil(2).max(1)
}

/// Turns the configured concurrency setting into a worker count.
///
/// Sources are consulted in strict precedence, first defined wins:
///
/// 1. the explicit override passed to [`resolve`](Self::resolve)
/// 2. [`CONCURRENCY_ENV_VAR`]
/// 3. [`DEPRECATED_CONCURRENCY_ENV_VAR`] (logs a deprecation warning once per
///    resolver)
/// 4. the default concurrency
///
/// The resolved count is never cached. Each call re-reads the environment, so
/// changes between runs are picked up. The only state is the deprecation
/// latch, which is set the first time the deprecated variable is used and
/// never reset.
///
/// Build one resolver per process and hand it to every run.
#[derive(Debug)]
pub struct ConcurrencyResolver<E = ProcessEnv> {
    env: E,
    default_concurrency: usize,
    warned_deprecation: AtomicBool,
}

impl ConcurrencyResolver<ProcessEnv> {
    /// Creates a resolver reading the process environment.
    pub fn new() -> Self {
        Self::with_env(ProcessEnv)
    }
}

impl Default for ConcurrencyResolver<ProcessEnv> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EnvSource> ConcurrencyResolver<E> {
    /// Creates a resolver reading variables from `env`.
    pub fn with_env(env: E) -> Self {
        Self {
            env,
            default_concurrency: default_concurrency(),
            warned_deprecation: AtomicBool::new(false),
        }
    }

    /// Replaces the CPU-derived default. Values below one are raised to one.
    #[must_use]
    pub fn with_default_concurrency(mut self, default_concurrency: usize) -> Self {
        self.default_concurrency = default_concurrency.max(1);
        self
    }

    /// The count used when no source defines a setting.
    pub const fn default_concurrency(&self) -> usize {
        self.default_concurrency
    }

    /// Whether the deprecated variable has been read (and warned about) yet.
    pub fn has_warned_deprecation(&self) -> bool {
        self.warned_deprecation.load(Ordering::Relaxed)
    }

    /// Resolves the worker count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConcurrencyOption`] if the winning source holds
    /// a value that is neither a boolean nor an integer.
    ///
    /// [`Error::InvalidConcurrencyOption`]: crate::Error::InvalidConcurrencyOption
    pub fn resolve(&self, explicit: Option<ConcurrencyOption>) -> Result<usize> {
        // An explicit `Unset` counts as not defined.
        if let Some(option) = explicit.filter(|option| *option != ConcurrencyOption::Unset) {
            return option.parse(self.default_concurrency);
        }

        if let Some(value) = self.env.var(CONCURRENCY_ENV_VAR) {
            return ConcurrencyOption::Text(value).parse(self.default_concurrency);
        }

        if let Some(value) = self.env.var(DEPRECATED_CONCURRENCY_ENV_VAR) {
            if !self.warned_deprecation.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "The {DEPRECATED_CONCURRENCY_ENV_VAR} environment variable is deprecated, use {CONCURRENCY_ENV_VAR} instead"
                );
            }
            return ConcurrencyOption::Text(value).parse(self.default_concurrency);
        }

        Ok(self.default_concurrency)
    }
}
