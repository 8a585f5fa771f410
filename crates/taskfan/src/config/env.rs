use std::collections::HashMap;

/// Primary environment variable holding the concurrency setting.
pub const CONCURRENCY_ENV_VAR: &str = "TASKFAN_CONCURRENCY";

/// Deprecated alias of [`CONCURRENCY_ENV_VAR`]. Still honored, with a one-time
/// warning.
pub const DEPRECATED_CONCURRENCY_ENV_VAR: &str = "TASKFAN_BUILD_PARALLEL";

/// Read access to environment variables.
///
/// The resolver reads its settings through this trait so that callers (and
/// tests) can supply variables without touching the process environment.
pub trait EnvSource {
    /// Returns the value of `key`, or `None` if it is not defined.
    ///
    /// A variable that is defined but empty returns `Some("")`.
    fn var(&self, key: &str) -> Option<String>;
}

/// [`EnvSource`] backed by the real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        // Non-unicode values are kept lossily so they fail validation instead
        // of silently reading as unset.
        std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn var(&self, key: &str) -> Option<String> {
        (**self).var(key)
    }
}
