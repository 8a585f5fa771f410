use crate::{
    CONCURRENCY_ENV_VAR, ConcurrencyOption, ConcurrencyResolver, DEPRECATED_CONCURRENCY_ENV_VAR,
    EnvSource, Error, default_concurrency,
};
use parking_lot::Mutex;
use std::{collections::HashMap, io, sync::Arc};

fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
    vars.iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn resolver(vars: &[(&str, &str)]) -> ConcurrencyResolver<HashMap<String, String>> {
    ConcurrencyResolver::with_env(env(vars)).with_default_concurrency(6)
}

fn assert_invalid(result: crate::Result<usize>) {
    match result {
        Err(Error::InvalidConcurrencyOption { .. }) => {}
        other => panic!("expected InvalidConcurrencyOption, got {other:?}"),
    }
}

#[test]
fn default_is_at_least_one_and_half_the_cpus() {
    let default = default_concurrency();
    assert!(default >= 1);
    assert_eq!(default, num_cpus::get().div_ceil(2).max(1));
}

#[test]
fn unset_and_booleans() {
    assert_eq!(ConcurrencyOption::Unset.parse(6), Ok(6));
    assert_eq!(ConcurrencyOption::Bool(true).parse(6), Ok(6));
    assert_eq!(ConcurrencyOption::Bool(false).parse(6), Ok(1));
    assert_eq!(ConcurrencyOption::from("true").parse(6), Ok(6));
    assert_eq!(ConcurrencyOption::from("false").parse(6), Ok(1));
}

#[test]
fn integers_are_clamped_to_one() {
    assert_eq!(ConcurrencyOption::Int(8).parse(6), Ok(8));
    assert_eq!(ConcurrencyOption::Int(1).parse(6), Ok(1));
    assert_eq!(ConcurrencyOption::Int(0).parse(6), Ok(1));
    assert_eq!(ConcurrencyOption::Int(-4).parse(6), Ok(1));
    assert_eq!(ConcurrencyOption::Float(3.0).parse(6), Ok(3));
}

#[test]
fn numeric_strings_follow_the_integer_rule() {
    for (text, expected) in [
        ("4", 4),
        (" 12 ", 12),
        ("+3", 3),
        ("0", 1),
        ("-7", 1),
        ("4.0", 4),
        ("1e1", 10),
        ("", 1),
        ("   ", 1),
    ] {
        assert_eq!(
            ConcurrencyOption::from(text).parse(6),
            Ok(expected),
            "input {text:?}"
        );
    }
}

#[test]
fn radix_prefixed_strings_are_integers() {
    for (text, expected) in [
        ("0x10", 16),
        ("0X1f", 31),
        ("0o17", 15),
        ("0b101", 5),
        (" 0x0 ", 1),
        ("0xffffffffffffffffffff", usize::try_from(i64::MAX).unwrap_or(usize::MAX)),
    ] {
        assert_eq!(
            ConcurrencyOption::from(text).parse(6),
            Ok(expected),
            "input {text:?}"
        );
    }
    for text in ["0x", "0xg", "0b102", "-0x10", "0x-1", "0x+1"] {
        assert_invalid(ConcurrencyOption::from(text).parse(6));
    }
}

#[test]
fn bare_integer_literals_convert() {
    assert_eq!(ConcurrencyOption::from(3), ConcurrencyOption::Int(3));
    assert_eq!(ConcurrencyOption::from(-3).parse(6), Ok(1));
    assert_eq!(ConcurrencyOption::from(7u32).parse(6), Ok(7));
    assert_eq!(ConcurrencyOption::from(5usize).parse(6), Ok(5));
    assert_eq!(ConcurrencyOption::from(i64::MIN).parse(6), Ok(1));
}

#[test]
fn non_integer_values_are_rejected() {
    for text in ["2.5", "abc", "TRUE", "yes", "NaN", "inf", "1e400", "4 cores"] {
        assert_invalid(ConcurrencyOption::from(text).parse(6));
    }
    assert_invalid(ConcurrencyOption::Float(0.5).parse(6));
    assert_invalid(ConcurrencyOption::Float(f64::NAN).parse(6));
    assert_invalid(ConcurrencyOption::Float(f64::INFINITY).parse(6));
}

#[test]
fn from_str_validates_eagerly() {
    assert_eq!(
        "3".parse::<ConcurrencyOption>(),
        Ok(ConcurrencyOption::Text("3".into()))
    );
    assert_eq!(
        "many".parse::<ConcurrencyOption>(),
        Err(Error::InvalidConcurrencyOption {
            value: "many".into()
        })
    );
}

#[test]
fn resolves_to_default_without_any_source() {
    let resolver = resolver(&[]);
    assert_eq!(resolver.resolve(None), Ok(6));
    assert!(!resolver.has_warned_deprecation());
}

#[test]
fn explicit_override_beats_environment() {
    let resolver = resolver(&[
        (CONCURRENCY_ENV_VAR, "3"),
        (DEPRECATED_CONCURRENCY_ENV_VAR, "5"),
    ]);
    assert_eq!(resolver.resolve(Some(ConcurrencyOption::Int(9))), Ok(9));
    assert!(!resolver.has_warned_deprecation());
}

#[test]
fn explicit_unset_falls_through_to_environment() {
    let resolver = resolver(&[(CONCURRENCY_ENV_VAR, "3")]);
    assert_eq!(resolver.resolve(Some(ConcurrencyOption::Unset)), Ok(3));
    assert_eq!(resolver.resolve(Some(None::<usize>.into())), Ok(3));

    let unset = ConcurrencyResolver::with_env(env(&[])).with_default_concurrency(6);
    assert_eq!(unset.resolve(Some(ConcurrencyOption::Unset)), Ok(6));
}

#[test]
fn primary_variable_wins_over_deprecated_without_warning() {
    let resolver = resolver(&[
        (CONCURRENCY_ENV_VAR, "3"),
        (DEPRECATED_CONCURRENCY_ENV_VAR, "5"),
    ]);
    assert_eq!(resolver.resolve(None), Ok(3));
    assert!(!resolver.has_warned_deprecation());
}

#[test]
fn deprecated_variable_is_honored_and_latches_the_warning() {
    let resolver = resolver(&[(DEPRECATED_CONCURRENCY_ENV_VAR, "2")]);
    assert!(!resolver.has_warned_deprecation());
    assert_eq!(resolver.resolve(None), Ok(2));
    assert!(resolver.has_warned_deprecation());
    // Still honored on later calls; the latch stays set.
    assert_eq!(resolver.resolve(None), Ok(2));
    assert!(resolver.has_warned_deprecation());
}

#[test]
fn defined_but_empty_variable_counts_as_defined() {
    let resolver = resolver(&[(CONCURRENCY_ENV_VAR, ""), (DEPRECATED_CONCURRENCY_ENV_VAR, "5")]);
    assert_eq!(resolver.resolve(None), Ok(1));
}

#[test]
fn invalid_environment_value_fails() {
    let resolver = resolver(&[(CONCURRENCY_ENV_VAR, "lots")]);
    assert_eq!(
        resolver.resolve(None),
        Err(Error::InvalidConcurrencyOption {
            value: "lots".into()
        })
    );
}

/// Environment that can change while a resolver is reading it.
#[derive(Default)]
struct MutableEnv(Mutex<HashMap<String, String>>);

impl MutableEnv {
    fn set(&self, key: &str, value: &str) {
        self.0.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.0.lock().remove(key);
    }
}

impl EnvSource for MutableEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.lock().get(key).cloned()
    }
}

#[test]
fn environment_is_reread_on_every_call() {
    let vars = MutableEnv::default();
    let resolver = ConcurrencyResolver::with_env(&vars).with_default_concurrency(6);
    assert_eq!(resolver.resolve(None), Ok(6));

    vars.set(CONCURRENCY_ENV_VAR, "2");
    assert_eq!(resolver.resolve(None), Ok(2));

    vars.set(CONCURRENCY_ENV_VAR, "7");
    assert_eq!(resolver.resolve(None), Ok(7));

    vars.remove(CONCURRENCY_ENV_VAR);
    vars.set(DEPRECATED_CONCURRENCY_ENV_VAR, "3");
    assert_eq!(resolver.resolve(None), Ok(3));

    vars.remove(DEPRECATED_CONCURRENCY_ENV_VAR);
    assert_eq!(resolver.resolve(None), Ok(6));
}

/// Log output captured from a scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Runs `f` with a subscriber writing into this buffer.
    fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    fn deprecation_notices(&self) -> usize {
        self.text()
            .lines()
            .filter(|line| line.contains("WARN") && line.contains("is deprecated"))
            .count()
    }
}

#[test]
fn deprecation_notice_is_logged_once() {
    let logs = CapturedLogs::default();
    let resolver = resolver(&[(DEPRECATED_CONCURRENCY_ENV_VAR, "2")]);

    logs.capture(|| {
        assert_eq!(resolver.resolve(None), Ok(2));
        assert_eq!(resolver.resolve(None), Ok(2));
    });

    assert_eq!(logs.deprecation_notices(), 1, "logs: {}", logs.text());
    assert!(logs.text().contains(DEPRECATED_CONCURRENCY_ENV_VAR));
    assert!(logs.text().contains(CONCURRENCY_ENV_VAR));
}

#[test]
fn no_deprecation_notice_when_primary_variable_wins() {
    let logs = CapturedLogs::default();
    let resolver = resolver(&[
        (CONCURRENCY_ENV_VAR, "3"),
        (DEPRECATED_CONCURRENCY_ENV_VAR, "5"),
    ]);

    logs.capture(|| {
        assert_eq!(resolver.resolve(None), Ok(3));
        assert_eq!(resolver.resolve(Some(ConcurrencyOption::Int(4))), Ok(4));
    });

    assert_eq!(logs.deprecation_notices(), 0, "logs: {}", logs.text());
}

#[test]
fn zero_default_is_raised_to_one() {
    let resolver = ConcurrencyResolver::with_env(env(&[])).with_default_concurrency(0);
    assert_eq!(resolver.default_concurrency(), 1);
    assert_eq!(resolver.resolve(Some(true.into())), Ok(1));
}

#[cfg(feature = "serde")]
#[test]
fn options_deserialize_from_json_shapes() {
    let parsed: Vec<ConcurrencyOption> =
        serde_json::from_str(r#"[null, true, 4, 2.5, "8"]"#).unwrap();
    assert_eq!(
        parsed,
        vec![
            ConcurrencyOption::Unset,
            ConcurrencyOption::Bool(true),
            ConcurrencyOption::Int(4),
            ConcurrencyOption::Float(2.5),
            ConcurrencyOption::Text("8".into()),
        ]
    );
}
