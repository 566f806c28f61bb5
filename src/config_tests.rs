use crate::application::sync::fetcher::SelectionPolicy;
use crate::config::{Config, TransportKind};
use crate::domain::features::RunId;
use crate::domain::ml::Horizon;
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

fn set(key: &str, value: &str) {
    // SAFETY: tests touching the environment hold ENV_LOCK
    unsafe { env::set_var(key, value) }
}

fn clear(key: &str) {
    // SAFETY: tests touching the environment hold ENV_LOCK
    unsafe { env::remove_var(key) }
}

#[test]
fn test_defaults() {
    let _guard = get_env_lock().lock().unwrap();

    let config = Config::from_env().unwrap();

    assert_eq!(config.pipeline.horizons, vec![Horizon(24), Horizon(48), Horizon(72)]);
    assert_eq!(
        config.pipeline.algorithms,
        vec!["linear_regression", "ridge_regression", "random_forest"]
    );
    assert!((config.pipeline.train_ratio - 0.7).abs() < f64::EPSILON);
    assert_eq!(config.pipeline.rf_n_trees, 50);
    assert_eq!(config.pipeline.rf_max_depth, 5);
    assert_eq!(config.pipeline.selection_policy, SelectionPolicy::MostRecentWithinWindow);
    assert_eq!(config.freshness.max_staleness_hours, 25);
    assert_eq!(config.transport.kind, TransportKind::Local);
    assert_eq!(config.transport.retry_policy().max_attempts, 3);
}

#[test]
fn test_overrides() {
    let _guard = get_env_lock().lock().unwrap();
    set("AQI_HORIZONS", "6,12");
    set("AQI_SELECTION_POLICY", "run:42");
    set("AQI_MIN_CONSECUTIVE_RECORDS", "30");

    let config = Config::from_env().unwrap();

    assert_eq!(config.pipeline.horizons, vec![Horizon(6), Horizon(12)]);
    assert_eq!(config.pipeline.selection_policy, SelectionPolicy::Explicit(RunId(42)));
    assert_eq!(config.freshness.policy().min_consecutive_records, Some(30));

    clear("AQI_HORIZONS");
    clear("AQI_SELECTION_POLICY");
    clear("AQI_MIN_CONSECUTIVE_RECORDS");
}

#[test]
fn test_malformed_values_are_errors() {
    let _guard = get_env_lock().lock().unwrap();

    set("AQI_TRAIN_RATIO", "1.5");
    assert!(Config::from_env().is_err());
    clear("AQI_TRAIN_RATIO");

    set("AQI_FETCH_MAX_ATTEMPTS", "many");
    assert!(Config::from_env().is_err());
    clear("AQI_FETCH_MAX_ATTEMPTS");

    set("AQI_TRANSPORT", "ftp");
    assert!(Config::from_env().is_err());
    clear("AQI_TRANSPORT");
}
