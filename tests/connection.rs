use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use sqlextract::drivers::{DriverLibraryCache, DriverRegistry, InMemoryDriver};
use sqlextract::error::ExtractError;
use sqlextract::traits::Driver;
use sqlextract::{ConnectionManager, ConnectionSpec, RetryPolicy};

fn manager(driver: &InMemoryDriver, libraries: Arc<DriverLibraryCache>) -> ConnectionManager {
    let driver = driver.clone();
    let registry = DriverRegistry::new().with_driver("mockdriver", move || {
        Ok(Arc::new(driver.clone()) as Arc<dyn Driver>)
    });
    ConnectionManager::new(Arc::new(registry), libraries)
}

fn refusals(n: usize) -> Vec<ExtractError> {
    (1..=n)
        .map(|i| ExtractError::transient(format!("connection refused #{}", i)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_ten_attempts() {
    let driver = InMemoryDriver::new().with_connect_failures(refusals(12));
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new()));

    let started = Instant::now();
    let err = manager
        .connect(&ConnectionSpec::new("mockdriver", "mock://flaky"))
        .await
        .unwrap_err();

    assert_eq!(driver.connect_attempts(), 10);
    assert!(started.elapsed() >= Duration::from_millis(9 * 300));
    match &err {
        ExtractError::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 10);
            assert!(source.to_string().contains("connection refused #10"));
        }
        other => panic!("Expected RetriesExhausted error, got {:?}", other),
    }
    assert!(err.source().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connects_after_transient_failures() {
    let driver = InMemoryDriver::new().with_connect_failures(refusals(3));
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new()));

    let started = Instant::now();
    let mut conn = manager
        .connect(&ConnectionSpec::new("mockdriver", "mock://flaky"))
        .await
        .unwrap();

    assert_eq!(driver.connect_attempts(), 4);
    assert!(started.elapsed() >= Duration::from_millis(3 * 300));
    conn.close().await.unwrap();
    assert!(conn.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_is_not_retried() {
    let driver = InMemoryDriver::new()
        .with_connect_failures(vec![ExtractError::connection("password authentication failed")]);
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new()));

    let started = Instant::now();
    let err = manager
        .connect(&ConnectionSpec::new("mockdriver", "mock://ok"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Connection { .. }));
    assert_eq!(driver.connect_attempts(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_policy() {
    let driver = InMemoryDriver::new().with_connect_failures(refusals(5));
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new())).with_retry_policy(
        RetryPolicy {
            max_attempts: 2,
            interval: Duration::from_secs(1),
        },
    );

    let err = manager
        .connect(&ConnectionSpec::new("mockdriver", "mock://flaky"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(driver.connect_attempts(), 2);
}

#[tokio::test]
async fn test_unknown_driver_is_driver_load_error() {
    let driver = InMemoryDriver::new();
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new()));

    let err = manager
        .connect(&ConnectionSpec::new("com.example.Missing", "mock://ok"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::DriverLoad(_)));
    assert_eq!(driver.connect_attempts(), 0);
}

#[tokio::test]
async fn test_properties_reach_the_driver() {
    let driver = InMemoryDriver::new();
    let manager = manager(&driver, Arc::new(DriverLibraryCache::new()));
    let spec = ConnectionSpec::new("mockdriver", "mock://ok")
        .with_user("reader")
        .with_password("secret")
        .with_option("password", "override")
        .with_option("loginTimeout", "30");

    let mut conn = manager.connect(&spec).await.unwrap();
    conn.close().await.unwrap();

    let props = driver.last_properties().unwrap();
    assert_eq!(props.get("user"), Some("reader"));
    assert_eq!(props.get("password"), Some("override"));
    assert_eq!(props.get("loginTimeout"), Some("30"));
}

#[tokio::test]
async fn test_driver_library_loaded_once_across_connections() {
    let driver = InMemoryDriver::new();
    let libraries = Arc::new(DriverLibraryCache::new());
    let manager = manager(&driver, Arc::clone(&libraries));
    let location = std::env::temp_dir();
    let spec = ConnectionSpec::new("mockdriver", "mock://ok").with_driver_path(&location);

    for _ in 0..3 {
        let mut conn = manager.connect(&spec).await.unwrap();
        conn.close().await.unwrap();
    }

    assert!(libraries.is_loaded(&location));
    assert_eq!(libraries.loaded_locations(), vec![location]);
    assert_eq!(driver.connect_attempts(), 3);
}

#[tokio::test]
async fn test_missing_driver_library_fails_before_connecting() {
    let driver = InMemoryDriver::new();
    let libraries = Arc::new(DriverLibraryCache::new());
    let manager = manager(&driver, Arc::clone(&libraries));
    let spec = ConnectionSpec::new("mockdriver", "mock://ok")
        .with_driver_path("/nonexistent/drivers/postgresql.jar");

    let err = manager.connect(&spec).await.unwrap_err();

    assert!(matches!(err, ExtractError::DriverLoad(_)));
    assert!(libraries.loaded_locations().is_empty());
    assert_eq!(driver.connect_attempts(), 0);
}
