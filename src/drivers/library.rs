use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{ExtractError, Result};

/// Makes a driver library location available to the process.
pub trait LibraryLoader: Send + Sync {
    fn load(&self, location: &Path) -> Result<()>;
}

/// Loader that only checks the location exists.
/// Drivers are linked into the binary, so there is no code to load.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLoader;

impl LibraryLoader for PathLoader {
    fn load(&self, location: &Path) -> Result<()> {
        std::fs::metadata(location).map_err(|e| {
            ExtractError::driver_load(format!(
                "driver library {} is not available: {}",
                location.display(),
                e
            ))
        })?;
        debug!(location = %location.display(), "driver library location verified");
        Ok(())
    }
}

/// Process-scoped set of driver library locations that were already loaded.
///
/// Shared by every connection manager of the process. Check-and-insert runs
/// under one lock, so each distinct location is loaded once even when several
/// tasks connect concurrently. A location whose load fails is not recorded.
pub struct DriverLibraryCache {
    loader: Arc<dyn LibraryLoader>,
    loaded: Mutex<HashSet<PathBuf>>,
}

impl DriverLibraryCache {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(PathLoader))
    }

    pub fn with_loader(loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            loaded: Mutex::new(HashSet::new()),
        }
    }

    /// Load `location` unless it was loaded before.
    /// Returns `true` when this call performed the load.
    pub fn ensure_loaded(&self, location: &Path) -> Result<bool> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if loaded.contains(location) {
            return Ok(false);
        }
        self.loader.load(location)?;
        loaded.insert(location.to_path_buf());
        info!(location = %location.display(), "loaded driver library");
        Ok(true)
    }

    pub fn is_loaded(&self, location: &Path) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(location)
    }

    pub fn loaded_locations(&self) -> Vec<PathBuf> {
        let mut locations: Vec<PathBuf> = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        locations.sort();
        locations
    }
}

impl Default for DriverLibraryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriverLibraryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverLibraryCache")
            .field("loaded", &self.loaded_locations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl LibraryLoader for CountingLoader {
        fn load(&self, _location: &Path) -> Result<()> {
            // Widen the window in which a racing caller could slip in.
            std::thread::sleep(Duration::from_millis(5));
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingLoader;

    impl LibraryLoader for FailingLoader {
        fn load(&self, location: &Path) -> Result<()> {
            Err(ExtractError::driver_load(format!(
                "cannot open {}",
                location.display()
            )))
        }
    }

    #[test]
    fn test_same_location_loaded_once_across_threads() {
        let loader = Arc::new(CountingLoader::default());
        let cache = DriverLibraryCache::with_loader(loader.clone());
        let location = Path::new("/opt/drivers/postgresql.jar");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| cache.ensure_loaded(location).unwrap());
            }
        });

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded(location));
    }

    #[test]
    fn test_distinct_locations_each_loaded() {
        let loader = Arc::new(CountingLoader::default());
        let cache = DriverLibraryCache::with_loader(loader.clone());

        assert!(cache.ensure_loaded(Path::new("/a.jar")).unwrap());
        assert!(cache.ensure_loaded(Path::new("/b.jar")).unwrap());
        assert!(!cache.ensure_loaded(Path::new("/a.jar")).unwrap());

        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(
            cache.loaded_locations(),
            vec![PathBuf::from("/a.jar"), PathBuf::from("/b.jar")]
        );
    }

    #[test]
    fn test_failed_load_is_not_recorded() {
        let cache = DriverLibraryCache::with_loader(Arc::new(FailingLoader));
        let err = cache.ensure_loaded(Path::new("/missing.jar")).unwrap_err();
        assert!(matches!(err, ExtractError::DriverLoad(_)));
        assert!(!cache.is_loaded(Path::new("/missing.jar")));
    }

    #[test]
    fn test_path_loader_rejects_missing_location() {
        let err = PathLoader
            .load(Path::new("/definitely/not/here/driver.so"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::DriverLoad(_)));
        assert!(PathLoader.load(&std::env::temp_dir()).is_ok());
    }
}
