use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::context::{DataSourceInstanceSettings, PluginContext};
use crate::error::{DatasourceError, Result};

/// A live, configured handle for one datasource configuration
pub trait Instance: Send + Sync + 'static {
    /// Release resources held by the instance
    ///
    /// Called exactly once, after the instance has left the registry.
    fn dispose(&self) {}
}

/// Creates an instance from freshly parsed settings
pub type InstanceFactory<I> =
    Box<dyn Fn(&DataSourceInstanceSettings) -> Result<I> + Send + Sync + 'static>;

struct CachedInstance<I> {
    updated: DateTime<Utc>,
    instance: Arc<I>,
}

/// Registry mapping datasource ids to lazily created instances
pub struct InstanceManager<I: Instance> {
    instances: RwLock<HashMap<i64, CachedInstance<I>>>,
    factory: InstanceFactory<I>,
}

fn poisoned() -> DatasourceError {
    DatasourceError::Instance("Lock poisoned".to_string())
}

impl<I: Instance> InstanceManager<I> {
    /// Create a new empty registry
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&DataSourceInstanceSettings) -> Result<I> + Send + Sync + 'static,
    {
        Self {
            instances: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    fn cached(&self, settings: &DataSourceInstanceSettings) -> Result<Option<Arc<I>>> {
        let instances = self.instances.read().map_err(|_| poisoned())?;
        Ok(instances
            .get(&settings.id)
            .filter(|cached| cached.updated == settings.updated)
            .map(|cached| Arc::clone(&cached.instance)))
    }

    /// Get the instance for a plugin context, creating or replacing it as needed
    ///
    /// An instance whose settings timestamp no longer matches is swapped out and disposed.
    pub fn get(&self, ctx: &PluginContext) -> Result<Arc<I>> {
        let settings = ctx.settings()?;

        if let Some(instance) = self.cached(settings)? {
            return Ok(instance);
        }

        let mut instances = self.instances.write().map_err(|_| poisoned())?;

        // Another caller may have created it while we waited for the lock
        if let Some(cached) = instances.get(&settings.id) {
            if cached.updated == settings.updated {
                return Ok(Arc::clone(&cached.instance));
            }
        }

        let instance = Arc::new((self.factory)(settings)?);
        let previous = instances.insert(
            settings.id,
            CachedInstance {
                updated: settings.updated,
                instance: Arc::clone(&instance),
            },
        );
        drop(instances);

        match previous {
            Some(old) => {
                info!(
                    "Settings of datasource {} changed, disposing previous instance",
                    settings.id
                );
                old.instance.dispose();
            }
            None => debug!("Created instance for datasource {}", settings.id),
        }

        Ok(instance)
    }

    /// Remove and dispose the instance for a datasource id
    pub fn remove(&self, id: i64) -> Result<bool> {
        let removed = self
            .instances
            .write()
            .map_err(|_| poisoned())?
            .remove(&id);

        Ok(match removed {
            Some(cached) => {
                cached.instance.dispose();
                true
            }
            None => false,
        })
    }

    /// Dispose every instance, used on shutdown
    pub fn dispose_all(&self) -> Result<()> {
        let drained: Vec<_> = self
            .instances
            .write()
            .map_err(|_| poisoned())?
            .drain()
            .collect();

        for (id, cached) in drained {
            debug!("Disposing instance for datasource {}", id);
            cached.instance.dispose();
        }
        Ok(())
    }

    /// Count the number of live instances
    pub fn count(&self) -> Result<usize> {
        Ok(self.instances.read().map_err(|_| poisoned())?.len())
    }

    /// Check if an instance exists for a datasource id
    pub fn contains(&self, id: i64) -> Result<bool> {
        Ok(self.instances.read().map_err(|_| poisoned())?.contains_key(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        id: i64,
        disposed: Arc<AtomicUsize>,
    }

    impl Instance for Probe {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(disposed: Arc<AtomicUsize>, created: Arc<AtomicUsize>) -> InstanceManager<Probe> {
        InstanceManager::new(move |settings| {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Probe {
                id: settings.id,
                disposed: Arc::clone(&disposed),
            })
        })
    }

    #[test]
    fn test_instance_is_cached() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let manager = manager(disposed.clone(), created.clone());
        let ctx = PluginContext::for_datasource("test", DataSourceInstanceSettings::new(3, "a"));

        let first = manager.get(&ctx).unwrap();
        let second = manager.get(&ctx).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, 3);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settings_change_replaces_and_disposes_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let manager = manager(disposed.clone(), created.clone());
        let settings = DataSourceInstanceSettings::new(3, "a");
        let changed = settings.clone().with_updated(settings.updated + Duration::seconds(1));

        let first = manager
            .get(&PluginContext::for_datasource("test", settings))
            .unwrap();
        let ctx = PluginContext::for_datasource("test", changed);
        let second = manager.get(&ctx).unwrap();
        let third = manager.get(&ctx).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.count().unwrap(), 1);
    }

    #[test]
    fn test_separate_datasources_coexist() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let manager = manager(disposed.clone(), Arc::new(AtomicUsize::new(0)));

        for id in [1, 2] {
            let ctx =
                PluginContext::for_datasource("test", DataSourceInstanceSettings::new(id, "x"));
            manager.get(&ctx).unwrap();
        }

        assert_eq!(manager.count().unwrap(), 2);
        assert!(manager.remove(1).unwrap());
        assert!(!manager.remove(1).unwrap());
        assert!(manager.contains(2).unwrap());

        manager.dispose_all().unwrap();
        assert_eq!(manager.count().unwrap(), 0);
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_settings_is_error() {
        let manager = manager(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let err = manager.get(&PluginContext::default()).err().unwrap();
        assert!(matches!(err, DatasourceError::Instance(_)));
    }

    #[test]
    fn test_factory_error_is_propagated() {
        let manager: InstanceManager<Probe> =
            InstanceManager::new(|_| Err(DatasourceError::Settings("bad json".to_string())));
        let ctx = PluginContext::for_datasource("test", DataSourceInstanceSettings::new(1, "x"));
        assert!(matches!(manager.get(&ctx), Err(DatasourceError::Settings(_))));
        assert_eq!(manager.count().unwrap(), 0);
    }
}
