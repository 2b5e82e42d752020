//! The component store: registry, factory, descriptor resolver, buffer bridge.
//!
//! Every operation that may call into a collaborator runs under the deadline
//! supervisor and reports `TimedOut` instead of hanging. `pool_client_manager`
//! and `configurable` only hand out state built with the store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::buffer::{self, Buffer};
use crate::component::{
    Component, ComponentId, ComponentInterface, ComponentModule, CreateContext, Listener,
};
use crate::config::StoreConfig;
use crate::configurable::{Configurable, StoreConfigurable};
use crate::deadline;
use crate::params::{DescriptorQuery, DescriptorResolver, ParamIndex, ParamReflector};
use crate::pool::{InProcessPoolManager, PoolHandle};
use crate::registry::{ComponentTraits, Kind, TraitRegistry};
use crate::status::StoreError;
use crate::surface::{InputSurface, PersistentSurfaceFactory, SurfaceFactory};

pub struct ComponentStore {
    config: StoreConfig,
    registry: Arc<TraitRegistry>,
    /// Indexed by registry slot.
    modules: Vec<Arc<dyn ComponentModule>>,
    resolver: Arc<DescriptorResolver>,
    pool_manager: Option<PoolHandle>,
    configurable: Arc<StoreConfigurable>,
    surface_factory: Arc<dyn SurfaceFactory>,
    next_id: AtomicU32,
    instances: Mutex<Instances>,
}

/// Components handed out and not yet dropped, plus creations in flight.
#[derive(Default)]
struct Instances {
    live: Vec<Weak<dyn Component>>,
    pending: usize,
}

/// One admitted creation. Dropping it frees the in-flight slot.
struct Reservation<'a> {
    instances: &'a Mutex<Instances>,
}

impl Reservation<'_> {
    fn admit(self, component: &Arc<dyn Component>) {
        self.instances.lock().live.push(Arc::downgrade(component));
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut instances = self.instances.lock();
        instances.pending = instances.pending.saturating_sub(1);
    }
}

impl ComponentStore {
    pub fn builder() -> ComponentStoreBuilder {
        ComponentStoreBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Every known component; an empty store is an empty list, not an error.
    pub async fn list_components(&self) -> Result<Vec<ComponentTraits>, StoreError> {
        let registry = self.registry.clone();
        deadline::run_async("list_components", self.config.timeouts.list_components(), async move {
            let mut traits = Vec::new();
            traits.try_reserve_exact(registry.len())?;
            traits.extend(registry.list().iter().cloned());
            Ok::<_, StoreError>(traits)
        })
        .await
    }

    /// Candidates for one media type, best rank first.
    pub fn find_components(&self, media_type: &str, kind: Option<Kind>) -> Vec<ComponentTraits> {
        self.registry
            .find(media_type, kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn resolve_alias(&self, alias: &str, media_type: &str) -> Option<ComponentTraits> {
        self.registry.resolve_alias(alias, media_type).cloned()
    }

    pub async fn create_component(
        &self,
        name: &str,
        listener: Arc<dyn Listener>,
        pool: Option<PoolHandle>,
    ) -> Result<Arc<dyn Component>, StoreError> {
        let (traits, module) = self.resolve(name)?;
        let reservation = self.reserve_instance()?;
        let id = self.next_id();
        let budget = self.config.timeouts.create_component();
        log::debug!("creating component {} ({}) as #{}", name, traits.name, id);

        let component = deadline::run_blocking_or_release(
            "create_component",
            budget,
            move |cancel| {
                let ctx = CreateContext { id, traits, cancel };
                module
                    .create_component(&ctx, listener, pool)
                    .map_err(StoreError::from_collaborator)
            },
            move |late: Arc<dyn Component>| {
                log::warn!("releasing component #{} that missed its deadline", id);
                if let Err(e) = late.release() {
                    log::error!("release of late component #{} failed: {:#}", id, e);
                }
            },
        )
        .await?;
        reservation.admit(&component);
        Ok(component)
    }

    pub async fn create_interface(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ComponentInterface>, StoreError> {
        let (traits, module) = self.resolve(name)?;
        let id = self.next_id();
        let budget = self.config.timeouts.create_interface();
        log::debug!("creating interface {} ({}) as #{}", name, traits.name, id);

        deadline::run_blocking("create_interface", budget, move |cancel| {
            let ctx = CreateContext { id, traits, cancel };
            module
                .create_interface(&ctx)
                .map_err(StoreError::from_collaborator)
        })
        .await
    }

    /// Best effort: the query's `status()` is `NotFound` if any index stayed
    /// unresolved, with the resolved descriptors still attached. `Err` means
    /// the lookup itself failed.
    pub async fn get_struct_descriptors(
        &self,
        indices: &[ParamIndex],
    ) -> Result<DescriptorQuery, StoreError> {
        let resolver = self.resolver.clone();
        let indices = indices.to_vec();
        deadline::run_blocking(
            "get_struct_descriptors",
            self.config.timeouts.struct_descriptors(),
            move |_| Ok(resolver.resolve(&indices)),
        )
        .await
    }

    pub async fn copy_buffer(&self, src: &Buffer, dst: &Buffer) -> Result<(), StoreError> {
        deadline::run_async(
            "copy_buffer",
            self.config.timeouts.copy_buffer(),
            buffer::copy_buffer(src, dst),
        )
        .await
    }

    pub async fn create_input_surface(&self) -> Result<Arc<dyn InputSurface>, StoreError> {
        let factory = self.surface_factory.clone();
        deadline::run_blocking(
            "create_input_surface",
            self.config.timeouts.create_input_surface(),
            move |cancel| {
                factory
                    .create(&cancel)
                    .map_err(StoreError::from_collaborator)
            },
        )
        .await
    }

    /// Immediate; `None` when the store has no pooled-buffer support.
    pub fn pool_client_manager(&self) -> Option<PoolHandle> {
        self.pool_manager.clone()
    }

    /// Immediate.
    pub fn configurable(&self) -> Arc<dyn Configurable> {
        self.configurable.clone()
    }

    fn resolve(&self, name: &str) -> Result<(ComponentTraits, Arc<dyn ComponentModule>), StoreError> {
        let slot = self
            .registry
            .slot(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        match (self.registry.get(slot), self.modules.get(slot)) {
            (Some(traits), Some(module)) => Ok((traits.clone(), module.clone())),
            _ => Err(StoreError::Corrupted(format!(
                "registry slot {} for '{}' has no module",
                slot, name
            ))),
        }
    }

    /// Refused once `max_instances` live or in-flight components exist.
    fn reserve_instance(&self) -> Result<Reservation<'_>, StoreError> {
        let max = self.configurable.max_instances() as usize;
        let mut instances = self.instances.lock();
        instances.live.retain(|c| c.strong_count() > 0);
        if max > 0 && instances.live.len() + instances.pending >= max {
            return Err(StoreError::Refused(format!(
                "{} of {} component instances in use",
                instances.live.len() + instances.pending,
                max
            )));
        }
        instances.pending += 1;
        Ok(Reservation {
            instances: &self.instances,
        })
    }

    fn next_id(&self) -> ComponentId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct ComponentStoreBuilder {
    config: StoreConfig,
    modules: Vec<Arc<dyn ComponentModule>>,
    reflectors: Vec<Arc<dyn ParamReflector>>,
    pool_manager: Option<PoolHandle>,
    surface_factory: Option<Arc<dyn SurfaceFactory>>,
}

impl ComponentStoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_module(self, module: impl ComponentModule + 'static) -> Self {
        self.add_shared_module(Arc::new(module))
    }

    pub fn add_shared_module(mut self, module: Arc<dyn ComponentModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Extra descriptor source on top of the modules' own reflectors.
    pub fn add_reflector(mut self, reflector: Arc<dyn ParamReflector>) -> Self {
        self.reflectors.push(reflector);
        self
    }

    /// External manager; takes precedence over the in-process one.
    pub fn pool_manager(mut self, manager: PoolHandle) -> Self {
        self.pool_manager = Some(manager);
        self
    }

    pub fn surface_factory(mut self, factory: Arc<dyn SurfaceFactory>) -> Self {
        self.surface_factory = Some(factory);
        self
    }

    pub fn build(self) -> anyhow::Result<ComponentStore> {
        self.config.validate()?;

        let mut registry = TraitRegistry::default();
        let mut reflectors = self.reflectors;
        for module in &self.modules {
            registry.insert(module.traits())?;
            if let Some(r) = module.reflector() {
                reflectors.push(r);
            }
        }

        let pool_manager = match self.pool_manager {
            Some(m) => Some(m),
            None if self.config.pooled_buffers => {
                Some(Arc::new(InProcessPoolManager::new()) as PoolHandle)
            }
            None => None,
        };
        let configurable = Arc::new(StoreConfigurable::new(
            &self.config.name,
            registry.len(),
            pool_manager.is_some(),
        ));
        let surface_factory = self.surface_factory.unwrap_or_else(|| {
            Arc::new(PersistentSurfaceFactory::new(self.config.surface_queue_depth))
                as Arc<dyn SurfaceFactory>
        });

        log::info!(
            "store {} ready with {} components, pooled buffers: {}",
            self.config.name,
            registry.len(),
            pool_manager.is_some()
        );

        Ok(ComponentStore {
            config: self.config,
            registry: Arc::new(registry),
            modules: self.modules,
            resolver: Arc::new(DescriptorResolver::new(reflectors)),
            pool_manager,
            configurable,
            surface_factory,
            next_id: AtomicU32::new(1),
            instances: Mutex::new(Instances::default()),
        })
    }
}

static GLOBAL_STORE: OnceLock<Arc<ComponentStore>> = OnceLock::new();

/// Makes `store` the process-wide store. Only the first call wins.
pub fn install(store: ComponentStore) -> anyhow::Result<Arc<ComponentStore>> {
    let store = Arc::new(store);
    GLOBAL_STORE
        .set(store.clone())
        .map_err(|_| anyhow::anyhow!("a component store is already installed"))?;
    Ok(store)
}

pub fn global() -> Option<Arc<ComponentStore>> {
    GLOBAL_STORE.get().cloned()
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
