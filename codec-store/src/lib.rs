//! Process-wide registry and factory for pluggable codec components.
//!
//! Callers discover components through [`ComponentStore::list_components`],
//! instantiate them by name, and interpret their configuration structures via
//! [`ComponentStore::get_struct_descriptors`]. Everything that might call into
//! a component module is bounded by a deadline and reports
//! [`Status::TimedOut`] rather than blocking.

pub mod buffer;
pub mod component;
pub mod config;
pub mod configurable;
pub mod deadline;
pub mod params;
pub mod pool;
pub mod registry;
pub mod status;
pub mod store;
pub mod surface;

pub use buffer::{Buffer, BufferLayout, PixelFormat};
pub use component::{
    Component, ComponentId, ComponentInterface, ComponentModule, CreateContext, Listener, Work,
    WorkResult,
};
pub use config::{StoreConfig, Timeouts};
pub use configurable::{Configurable, StoreConfigurable};
pub use params::{
    DescriptorQuery, FieldDescriptor, FieldType, Param, ParamDescriptor, ParamIndex,
    ParamReflector, ParamValue, SettingFailure, StaticReflector, StructDescriptor,
};
pub use pool::{InProcessPoolManager, PoolClientManager, PoolHandle};
pub use registry::{ComponentTraits, Domain, Kind, TraitRegistry};
pub use status::{Status, StoreError};
pub use store::{ComponentStore, ComponentStoreBuilder};
pub use surface::{InputSurface, PersistentSurface, SurfaceFactory, SurfaceFrame};
