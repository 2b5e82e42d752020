//! Capability interfaces implemented by component modules and by callers.
//!
//! The store never looks inside a component: it resolves a name to a
//! [`ComponentModule`] and lets the module build the instance, wired to the
//! caller's [`Listener`] and the optional pool handle.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::configurable::Configurable;
use crate::params::{ParamReflector, SettingFailure};
use crate::pool::PoolHandle;
use crate::registry::ComponentTraits;
use crate::status::Status;

/// Store-unique id of a created component or interface.
pub type ComponentId = u32;

/// One unit of input queued to a component.
#[derive(Clone, Debug, PartialEq)]
pub struct Work {
    pub frame_index: u64,
    pub input: Bytes,
    pub end_of_stream: bool,
}

/// Completed work, delivered through [`Listener::on_work_done`].
#[derive(Clone, Debug, PartialEq)]
pub struct WorkResult {
    pub frame_index: u64,
    pub output: Bytes,
    pub status: Status,
    pub end_of_stream: bool,
}

/// Receives asynchronous notifications from one component.
pub trait Listener: Send + Sync {
    fn on_work_done(&self, component: ComponentId, done: Vec<WorkResult>);

    /// A parameter change was forced on the component.
    fn on_tripped(&self, component: ComponentId, failures: Vec<SettingFailure>);

    fn on_error(&self, component: ComponentId, status: Status);
}

/// Descriptive/configuration surface of a component, without processing.
pub trait ComponentInterface: Configurable {
    fn id(&self) -> ComponentId;
}

/// A fully functional component instance.
pub trait Component: Send + Sync {
    fn id(&self) -> ComponentId;

    fn interface(&self) -> Arc<dyn ComponentInterface>;

    fn start(&self) -> anyhow::Result<()>;

    fn stop(&self) -> anyhow::Result<()>;

    fn queue(&self, work: Vec<Work>) -> anyhow::Result<()>;

    /// Drops pending work and hands it back.
    fn flush(&self) -> anyhow::Result<Vec<Work>>;

    fn release(&self) -> anyhow::Result<()>;
}

/// What a module gets when asked to build something.
#[derive(Clone, Debug)]
pub struct CreateContext {
    pub id: ComponentId,
    pub traits: ComponentTraits,
    /// Cancelled once the caller has been told `TimedOut`; long constructions should poll it.
    pub cancel: CancellationToken,
}

/// Factory for one registered component.
pub trait ComponentModule: Send + Sync {
    fn traits(&self) -> ComponentTraits;

    fn create_component(
        &self,
        ctx: &CreateContext,
        listener: Arc<dyn Listener>,
        pool: Option<PoolHandle>,
    ) -> anyhow::Result<Arc<dyn Component>>;

    fn create_interface(&self, ctx: &CreateContext) -> anyhow::Result<Arc<dyn ComponentInterface>>;

    /// Descriptors for the parameter structures this module understands.
    fn reflector(&self) -> Option<Arc<dyn ParamReflector>> {
        None
    }
}
