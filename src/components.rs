//! Built-in raw passthrough components: output is the input, unchanged.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use codec_store::{
    Component, ComponentId, ComponentInterface, ComponentModule, ComponentTraits, Configurable,
    CreateContext, Domain, FieldDescriptor, FieldType, Kind, Listener, Param, ParamDescriptor,
    ParamIndex, ParamReflector, ParamValue, PoolHandle, SettingFailure, StaticReflector, Status,
    StructDescriptor, Work, WorkResult,
};

/// Frames to hold back before emitting output.
pub const PARAM_OUTPUT_DELAY: ParamIndex = ParamIndex(0x2001);

pub struct PassthroughModule {
    traits: ComponentTraits,
}

impl PassthroughModule {
    pub fn audio() -> Self {
        Self {
            traits: ComponentTraits::new(
                "c2.raw.audio.passthrough",
                Domain::Audio,
                Kind::Decoder,
                1000,
                "audio/raw",
            )
            .with_alias("raw.audio"),
        }
    }

    pub fn video() -> Self {
        Self {
            traits: ComponentTraits::new(
                "c2.raw.video.passthrough",
                Domain::Video,
                Kind::Decoder,
                1000,
                "video/raw",
            )
            .with_alias("raw.video"),
        }
    }
}

impl ComponentModule for PassthroughModule {
    fn traits(&self) -> ComponentTraits {
        self.traits.clone()
    }

    fn create_component(
        &self,
        ctx: &CreateContext,
        listener: Arc<dyn Listener>,
        pool: Option<PoolHandle>,
    ) -> anyhow::Result<Arc<dyn Component>> {
        if let Some(pool) = &pool {
            log::debug!(
                "{} #{} uses buffer pool {}",
                ctx.traits.name,
                ctx.id,
                pool.connection_id()
            );
        }
        Ok(Arc::new(PassthroughComponent {
            interface: Arc::new(PassthroughInterface::new(ctx)),
            listener,
            _pool: pool,
            running: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
        }))
    }

    fn create_interface(&self, ctx: &CreateContext) -> anyhow::Result<Arc<dyn ComponentInterface>> {
        Ok(Arc::new(PassthroughInterface::new(ctx)))
    }

    fn reflector(&self) -> Option<Arc<dyn ParamReflector>> {
        Some(Arc::new(StaticReflector::new().with(StructDescriptor::new(
            PARAM_OUTPUT_DELAY,
            vec![FieldDescriptor::scalar("value", FieldType::Uint32, 0)],
        ))))
    }
}

struct PassthroughInterface {
    id: ComponentId,
    name: String,
    delay: AtomicU32,
}

impl PassthroughInterface {
    fn new(ctx: &CreateContext) -> Self {
        Self {
            id: ctx.id,
            name: ctx.traits.name.clone(),
            delay: AtomicU32::new(0),
        }
    }
}

impl Configurable for PassthroughInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, indices: &[ParamIndex]) -> Vec<Param> {
        indices
            .iter()
            .filter(|i| **i == PARAM_OUTPUT_DELAY)
            .map(|i| Param::new(*i, ParamValue::U32(self.delay.load(Ordering::Relaxed))))
            .collect()
    }

    fn config(&self, params: &[Param]) -> Vec<SettingFailure> {
        let mut failures = Vec::new();
        for p in params {
            match (p.index, &p.value) {
                (PARAM_OUTPUT_DELAY, ParamValue::U32(v)) => self.delay.store(*v, Ordering::Relaxed),
                (PARAM_OUTPUT_DELAY, _) => failures.push(SettingFailure {
                    index: p.index,
                    status: Status::CannotDo,
                    reason: "output delay is a u32".to_string(),
                }),
                _ => failures.push(SettingFailure {
                    index: p.index,
                    status: Status::NotFound,
                    reason: "unsupported parameter".to_string(),
                }),
            }
        }
        failures
    }

    fn supported_params(&self) -> Vec<ParamDescriptor> {
        vec![ParamDescriptor {
            index: PARAM_OUTPUT_DELAY,
            name: "output.delay".to_string(),
            read_only: false,
        }]
    }
}

impl ComponentInterface for PassthroughInterface {
    fn id(&self) -> ComponentId {
        self.id
    }
}

struct PassthroughComponent {
    interface: Arc<PassthroughInterface>,
    listener: Arc<dyn Listener>,
    _pool: Option<PoolHandle>,
    running: AtomicBool,
    pending: Mutex<VecDeque<Work>>,
}

impl PassthroughComponent {
    fn drain(&self, pending: &mut VecDeque<Work>, keep: usize) -> Vec<WorkResult> {
        let mut done = Vec::new();
        while pending.len() > keep || pending.back().is_some_and(|w| w.end_of_stream) {
            let Some(w) = pending.pop_front() else {
                break;
            };
            done.push(WorkResult {
                frame_index: w.frame_index,
                output: w.input,
                status: Status::Ok,
                end_of_stream: w.end_of_stream,
            });
        }
        done
    }
}

impl Component for PassthroughComponent {
    fn id(&self) -> ComponentId {
        self.interface.id
    }

    fn interface(&self) -> Arc<dyn ComponentInterface> {
        self.interface.clone()
    }

    fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn queue(&self, work: Vec<Work>) -> anyhow::Result<()> {
        if !self.running.load(Ordering::Acquire) {
            self.listener.on_error(self.id(), Status::CannotDo);
            return Err(anyhow::anyhow!("{} is not running", self.interface.name));
        }
        let keep = self.interface.delay.load(Ordering::Relaxed) as usize;
        let done = {
            let mut pending = self.pending.lock();
            pending.extend(work);
            self.drain(&mut pending, keep)
        };
        if !done.is_empty() {
            self.listener.on_work_done(self.id(), done);
        }
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<Vec<Work>> {
        Ok(self.pending.lock().drain(..).collect())
    }

    fn release(&self) -> anyhow::Result<()> {
        self.stop()?;
        self.flush()?;
        log::debug!("{} #{} released", self.interface.name, self.id());
        Ok(())
    }
}
