//! Generic get/set configuration surface.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::params::{Param, ParamDescriptor, ParamIndex, ParamValue, SettingFailure};
use crate::status::Status;

/// Anything that exposes queryable and settable parameters: the store itself
/// and every component interface.
pub trait Configurable: Send + Sync {
    fn name(&self) -> &str;

    /// Current values for the known indices; unknown ones are skipped.
    fn query(&self, indices: &[ParamIndex]) -> Vec<Param>;

    /// Applies what it can and reports each parameter it could not apply.
    fn config(&self, params: &[Param]) -> Vec<SettingFailure>;

    fn supported_params(&self) -> Vec<ParamDescriptor>;
}

pub const PARAM_STORE_NAME: ParamIndex = ParamIndex(0x1000);
pub const PARAM_COMPONENT_COUNT: ParamIndex = ParamIndex(0x1001);
pub const PARAM_POOLED_BUFFERS: ParamIndex = ParamIndex(0x1002);
pub const PARAM_MAX_INSTANCES: ParamIndex = ParamIndex(0x1003);

struct Slot {
    name: &'static str,
    read_only: bool,
    value: ParamValue,
}

/// The store's own parameters.
pub struct StoreConfigurable {
    name: String,
    slots: RwLock<HashMap<ParamIndex, Slot>>,
}

impl StoreConfigurable {
    pub fn new(name: &str, component_count: usize, pooled_buffers: bool) -> Self {
        let mut slots = HashMap::new();
        slots.insert(
            PARAM_STORE_NAME,
            Slot {
                name: "store.name",
                read_only: true,
                value: ParamValue::Str(name.to_string()),
            },
        );
        slots.insert(
            PARAM_COMPONENT_COUNT,
            Slot {
                name: "store.component-count",
                read_only: true,
                value: ParamValue::U32(component_count as u32),
            },
        );
        slots.insert(
            PARAM_POOLED_BUFFERS,
            Slot {
                name: "store.pooled-buffers",
                read_only: true,
                value: ParamValue::U32(pooled_buffers as u32),
            },
        );
        slots.insert(
            PARAM_MAX_INSTANCES,
            Slot {
                name: "store.max-instances",
                read_only: false,
                value: ParamValue::U32(0),
            },
        );
        Self {
            name: name.to_string(),
            slots: RwLock::new(slots),
        }
    }

    /// Cap on live component instances; 0 means unlimited.
    pub fn max_instances(&self) -> u32 {
        match self.slots.read().get(&PARAM_MAX_INSTANCES).map(|s| &s.value) {
            Some(ParamValue::U32(max)) => *max,
            _ => 0,
        }
    }
}

impl Configurable for StoreConfigurable {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, indices: &[ParamIndex]) -> Vec<Param> {
        let slots = self.slots.read();
        indices
            .iter()
            .filter_map(|index| {
                slots
                    .get(index)
                    .map(|slot| Param::new(*index, slot.value.clone()))
            })
            .collect()
    }

    fn config(&self, params: &[Param]) -> Vec<SettingFailure> {
        let mut slots = self.slots.write();
        let mut failures = Vec::new();
        for param in params {
            let Some(slot) = slots.get_mut(&param.index) else {
                failures.push(SettingFailure {
                    index: param.index,
                    status: Status::NotFound,
                    reason: "unsupported parameter".to_string(),
                });
                continue;
            };
            if slot.read_only {
                failures.push(SettingFailure {
                    index: param.index,
                    status: Status::Refused,
                    reason: format!("{} is read-only", slot.name),
                });
                continue;
            }
            if slot.value.field_type() != param.value.field_type() {
                failures.push(SettingFailure {
                    index: param.index,
                    status: Status::CannotDo,
                    reason: format!(
                        "{} expects {:?}, got {:?}",
                        slot.name,
                        slot.value.field_type(),
                        param.value.field_type()
                    ),
                });
                continue;
            }
            log::debug!("store {} set {} = {:?}", self.name, slot.name, param.value);
            slot.value = param.value.clone();
        }
        failures
    }

    fn supported_params(&self) -> Vec<ParamDescriptor> {
        let mut params: Vec<ParamDescriptor> = self
            .slots
            .read()
            .iter()
            .map(|(index, slot)| ParamDescriptor {
                index: *index,
                name: slot.name.to_string(),
                read_only: slot.read_only,
            })
            .collect();
        params.sort_by_key(|p| p.index);
        params
    }
}
