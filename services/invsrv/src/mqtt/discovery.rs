//! Home Assistant discovery documents and topic layout.
//!
//! Topic scheme:
//!   state         {base}/{device}/{slug}/state
//!   command       {base}/{device}/{slug}/set
//!   availability  {base}_{device}/availability
//!   discovery     {prefix}/{component}/{device}/{slug}/config
//!
//! Everything here is pure string/JSON assembly so it can be tested without
//! a broker.

use common::slugify;
use serde_json::{json, Value as Json};

use crate::catalog::{EntityHint, Parameter, WriteParameter};
use crate::device::Device;

/// Topic factory for one device.
#[derive(Debug, Clone)]
pub struct DeviceTopics {
    base: String,
    device: String,
}

impl DeviceTopics {
    pub fn new(base: &str, device: &str) -> Self {
        Self {
            base: base.to_string(),
            device: device.to_string(),
        }
    }

    pub fn state(&self, parameter: &str) -> String {
        format!("{}/{}/{}/state", self.base, self.device, slugify(parameter))
    }

    pub fn command(&self, parameter: &str) -> String {
        format!("{}/{}/{}/set", self.base, self.device, slugify(parameter))
    }

    pub fn availability(&self) -> String {
        format!("{}_{}/availability", self.base, self.device)
    }

    pub fn discovery(&self, prefix: &str, component: &str, parameter: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            prefix,
            component,
            self.device,
            slugify(parameter)
        )
    }

    /// All command topics of one device, as a subscription filter.
    pub fn command_filter(&self) -> String {
        format!("{}/{}/+/set", self.base, self.device)
    }

    /// Parse `{base}/{device}/{slug}/set` back into (device, slug).
    pub fn parse_command(base: &str, topic: &str) -> Option<(String, String)> {
        let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
        let mut segments = rest.split('/');
        let device = segments.next()?;
        let slug = segments.next()?;
        if segments.next() != Some("set") || segments.next().is_some() {
            return None;
        }
        Some((device.to_string(), slug.to_string()))
    }
}

/// Discovery component for a read-only parameter.
pub const SENSOR: &str = "sensor";

/// Discovery component implied by an entity hint.
pub fn component_of(hint: EntityHint) -> &'static str {
    match hint {
        EntityHint::Number { .. } => "number",
        EntityHint::Switch { .. } => "switch",
        EntityHint::Select { .. } => "select",
    }
}

fn device_block(device: &Device) -> Json {
    json!({
        "identifiers": [device.name()],
        "name": device.name(),
        "manufacturer": device.manufacturer(),
        "model": device.model(),
        "serial_number": device.serial(),
    })
}

fn base_document(device: &Device, topics: &DeviceTopics, param: &Parameter) -> Json {
    let mut doc = json!({
        "name": param.name,
        "unique_id": format!("{}_{}", device.name(), slugify(param.name)),
        "state_topic": topics.state(param.name),
        "availability_topic": topics.availability(),
        "device": device_block(device),
    });
    if !param.unit.is_empty() {
        doc["unit_of_measurement"] = json!(param.unit);
    }
    doc
}

/// Discovery document for a read-only parameter.
pub fn sensor_document(device: &Device, topics: &DeviceTopics, param: &Parameter) -> Json {
    base_document(device, topics, param)
}

/// Discovery document for a writable parameter, shaped by its entity hint.
pub fn entity_document(device: &Device, topics: &DeviceTopics, writable: &WriteParameter) -> Json {
    let param = &writable.parameter;
    let mut doc = base_document(device, topics, param);
    doc["command_topic"] = json!(topics.command(param.name));
    match writable.hint {
        EntityHint::Number { min, max } => {
            doc["min"] = json!(min);
            doc["max"] = json!(max);
        }
        EntityHint::Switch { .. } => {
            doc["payload_on"] = json!("ON");
            doc["payload_off"] = json!("OFF");
        }
        EntityHint::Select { options } => {
            doc["options"] = json!(options);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_layout() {
        let topics = DeviceTopics::new("invsrv", "pcs1");
        assert_eq!(topics.state("Battery SOC"), "invsrv/pcs1/battery_soc/state");
        assert_eq!(topics.command("Mode Selection"), "invsrv/pcs1/mode_selection/set");
        assert_eq!(topics.availability(), "invsrv_pcs1/availability");
        assert_eq!(
            topics.discovery("homeassistant", "sensor", "Battery SOC"),
            "homeassistant/sensor/pcs1/battery_soc/config"
        );
    }

    #[test]
    fn command_topics_parse_back() {
        assert_eq!(
            DeviceTopics::parse_command("invsrv", "invsrv/pcs1/soc_up_limit/set"),
            Some(("pcs1".to_string(), "soc_up_limit".to_string()))
        );
        assert_eq!(DeviceTopics::parse_command("invsrv", "invsrv/pcs1/soc_up_limit/state"), None);
        assert_eq!(DeviceTopics::parse_command("invsrv", "other/pcs1/x/set"), None);
        assert_eq!(DeviceTopics::parse_command("invsrv", "invsrv/pcs1/x/set/extra"), None);
    }

    #[test]
    fn hints_choose_the_component() {
        assert_eq!(component_of(EntityHint::Number { min: 0.0, max: 1.0 }), "number");
        assert_eq!(
            component_of(EntityHint::Switch { payload_off: 0, payload_on: 1 }),
            "switch"
        );
        assert_eq!(component_of(EntityHint::Select { options: &[] }), "select");
    }
}
