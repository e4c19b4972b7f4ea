//! Parameter catalog: the static mapping from named logical values to
//! register locations and decode rules, per manufacturer and model family.
//!
//! Tables for related families are additive: a profile exposes a base set
//! and merges family extensions on top when the model is known. Merging is
//! a pure function producing a new set; the static tables are never
//! mutated.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{InvSrvError, Result};

pub mod atess;
pub mod sungrow;

/// Register class, named by Modbus convention.
///
/// Input registers are read-only (function code 0x04); holding registers
/// are read/write (0x03 to read, 0x10 to write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterKind {
    Input,
    Holding,
}

impl RegisterKind {
    pub const ALL: [RegisterKind; 2] = [RegisterKind::Input, RegisterKind::Holding];

    /// Modbus function code used to read this register class.
    pub fn read_function(self) -> u8 {
        match self {
            RegisterKind::Input => 0x04,
            RegisterKind::Holding => 0x03,
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::Input => write!(f, "input"),
            RegisterKind::Holding => write!(f, "holding"),
        }
    }
}

/// Data types stored in device registers. Chooses the decode rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Unsigned 16-bit, one register
    U16,
    /// Two's-complement signed 16-bit, one register
    I16,
    /// Signed 8-bit packed in the high byte of one register
    I8High,
    /// Signed 8-bit packed in the low byte of one register
    I8Low,
    /// Unsigned 32-bit, two registers, most significant word first
    U32,
    /// Two ASCII characters per register, big-endian within the word
    Utf8,
}

impl DataType {
    /// Fixed register width, or `None` for text whose width comes from the
    /// parameter's word count.
    pub fn word_count(self) -> Option<u16> {
        match self {
            DataType::U16 | DataType::I16 | DataType::I8High | DataType::I8Low => Some(1),
            DataType::U32 => Some(2),
            DataType::Utf8 => None,
        }
    }
}

/// Immutable descriptor of one named logical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    /// Unique name within a device
    pub name: &'static str,
    pub kind: RegisterKind,
    /// 1-indexed logical register address
    pub address: u16,
    /// Number of consecutive 16-bit registers
    pub word_count: u16,
    pub data_type: DataType,
    /// Multiplicative factor applied after decode, divided out before encode
    pub scale: f64,
    /// Display unit, may be empty
    pub unit: &'static str,
}

impl Parameter {
    pub const fn new(
        name: &'static str,
        kind: RegisterKind,
        address: u16,
        data_type: DataType,
    ) -> Self {
        let word_count = match data_type {
            DataType::U32 => 2,
            _ => 1,
        };
        Parameter {
            name,
            kind,
            address,
            word_count,
            data_type,
            scale: 1.0,
            unit: "",
        }
    }

    pub const fn scaled(mut self, scale: f64, unit: &'static str) -> Self {
        self.scale = scale;
        self.unit = unit;
        self
    }

    pub const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub const fn words(mut self, word_count: u16) -> Self {
        self.word_count = word_count;
        self
    }

    /// Exclusive end address (last word lives at `end_address - 1`).
    pub fn end_address(&self) -> u16 {
        self.address + self.word_count
    }
}

/// Shape hint for a writable parameter, consumed only by the publishing
/// layer when building discovery documents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityHint {
    /// Numeric setpoint with an allowed range
    Number { min: f64, max: f64 },
    /// Two-state control with the raw payloads to write
    Switch { payload_off: u16, payload_on: u16 },
    /// Enumerated option list; the register stores the option index
    Select { options: &'static [&'static str] },
}

/// Writable parameter: register descriptor plus its entity shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteParameter {
    pub parameter: Parameter,
    pub hint: EntityHint,
}

/// The resolved parameter surface of one device.
///
/// Readable parameters include the writable ones (their current value is
/// polled like any other register); the writable map layers the entity
/// hints on top. Name order is stable so extents, publishes and tests are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: BTreeMap<&'static str, Parameter>,
    writable: BTreeMap<&'static str, WriteParameter>,
}

impl ParameterSet {
    pub fn from_tables(params: &[Parameter], writable: &[WriteParameter]) -> Self {
        let mut set = ParameterSet::default();
        set.extend(params, writable);
        set
    }

    fn extend(&mut self, params: &[Parameter], writable: &[WriteParameter]) {
        for p in params {
            self.params.insert(p.name, *p);
        }
        for w in writable {
            self.params.insert(w.parameter.name, w.parameter);
            self.writable.insert(w.parameter.name, *w);
        }
    }

    /// Pure merge: `base` plus `extension`, extension entries winning on
    /// name collision. Neither input is modified.
    pub fn merge(base: &ParameterSet, extension: &ParameterSet) -> ParameterSet {
        let mut merged = base.clone();
        for p in extension.params.values() {
            merged.params.insert(p.name, *p);
        }
        for w in extension.writable.values() {
            merged.writable.insert(w.parameter.name, *w);
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn get_writable(&self, name: &str) -> Option<&WriteParameter> {
        self.writable.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    pub fn iter_writable(&self) -> impl Iterator<Item = &WriteParameter> {
        self.writable.values()
    }

    pub fn of_kind(&self, kind: RegisterKind) -> impl Iterator<Item = &Parameter> {
        self.params.values().filter(move |p| p.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Capability record for one manufacturer.
///
/// Replaces per-manufacturer device subclasses: the device lifecycle is a
/// single type parameterised by a profile that knows how to identify a
/// model and assemble its parameter set.
pub trait DeviceProfile: Send + Sync {
    fn manufacturer(&self) -> &'static str;

    /// The parameter whose register holds the model/type code, decoded as
    /// U16 and mapped through `model_name`.
    fn identification_parameter(&self) -> Parameter;

    /// Parameter read as the availability probe at connect time. A full
    /// descriptor, not a name: the probe runs before model resolution, so
    /// there is no parameter set to look it up in yet.
    fn availability_parameter(&self) -> Parameter;

    /// Name of the parameter holding the serial number, if the family
    /// publishes one.
    fn serial_parameter(&self) -> Option<&'static str> {
        None
    }

    /// Map a raw identification code to a model name.
    fn model_name(&self, code: u16) -> Option<&'static str>;

    /// Assemble the full parameter set for a named model.
    ///
    /// Returns `UnsupportedModel` when the name does not belong to a
    /// family this profile can poll.
    fn resolve(&self, model: &str) -> Result<ParameterSet>;
}

/// Look up the profile for a configured device type.
pub fn profile_for(device_type: &str) -> Result<Arc<dyn DeviceProfile>> {
    match device_type {
        "atess" => Ok(Arc::new(atess::AtessProfile)),
        "sungrow" => Ok(Arc::new(sungrow::SungrowProfile)),
        other => Err(InvSrvError::config(format!(
            "Device type {other} not implemented"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &'static str, address: u16) -> Parameter {
        Parameter::new(name, RegisterKind::Holding, address, DataType::U16)
    }

    #[test]
    fn merge_is_pure() {
        let base = ParameterSet::from_tables(&[param("A", 1), param("B", 5)], &[]);
        let ext = ParameterSet::from_tables(&[param("C", 9)], &[]);

        let merged = ParameterSet::merge(&base, &ext);
        assert_eq!(merged.len(), 3);
        // inputs untouched
        assert_eq!(base.len(), 2);
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn merge_extension_wins_on_collision() {
        let base = ParameterSet::from_tables(&[param("A", 1)], &[]);
        let ext = ParameterSet::from_tables(&[param("A", 7)], &[]);

        let merged = ParameterSet::merge(&base, &ext);
        assert_eq!(merged.get("A").unwrap().address, 7);
    }

    #[test]
    fn writable_parameters_are_also_readable() {
        let w = WriteParameter {
            parameter: param("Setpoint", 20),
            hint: EntityHint::Number { min: 0.0, max: 100.0 },
        };
        let set = ParameterSet::from_tables(&[], &[w]);
        assert!(set.get("Setpoint").is_some());
        assert!(set.get_writable("Setpoint").is_some());
    }

    #[test]
    fn unknown_device_type_is_a_config_error() {
        assert!(matches!(
            profile_for("growatt"),
            Err(InvSrvError::Config(_))
        ));
    }
}
