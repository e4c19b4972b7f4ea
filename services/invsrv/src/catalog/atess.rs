//! Atess parameter tables.
//!
//! Address layout follows the Atess Modbus protocol document; the document
//! lists 0-indexed register offsets, the tables here store the 1-indexed
//! logical addresses used everywhere above the transport.
//!
//! Family layout: a base table shared by every model, a PCS extension for
//! the battery-converter family, a non-PCS extension for everything else,
//! and a PBD extension layered on top of non-PCS for the DC-coupled
//! converters. The writable surface ships with the PCS family.

use super::{
    DataType::{I16, I8High, I8Low, Utf8, U16, U32},
    DeviceProfile, EntityHint, Parameter, ParameterSet, RegisterKind,
    RegisterKind::{Holding, Input},
    WriteParameter,
};
use crate::error::{InvSrvError, Result};

const fn p(name: &'static str, kind: RegisterKind, address: u16, dtype: super::DataType) -> Parameter {
    Parameter::new(name, kind, address, dtype)
}

/// Available on all models.
const BASE: &[Parameter] = &[
    p("Serial Number", Holding, 181, Utf8).words(5),
    p("Device Type Code", Holding, 44, U16),
    p("Device On/Off", Holding, 1, U16),
    p("PV Voltage", Holding, 81, U16).scaled(0.1, "V"),
    p("PV Current", Holding, 84, U16).scaled(0.1, "A"),
    p("Battery Power", Input, 18, I16).scaled(0.1, "kW"),
    p("Battery SOC", Input, 48, U16).unit("%"),
    p("Hardware Version", Input, 271, Utf8).words(10),
    p("Battery Voltage", Input, 2, I16).scaled(0.1, "V"),
    p("Battery Current", Input, 3, I16).scaled(0.1, "A"),
    p("Ambient Temperature", Input, 37, I16).scaled(0.1, "°C"),
    // two signed 8-bit values packed into one register
    p("BMS Max. Temperature", Input, 172, I8High).unit("°C"),
    p("BMS Min. Temperature", Input, 172, I8Low).unit("°C"),
    p("BMS Max. Cell Voltage", Input, 175, U16).unit("mV"),
    p("BMS Min. Cell Voltage", Input, 176, U16).unit("mV"),
    p("Total Battery Discharge Energy", Input, 69, U32).scaled(0.1, "kWh"),
    p("Total Battery Charge Energy", Input, 73, U32).scaled(0.1, "kWh"),
];

/// Battery-converter (PCS) family additions.
const PCS: &[Parameter] = &[
    p("System Battery Current", Input, 163, I16).scaled(0.1, "A"),
    p("System Battery Power", Input, 229, I16).scaled(0.1, "kW"),
    p("Transformer Temperature", Input, 36, I16).scaled(0.1, "°C"),
    p("Frequency Shift Enable", Holding, 80, U16),
    p("Power Factor Symbol", Input, 23, U16),
    p("Power Factor", Input, 24, U16).scaled(0.001, ""),
    p("Charge Cutoff SOC", Holding, 179, U16).unit("%"),
    p("Output Voltage UV", Input, 5, U16).scaled(0.1, "V"),
    p("Output Voltage VW", Input, 6, U16).scaled(0.1, "V"),
    p("Output Voltage WU", Input, 7, U16).scaled(0.1, "V"),
    p("Bypass Current U", Input, 8, U16).scaled(0.1, "A"),
    p("Bypass Current V", Input, 9, U16).scaled(0.1, "A"),
    p("Bypass Current W", Input, 10, U16).scaled(0.1, "A"),
    p("Output Frequency", Input, 17, U16).scaled(0.01, "Hz"),
    p("Bypass Frequency", Input, 82, U16).scaled(0.01, "Hz"),
    p("Bypass Active Power", Input, 20, I16).scaled(0.1, "kW"),
    p("Grid Frequency", Input, 22, U16).scaled(0.01, "Hz"),
    p("Output Apparent Power", Input, 79, U16).scaled(0.1, "kVA"),
    p("Output Active Power", Input, 80, I16).scaled(0.1, "kW"),
    p("Load Active Power", Input, 50, I16).scaled(0.1, "kW"),
    p("Output Voltage U", Input, 57, U16).scaled(0.1, "V"),
    p("Output Voltage V", Input, 58, U16).scaled(0.1, "V"),
    p("Output Voltage W", Input, 59, U16).scaled(0.1, "V"),
    p("Output Current U", Input, 136, U16).scaled(0.1, "A"),
    p("Output Current V", Input, 137, U16).scaled(0.1, "A"),
    p("Output Current W", Input, 138, U16).scaled(0.1, "A"),
    p("Total Grid Import", Input, 91, U32).scaled(0.1, "kWh"),
    p("Total Grid Export", Input, 97, U32).scaled(0.1, "kWh"),
    p("Total Load Energy", Input, 85, U32).scaled(0.1, "kWh"),
];

/// Additions common to all except the PCS family.
const NOT_PCS: &[Parameter] = &[
    p("PV1 Voltage", Input, 1, I16).scaled(0.1, "V"),
    p("PV1 DC Current", Input, 4, I16).scaled(0.1, "A"),
    // unsigned according to the protocol, observation says otherwise
    p("PV1 Power", Input, 52, I16).scaled(0.1, "kW"),
    p("PV Daily Power Generation", Input, 63, U16).scaled(0.1, "kWh"),
    p("Total PV Generation", Input, 65, U32).scaled(0.1, "kWh"),
];

/// DC-coupled converter (PBD) sub-family additions on top of non-PCS.
const PBD: &[Parameter] = &[
    p("PV2 Voltage", Input, 106, I16).scaled(0.1, "V"),
    p("PV2 DC Current", Input, 107, I16).scaled(0.1, "A"),
    p("PV2 Power", Input, 108, I16).scaled(0.1, "kW"),
    p("PV Total Power", Input, 109, I16).scaled(0.1, "kW"),
    p("Output Voltage", Input, 110, I16).scaled(0.1, "V"),
    p("Output Current", Input, 111, I16).scaled(0.1, "A"),
    p("Output Power", Input, 114, I16).scaled(0.1, "kW"),
    p("PV Module Temperature", Input, 115, U16).scaled(0.1, "°C"),
    p("PV3 Voltage", Input, 124, I16).scaled(0.1, "V"),
];

const MODE_OPTIONS: &[&str] = &[
    "Load First",
    "Battery First",
    "Economy Mode",
    "Peak Shaving",
    "Time Schedule",
    "Manual Dispatch",
    "Battery Protect",
    "Backup Power Management",
    "Constant Power Discharge",
    "Forced Charging",
    "Smart Meter Mode",
    "Bat-Smart Meter",
];

const fn number(
    name: &'static str,
    address: u16,
    min: f64,
    max: f64,
    unit: &'static str,
) -> WriteParameter {
    WriteParameter {
        parameter: p(name, Holding, address, U16).unit(unit),
        hint: EntityHint::Number { min, max },
    }
}

const fn switch(name: &'static str, address: u16) -> WriteParameter {
    WriteParameter {
        parameter: p(name, Holding, address, U16),
        hint: EntityHint::Switch { payload_off: 0, payload_on: 1 },
    }
}

/// Writable surface of the PCS family.
const PCS_WRITE: &[WriteParameter] = &[
    WriteParameter {
        parameter: p("Mode Selection", Holding, 27, U16),
        hint: EntityHint::Select { options: MODE_OPTIONS },
    },
    switch("Bypass Cabinet Enable", 14),
    switch("Grid And PV Charge Together", 9),
    switch("Forced Charge Enable", 230),
    switch("Anti Reflux Enable", 17),
    number("SOC Up Limit", 67, 0.0, 100.0, "%"),
    number("SOC Down Limit", 68, 0.0, 100.0, "%"),
    number("Charge Cutoff SOC", 179, 0.0, 100.0, "%"),
    number("Discharge Cutoff SOC", 48, 0.0, 100.0, "%"),
    number("Grid Charge Cutoff SOC", 341, 0.0, 100.0, "%"),
    number("Battery Power Export to Grid Set", 175, 0.0, 150.0, "kW"),
    number("Output Power Limit", 59, 0.0, 120.0, "%"),
    number("Grid Power UP Limit", 66, 0.0, 500.0, "kW"),
    WriteParameter {
        parameter: p("Max Grid Charge Power", Holding, 226, U16).scaled(0.1, "kW"),
        hint: EntityHint::Number { min: 0.0, max: 150.0 },
    },
    WriteParameter {
        parameter: p("Discharge Current Limit", Holding, 156, U16).scaled(0.1, "A"),
        hint: EntityHint::Number { min: 0.0, max: 1000.0 },
    },
];

/// Device Type Code register value to model name, from the protocol
/// document appendix.
const MODEL_CODES: &[(u16, &str)] = &[
    (22001, "HPS30"),
    (22002, "HPS50"),
    (22003, "HPS100"),
    (22004, "HPS120"),
    (22005, "HPS150"),
    (22006, "HPS250"),
    (22007, "HPS7500TL"),
    (22008, "HPS20KTL"),
    (22009, "HPS10KTL"),
    (22010, "HPS10KTLS"),
    (22011, "HPS7500TLS"),
    (22012, "HPS5KTLS"),
    (22013, "HPS3500TLS"),
    (22014, "HPS20KTLS"),
    (22015, "HPS15KTL"),
    (22016, "HPS30KTL"),
    (22017, "HPS40KTL"),
    (21016, "PCS50"),
    (21017, "PCS50TL"),
    (21018, "PCS50U"),
    (21019, "PCS100"),
    (21020, "PCS100TL"),
    (21021, "PCS100U"),
    (21022, "PCS250"),
    (21023, "PCS250TL"),
    (21024, "PCS250U"),
    (21025, "PCS500"),
    (21026, "PCS500TL"),
    (21027, "PCS500U"),
    (21028, "PCS50 (new model)"),
    (21029, "PCS50TL"),
    (21030, "PCS50U"),
    (21031, "PCS100"),
    (21032, "PCS100TL"),
    (21033, "PCS100U"),
    (21034, "PCS250"),
    (21035, "PCS250TL"),
    (21036, "PCS250U"),
    (21037, "PCS500"),
    (21038, "PCS500TL"),
    (21039, "PCS500U"),
    (21040, "PCS630"),
    (23001, "PBD350 (old model)"),
    (23002, "PBD350 (new model)"),
    (23003, "PBD250"),
];

pub struct AtessProfile;

impl DeviceProfile for AtessProfile {
    fn manufacturer(&self) -> &'static str {
        "Atess"
    }

    fn identification_parameter(&self) -> Parameter {
        p("Device Type Code", Holding, 44, U16)
    }

    fn availability_parameter(&self) -> Parameter {
        p("Device On/Off", Holding, 1, U16)
    }

    fn serial_parameter(&self) -> Option<&'static str> {
        Some("Serial Number")
    }

    fn model_name(&self, code: u16) -> Option<&'static str> {
        MODEL_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    fn resolve(&self, model: &str) -> Result<ParameterSet> {
        let base = ParameterSet::from_tables(BASE, &[]);

        if model.contains("PCS") {
            let ext = ParameterSet::from_tables(PCS, PCS_WRITE);
            return Ok(ParameterSet::merge(&base, &ext));
        }

        if model.contains("HPS") || model.contains("PBD") {
            let mut set = ParameterSet::merge(&base, &ParameterSet::from_tables(NOT_PCS, &[]));
            if model.contains("PBD") {
                set = ParameterSet::merge(&set, &ParameterSet::from_tables(PBD, &[]));
            }
            return Ok(set);
        }

        Err(InvSrvError::UnsupportedModel {
            model: model.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_codes_resolve() {
        let profile = AtessProfile;
        assert_eq!(profile.model_name(21025), Some("PCS500"));
        assert_eq!(profile.model_name(23003), Some("PBD250"));
        assert_eq!(profile.model_name(1), None);
    }

    #[test]
    fn pcs_family_gets_battery_converter_registers() {
        let set = AtessProfile.resolve("PCS500").unwrap();
        assert!(set.get("System Battery Current").is_some());
        assert!(set.get("Charge Cutoff SOC").is_some());
        // non-PCS additions absent
        assert!(set.get("PV1 Voltage").is_none());
        // writable surface present
        assert!(set.get_writable("Mode Selection").is_some());
    }

    #[test]
    fn pbd_family_layers_on_non_pcs() {
        let set = AtessProfile.resolve("PBD250").unwrap();
        assert!(set.get("PV1 Voltage").is_some());
        assert!(set.get("PV2 Voltage").is_some());
        assert!(set.get("System Battery Current").is_none());
    }

    #[test]
    fn hps_family_gets_only_non_pcs_additions() {
        let set = AtessProfile.resolve("HPS120").unwrap();
        assert!(set.get("PV1 Voltage").is_some());
        assert!(set.get("PV2 Voltage").is_none());
    }

    #[test]
    fn unknown_family_is_unsupported() {
        assert!(matches!(
            AtessProfile.resolve("XYZ100"),
            Err(InvSrvError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn resolution_is_idempotent() {
        let a = AtessProfile.resolve("PCS500").unwrap();
        let b = AtessProfile.resolve("PCS500").unwrap();
        assert_eq!(a.len(), b.len());
        for param in a.iter() {
            assert_eq!(b.get(param.name), Some(param));
        }
    }
}
