//! Sungrow string-inverter parameter tables.
//!
//! Single family: every model reads the same input-register map, trimmed to
//! the MPPT channels the model actually has. No writable surface. Addresses
//! are 1-indexed logical addresses (the protocol document lists 0-indexed
//! offsets).

use super::{
    DataType::{I16, Utf8, U16, U32},
    DeviceProfile, Parameter, ParameterSet,
    RegisterKind::Input,
};
use crate::error::{InvSrvError, Result};

const fn p(name: &'static str, address: u16, dtype: super::DataType) -> Parameter {
    Parameter::new(name, Input, address, dtype)
}

const REGISTERS: &[Parameter] = &[
    p("Serial Number", 4991, Utf8).words(10),
    p("Device Type Code", 5001, U16),
    p("Nominal Active Power", 5002, U16).scaled(0.1, "kW"),
    p("Output Type", 5003, U16),
    p("Daily Power Yields", 5004, U16).scaled(0.1, "kWh"),
    p("Total Power Yields", 5005, U32).unit("kWh"),
    p("Total Running Time", 5007, U32).unit("h"),
    p("Internal Temperature", 5009, I16).scaled(0.1, "°C"),
    // only valid for specific models
    p("Total Apparent Power", 5010, U32).unit("VA"),
    p("MPPT 1 Voltage", 5012, U16).scaled(0.1, "V"),
    p("MPPT 1 Current", 5013, U16).scaled(0.1, "A"),
    p("MPPT 2 Voltage", 5014, U16).scaled(0.1, "V"),
    p("MPPT 2 Current", 5015, U16).scaled(0.1, "A"),
    p("MPPT 3 Voltage", 5016, U16).scaled(0.1, "V"),
    p("MPPT 3 Current", 5017, U16).scaled(0.1, "A"),
    p("Total DC Power", 5018, U32).unit("W"),
    p("A-B Line Voltage/Phase A Voltage", 5020, U16).scaled(0.1, "V"),
    p("B-C Line Voltage/Phase B Voltage", 5021, U16).scaled(0.1, "V"),
    p("C-A Line Voltage/Phase C Voltage", 5022, U16).scaled(0.1, "V"),
    p("Phase A Current", 5023, U16).scaled(0.1, "A"),
    p("Phase B Current", 5024, U16).scaled(0.1, "A"),
    p("Phase C Current", 5025, U16).scaled(0.1, "A"),
    p("Total Active Power", 5032, U32).unit("W"),
    p("Total Reactive Power", 5034, U32).unit("Var"),
    // >0 leading, <0 lagging
    p("Power Factor", 5036, I16).scaled(0.001, ""),
    p("Grid Frequency", 5037, U16).scaled(0.1, "Hz"),
    p("Work State", 5039, U16),
    p("Fault/Alarm Code 1", 5046, U16),
    p("Nominal Reactive Power", 5050, U16).scaled(0.1, "kVar"),
    p("Array Insulation Resistance", 5072, U16).unit("kΩ"),
    p("Active Power Regulation Setpoint", 5078, U32).unit("W"),
    p("Work State (Extended)", 5082, U32),
    p("Daily Export Energy", 5094, U32).scaled(0.1, "kWh"),
    p("Total Export Energy", 5096, U32).scaled(0.1, "kWh"),
    p("Daily Import Energy", 5098, U32).scaled(0.1, "kWh"),
    p("Total Import Energy", 5100, U32).scaled(0.1, "kWh"),
    p("Daily Direct Energy Consumption", 5102, U32).scaled(0.1, "kWh"),
    p("Total Direct Energy Consumption", 5104, U32).scaled(0.1, "kWh"),
    p("Daily Running Time", 5114, U16).unit("min"),
    p("Present Country", 5115, U16),
    p("MPPT 4 Voltage", 5116, U16).scaled(0.1, "V"),
    p("MPPT 4 Current", 5117, U16).scaled(0.1, "A"),
    p("MPPT 5 Voltage", 5118, U16).scaled(0.1, "V"),
    p("MPPT 5 Current", 5119, U16).scaled(0.1, "A"),
    p("MPPT 6 Voltage", 5120, U16).scaled(0.1, "V"),
    p("MPPT 6 Current", 5121, U16).scaled(0.1, "A"),
    p("MPPT 7 Voltage", 5122, U16).scaled(0.1, "V"),
    p("MPPT 7 Current", 5123, U16).scaled(0.1, "A"),
    p("MPPT 8 Voltage", 5124, U16).scaled(0.1, "V"),
    p("MPPT 8 Current", 5125, U16).scaled(0.1, "A"),
    p("Monthly Power Yields", 5129, U32).scaled(0.1, "kWh"),
    p("MPPT 9 Voltage", 5131, U16).scaled(0.1, "V"),
    p("MPPT 9 Current", 5132, U16).scaled(0.1, "A"),
    p("MPPT 10 Voltage", 5133, U16).scaled(0.1, "V"),
    p("MPPT 10 Current", 5134, U16).scaled(0.1, "A"),
    p("MPPT 11 Voltage", 5135, U16).scaled(0.1, "V"),
    p("MPPT 11 Current", 5136, U16).scaled(0.1, "A"),
    p("MPPT 12 Voltage", 5137, U16).scaled(0.1, "V"),
    p("MPPT 12 Current", 5138, U16).scaled(0.1, "A"),
    p("Total Power Yields (Increased Accuracy)", 5145, U32).scaled(0.1, "kWh"),
    p("Negative Voltage to the Ground", 5147, I16).scaled(0.1, "V"),
    p("Bus Voltage", 5148, U16).scaled(0.1, "V"),
    p("Grid Frequency (Increased Accuracy)", 5149, U16).scaled(0.01, "Hz"),
    p("PID Work State", 5151, U16),
    p("PID Alarm Code", 5152, U16),
];

/// Model name, type code and MPPT channel count, from the protocol document
/// device-information appendix.
const MODELS: &[(&str, u16, u8)] = &[
    ("SG33CX", 0x2C00, 3),
    ("SG110CX", 0x2C06, 9),
    ("SG80KTL-20", 0x0138, 1),
    ("SG30KTL", 0x27, 2),
    ("SG10KTL", 0x26, 2),
    ("SG12KTL", 0x29, 2),
    ("SG15KTL", 0x28, 2),
    ("SG20KTL", 0x2A, 2),
    ("SG30KU", 0x2C, 2),
    ("SG36KTL", 0x2D, 2),
    ("SG36KU", 0x2E, 2),
    ("SG40KTL", 0x2F, 2),
    ("SG40KTL-M", 0x0135, 3),
    ("SG50KTL-M", 0x011B, 4),
    ("SG60KTL-M", 0x0131, 4),
    ("SG60KU", 0x0136, 1),
    ("SG30KTL-M", 0x0141, 3),
    ("SG30KTL-M-V31", 0x70, 3),
    ("SG33KTL-M", 0x0134, 3),
    ("SG36KTL-M", 0x74, 3),
    ("SG33K3J", 0x013D, 3),
    ("SG49K5J", 0x0137, 4),
    ("SG34KJ", 0x72, 2),
    ("LP_P34KSG", 0x73, 1),
    ("SG60KTL", 0x010F, 1),
    ("SG80KTL", 0x0139, 4),
    ("SG60KU-M", 0x0132, 4),
    ("SG5KTL-MT", 0x0147, 2),
    ("SG6KTL-MT", 0x0148, 2),
    ("SG8KTL-M", 0x013F, 2),
    ("SG10KTL-M", 0x013E, 2),
    ("SG10KTL-MT", 0x2C0F, 2),
    ("SG12KTL-M", 0x013C, 2),
    ("SG15KTL-M", 0x0142, 2),
    ("SG17KTL-M", 0x0149, 2),
    ("SG20KTL-M", 0x0143, 2),
    ("SG80KTL-M", 0x0139, 4),
    ("SG111HV", 0x014C, 1),
    ("SG125HV", 0x013B, 1),
    ("SG125HV-20", 0x2C03, 1),
    ("SG30CX", 0x2C10, 3),
    ("SG36CX-US", 0x2C0A, 3),
    ("SG40CX", 0x2C01, 4),
    ("SG50CX", 0x2C02, 5),
    ("SG60CX-US", 0x2C0B, 5),
    ("SG250HX", 0x2C0C, 12),
    ("SG250HX-US", 0x2C11, 12),
    ("SG100CX", 0x2C12, 12),
    ("SG250HX-IN", 0x2C13, 12),
    ("SG25CX-SA", 0x2C15, 3),
    ("SG75CX", 0x2C22, 9),
    ("SG3.0RT", 0x243D, 2),
    ("SG4.0RT", 0x243E, 2),
    ("SG5.0RT", 0x2430, 2),
    ("SG6.0RT", 0x2431, 2),
    ("SG7.0RT", 0x243C, 2),
    ("SG8.0RT", 0x2432, 2),
    ("SG10RT", 0x2433, 2),
    ("SG12RT", 0x2434, 2),
    ("SG15RT", 0x2435, 2),
    ("SG17RT", 0x2436, 2),
    ("SG20RT", 0x2437, 2),
];

/// Strip "MPPT n Voltage"/"MPPT n Current" entries for channels the model
/// does not have.
fn mppt_channel(name: &str) -> Option<u8> {
    let rest = name.strip_prefix("MPPT ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub struct SungrowProfile;

impl DeviceProfile for SungrowProfile {
    fn manufacturer(&self) -> &'static str {
        "Sungrow"
    }

    fn identification_parameter(&self) -> Parameter {
        p("Device Type Code", 5001, U16)
    }

    fn availability_parameter(&self) -> Parameter {
        p("Work State", 5039, U16)
    }

    fn serial_parameter(&self) -> Option<&'static str> {
        Some("Serial Number")
    }

    fn model_name(&self, code: u16) -> Option<&'static str> {
        MODELS
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(name, _, _)| *name)
    }

    fn resolve(&self, model: &str) -> Result<ParameterSet> {
        let Some((_, _, mppt)) = MODELS.iter().find(|(name, _, _)| *name == model) else {
            return Err(InvSrvError::UnsupportedModel {
                model: model.to_string(),
            });
        };

        let params: Vec<Parameter> = REGISTERS
            .iter()
            .filter(|param| match mppt_channel(param.name) {
                Some(channel) => channel <= *mppt,
                None => true,
            })
            .copied()
            .collect();

        Ok(ParameterSet::from_tables(&params, &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegisterKind;

    #[test]
    fn type_codes_resolve() {
        let profile = SungrowProfile;
        assert_eq!(profile.model_name(0x2C06), Some("SG110CX"));
        assert_eq!(profile.model_name(0x2C00), Some("SG33CX"));
        assert_eq!(profile.model_name(0xFFFF), None);
    }

    #[test]
    fn mppt_channels_trimmed_to_model() {
        let set = SungrowProfile.resolve("SG33CX").unwrap();
        assert!(set.get("MPPT 3 Voltage").is_some());
        assert!(set.get("MPPT 4 Voltage").is_none());

        let set = SungrowProfile.resolve("SG250HX").unwrap();
        assert!(set.get("MPPT 12 Current").is_some());
    }

    #[test]
    fn no_writable_surface() {
        let set = SungrowProfile.resolve("SG110CX").unwrap();
        assert_eq!(set.iter_writable().count(), 0);
        assert_eq!(set.of_kind(RegisterKind::Holding).count(), 0);
    }

    #[test]
    fn unknown_model_is_unsupported() {
        assert!(matches!(
            SungrowProfile.resolve("SG999ZZ"),
            Err(InvSrvError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn identification_register_is_in_the_set() {
        let profile = SungrowProfile;
        let set = profile.resolve("SG40CX").unwrap();
        let ident = profile.identification_parameter();
        assert_eq!(set.get(ident.name), Some(&ident));
    }
}
