//! Modbus protocol constants based on the official specification.
//!
//! The register limits fall out of the 253-byte PDU ceiling inherited from
//! the RS485 ADU limit of 256 bytes.

/// MBAP header length for TCP.
/// Transaction ID(2) + Protocol ID(2) + Length(2) = 6 bytes; the Unit ID is
/// counted by the Length field, not the header.
pub const MBAP_HEADER_LEN: usize = 6;

/// Protocol identifier carried in every MBAP header. Always zero for Modbus.
pub const MBAP_PROTOCOL_ID: u16 = 0;

/// Maximum PDU size per the specification:
/// RS485 ADU (256) - slave address (1) - CRC (2) = 253 bytes.
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum registers per FC03/FC04 read.
/// Response PDU: 1 (function) + 1 (byte count) + N*2 ≤ 253 → N ≤ 125.
pub const MAX_READ_WORDS: u16 = 125;

/// Maximum registers per FC16 write.
/// Request PDU: 1 + 2 + 2 + 1 + N*2 ≤ 253 → N ≤ 123.
pub const MAX_WRITE_WORDS: u16 = 123;

/// Function code: read holding registers
pub const FC_READ_HOLDING: u8 = 0x03;
/// Function code: read input registers
pub const FC_READ_INPUT: u8 = 0x04;
/// Function code: write multiple registers
pub const FC_WRITE_MULTIPLE: u8 = 0x10;

/// Bit set in the response function code when the device returns an
/// exception frame.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Human-readable reason for a Modbus exception code.
pub fn exception_reason(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_limit_fits_the_pdu() {
        assert!(2 + usize::from(MAX_READ_WORDS) * 2 <= MAX_PDU_SIZE);
        assert!(2 + (usize::from(MAX_READ_WORDS) + 1) * 2 > MAX_PDU_SIZE);
    }

    #[test]
    fn write_limit_fits_the_pdu() {
        assert!(6 + usize::from(MAX_WRITE_WORDS) * 2 <= MAX_PDU_SIZE);
        assert!(6 + (usize::from(MAX_WRITE_WORDS) + 1) * 2 > MAX_PDU_SIZE);
    }

    #[test]
    fn exception_reasons() {
        assert_eq!(exception_reason(0x02), "Illegal Data Address");
        assert_eq!(exception_reason(0x0B), "Gateway Target Device Failed to Respond");
        assert_eq!(exception_reason(0x7F), "Unknown Exception");
    }
}
