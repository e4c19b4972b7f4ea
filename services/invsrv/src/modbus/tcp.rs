//! Modbus TCP client.
//!
//! One connection per configured bus. The connection is opened lazily and
//! dropped on any I/O error; the retry layer above drives reconnection by
//! simply calling again. Frame building and parsing are pure functions so
//! they can be tested without a socket.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::constants::{
    EXCEPTION_FLAG, FC_WRITE_MULTIPLE, MAX_PDU_SIZE, MAX_READ_WORDS, MAX_WRITE_WORDS,
    MBAP_HEADER_LEN, MBAP_PROTOCOL_ID,
};
use super::transport::RegisterTransport;
use crate::catalog::RegisterKind;
use crate::error::{InvSrvError, Result};

pub struct ModbusTcpTransport {
    endpoint: String,
    timeout: Duration,
    stream: Option<TcpStream>,
    transaction_id: u16,
}

impl ModbusTcpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            stream: None,
            transaction_id: 0,
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let connect = TcpStream::connect(&self.endpoint);
            let stream = tokio::time::timeout(self.timeout, connect)
                .await
                .map_err(|_| {
                    InvSrvError::transport(format!("connect to {} timed out", self.endpoint))
                })??;
            stream.set_nodelay(true)?;
            info!(endpoint = %self.endpoint, "modbus tcp connected");
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| InvSrvError::transport("not connected"))
    }

    /// Send one PDU and return the response PDU. Any I/O failure tears the
    /// connection down so the next attempt reconnects.
    async fn roundtrip(&mut self, unit: u8, pdu: &[u8]) -> Result<Vec<u8>> {
        let txn = self.transaction_id.wrapping_add(1);
        self.transaction_id = txn;
        let frame = frame_request(txn, unit, pdu);
        let timeout = self.timeout;

        let result = async {
            let stream = self.ensure_connected().await?;
            tokio::time::timeout(timeout, stream.write_all(&frame))
                .await
                .map_err(|_| InvSrvError::transport("write timed out"))??;

            let mut header = [0u8; MBAP_HEADER_LEN + 1];
            tokio::time::timeout(timeout, stream.read_exact(&mut header))
                .await
                .map_err(|_| InvSrvError::transport("response timed out"))??;

            let rx_txn = u16::from_be_bytes([header[0], header[1]]);
            let protocol = u16::from_be_bytes([header[2], header[3]]);
            let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
            if protocol != MBAP_PROTOCOL_ID {
                return Err(InvSrvError::transport(format!(
                    "unexpected protocol id {protocol}"
                )));
            }
            if rx_txn != txn {
                return Err(InvSrvError::transport(format!(
                    "transaction id mismatch: sent {txn}, got {rx_txn}"
                )));
            }
            if length < 2 || length > MAX_PDU_SIZE + 1 {
                return Err(InvSrvError::transport(format!(
                    "bad MBAP length {length}"
                )));
            }

            // length counts the unit id byte already consumed with the header
            let mut pdu = vec![0u8; length - 1];
            tokio::time::timeout(timeout, stream.read_exact(&mut pdu))
                .await
                .map_err(|_| InvSrvError::transport("response body timed out"))??;
            Ok(pdu)
        }
        .await;

        if result.is_err() {
            debug!(endpoint = %self.endpoint, "dropping modbus tcp connection");
            self.stream = None;
        }
        result
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read(
        &mut self,
        unit: u8,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let function = kind.read_function();
        let request = read_pdu(function, address, count)?;
        let response = self.roundtrip(unit, &request).await?;
        parse_read_response(&response, function, count)
    }

    async fn write(&mut self, unit: u8, address: u16, words: &[u16]) -> Result<()> {
        let request = write_pdu(address, words)?;
        let response = self.roundtrip(unit, &request).await?;
        parse_write_response(&response, address, words.len() as u16)
    }
}

/// Prefix a PDU with the MBAP header.
fn frame_request(transaction_id: u16, unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&MBAP_PROTOCOL_ID.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() as u16 + 1).to_be_bytes()));
    frame.push(unit);
    frame.extend_from_slice(pdu);
    frame
}

/// FC03/FC04 request. Converts the 1-indexed logical address to the
/// 0-indexed wire address.
fn read_pdu(function: u8, address: u16, count: u16) -> Result<Vec<u8>> {
    if address == 0 {
        return Err(InvSrvError::data("logical addresses start at 1"));
    }
    if count == 0 || count > MAX_READ_WORDS {
        return Err(InvSrvError::data(format!("invalid read count {count}")));
    }
    let wire = address - 1;
    let mut pdu = Vec::with_capacity(5);
    pdu.push(function);
    pdu.extend_from_slice(&wire.to_be_bytes());
    pdu.extend_from_slice(&count.to_be_bytes());
    Ok(pdu)
}

/// FC16 request, same address convention as `read_pdu`.
fn write_pdu(address: u16, words: &[u16]) -> Result<Vec<u8>> {
    if address == 0 {
        return Err(InvSrvError::data("logical addresses start at 1"));
    }
    if words.is_empty() || words.len() > usize::from(MAX_WRITE_WORDS) {
        return Err(InvSrvError::data(format!(
            "invalid write count {}",
            words.len()
        )));
    }
    let wire = address - 1;
    let mut pdu = Vec::with_capacity(6 + words.len() * 2);
    pdu.push(FC_WRITE_MULTIPLE);
    pdu.extend_from_slice(&wire.to_be_bytes());
    pdu.extend_from_slice(&(words.len() as u16).to_be_bytes());
    pdu.push((words.len() * 2) as u8);
    for word in words {
        pdu.extend_from_slice(&word.to_be_bytes());
    }
    Ok(pdu)
}

fn check_exception(pdu: &[u8], function: u8) -> Result<()> {
    if pdu.len() >= 2 && pdu[0] == function | EXCEPTION_FLAG {
        let code = pdu[1];
        return Err(InvSrvError::ProtocolException {
            code,
            reason: super::constants::exception_reason(code),
        });
    }
    Ok(())
}

fn parse_read_response(pdu: &[u8], function: u8, count: u16) -> Result<Vec<u16>> {
    check_exception(pdu, function)?;
    let expected_bytes = usize::from(count) * 2;
    if pdu.len() < 2 + expected_bytes || pdu[0] != function {
        return Err(InvSrvError::transport(format!(
            "malformed read response ({} bytes, fc {:#04x})",
            pdu.len(),
            pdu.first().copied().unwrap_or(0)
        )));
    }
    if usize::from(pdu[1]) != expected_bytes {
        return Err(InvSrvError::transport(format!(
            "byte count mismatch: {} vs {expected_bytes}",
            pdu[1]
        )));
    }
    let words = pdu[2..2 + expected_bytes]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(words)
}

fn parse_write_response(pdu: &[u8], address: u16, count: u16) -> Result<()> {
    check_exception(pdu, FC_WRITE_MULTIPLE)?;
    if pdu.len() < 5 || pdu[0] != FC_WRITE_MULTIPLE {
        return Err(InvSrvError::transport("malformed write response"));
    }
    let echo_address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let echo_count = u16::from_be_bytes([pdu[3], pdu[4]]);
    if echo_address != address - 1 || echo_count != count {
        return Err(InvSrvError::transport(format!(
            "write echo mismatch: address {echo_address}, count {echo_count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mbap_header_shape() {
        let frame = frame_request(0x0102, 9, &[0x03, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(&frame[..7], &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x09]);
        assert_eq!(frame.len(), 12);
    }

    #[test]
    fn read_pdu_uses_wire_addressing() {
        // logical address 44 goes on the wire as 43
        let pdu = read_pdu(0x03, 44, 1).unwrap();
        assert_eq!(pdu, vec![0x03, 0x00, 0x2B, 0x00, 0x01]);
    }

    #[test]
    fn read_pdu_rejects_oversized_requests() {
        assert!(read_pdu(0x04, 1, 126).is_err());
        assert!(read_pdu(0x04, 0, 1).is_err());
    }

    #[test]
    fn write_pdu_shape() {
        let pdu = write_pdu(27, &[0x0005]).unwrap();
        assert_eq!(pdu, vec![0x10, 0x00, 0x1A, 0x00, 0x01, 0x02, 0x00, 0x05]);
    }

    #[test]
    fn read_response_parses_words() {
        let pdu = [0x03, 0x04, 0x52, 0x21, 0x00, 0x07];
        let words = parse_read_response(&pdu, 0x03, 2).unwrap();
        assert_eq!(words, vec![0x5221, 0x0007]);
    }

    #[test]
    fn exception_frames_carry_code_and_reason() {
        let pdu = [0x83, 0x02];
        let err = parse_read_response(&pdu, 0x03, 1).unwrap_err();
        match err {
            InvSrvError::ProtocolException { code, reason } => {
                assert_eq!(code, 2);
                assert_eq!(reason, "Illegal Data Address");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn short_responses_are_transport_errors() {
        let err = parse_read_response(&[0x03, 0x02, 0x00], 0x03, 1).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn write_echo_is_verified() {
        let ok = [0x10, 0x00, 0x1A, 0x00, 0x01];
        assert!(parse_write_response(&ok, 27, 1).is_ok());
        let bad = [0x10, 0x00, 0x1B, 0x00, 0x01];
        assert!(parse_write_response(&bad, 27, 1).is_err());
    }
}
