//! In-memory transport simulator.
//!
//! Backs the unit and integration tests: holds sparse register banks per
//! unit id, records every request, and can inject transient failures or a
//! protocol exception ahead of the next request.

use std::collections::HashMap;

use async_trait::async_trait;

use super::constants::{exception_reason, MAX_READ_WORDS, MAX_WRITE_WORDS};
use super::transport::RegisterTransport;
use crate::catalog::RegisterKind;
use crate::error::{InvSrvError, Result};

/// One recorded transport request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read {
        unit: u8,
        kind: RegisterKind,
        address: u16,
        count: u16,
    },
    Write {
        unit: u8,
        address: u16,
        words: Vec<u16>,
    },
}

#[derive(Default)]
pub struct SimulatedTransport {
    banks: HashMap<(u8, RegisterKind), HashMap<u16, u16>>,
    fail_next: u32,
    exception_next: Option<u8>,
    pub requests: Vec<Request>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one register, 1-indexed logical address.
    pub fn set(&mut self, unit: u8, kind: RegisterKind, address: u16, value: u16) {
        self.banks.entry((unit, kind)).or_default().insert(address, value);
    }

    /// Seed consecutive registers starting at `address`.
    pub fn set_words(&mut self, unit: u8, kind: RegisterKind, address: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.set(unit, kind, address + i as u16, *word);
        }
    }

    /// Seed a text parameter, two ASCII characters per word.
    pub fn set_text(&mut self, unit: u8, kind: RegisterKind, address: u16, text: &str) {
        let bytes = text.as_bytes();
        for (i, pair) in bytes.chunks(2).enumerate() {
            let high = u16::from(pair[0]) << 8;
            let low = pair.get(1).copied().map(u16::from).unwrap_or(0);
            self.set(unit, kind, address + i as u16, high | low);
        }
    }

    pub fn get(&self, unit: u8, kind: RegisterKind, address: u16) -> u16 {
        self.banks
            .get(&(unit, kind))
            .and_then(|bank| bank.get(&address).copied())
            .unwrap_or(0)
    }

    /// The next `count` requests fail with a transient transport error.
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// The next request is answered with a protocol exception.
    pub fn raise_exception(&mut self, code: u8) {
        self.exception_next = Some(code);
    }

    fn check_injected(&mut self) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(InvSrvError::transport("simulated link failure"));
        }
        if let Some(code) = self.exception_next.take() {
            return Err(InvSrvError::ProtocolException {
                code,
                reason: exception_reason(code),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterTransport for SimulatedTransport {
    async fn read(
        &mut self,
        unit: u8,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.requests.push(Request::Read { unit, kind, address, count });
        if address == 0 || count == 0 || count > MAX_READ_WORDS {
            return Err(InvSrvError::data(format!(
                "invalid read: address {address}, count {count}"
            )));
        }
        self.check_injected()?;
        Ok((address..address + count)
            .map(|a| self.get(unit, kind, a))
            .collect())
    }

    async fn write(&mut self, unit: u8, address: u16, words: &[u16]) -> Result<()> {
        self.requests.push(Request::Write {
            unit,
            address,
            words: words.to_vec(),
        });
        if address == 0 || words.is_empty() || words.len() > usize::from(MAX_WRITE_WORDS) {
            return Err(InvSrvError::data(format!(
                "invalid write: address {address}, count {}",
                words.len()
            )));
        }
        self.check_injected()?;
        for (i, word) in words.iter().enumerate() {
            self.set(unit, RegisterKind::Holding, address + i as u16, *word);
        }
        Ok(())
    }
}
