//! Device state cache: one raw word buffer per register kind.
//!
//! Index `i` holds the word at logical address `extent.min + i`. The buffer
//! is refreshed batch by batch during a poll cycle and read by parameter
//! decode; synchronization lives at the device level, the bank itself is
//! plain data.

use super::plan::{plan_batches, Batch, RegisterExtent};
use crate::catalog::Parameter;
use crate::error::{InvSrvError, Result};

#[derive(Debug, Clone)]
pub struct RegisterBank {
    extent: RegisterExtent,
    batches: Vec<Batch>,
    words: Vec<u16>,
}

impl RegisterBank {
    pub fn new(extent: RegisterExtent) -> Self {
        Self {
            extent,
            batches: plan_batches(extent),
            words: vec![0; usize::from(extent.len())],
        }
    }

    pub fn extent(&self) -> RegisterExtent {
        self.extent
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Store one batch's worth of words at the batch's offset.
    pub fn store(&mut self, batch: Batch, words: &[u16]) -> Result<()> {
        if words.len() != usize::from(batch.count) {
            return Err(InvSrvError::data(format!(
                "batch at {} returned {} words, expected {}",
                batch.address,
                words.len(),
                batch.count
            )));
        }
        let offset = usize::from(batch.address - self.extent.min);
        self.words[offset..offset + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Overwrite a single word, used by the write path to keep the cached
    /// view current between polls.
    pub fn store_words(&mut self, address: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            let address = address + i as u16;
            if address >= self.extent.min && address < self.extent.max {
                self.words[usize::from(address - self.extent.min)] = *word;
            }
        }
    }

    /// Words backing one parameter.
    pub fn slice(&self, param: &Parameter) -> Result<&[u16]> {
        if param.address < self.extent.min || param.end_address() > self.extent.max {
            return Err(InvSrvError::data(format!(
                "parameter {} at [{}, {}) outside extent [{}, {})",
                param.name,
                param.address,
                param.end_address(),
                self.extent.min,
                self.extent.max
            )));
        }
        let offset = usize::from(param.address - self.extent.min);
        Ok(&self.words[offset..offset + usize::from(param.word_count)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, Parameter, RegisterKind};

    fn bank() -> RegisterBank {
        RegisterBank::new(RegisterExtent { min: 10, max: 20 })
    }

    #[test]
    fn store_and_slice_use_relative_offsets() {
        let mut bank = bank();
        bank.store(Batch { address: 10, count: 10 }, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
            .unwrap();
        let param = Parameter::new("X", RegisterKind::Input, 13, DataType::U32);
        assert_eq!(bank.slice(&param).unwrap(), &[3, 4]);
    }

    #[test]
    fn short_batch_payload_is_rejected() {
        let mut bank = bank();
        let err = bank.store(Batch { address: 10, count: 10 }, &[1, 2, 3]);
        assert!(matches!(err, Err(InvSrvError::Data(_))));
    }

    #[test]
    fn out_of_extent_parameter_is_rejected() {
        let bank = bank();
        let param = Parameter::new("X", RegisterKind::Input, 19, DataType::U32);
        assert!(bank.slice(&param).is_err());
    }

    #[test]
    fn single_word_updates_land_between_polls() {
        let mut bank = bank();
        bank.store_words(15, &[42]);
        let param = Parameter::new("X", RegisterKind::Holding, 15, DataType::U16);
        assert_eq!(bank.slice(&param).unwrap(), &[42]);
        // outside the extent is ignored
        bank.store_words(25, &[1]);
    }
}
