//! Device lifecycle: identification, parameter-set resolution, state cache
//! refresh and the read/write surface used by the poll loop and the command
//! path.
//!
//! A device is constructed knowing only its name and bus address. `connect`
//! probes availability, reads the identification register, fixes the model
//! and builds the poll plan; after that the device is `Ready` and never
//! re-identifies. A device whose model changes needs a new instance.

pub mod bank;
pub mod plan;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{DeviceProfile, EntityHint, ParameterSet, RegisterKind};
use crate::error::{InvSrvError, Result};
use crate::modbus::codec::{self, Value};
use crate::modbus::transport::{read_with_retry, write_with_retry, RetryPolicy, SharedTransport};
use bank::RegisterBank;
use plan::extent_of;

/// Lifecycle states. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unidentified,
    Identifying,
    Configured,
    Ready,
    Failed,
}

pub struct Device {
    name: String,
    unit: u8,
    profile: Arc<dyn DeviceProfile>,
    transport: SharedTransport,
    retry: RetryPolicy,
    expected_serial: Option<String>,

    state: DeviceState,
    model: Option<&'static str>,
    serial: Option<String>,
    params: ParameterSet,
    banks: BTreeMap<RegisterKind, RegisterBank>,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        unit: u8,
        profile: Arc<dyn DeviceProfile>,
        transport: SharedTransport,
        retry: RetryPolicy,
        expected_serial: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            unit,
            profile,
            transport,
            retry,
            expected_serial,
            state: DeviceState::Unidentified,
            model: None,
            serial: None,
            params: ParameterSet::default(),
            banks: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> u8 {
        self.unit
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn model(&self) -> Option<&'static str> {
        self.model
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn manufacturer(&self) -> &'static str {
        self.profile.manufacturer()
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    fn fail<T>(&mut self, err: InvSrvError) -> Result<T> {
        self.state = DeviceState::Failed;
        Err(err)
    }

    /// Probe, identify and configure. Runs exactly once; any failure parks
    /// the device in `Failed`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != DeviceState::Unidentified {
            return Err(InvSrvError::state(format!(
                "connect() called in state {:?}",
                self.state
            )));
        }
        self.state = DeviceState::Identifying;

        // availability probe
        let probe = self.profile.availability_parameter();
        if let Err(err) = read_with_retry(
            &self.transport,
            &self.retry,
            &self.name,
            self.unit,
            probe.kind,
            probe.address,
            probe.word_count,
        )
        .await
        {
            warn!(device = %self.name, error = %err, "availability probe failed");
            return self.fail(err);
        }

        // identification
        let ident = self.profile.identification_parameter();
        let words = match read_with_retry(
            &self.transport,
            &self.retry,
            &self.name,
            self.unit,
            ident.kind,
            ident.address,
            ident.word_count,
        )
        .await
        {
            Ok(words) => words,
            Err(err) => return self.fail(err),
        };
        let code = match codec::decode(&words, ident.data_type) {
            Ok(Value::Integer(code)) => code as u16,
            Ok(other) => {
                return self.fail(InvSrvError::data(format!(
                    "identification register decoded to {other:?}"
                )))
            }
            Err(err) => return self.fail(err),
        };
        let Some(model) = self.profile.model_name(code) else {
            return self.fail(InvSrvError::UnknownModelCode { code });
        };
        let params = match self.profile.resolve(model) {
            Ok(params) => params,
            Err(err) => return self.fail(err),
        };

        // model is fixed from here on
        self.model = Some(model);
        self.params = params;
        self.state = DeviceState::Configured;

        // extents, batch plans and cache buffers
        for kind in RegisterKind::ALL {
            if let Some(extent) = extent_of(self.params.of_kind(kind)) {
                self.banks.insert(kind, RegisterBank::new(extent));
            }
        }
        self.state = DeviceState::Ready;
        info!(
            device = %self.name,
            manufacturer = self.profile.manufacturer(),
            model,
            code,
            "device identified"
        );

        if let Err(err) = self.read_serial().await {
            return self.fail(err);
        }
        Ok(())
    }

    /// Serial read after identification. Transport trouble is logged and
    /// tolerated, but a serial that contradicts the configured one is a
    /// fatal configuration error: the bus address points at different
    /// hardware than the operator thinks.
    async fn read_serial(&mut self) -> Result<()> {
        let Some(name) = self.profile.serial_parameter() else {
            return Ok(());
        };
        let Some(param) = self.params.get(name).copied() else {
            return Ok(());
        };
        let result = read_with_retry(
            &self.transport,
            &self.retry,
            &self.name,
            self.unit,
            param.kind,
            param.address,
            param.word_count,
        )
        .await;
        match result.and_then(|words| codec::decode(&words, param.data_type)) {
            Ok(Value::Text(serial)) if !serial.is_empty() => {
                if let Some(expected) = &self.expected_serial {
                    if expected != &serial {
                        return Err(InvSrvError::config(format!(
                            "device {} reports serial {serial:?}, configured {expected:?}",
                            self.name
                        )));
                    }
                }
                self.serial = Some(serial);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(device = %self.name, error = %err, "serial read failed");
                Ok(())
            }
        }
    }

    /// One poll cycle: execute every planned batch and refresh the cache
    /// buffers in address order.
    pub async fn refresh(&mut self) -> Result<()> {
        if self.state != DeviceState::Ready {
            return Err(InvSrvError::state(format!(
                "refresh() called in state {:?}",
                self.state
            )));
        }
        for (kind, bank) in &mut self.banks {
            for batch in bank.batches().to_vec() {
                let words = read_with_retry(
                    &self.transport,
                    &self.retry,
                    &self.name,
                    self.unit,
                    *kind,
                    batch.address,
                    batch.count,
                )
                .await?;
                bank.store(batch, &words)?;
            }
        }
        Ok(())
    }

    /// Decode one parameter from the cached state. Pure lookup, no I/O.
    pub fn read_value(&self, name: &str) -> Result<Value> {
        let param = self.params.get(name).ok_or_else(|| InvSrvError::UnknownParameter {
            device: self.name.clone(),
            name: name.to_string(),
        })?;
        let bank = self
            .banks
            .get(&param.kind)
            .ok_or_else(|| InvSrvError::data(format!("no cache for {} registers", param.kind)))?;
        let raw = codec::decode(bank.slice(param)?, param.data_type)?;
        Ok(raw.scaled(param.scale))
    }

    /// Apply a command payload to a writable parameter: parse per the
    /// entity hint, de-scale, encode and write through, then patch the
    /// cached words so reads reflect the new value before the next poll.
    pub async fn write_value(&mut self, name: &str, payload: &str) -> Result<()> {
        if self.state != DeviceState::Ready {
            return Err(InvSrvError::state(format!(
                "write in state {:?}",
                self.state
            )));
        }
        let writable = *self
            .params
            .get_writable(name)
            .ok_or_else(|| InvSrvError::UnknownParameter {
                device: self.name.clone(),
                name: name.to_string(),
            })?;
        let param = writable.parameter;

        let raw = match writable.hint {
            EntityHint::Number { min, max } => {
                let value: f64 = payload
                    .trim()
                    .parse()
                    .map_err(|_| InvSrvError::data(format!("not a number: {payload:?}")))?;
                if value < min || value > max {
                    return Err(InvSrvError::data(format!(
                        "{value} outside [{min}, {max}] for {name}"
                    )));
                }
                value / param.scale
            }
            EntityHint::Switch { payload_off, payload_on } => match payload.trim() {
                "ON" => f64::from(payload_on),
                "OFF" => f64::from(payload_off),
                other => {
                    return Err(InvSrvError::data(format!("not a switch payload: {other:?}")))
                }
            },
            EntityHint::Select { options } => {
                let index = options
                    .iter()
                    .position(|option| *option == payload.trim())
                    .ok_or_else(|| {
                        InvSrvError::data(format!("{payload:?} not an option of {name}"))
                    })?;
                index as f64
            }
        };

        let words = codec::encode(raw, param.data_type)?;
        write_with_retry(
            &self.transport,
            &self.retry,
            &self.name,
            self.unit,
            param.address,
            &words,
        )
        .await?;

        if let Some(bank) = self.banks.get_mut(&param.kind) {
            bank.store_words(param.address, &words);
        }
        info!(device = %self.name, parameter = name, payload, "parameter written");
        Ok(())
    }
}
