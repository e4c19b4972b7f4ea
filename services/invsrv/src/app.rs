//! Application wiring and the polling loop.
//!
//! The poll loop drives every device in turn: refresh its cache, publish
//! its state, pause briefly, then a longer pause between full cycles.
//! Inbound MQTT commands are drained by a separate task, so a write only
//! contends with refreshes of its own target device; one device burning
//! through its retry budget cannot delay commands for healthy devices,
//! and the command channel never backs up into the MQTT event loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Timelike};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::catalog::profile_for;
use crate::config::{Config, QuietHours};
use crate::device::Device;
use crate::error::{InvSrvError, Result};
use crate::modbus::tcp::ModbusTcpTransport;
use crate::modbus::transport::SharedTransport;
use crate::mqtt::{Command, MqttPublisher};

pub struct App {
    config: Config,
    devices: Vec<Arc<Mutex<Device>>>,
    publisher: MqttPublisher,
}

impl App {
    /// Build transports, devices and the MQTT connection from a validated
    /// configuration, and spawn the command dispatcher. No device I/O
    /// happens here.
    pub fn build(config: Config) -> Result<Self> {
        let mut buses: HashMap<String, SharedTransport> = HashMap::new();
        for bus in &config.buses {
            let transport = ModbusTcpTransport::new(
                bus.endpoint.clone(),
                Duration::from_millis(bus.timeout_ms),
            );
            buses.insert(bus.name.clone(), Arc::new(Mutex::new(transport)));
        }

        let retry = config.retry.policy();
        let mut devices = Vec::new();
        let mut by_name: HashMap<String, Arc<Mutex<Device>>> = HashMap::new();
        for entry in &config.devices {
            let transport = buses
                .get(entry.bus.as_str())
                .ok_or_else(|| {
                    InvSrvError::config(format!("unknown bus {:?}", entry.bus))
                })?
                .clone();
            let device = Arc::new(Mutex::new(Device::new(
                entry.name.clone(),
                entry.unit,
                profile_for(&entry.device_type)?,
                transport,
                retry.clone(),
                entry.serial.clone(),
            )));
            by_name.insert(entry.name.clone(), device.clone());
            devices.push(device);
        }

        let (publisher, commands) = MqttPublisher::connect(&config.mqtt);
        tokio::spawn(dispatch_commands(by_name, commands));

        Ok(Self {
            config,
            devices,
            publisher,
        })
    }

    /// Identify every device, announce the ready ones, then poll forever.
    pub async fn run(&mut self) -> Result<()> {
        for device in &self.devices {
            let mut device = device.lock().await;
            let name = device.name().to_string();
            match device.connect().await {
                Ok(()) => {
                    self.publisher.announce(&device).await?;
                    self.publisher.publish_availability(&name, true).await?;
                }
                Err(err) => {
                    error!(device = %name, error = %err, "device failed to identify, parking it");
                    self.publisher.publish_availability(&name, false).await?;
                }
            }
        }

        let device_pause = Duration::from_millis(self.config.poll.device_pause_ms);
        let cycle_pause = Duration::from_secs(self.config.poll.cycle_pause_secs);

        loop {
            if let Some(window) = &self.config.poll.quiet_hours {
                if let Some(pause) = quiet_hours_remaining(Local::now().time(), window) {
                    info!(seconds = pause.as_secs(), "quiet hours, polling suspended");
                    tokio::time::sleep(pause).await;
                }
            }

            for device in &self.devices {
                self.poll_device(device).await;
                tokio::time::sleep(device_pause).await;
            }
            tokio::time::sleep(cycle_pause).await;
        }
    }

    async fn poll_device(&self, device: &Arc<Mutex<Device>>) {
        let mut device = device.lock().await;
        if !device.is_ready() {
            return;
        }
        let name = device.name().to_string();
        match device.refresh().await {
            Ok(()) => {
                if let Err(err) = self.publisher.publish_state(&device).await {
                    warn!(device = %name, error = %err, "state publish failed");
                }
                let _ = self.publisher.publish_availability(&name, true).await;
            }
            Err(err @ InvSrvError::DeviceUnavailable { .. }) => {
                // marked offline; polling resumes next cycle if the bus heals
                warn!(device = %name, error = %err, "refresh exhausted retries");
                let _ = self.publisher.publish_availability(&name, false).await;
            }
            Err(err) => {
                warn!(device = %name, error = %err, "refresh failed");
            }
        }
    }
}

/// Command pump, spawned beside the poll loop. Lookup goes through the
/// name map so dispatch never touches another device's lock.
async fn dispatch_commands(
    devices: HashMap<String, Arc<Mutex<Device>>>,
    mut commands: mpsc::Receiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        dispatch(&devices, command).await;
    }
}

async fn dispatch(devices: &HashMap<String, Arc<Mutex<Device>>>, command: Command) {
    let Some(device) = devices.get(&command.device) else {
        warn!(device = %command.device, "command for unknown device");
        return;
    };
    let mut device = device.lock().await;
    let Some(name) = device
        .parameters()
        .iter_writable()
        .map(|w| w.parameter.name)
        .find(|name| common::slugify(name) == command.slug)
    else {
        warn!(device = %command.device, slug = %command.slug, "command for unknown parameter");
        return;
    };
    if let Err(err) = device.write_value(name, &command.payload).await {
        warn!(
            device = %command.device,
            parameter = name,
            payload = %command.payload,
            error = %err,
            "command rejected"
        );
    }
}

/// Time left inside the quiet window, `None` when outside it. The window
/// may wrap midnight (e.g. 23:57 to 00:05).
pub fn quiet_hours_remaining(now: NaiveTime, window: &QuietHours) -> Option<Duration> {
    let start = NaiveTime::parse_from_str(&window.start, "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(&window.end, "%H:%M").ok()?;

    let inside = if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    };
    if !inside {
        return None;
    }

    let now_secs = i64::from(now.num_seconds_from_midnight());
    let end_secs = i64::from(end.num_seconds_from_midnight());
    let remaining = (end_secs - now_secs).rem_euclid(24 * 3600);
    Some(Duration::from_secs(remaining as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegisterKind;
    use crate::modbus::sim::SimulatedTransport;
    use crate::modbus::transport::RetryPolicy;

    fn window(start: &str, end: &str) -> QuietHours {
        QuietHours {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn outside_the_window_returns_none() {
        let w = window("23:57", "00:05");
        assert_eq!(quiet_hours_remaining(at(12, 0), &w), None);
        assert_eq!(quiet_hours_remaining(at(0, 5), &w), None);
    }

    #[test]
    fn wrapping_window_covers_both_sides_of_midnight() {
        let w = window("23:57", "00:05");
        assert_eq!(
            quiet_hours_remaining(at(23, 58), &w),
            Some(Duration::from_secs(7 * 60))
        );
        assert_eq!(
            quiet_hours_remaining(at(0, 2), &w),
            Some(Duration::from_secs(3 * 60))
        );
    }

    #[test]
    fn non_wrapping_window() {
        let w = window("01:00", "02:00");
        assert_eq!(
            quiet_hours_remaining(at(1, 30), &w),
            Some(Duration::from_secs(30 * 60))
        );
        assert_eq!(quiet_hours_remaining(at(2, 0), &w), None);
    }

    fn ready_atess(name: &str) -> (Arc<Mutex<Device>>, Arc<Mutex<SimulatedTransport>>) {
        let mut sim = SimulatedTransport::new();
        sim.set(1, RegisterKind::Holding, 1, 1);
        sim.set(1, RegisterKind::Holding, 44, 21025);
        let sim = Arc::new(Mutex::new(sim));
        let device = Device::new(
            name,
            1,
            profile_for("atess").unwrap(),
            sim.clone(),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter: false,
                ..RetryPolicy::default()
            },
            None,
        );
        (Arc::new(Mutex::new(device)), sim)
    }

    #[tokio::test]
    async fn commands_reach_their_device_while_another_is_busy() {
        let (stuck, _) = ready_atess("stuck");
        let (healthy, healthy_sim) = ready_atess("pcs1");
        healthy.lock().await.connect().await.unwrap();

        let mut devices = HashMap::new();
        devices.insert("stuck".to_string(), stuck.clone());
        devices.insert("pcs1".to_string(), healthy.clone());

        // hold the other device's lock the way a stalled refresh would
        let _stuck_guard = stuck.lock().await;

        dispatch(
            &devices,
            Command {
                device: "pcs1".to_string(),
                slug: "soc_up_limit".to_string(),
                payload: "85".to_string(),
            },
        )
        .await;

        assert_eq!(healthy_sim.lock().await.get(1, RegisterKind::Holding, 67), 85);
    }

    #[tokio::test]
    async fn commands_for_unknown_targets_are_dropped() {
        let (device, sim) = ready_atess("pcs1");
        device.lock().await.connect().await.unwrap();
        let mut devices = HashMap::new();
        devices.insert("pcs1".to_string(), device);
        let before = sim.lock().await.requests.len();

        dispatch(
            &devices,
            Command {
                device: "ghost".to_string(),
                slug: "soc_up_limit".to_string(),
                payload: "85".to_string(),
            },
        )
        .await;
        dispatch(
            &devices,
            Command {
                device: "pcs1".to_string(),
                slug: "no_such_parameter".to_string(),
                payload: "85".to_string(),
            },
        )
        .await;

        assert_eq!(sim.lock().await.requests.len(), before);
    }
}
