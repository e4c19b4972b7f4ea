//! MQTT publishing boundary: Home Assistant discovery, state publishing and
//! the inbound command stream.

pub mod discovery;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::MqttConfig;
use crate::device::Device;
use crate::error::Result;
use discovery::DeviceTopics;

/// One inbound write command, parsed off a `{base}/{device}/{slug}/set`
/// topic. The slug maps back to a parameter name in the device's set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub device: String,
    pub slug: String,
    pub payload: String,
}

pub struct MqttPublisher {
    client: AsyncClient,
    base: String,
    discovery_prefix: String,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the event loop. Returns the
    /// publisher and the stream of inbound commands.
    pub fn connect(cfg: &MqttConfig) -> (Self, mpsc::Receiver<Command>) {
        let client_id = format!("{}-{}", cfg.base_topic, std::process::id());
        let mut options = MqttOptions::new(client_id, &cfg.host, cfg.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let (tx, rx) = mpsc::channel(32);
        let base = cfg.base_topic.clone();

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some((device, slug)) =
                            DeviceTopics::parse_command(&base, &publish.topic)
                        else {
                            debug!(topic = %publish.topic, "ignoring non-command publish");
                            continue;
                        };
                        let payload = String::from_utf8_lossy(&publish.payload).to_string();
                        if tx.send(Command { device, slug, payload }).await.is_err() {
                            // command consumer is gone, stop the loop
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "mqtt event loop error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        let publisher = Self {
            client,
            base: cfg.base_topic.clone(),
            discovery_prefix: cfg.discovery_prefix.clone(),
        };
        (publisher, rx)
    }

    pub fn topics(&self, device: &str) -> DeviceTopics {
        DeviceTopics::new(&self.base, device)
    }

    /// Publish retained discovery documents for every parameter of an
    /// identified device and subscribe to its command topics.
    pub async fn announce(&self, device: &Device) -> Result<()> {
        let topics = self.topics(device.name());

        for param in device.parameters().iter() {
            // writables get their own component below
            if device.parameters().get_writable(param.name).is_some() {
                continue;
            }
            let doc = discovery::sensor_document(device, &topics, param);
            let topic = topics.discovery(&self.discovery_prefix, discovery::SENSOR, param.name);
            self.client
                .publish(topic, QoS::AtLeastOnce, true, doc.to_string())
                .await?;
        }

        for writable in device.parameters().iter_writable() {
            let doc = discovery::entity_document(device, &topics, writable);
            let component = discovery::component_of(writable.hint);
            let topic =
                topics.discovery(&self.discovery_prefix, component, writable.parameter.name);
            self.client
                .publish(topic, QoS::AtLeastOnce, true, doc.to_string())
                .await?;
        }

        if device.parameters().iter_writable().next().is_some() {
            self.client
                .subscribe(topics.command_filter(), QoS::AtLeastOnce)
                .await?;
        }
        Ok(())
    }

    pub async fn publish_availability(&self, device: &str, online: bool) -> Result<()> {
        let topics = self.topics(device);
        let payload = if online { "online" } else { "offline" };
        self.client
            .publish(topics.availability(), QoS::AtLeastOnce, true, payload)
            .await?;
        Ok(())
    }

    /// Publish every decodable parameter of a freshly refreshed device.
    /// Per-parameter decode failures are logged and skipped; they never
    /// abort the rest of the publish.
    pub async fn publish_state(&self, device: &Device) -> Result<()> {
        let topics = self.topics(device.name());
        for param in device.parameters().iter() {
            match device.read_value(param.name) {
                Ok(value) => {
                    self.client
                        .publish(
                            topics.state(param.name),
                            QoS::AtLeastOnce,
                            false,
                            value.to_string(),
                        )
                        .await?;
                }
                Err(err) => {
                    debug!(device = %device.name(), parameter = param.name, error = %err,
                        "skipping unpublishable parameter");
                }
            }
        }
        Ok(())
    }
}
