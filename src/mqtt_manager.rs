use crate::config::Config;
use crate::protocol::Frame;
use anyhow::Result;
use log::{debug, error, info, trace};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60000;
const KEEP_ALIVE_SECS: u64 = 30;
/// Control messages held while the broker is unreachable. When the queue
/// is full, new messages are rejected rather than evicting older ones.
const OFFLINE_QUEUE_LIMIT: usize = 100;

/// Commands that can be sent to the MQTT manager
#[derive(Debug, Clone)]
pub enum MqttCommand {
    /// Publish a control frame to the ctrl topic
    Publish(Frame),
}

/// Session notifications from the MQTT manager to consumers
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// The broker accepted the connection
    Connected { reconnect: bool },
    /// The connection dropped or could not be established
    ConnectionLost { error: String },
    /// The status topic subscription was acknowledged
    Subscribed { topic: String },
    SubscribeFailed { error: String },
    /// A publish arrived on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// A control frame was queued while offline
    Buffered { queued: usize },
    /// The offline queue is full and the frame was dropped
    QueueFull,
    /// Queued control frames went out after a reconnect
    Flushed { count: usize },
    PublishFailed { error: String },
}

/// Owns the MQTT client session and handles both directions of traffic.
/// Reconnection is automatic with exponential backoff; the subscription
/// is re-established after every reconnect.
pub struct MqttManager {
    client: AsyncClient,
    eventloop: EventLoop,
    ctrl_topic: String,
    status_topic: String,
    command_rx: mpsc::Receiver<MqttCommand>,
    event_tx: mpsc::Sender<MqttEvent>,
    pending: VecDeque<Frame>,
    connected: bool,
    ever_connected: bool,
}

impl MqttManager {
    pub fn new(
        config: &Config,
        command_rx: mpsc::Receiver<MqttCommand>,
        event_tx: mpsc::Sender<MqttEvent>,
    ) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options
            .set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS))
            .set_clean_session(true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 100);

        Self {
            client,
            eventloop,
            ctrl_topic: config.ctrl_topic.clone(),
            status_topic: config.status_topic.clone(),
            command_rx,
            event_tx,
            pending: VecDeque::new(),
            connected: false,
            ever_connected: false,
        }
    }

    pub async fn run(mut self) {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff_ms = INITIAL_BACKOFF_MS;
                        let reconnect = self.ever_connected;
                        self.ever_connected = true;
                        self.connected = true;
                        info!("Connected to broker (reconnect: {})", reconnect);

                        let _ = self.event_tx.send(MqttEvent::Connected { reconnect }).await;
                        self.subscribe().await;
                        self.flush_pending().await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        let _ = self
                            .event_tx
                            .send(MqttEvent::Subscribed {
                                topic: self.status_topic.clone(),
                            })
                            .await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        trace!("Incoming publish on {}", publish.topic);
                        let _ = self
                            .event_tx
                            .send(MqttEvent::Message {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                            })
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.connected = false;
                        error!("MQTT connection error: {}. Retrying in {}ms...", e, backoff_ms);
                        let _ = self
                            .event_tx
                            .send(MqttEvent::ConnectionLost {
                                error: e.to_string(),
                            })
                            .await;
                        sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                    }
                },

                Some(cmd) = self.command_rx.recv() => match cmd {
                    MqttCommand::Publish(frame) => self.publish(frame).await,
                },
            }
        }
    }

    async fn subscribe(&mut self) {
        if let Err(e) = self
            .client
            .subscribe(self.status_topic.clone(), QoS::AtMostOnce)
            .await
        {
            let _ = self
                .event_tx
                .send(MqttEvent::SubscribeFailed {
                    error: e.to_string(),
                })
                .await;
        }
    }

    async fn publish(&mut self, frame: Frame) {
        if !self.connected {
            if self.pending.len() >= OFFLINE_QUEUE_LIMIT {
                let _ = self.event_tx.send(MqttEvent::QueueFull).await;
            } else {
                self.pending.push_back(frame);
                let _ = self
                    .event_tx
                    .send(MqttEvent::Buffered {
                        queued: self.pending.len(),
                    })
                    .await;
            }
            return;
        }

        if let Err(e) = self
            .client
            .publish(self.ctrl_topic.clone(), QoS::AtMostOnce, false, frame.encode())
            .await
        {
            let _ = self
                .event_tx
                .send(MqttEvent::PublishFailed {
                    error: e.to_string(),
                })
                .await;
        }
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let mut count = 0usize;
        while let Some(frame) = self.pending.pop_front() {
            debug!("Flushing buffered control frame 0x{:02X}", frame.tag());
            if let Err(e) = self
                .client
                .publish(self.ctrl_topic.clone(), QoS::AtMostOnce, false, frame.encode())
                .await
            {
                error!("Failed to flush buffered message: {}", e);
                self.pending.push_front(frame);
                break;
            }
            count += 1;
        }

        if count > 0 {
            let _ = self.event_tx.send(MqttEvent::Flushed { count }).await;
        }
    }
}

/// Handle for publishing control frames through the MQTT manager
#[derive(Clone)]
pub struct MqttHandle {
    command_tx: mpsc::Sender<MqttCommand>,
}

impl MqttHandle {
    pub fn new(command_tx: mpsc::Sender<MqttCommand>) -> Self {
        Self { command_tx }
    }

    /// Queue a control frame for the ctrl topic
    pub async fn publish(&self, frame: Frame) -> Result<()> {
        self.command_tx
            .send(MqttCommand::Publish(frame))
            .await
            .map_err(|e| anyhow::anyhow!("MQTT manager unavailable: {}", e))
    }
}
