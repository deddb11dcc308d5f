use crate::config::Config;
use crate::mqtt_manager::MqttEvent;
use crate::protocol::Frame;
use crate::types::{DeviceState, Scrollback};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Consumes MQTT session events, folds status frames into the device
/// snapshot and writes the scrollback. This task is the only writer of
/// both shared structures.
pub async fn run(
    config: Config,
    mut events: mpsc::Receiver<MqttEvent>,
    device: Arc<RwLock<DeviceState>>,
    scrollback: Arc<Mutex<Scrollback>>,
) {
    let broker = format!("mqtt://{}:{}", config.broker_host, config.broker_port);

    while let Some(event) = events.recv().await {
        match event {
            MqttEvent::Connected { reconnect } => {
                let mut sb = scrollback.lock().await;
                if reconnect {
                    sb.info(format!("Reconnected to {}", broker));
                } else {
                    sb.info(format!("Connected to {}", broker));
                }
            }

            MqttEvent::ConnectionLost { error } => {
                scrollback
                    .lock()
                    .await
                    .error(format!("Connection lost: {}", error));
            }

            MqttEvent::Subscribed { topic } => {
                scrollback
                    .lock()
                    .await
                    .info(format!("Subscribed to {}", topic));
            }

            MqttEvent::SubscribeFailed { error } => {
                scrollback
                    .lock()
                    .await
                    .error(format!("Failed to subscribe: {}", error));
            }

            MqttEvent::Message { topic, payload } => {
                handle_message(&topic, &payload, &device, &scrollback).await;
            }

            MqttEvent::Buffered { queued } => {
                scrollback
                    .lock()
                    .await
                    .warning(format!("{} messages in buffer", queued));
            }

            MqttEvent::QueueFull => {
                scrollback
                    .lock()
                    .await
                    .error("Offline buffer full, message dropped");
            }

            MqttEvent::Flushed { count } => {
                scrollback
                    .lock()
                    .await
                    .info(format!("Delivered {} buffered messages", count));
            }

            MqttEvent::PublishFailed { error } => {
                scrollback
                    .lock()
                    .await
                    .error(format!("Failed to publish: {}", error));
            }
        }
    }
}

async fn handle_message(
    topic: &str,
    payload: &[u8],
    device: &Arc<RwLock<DeviceState>>,
    scrollback: &Arc<Mutex<Scrollback>>,
) {
    match Frame::decode(payload) {
        Ok(frame) => {
            let (tone, line) = device.write().await.apply(&frame);
            scrollback.lock().await.push(tone, line);
        }
        Err(e) => {
            scrollback
                .lock()
                .await
                .error(format!("Malformed message on {}: {}", topic, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tone;

    async fn drive(events: Vec<MqttEvent>) -> (Arc<RwLock<DeviceState>>, Arc<Mutex<Scrollback>>) {
        let device = Arc::new(RwLock::new(DeviceState::default()));
        let scrollback = Arc::new(Mutex::new(Scrollback::new()));

        let (tx, rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        run(
            Config::default(),
            rx,
            Arc::clone(&device),
            Arc::clone(&scrollback),
        )
        .await;

        (device, scrollback)
    }

    #[tokio::test]
    async fn test_connect_then_reconnect_lines() {
        let (_, scrollback) = drive(vec![
            MqttEvent::Connected { reconnect: false },
            MqttEvent::ConnectionLost {
                error: "broken pipe".to_string(),
            },
            MqttEvent::Connected { reconnect: true },
        ])
        .await;

        let sb = scrollback.lock().await;
        assert_eq!(sb.len(), 3);
        assert!(sb.entries()[0].message.starts_with("Connected to mqtt://"));
        assert_eq!(sb.entries()[1].tone, Tone::Error);
        assert!(sb.entries()[2].message.starts_with("Reconnected to"));
    }

    #[tokio::test]
    async fn test_status_message_updates_device_state() {
        let (device, scrollback) = drive(vec![MqttEvent::Message {
            topic: "/imulogger/status".to_string(),
            payload: vec![0x04, 0x90, 0x01, 0x00, 0x00], // sample rate 400 Hz
        }])
        .await;

        assert_eq!(device.read().await.sample_rate, Some(400));
        let sb = scrollback.lock().await;
        assert_eq!(sb.entries()[0].message, "Sample rate: 400 Hz");
    }

    #[tokio::test]
    async fn test_malformed_message_is_surfaced_not_fatal() {
        let (device, scrollback) = drive(vec![
            MqttEvent::Message {
                topic: "/imulogger/status".to_string(),
                payload: vec![],
            },
            MqttEvent::Message {
                topic: "/imulogger/status".to_string(),
                payload: vec![0x02, 0x01],
            },
        ])
        .await;

        let sb = scrollback.lock().await;
        assert_eq!(sb.entries()[0].tone, Tone::Error);
        assert!(sb.entries()[0].message.contains("Malformed message"));
        // the session kept going and the next frame landed
        assert_eq!(device.read().await.enabled, Some(true));
    }
}
