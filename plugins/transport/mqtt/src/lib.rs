mod config;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};

use bridge_api::{InboundMessage, MessagePublisher, MessageSource, PluginError};

pub use config::{DEFAULT_PORT, MqttConfig, parse_broker_address, parse_qos, reconnect_delay};

/// Ёмкость очереди запросов AsyncClient → EventLoop.
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Ждать ConnAck от брокера. Любая ошибка: `ErrorKind::Connection`.
async fn wait_connack(eventloop: &mut EventLoop, addr: &str) -> Result<(), PluginError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(PluginError::connection(format!("mqtt {addr}: broker refused connection: {:?}", ack.code)))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(PluginError::connection(format!("mqtt connect to {addr}: {e}"))),
        }
    }
}

async fn connect(config: &MqttConfig) -> Result<(AsyncClient, EventLoop), PluginError> {
    config.validate()?;
    let addr = config.address();
    let (client, mut eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);

    tokio::time::timeout(config.connect_timeout(), wait_connack(&mut eventloop, &addr))
        .await
        .map_err(|_| {
            PluginError::connection(format!(
                "mqtt connect to {addr}: timed out after {} ms",
                config.connect_timeout_ms
            ))
        })??;

    Ok((client, eventloop))
}

// ═══════════════════════════════════════════════════════════════
//  MqttSource: subscriber adapter
// ═══════════════════════════════════════════════════════════════

/// Подписчик на один MQTT topic.
///
/// Владеет EventLoop'ом: сообщения отдаются в порядке получения.
/// При обрыве соединения переподключается с экспоненциальной задержкой
/// и заново подписывается на каждом ConnAck.
pub struct MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    qos: QoS,
    addr: String,
    max_reconnects: u32,
    failures: u32,
}

impl MqttSource {
    /// Подключиться и подписаться. Ошибка здесь фатальна для старта.
    pub async fn connect(config: &MqttConfig) -> Result<Self, PluginError> {
        let qos = parse_qos(config.qos)?;
        let (client, eventloop) = connect(config).await?;
        tracing::info!(broker = %config.address(), client_id = %config.client_id, "connected to mqtt broker");

        client
            .subscribe(&config.topic, qos)
            .await
            .map_err(|e| PluginError::connection(format!("mqtt subscribe '{}': {e}", config.topic)))?;
        tracing::info!(topic = %config.topic, ?qos, "subscribed");

        Ok(Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            qos,
            addr: config.address(),
            max_reconnects: config.max_reconnects,
            failures: 0,
        })
    }

    async fn poll_message(&mut self) -> Result<Option<InboundMessage>, PluginError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.failures = 0;
                    return Ok(Some(InboundMessage::new(publish.topic, publish.payload.to_vec())));
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(broker = %self.addr, "reconnected to mqtt broker, resubscribing");
                    self.failures = 0;
                    self.client
                        .try_subscribe(&self.topic, self.qos)
                        .map_err(|e| PluginError::connection(format!("mqtt resubscribe '{}': {e}", self.topic)))?;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!(broker = %self.addr, "broker sent disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    self.failures += 1;
                    if self.max_reconnects > 0 && self.failures > self.max_reconnects {
                        return Err(PluginError::connection(format!(
                            "mqtt {}: giving up after {} reconnect attempts: {e}",
                            self.addr, self.max_reconnects
                        )));
                    }
                    let delay = reconnect_delay(self.failures, RECONNECT_BASE, RECONNECT_MAX);
                    tracing::warn!(
                        broker = %self.addr,
                        error = %e,
                        attempt = self.failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "mqtt connection lost, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl MessageSource for MqttSource {
    fn next_message(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, PluginError>> + Send + '_>> {
        Box::pin(self.poll_message())
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.client.try_disconnect().is_err() {
                return Ok(());
            }
            // Прокрутить EventLoop, чтобы DISCONNECT реально ушёл брокеру.
            let flush = async {
                loop {
                    match self.eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            let _ = tokio::time::timeout(Duration::from_secs(1), flush).await;
            tracing::info!(broker = %self.addr, "disconnected from mqtt broker");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MqttPublisher: исходящая сторона (генератор нагрузки)
// ═══════════════════════════════════════════════════════════════

/// Публикует payload'ы в один topic. EventLoop крутится в фоне.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    closing: Arc<AtomicBool>,
}

impl MqttPublisher {
    pub async fn connect(config: &MqttConfig) -> Result<Self, PluginError> {
        let qos = parse_qos(config.qos)?;
        let (client, mut eventloop) = connect(config).await?;
        let addr = config.address();
        tracing::info!(broker = %addr, client_id = %config.client_id, "connected to mqtt broker");

        let closing = Arc::new(AtomicBool::new(false));
        let loop_closing = closing.clone();
        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => failures = 0,
                    Err(e) => {
                        if loop_closing.load(Ordering::Relaxed) {
                            break;
                        }
                        failures += 1;
                        let delay = reconnect_delay(failures, RECONNECT_BASE, RECONNECT_MAX);
                        tracing::warn!(broker = %addr, error = %e, attempt = failures, "mqtt connection lost, reconnecting");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            topic: config.topic.clone(),
            qos,
            closing,
        })
    }
}

impl MessagePublisher for MqttPublisher {
    fn publish(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.client
                .publish(&self.topic, self.qos, false, payload)
                .await
                .map_err(|e| PluginError::connection(format!("mqtt publish '{}': {e}", self.topic)))
        })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.closing.store(true, Ordering::Relaxed);
            self.client
                .disconnect()
                .await
                .map_err(|e| PluginError::connection(format!("mqtt disconnect: {e}")))
        })
    }
}
