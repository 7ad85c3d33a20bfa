//! Service Communication Manager - 채널 기반 서비스 간 메시징
//!
//! 모든 전송은 버스의 미들웨어 체인(`custom.message`)을 통과한 뒤에만
//! 채널 history에 기록된다. 핸들러는 상태 잠금을 해제한 뒤 구독 순서대로 호출된다.

use super::types::{
    Channel, ChannelMetadata, ChannelType, CommunicationEvent, CommunicationListener,
    CommunicationStats, DataHandler, Message, MessageHandler, ServiceDataSync, ServiceStatus,
};
use crate::bus::{is_expired, ServiceBus, ServiceEvent};
use crate::registry::{RegistryEvent, ServiceRegistry};
use crate::subscription::{SubscriptionId, SubscriptionIds};
use chrono::Utc;
use nexus_foundation::{CommunicationConfig, DeliveryError, Error, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 채널 전송이 버스에 발행되는 이벤트 타입
pub const MESSAGE_EVENT_TYPE: &str = "custom.message";

/// 편의 API가 사용하는 공용 broadcast 채널 이름
pub const BROADCAST_CHANNEL_NAME: &str = "broadcast";

// ============================================================================
// 내부 상태
// ============================================================================

struct ChannelSlot {
    sequence: u64,
    channel: Channel,
    history: VecDeque<Message>,
}

/// 읽음 표시 (전달 수 / 읽은 시점의 전달 수)
#[derive(Default, Clone, Copy)]
struct ReadMarker {
    delivered: u64,
    read: u64,
}

#[derive(Default)]
struct CommState {
    channels: HashMap<String, ChannelSlot>,
    next_sequence: u64,
    presence: HashMap<String, ServiceStatus>,
    markers: HashMap<String, ReadMarker>,
    service_data: HashMap<String, ServiceDataSync>,
}

enum Subscription {
    Channel {
        channel_id: String,
        service_id: String,
        handler: MessageHandler,
    },
    Service {
        service_id: String,
        handler: MessageHandler,
    },
    Data {
        service_id: String,
        handler: DataHandler,
    },
    Events {
        handler: CommunicationListener,
    },
}

/// 전달 대상 계산 결과
enum Delivery {
    Message(MessageHandler),
    Data(DataHandler),
    Event(CommunicationListener),
}

// ============================================================================
// ServiceCommunicationManager
// ============================================================================

pub struct ServiceCommunicationManager {
    config: CommunicationConfig,
    registry: Arc<ServiceRegistry>,
    bus: Arc<ServiceBus>,
    state: RwLock<CommState>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    subscription_ids: SubscriptionIds,
    running: AtomicBool,
    registry_listener: Mutex<Option<SubscriptionId>>,
}

impl ServiceCommunicationManager {
    /// 생성 후 레지스트리의 해제 이벤트를 구독한다
    pub fn new(
        config: CommunicationConfig,
        registry: Arc<ServiceRegistry>,
        bus: Arc<ServiceBus>,
    ) -> Arc<Self> {
        let running = config.auto_start;
        let manager = Arc::new(Self {
            config,
            registry,
            bus,
            state: RwLock::new(CommState::default()),
            subscriptions: RwLock::new(HashMap::new()),
            subscription_ids: SubscriptionIds::new(),
            running: AtomicBool::new(running),
            registry_listener: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&manager);
        let listener_id = manager.registry.subscribe(Arc::new(move |event: &RegistryEvent| {
            if let RegistryEvent::Unregistered { service_id } = event {
                if let Some(manager) = weak.upgrade() {
                    manager.purge_service(service_id);
                }
            }
        }));
        *manager.registry_listener.lock() = Some(listener_id);

        manager
    }

    pub fn config(&self) -> &CommunicationConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Communication manager started");
        }
    }

    /// 정지 (전송 거부, 조회는 계속 가능)
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Communication manager stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// 채널 생성
    ///
    /// 참가자는 모두 등록된 서비스여야 하며 direct 채널은 최대 두 명이다.
    pub fn create_channel(
        &self,
        name: &str,
        channel_type: ChannelType,
        participants: &[String],
    ) -> Result<Channel> {
        if name.trim().is_empty() {
            return Err(Error::invalid("channel name is required"));
        }

        let participants: BTreeSet<String> = participants.iter().cloned().collect();
        for participant in &participants {
            self.ensure_registered(participant)?;
        }
        if channel_type == ChannelType::Direct && participants.len() > 2 {
            return Err(Error::invalid(format!(
                "direct channel '{}' accepts at most two participants",
                name
            )));
        }

        let channel = Channel {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            channel_type,
            participants,
            is_active: true,
            metadata: ChannelMetadata::new(),
        };

        {
            let mut state = self.state.write();
            state.next_sequence += 1;
            let sequence = state.next_sequence;
            state.channels.insert(
                channel.id.clone(),
                ChannelSlot {
                    sequence,
                    channel: channel.clone(),
                    history: VecDeque::new(),
                },
            );
        }

        info!(
            channel_id = %channel.id,
            name = name,
            channel_type = %channel_type,
            participants = channel.participants.len(),
            "Channel created"
        );
        self.emit(CommunicationEvent::ChannelCreated {
            channel_id: channel.id.clone(),
        });
        Ok(channel)
    }

    /// 채널 참가 (이미 참가 중이거나 채널이 없으면 `Ok(false)`)
    pub fn join_channel(&self, channel_id: &str, service_id: &str) -> Result<bool> {
        self.ensure_registered(service_id)?;

        {
            let mut state = self.state.write();
            let Some(slot) = state.channels.get_mut(channel_id) else {
                return Ok(false);
            };
            let channel = &mut slot.channel;

            if channel.has_participant(service_id) {
                return Ok(false);
            }
            if channel.channel_type == ChannelType::Direct && channel.participants.len() >= 2 {
                return Err(Error::invalid(format!(
                    "direct channel '{}' is full",
                    channel.name
                )));
            }
            channel.participants.insert(service_id.to_string());
        }

        debug!(channel_id = channel_id, service_id = service_id, "Service joined channel");
        self.emit(CommunicationEvent::ServiceJoined {
            channel_id: channel_id.to_string(),
            service_id: service_id.to_string(),
        });
        Ok(true)
    }

    /// 채널 탈퇴 (참가자가 아니거나 채널이 없으면 `Ok(false)`)
    pub fn leave_channel(&self, channel_id: &str, service_id: &str) -> Result<bool> {
        let removed = {
            let mut state = self.state.write();
            match state.channels.get_mut(channel_id) {
                Some(slot) => slot.channel.participants.remove(service_id),
                None => false,
            }
        };

        if removed {
            debug!(channel_id = channel_id, service_id = service_id, "Service left channel");
            self.emit(CommunicationEvent::ServiceLeft {
                channel_id: channel_id.to_string(),
                service_id: service_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// 채널과 history 삭제, 해당 채널 구독도 정리
    pub fn close_channel(&self, channel_id: &str) -> Result<()> {
        if self.state.write().channels.remove(channel_id).is_none() {
            return Err(Error::not_found("channel", channel_id));
        }

        self.subscriptions.write().retain(|_, sub| {
            !matches!(sub, Subscription::Channel { channel_id: id, .. } if id == channel_id)
        });

        info!(channel_id = channel_id, "Channel closed");
        self.emit(CommunicationEvent::ChannelClosed {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    pub fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.state
            .read()
            .channels
            .get(channel_id)
            .map(|slot| slot.channel.clone())
    }

    /// 생성 순서대로
    pub fn get_channels(&self) -> Vec<Channel> {
        self.collect_channels(|_| true)
    }

    pub fn get_service_channels(&self, service_id: &str) -> Vec<Channel> {
        self.collect_channels(|channel| channel.has_participant(service_id))
    }

    fn collect_channels(&self, filter: impl Fn(&Channel) -> bool) -> Vec<Channel> {
        let state = self.state.read();
        let mut slots: Vec<&ChannelSlot> = state
            .channels
            .values()
            .filter(|slot| filter(&slot.channel))
            .collect();
        slots.sort_by_key(|slot| slot.sequence);
        slots.into_iter().map(|slot| slot.channel.clone()).collect()
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// 메시지 전송
    ///
    /// 1. 정지 상태, 채널, 참가자, TTL 확인
    /// 2. 버스에 `custom.message`로 발행 (미들웨어 drop 시 거부)
    /// 3. history 기록, 채널 메타데이터 갱신
    /// 4. 채널 구독자와 수신자 구독자에게 구독 순서대로 전달, 이후 버스 구독자
    pub fn send_message(&self, message: Message) -> Result<Message> {
        if !self.is_running() {
            return Err(DeliveryError::NotRunning("communication manager".into()).into());
        }

        {
            let state = self.state.read();
            let slot = state
                .channels
                .get(&message.channel_id)
                .ok_or_else(|| Error::not_found("channel", &message.channel_id))?;
            let channel = &slot.channel;

            let outsider = std::iter::once(&message.sender_id)
                .chain(message.recipient_id.as_ref())
                .find(|id| !channel.has_participant(id));
            if let Some(service_id) = outsider {
                return Err(DeliveryError::NotParticipant {
                    service_id: service_id.clone(),
                    channel_id: channel.id.clone(),
                }
                .into());
            }
        }

        if is_expired(message.timestamp, message.ttl_ms, Utc::now()) {
            debug!(message_id = %message.id, "Expired message dropped");
            return Err(DeliveryError::Expired {
                message_id: message.id,
            }
            .into());
        }

        let mut message = message;
        let mut audience_size = 0;
        let delivered = self.bus.publish_with(message_event(&message), |event| {
            if let Some(content) = event.payload.get("content") {
                message.content = content.clone();
            }

            let (handlers, audience) = {
                let mut state = self.state.write();
                let limit = self.config.history_limit;
                let slot = state
                    .channels
                    .get_mut(&message.channel_id)
                    .ok_or_else(|| Error::not_found("channel", &message.channel_id))?;

                slot.history.push_back(message.clone());
                while slot.history.len() > limit {
                    slot.history.pop_front();
                }
                slot.channel.metadata.record_message();

                let audience: Vec<String> = match &message.recipient_id {
                    Some(recipient) => vec![recipient.clone()],
                    None => slot.channel.participants.iter().cloned().collect(),
                };

                for service_id in &audience {
                    if *service_id != message.sender_id {
                        state.markers.entry(service_id.clone()).or_default().delivered += 1;
                    }
                }

                let handlers = self.message_handlers(&message, &audience);
                (handlers, audience)
            };
            audience_size = audience.len();

            Ok(dispatch(&handlers, |delivery| {
                if let Delivery::Message(handler) = delivery {
                    handler(&message);
                }
            }))
        })?;

        debug!(
            message_id = %message.id,
            channel_id = %message.channel_id,
            sender_id = %message.sender_id,
            audience = audience_size,
            delivered,
            "Message sent"
        );

        self.emit(CommunicationEvent::MessageReceived {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
        });
        Ok(message)
    }

    /// 두 서비스 전용 direct 채널을 재사용하거나 생성해 전송
    pub fn send_direct_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: Value,
    ) -> Result<Message> {
        let members = [sender_id.to_string(), recipient_id.to_string()];
        let name = {
            let mut sorted = members.clone();
            sorted.sort();
            format!("direct:{}:{}", sorted[0], sorted[1])
        };
        let channel_id = self.find_or_create(&name, ChannelType::Direct, &members)?;
        self.send_message(Message::new(channel_id, sender_id, content).to(recipient_id))
    }

    /// 공용 broadcast 채널로 전송 (등록된 모든 서비스가 참가, 송신자 포함 전달)
    pub fn broadcast_message(&self, sender_id: &str, content: Value) -> Result<Message> {
        self.ensure_registered(sender_id)?;

        let channel_id = match self.find_channel(|c| {
            c.channel_type == ChannelType::Broadcast && c.name == BROADCAST_CHANNEL_NAME
        }) {
            Some(id) => id,
            None => self
                .create_channel(BROADCAST_CHANNEL_NAME, ChannelType::Broadcast, &[])?
                .id,
        };

        for entry in self.registry.get_all_services() {
            self.join_channel(&channel_id, entry.id())?;
        }

        self.send_message(Message::new(channel_id, sender_id, content))
    }

    /// 송신자와 수신자 집합이 정확히 일치하는 multicast 채널로 전송
    pub fn multicast_message(
        &self,
        sender_id: &str,
        recipients: &[String],
        content: Value,
    ) -> Result<Message> {
        let mut members: Vec<String> = recipients.to_vec();
        members.push(sender_id.to_string());
        members.sort();
        members.dedup();

        let name = format!("multicast:{}", members.join(","));
        let channel_id = self.find_or_create(&name, ChannelType::Multicast, &members)?;
        self.send_message(Message::new(channel_id, sender_id, content))
    }

    fn find_or_create(
        &self,
        name: &str,
        channel_type: ChannelType,
        members: &[String],
    ) -> Result<String> {
        let wanted: BTreeSet<&String> = members.iter().collect();
        let existing = self.find_channel(|c| {
            c.channel_type == channel_type
                && c.is_active
                && c.participants.len() == wanted.len()
                && c.participants.iter().all(|p| wanted.contains(p))
        });

        match existing {
            Some(id) => Ok(id),
            None => Ok(self.create_channel(name, channel_type, members)?.id),
        }
    }

    fn find_channel(&self, filter: impl Fn(&Channel) -> bool) -> Option<String> {
        self.collect_channels(filter).into_iter().next().map(|c| c.id)
    }

    /// 최근 메시지 (시간순, `limit` 지정 시 마지막 N개)
    pub fn get_messages(&self, channel_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let state = self.state.read();
        let slot = state
            .channels
            .get(channel_id)
            .ok_or_else(|| Error::not_found("channel", channel_id))?;
        Ok(tail(slot.history.iter().cloned().collect(), limit))
    }

    /// 서비스가 보냈거나 받은 메시지 (시간순)
    pub fn get_service_messages(&self, service_id: &str, limit: Option<usize>) -> Vec<Message> {
        let state = self.state.read();
        let mut messages: Vec<Message> = state
            .channels
            .values()
            .flat_map(|slot| {
                slot.history.iter().filter(move |m| {
                    m.sender_id == service_id
                        || match &m.recipient_id {
                            Some(recipient) => recipient == service_id,
                            None => slot.channel.has_participant(service_id),
                        }
                })
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        tail(messages, limit)
    }

    // ========================================================================
    // Unread
    // ========================================================================

    /// 마지막 `mark_read` 이후 전달된 메시지 수 (자신이 보낸 것 제외)
    pub fn get_unread_count(&self, service_id: &str) -> u64 {
        self.state
            .read()
            .markers
            .get(service_id)
            .map(|m| m.delivered - m.read)
            .unwrap_or(0)
    }

    pub fn mark_read(&self, service_id: &str) {
        if let Some(marker) = self.state.write().markers.get_mut(service_id) {
            marker.read = marker.delivered;
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// 채널 구독
    ///
    /// 수신자가 지정된 메시지는 해당 수신자의 구독에만 전달된다.
    pub fn subscribe_to_channel(
        &self,
        channel_id: &str,
        service_id: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId> {
        if !self.state.read().channels.contains_key(channel_id) {
            return Err(Error::not_found("channel", channel_id));
        }
        Ok(self.add_subscription(Subscription::Channel {
            channel_id: channel_id.to_string(),
            service_id: service_id.to_string(),
            handler,
        }))
    }

    /// 서비스 앞으로 오는 모든 메시지 구독 (참가 중인 채널 전체)
    pub fn subscribe_to_service(&self, service_id: &str, handler: MessageHandler) -> SubscriptionId {
        self.add_subscription(Subscription::Service {
            service_id: service_id.to_string(),
            handler,
        })
    }

    pub fn subscribe_to_service_data(&self, service_id: &str, handler: DataHandler) -> SubscriptionId {
        self.add_subscription(Subscription::Data {
            service_id: service_id.to_string(),
            handler,
        })
    }

    pub fn on_event(&self, handler: CommunicationListener) -> SubscriptionId {
        self.add_subscription(Subscription::Events { handler })
    }

    /// 구독 해제 (이미 해제된 ID는 `false`)
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().remove(&id).is_some()
    }

    fn add_subscription(&self, subscription: Subscription) -> SubscriptionId {
        let id = self.subscription_ids.next();
        self.subscriptions.write().insert(id, subscription);
        id
    }

    fn message_handlers(&self, message: &Message, audience: &[String]) -> Vec<(SubscriptionId, Delivery)> {
        let in_audience = |service_id: &str| audience.iter().any(|a| a == service_id);

        let subscriptions = self.subscriptions.read();
        let mut handlers: Vec<(SubscriptionId, Delivery)> = subscriptions
            .iter()
            .filter_map(|(id, sub)| match sub {
                Subscription::Channel {
                    channel_id,
                    service_id,
                    handler,
                } if *channel_id == message.channel_id && in_audience(service_id) => {
                    Some((*id, Delivery::Message(handler.clone())))
                }
                Subscription::Service {
                    service_id,
                    handler,
                } if in_audience(service_id) => Some((*id, Delivery::Message(handler.clone()))),
                _ => None,
            })
            .collect();
        handlers.sort_by_key(|(id, _)| *id);
        handlers
    }

    fn emit(&self, event: CommunicationEvent) {
        let mut listeners: Vec<(SubscriptionId, Delivery)> = self
            .subscriptions
            .read()
            .iter()
            .filter_map(|(id, sub)| match sub {
                Subscription::Events { handler } => Some((*id, Delivery::Event(handler.clone()))),
                _ => None,
            })
            .collect();
        listeners.sort_by_key(|(id, _)| *id);

        dispatch(&listeners, |delivery| {
            if let Delivery::Event(handler) = delivery {
                handler(&event);
            }
        });
    }

    // ========================================================================
    // Presence
    // ========================================================================

    /// 상태 변경 (변경된 경우에만 이벤트 발생, `service.status` 발행)
    pub fn set_service_status(&self, service_id: &str, status: ServiceStatus) -> Result<()> {
        self.ensure_registered(service_id)?;

        let previous = self
            .state
            .write()
            .presence
            .insert(service_id.to_string(), status)
            .unwrap_or_default();
        if previous == status {
            return Ok(());
        }

        debug!(service_id = service_id, %previous, current = %status, "Service status changed");
        self.emit(CommunicationEvent::StatusChanged {
            service_id: service_id.to_string(),
            previous,
            current: status,
        });

        let event = ServiceEvent::new(
            "service.status",
            service_id,
            json!({ "previous": previous, "current": status }),
        );
        if let Err(e) = self.bus.publish(event) {
            debug!(service_id = service_id, error = %e, "Status event not published");
        }
        Ok(())
    }

    /// 알려지지 않은 서비스는 offline
    pub fn get_service_status(&self, service_id: &str) -> ServiceStatus {
        self.state
            .read()
            .presence
            .get(service_id)
            .copied()
            .unwrap_or_default()
    }

    /// online 또는 busy 서비스 (정렬됨)
    pub fn get_online_services(&self) -> Vec<String> {
        let mut online: Vec<String> = self
            .state
            .read()
            .presence
            .iter()
            .filter(|(_, status)| status.is_reachable())
            .map(|(id, _)| id.clone())
            .collect();
        online.sort();
        online
    }

    // ========================================================================
    // Service data sync
    // ========================================================================

    /// 서비스 공유 데이터 갱신 (버전 증가, 구독자 통지, `data.changed` 발행)
    pub fn sync_service_data(&self, service_id: &str, data: Value) -> Result<ServiceDataSync> {
        self.ensure_registered(service_id)?;

        let sync = {
            let mut state = self.state.write();
            let version = state
                .service_data
                .get(service_id)
                .map(|s| s.version + 1)
                .unwrap_or(1);
            let sync = ServiceDataSync {
                service_id: service_id.to_string(),
                data,
                version,
                updated_at: Utc::now(),
            };
            state.service_data.insert(service_id.to_string(), sync.clone());
            sync
        };

        let mut handlers: Vec<(SubscriptionId, Delivery)> = self
            .subscriptions
            .read()
            .iter()
            .filter_map(|(id, sub)| match sub {
                Subscription::Data {
                    service_id: target,
                    handler,
                } if target == service_id => Some((*id, Delivery::Data(handler.clone()))),
                _ => None,
            })
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        dispatch(&handlers, |delivery| {
            if let Delivery::Data(handler) = delivery {
                handler(&sync);
            }
        });

        let event = ServiceEvent::new(
            "data.changed",
            service_id,
            json!({ "version": sync.version, "data": sync.data }),
        );
        if let Err(e) = self.bus.publish(event) {
            debug!(service_id = service_id, error = %e, "Data change not published");
        }
        Ok(sync)
    }

    pub fn get_service_data(&self, service_id: &str) -> Option<ServiceDataSync> {
        self.state.read().service_data.get(service_id).cloned()
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn stats(&self) -> CommunicationStats {
        let state = self.state.read();
        CommunicationStats {
            total_channels: state.channels.len(),
            active_channels: state.channels.values().filter(|s| s.channel.is_active).count(),
            total_messages: state
                .channels
                .values()
                .map(|s| s.channel.metadata.message_count)
                .sum(),
            stored_messages: state.channels.values().map(|s| s.history.len()).sum(),
            online_services: state.presence.values().filter(|s| s.is_reachable()).count(),
            tracked_services: state.presence.len(),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn ensure_registered(&self, service_id: &str) -> Result<()> {
        if self.registry.is_registered(service_id) {
            Ok(())
        } else {
            Err(Error::not_found("service", service_id))
        }
    }

    /// 등록 해제된 서비스를 모든 채널과 presence에서 제거
    fn purge_service(&self, service_id: &str) {
        let left: Vec<String> = {
            let mut state = self.state.write();
            state.presence.remove(service_id);
            state.markers.remove(service_id);
            state.service_data.remove(service_id);

            let mut slots: Vec<&mut ChannelSlot> = state.channels.values_mut().collect();
            slots.sort_by_key(|slot| slot.sequence);
            slots
                .into_iter()
                .filter_map(|slot| {
                    slot.channel
                        .participants
                        .remove(service_id)
                        .then(|| slot.channel.id.clone())
                })
                .collect()
        };

        if !left.is_empty() {
            info!(service_id = service_id, channels = left.len(), "Unregistered service removed from channels");
        }
        for channel_id in left {
            self.emit(CommunicationEvent::ServiceLeft {
                channel_id,
                service_id: service_id.to_string(),
            });
        }
    }
}

impl Drop for ServiceCommunicationManager {
    fn drop(&mut self) {
        if let Some(id) = self.registry_listener.lock().take() {
            self.registry.unsubscribe(id);
        }
    }
}

/// 버스 미들웨어로 보낼 이벤트
fn message_event(message: &Message) -> ServiceEvent {
    let mut event = ServiceEvent::new(
        MESSAGE_EVENT_TYPE,
        &message.sender_id,
        json!({
            "channelId": message.channel_id,
            "messageId": message.id,
            "type": message.message_type,
            "priority": message.priority,
            "content": message.content,
        }),
    )
    .with_timestamp(message.timestamp);
    event.ttl_ms = message.ttl_ms;
    if let Some(recipient) = &message.recipient_id {
        event = event.with_target(recipient);
    }
    event
}

/// 핸들러 호출 (패닉은 해당 핸들러로 격리), 성공 수 반환
fn dispatch(handlers: &[(SubscriptionId, Delivery)], call: impl Fn(&Delivery)) -> usize {
    let mut delivered = 0;
    for (id, delivery) in handlers {
        match catch_unwind(AssertUnwindSafe(|| call(delivery))) {
            Ok(()) => delivered += 1,
            Err(_) => warn!(subscription_id = %id, "Communication handler panicked"),
        }
    }
    delivered
}

fn tail(mut messages: Vec<Message>, limit: Option<usize>) -> Vec<Message> {
    if let Some(limit) = limit {
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
    }
    messages
}
