//! Communication Types - 채널, 메시지, 상태

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Channel
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// 두 서비스 간 1:1
    Direct,
    /// 전체 서비스
    Broadcast,
    /// 지정된 서비스 그룹
    Multicast,
    /// 수신자 지정 전달
    Unicast,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Broadcast => write!(f, "broadcast"),
            Self::Multicast => write!(f, "multicast"),
            Self::Unicast => write!(f, "unicast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
}

impl ChannelMetadata {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }

    /// 전송 기록 (last_activity는 항상 앞으로 이동)
    pub(crate) fn record_message(&mut self) {
        let now = Utc::now();
        self.last_activity = if now > self.last_activity {
            now
        } else {
            self.last_activity + chrono::Duration::microseconds(1)
        };
        self.message_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub participants: BTreeSet<String>,
    pub is_active: bool,
    pub metadata: ChannelMetadata,
}

impl Channel {
    pub fn has_participant(&self, service_id: &str) -> bool {
        self.participants.contains(service_id)
    }
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    Data,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,

    /// 지정 시 이 서비스에게만 전달
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub content: Value,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,

    pub priority: MessagePriority,

    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(channel_id: impl Into<String>, sender_id: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            recipient_id: None,
            message_type: MessageType::Notification,
            content,
            timestamp: Utc::now(),
            ttl_ms: None,
            priority: MessagePriority::Normal,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn to(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.metadata.reply_to = Some(message_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }
}

// ============================================================================
// Presence
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    #[default]
    Offline,
    Busy,
    Away,
}

impl ServiceStatus {
    /// online, busy는 도달 가능
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Online | Self::Busy)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Busy => write!(f, "busy"),
            Self::Away => write!(f, "away"),
        }
    }
}

// ============================================================================
// Service data sync
// ============================================================================

/// 서비스가 공유하는 버전 관리 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDataSync {
    pub service_id: String,
    pub data: Value,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Events / Stats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommunicationEvent {
    ChannelCreated {
        channel_id: String,
    },
    ChannelClosed {
        channel_id: String,
    },
    ServiceJoined {
        channel_id: String,
        service_id: String,
    },
    ServiceLeft {
        channel_id: String,
        service_id: String,
    },
    MessageReceived {
        channel_id: String,
        message_id: String,
    },
    StatusChanged {
        service_id: String,
        previous: ServiceStatus,
        current: ServiceStatus,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunicationStats {
    pub total_channels: usize,
    pub active_channels: usize,
    /// 채널별 message_count 합 (history에서 밀려난 것 포함)
    pub total_messages: u64,
    pub stored_messages: usize,
    pub online_services: usize,
    pub tracked_services: usize,
}

pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;
pub type DataHandler = Arc<dyn Fn(&ServiceDataSync) + Send + Sync>;
pub type CommunicationListener = Arc<dyn Fn(&CommunicationEvent) + Send + Sync>;
