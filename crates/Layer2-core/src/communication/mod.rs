//! Communication - 채널 기반 서비스 간 통신
//!
//! ```text
//! ServiceCommunicationManager
//!   ├── Channel (direct / broadcast / multicast / unicast)
//!   │     └── history (history_limit 초과 시 오래된 것부터 제거)
//!   ├── presence (online / busy = 도달 가능)
//!   ├── read marker (unread 계산)
//!   └── ServiceBus 미들웨어 체인 (`custom.message`)
//! ```

mod manager;
mod types;

pub use manager::{ServiceCommunicationManager, BROADCAST_CHANNEL_NAME, MESSAGE_EVENT_TYPE};
pub use types::{
    Channel, ChannelMetadata, ChannelType, CommunicationEvent, CommunicationListener,
    CommunicationStats, DataHandler, Message, MessageHandler, MessageMetadata, MessagePriority,
    MessageType, ServiceDataSync, ServiceStatus,
};
