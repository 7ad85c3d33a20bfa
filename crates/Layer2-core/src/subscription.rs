//! 구독 ID
//!
//! 버스, 채널, 레지스트리 리스너가 공통으로 사용하는 불투명 핸들

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 구독 ID (발급 순서대로 증가)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 단조 증가 ID 발급기
#[derive(Debug)]
pub(crate) struct SubscriptionIds {
    next: AtomicU64,
}

impl SubscriptionIds {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> SubscriptionId {
        SubscriptionId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for SubscriptionIds {
    fn default() -> Self {
        Self::new()
    }
}
