//! Update Checker - 주기적 업데이트 확인 태스크
//!
//! 매니저를 `Weak`으로만 잡고 있으므로 매니저가 사라지면 다음 tick에서 종료된다.
//! 진행 중인 확인은 끝까지 실행된 뒤 종료된다.

use super::manager::PluginManager;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 마지막 업데이트 확인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub checked_at: DateTime<Utc>,
    /// 플러그인 ID -> 업데이트 존재 여부
    pub available: BTreeMap<String, bool>,
}

impl UpdateCheck {
    pub fn pending(&self) -> Vec<String> {
        self.available
            .iter()
            .filter(|(_, available)| **available)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

pub(super) struct UpdateChecker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl UpdateChecker {
    /// 첫 확인은 `interval` 이후
    pub(super) fn spawn(manager: Weak<PluginManager>, interval: Duration, auto_update: bool) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(manager) = manager.upgrade() else {
                    break;
                };

                if auto_update {
                    let report = manager.auto_update_all().await;
                    debug!(
                        updated = report.updated.len(),
                        failed = report.failed.len(),
                        "Scheduled auto-update finished"
                    );
                } else {
                    let results = manager.check_all_updates().await;
                    let pending = results.values().filter(|available| **available).count();
                    if pending > 0 {
                        info!("{} plugin update(s) available", pending);
                    }
                }
            }

            debug!("Update checker exited");
        });

        Self { token, handle }
    }

    pub(super) fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    pub(super) fn cancel(&self) {
        self.token.cancel();
    }

    /// 취소 후 태스크 종료까지 대기
    pub(super) async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!("Update checker panicked: {}", e);
            }
        }
    }
}
