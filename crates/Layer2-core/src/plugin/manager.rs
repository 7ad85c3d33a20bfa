//! Plugin Manager - 플러그인 설치 / 활성화 / 업데이트 라이프사이클
//!
//! ```text
//! (없음) --install--> Installed(disabled) <--enable/disable--> Installed(enabled)
//!                          |                                        |
//!                          +---------------uninstall----------------+--> (없음)
//!
//! update: Installed -> Updating -> (성공) 새 모듈 / (실패) 이전 모듈 유지
//! ```
//!
//! 상태를 바꾸는 연산은 하나의 async mutex로 직렬화된다.
//! 설치와 업데이트는 모든 검증과 모듈 로드가 끝난 뒤에만 상태를 바꾼다.

use super::manifest::{PluginManifest, PluginVersion, VersionRequirement};
use super::store::{PluginIndex, PluginRecord};
use super::traits::{ManifestSource, ModuleLoader, PluginModule};
use super::updater::{UpdateCheck, UpdateChecker};
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use nexus_foundation::{
    DeliveryError, DependencyError, Error, KeyValueStore, PluginConfig, Result,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Plugin - 외부에 노출되는 상태
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: String,
    pub manifest: PluginManifest,
    pub descriptor: ServiceDescriptor,
    pub source_url: String,
    pub is_installed: bool,
    pub is_enabled: bool,
    pub is_updating: bool,
    pub last_update: DateTime<Utc>,

    /// 마지막 업데이트 실패 사유 (성공하면 지워짐)
    pub last_update_error: Option<String>,
}

impl Plugin {
    pub fn version(&self) -> PluginVersion {
        self.manifest.version
    }

    pub fn update_url(&self) -> Option<&str> {
        self.manifest.update_url.as_deref()
    }

    pub fn dependency_ids(&self) -> Vec<String> {
        self.manifest.dependencies.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        from: PluginVersion,
        to: PluginVersion,
    },
    UpToDate {
        version: PluginVersion,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoUpdateReport {
    pub updated: Vec<String>,
    /// (플러그인 ID, 실패 사유)
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub updating: usize,
    pub failed_updates: usize,
}

struct PluginSlot {
    sequence: u64,
    plugin: Plugin,
    module: Arc<dyn PluginModule>,
}

// ============================================================================
// PluginManager
// ============================================================================

pub struct PluginManager {
    config: PluginConfig,
    platform: PluginVersion,
    registry: Arc<ServiceRegistry>,
    source: Arc<dyn ManifestSource>,
    loader: Arc<dyn ModuleLoader>,
    index: PluginIndex,
    plugins: RwLock<HashMap<String, PluginSlot>>,

    /// 복원하지 못한 인덱스 항목 (다음 저장 때도 보존)
    unrestored: RwLock<Vec<PluginRecord>>,

    sequence: AtomicU64,
    op_lock: tokio::sync::Mutex<()>,
    checker: Mutex<Option<UpdateChecker>>,
    last_check: RwLock<Option<UpdateCheck>>,
}

impl PluginManager {
    pub fn new(
        config: PluginConfig,
        registry: Arc<ServiceRegistry>,
        source: Arc<dyn ManifestSource>,
        loader: Arc<dyn ModuleLoader>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let platform = PluginVersion::parse(&config.platform_version).ok_or_else(|| {
            Error::Config(format!(
                "invalid platform version '{}'",
                config.platform_version
            ))
        })?;

        Ok(Self {
            config,
            platform,
            registry,
            source,
            loader,
            index: PluginIndex::new(store),
            plugins: RwLock::new(HashMap::new()),
            unrestored: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
            op_lock: tokio::sync::Mutex::new(()),
            checker: Mutex::new(None),
            last_check: RwLock::new(None),
        })
    }

    pub fn platform_version(&self) -> PluginVersion {
        self.platform
    }

    // ========================================================================
    // 설치 / 제거
    // ========================================================================

    /// URL에서 플러그인 설치 (비활성 상태)
    ///
    /// 매니페스트 검증, 의존성 확인, 모듈 로드가 모두 성공해야 레지스트리와
    /// 인덱스에 기록된다. 실패하면 아무 흔적도 남지 않는다.
    pub async fn install_plugin(&self, url: &str) -> Result<Plugin> {
        let _guard = self.op_lock.lock().await;
        info!("Installing plugin from {}", url);

        let manifest = self.source.fetch_manifest(url).await?;
        if self.plugins.read().contains_key(&manifest.id) {
            return Err(Error::already_exists("plugin", &manifest.id));
        }

        self.validate_manifest(&manifest)?;
        let module = self.loader.load(url, &manifest).await?;

        let descriptor = manifest.to_descriptor();
        let report = self.registry.register_service(descriptor.clone())?;
        if !report.is_valid {
            return Err(Error::Validation(report));
        }

        let plugin = Plugin {
            id: manifest.id.clone(),
            manifest,
            descriptor,
            source_url: url.to_string(),
            is_installed: true,
            is_enabled: false,
            is_updating: false,
            last_update: Utc::now(),
            last_update_error: None,
        };

        let mut records = self.records();
        records.push(record_of(&plugin));
        if let Err(e) = self.index.save(&records).await {
            warn!(plugin_id = %plugin.id, error = %e, "Failed to persist plugin index, rolling back install");
            if let Err(rollback) = self.registry.unregister_service(&plugin.id) {
                warn!(plugin_id = %plugin.id, error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.plugins.write().insert(
            plugin.id.clone(),
            PluginSlot {
                sequence,
                plugin: plugin.clone(),
                module,
            },
        );

        info!("Installed plugin: {} (v{})", plugin.id, plugin.version());
        Ok(plugin)
    }

    /// 플러그인 제거 (활성 상태면 먼저 비활성화)
    pub async fn uninstall_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        info!("Uninstalling plugin: {}", id);

        if !self.plugins.read().contains_key(id) {
            return Err(Error::not_found("plugin", id));
        }

        // 인덱스에서 먼저 빼고 정리, 정리에 실패하면 인덱스를 되돌린다
        let remaining: Vec<PluginRecord> =
            self.records().into_iter().filter(|r| r.id != id).collect();
        self.index.save(&remaining).await?;

        if let Err(e) = self.remove_locked(id).await {
            if let Err(restore) = self.persist().await {
                warn!(plugin_id = id, error = %restore, "Failed to restore plugin index");
            }
            return Err(e);
        }

        info!("Uninstalled plugin: {}", id);
        Ok(())
    }

    // ========================================================================
    // 활성화 / 비활성화
    // ========================================================================

    /// 레지스트리에서 활성화 후 모듈 초기화
    pub async fn enable_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        if !self.start_module(id).await? {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            if let Err(revert) = self.stop_module(id).await {
                warn!(plugin_id = id, error = %revert, "Failed to revert enable");
            }
            return Err(e);
        }

        info!("Enabled plugin: {}", id);
        Ok(())
    }

    /// 모듈 종료 후 레지스트리에서 비활성화 (활성 의존 서비스가 있으면 거부)
    pub async fn disable_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        if !self.stop_module(id).await? {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            if let Err(revert) = self.start_module(id).await {
                warn!(plugin_id = id, error = %revert, "Failed to revert disable");
            }
            return Err(e);
        }

        info!("Disabled plugin: {}", id);
        Ok(())
    }

    /// 이미 활성이면 `Ok(false)`
    async fn start_module(&self, id: &str) -> Result<bool> {
        let module = {
            let plugins = self.plugins.read();
            let slot = plugins
                .get(id)
                .ok_or_else(|| Error::not_found("plugin", id))?;
            if slot.plugin.is_enabled {
                return Ok(false);
            }
            slot.module.clone()
        };

        self.registry.activate_service(id)?;
        if let Err(e) = module.initialize().await {
            warn!(plugin_id = id, error = %e, "Plugin initialization failed");
            if let Err(revert) = self.registry.deactivate_service(id) {
                warn!(plugin_id = id, error = %revert, "Failed to deactivate after init failure");
            }
            return Err(e);
        }

        self.set_enabled(id, true);
        Ok(true)
    }

    /// 이미 비활성이면 `Ok(false)`
    async fn stop_module(&self, id: &str) -> Result<bool> {
        let module = {
            let plugins = self.plugins.read();
            let slot = plugins
                .get(id)
                .ok_or_else(|| Error::not_found("plugin", id))?;
            if !slot.plugin.is_enabled {
                return Ok(false);
            }
            slot.module.clone()
        };

        self.registry.deactivate_service(id)?;
        if let Err(e) = module.shutdown().await {
            warn!(plugin_id = id, error = %e, "Plugin shutdown failed");
        }

        self.set_enabled(id, false);
        Ok(true)
    }

    fn set_enabled(&self, id: &str, enabled: bool) {
        if let Some(slot) = self.plugins.write().get_mut(id) {
            slot.plugin.is_enabled = enabled;
        }
    }

    /// 비활성화, 등록 해제, 메모리에서 제거 (인덱스 저장은 호출자 몫)
    async fn remove_locked(&self, id: &str) -> Result<()> {
        self.stop_module(id).await?;

        match self.registry.unregister_service(id) {
            Ok(()) | Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        self.plugins.write().remove(id);
        Ok(())
    }

    // ========================================================================
    // 업데이트
    // ========================================================================

    /// 플러그인 업데이트
    ///
    /// 실패해도 이전 모듈은 그대로 동작하며 사유는 `last_update_error`에 남는다.
    pub async fn update_plugin(&self, id: &str) -> Result<UpdateOutcome> {
        let _guard = self.op_lock.lock().await;

        let (current, enabled, old_module) = {
            let mut plugins = self.plugins.write();
            let slot = plugins
                .get_mut(id)
                .ok_or_else(|| Error::not_found("plugin", id))?;
            slot.plugin.is_updating = true;
            (
                slot.plugin.manifest.clone(),
                slot.plugin.is_enabled,
                slot.module.clone(),
            )
        };

        debug!(plugin_id = id, version = %current.version, "Updating plugin");
        let result = self.apply_update(&current, enabled, old_module).await;

        if let Some(slot) = self.plugins.write().get_mut(id) {
            slot.plugin.is_updating = false;
            slot.plugin.last_update_error = result.as_ref().err().map(|e| e.to_string());
        }

        result.map_err(|e| {
            warn!(plugin_id = id, error = %e, "Plugin update failed, keeping previous version");
            match e {
                Error::Update { .. } => e,
                other => Error::update(id, other.to_string()),
            }
        })
    }

    async fn apply_update(
        &self,
        current: &PluginManifest,
        enabled: bool,
        old_module: Arc<dyn PluginModule>,
    ) -> Result<UpdateOutcome> {
        let url = current
            .update_url
            .as_deref()
            .ok_or_else(|| Error::update(&current.id, "no updateUrl declared"))?;

        let next = self.source.fetch_manifest(url).await?;
        if next.id != current.id {
            return Err(Error::update(
                &current.id,
                format!("update manifest describes '{}'", next.id),
            ));
        }
        if next.version <= current.version {
            return Ok(UpdateOutcome::UpToDate {
                version: current.version,
            });
        }

        self.validate_manifest(&next)?;
        let module = self.loader.load(url, &next).await?;
        if enabled {
            module.initialize().await?;
        }

        let descriptor = next.to_descriptor();
        let swapped = self
            .registry
            .update_service(descriptor.clone())
            .and_then(|report| report.into_result());
        if let Err(e) = swapped {
            discard(&module, enabled).await;
            return Err(e);
        }

        let now = Utc::now();
        let mut records = self.records();
        if let Some(record) = records.iter_mut().find(|r| r.id == next.id) {
            record.manifest = next.clone();
            record.last_update = now;
        }
        if let Err(e) = self.index.save(&records).await {
            if let Err(revert) = self.registry.update_service(current.to_descriptor()) {
                warn!(plugin_id = %current.id, error = %revert, "Failed to restore previous descriptor");
            }
            discard(&module, enabled).await;
            return Err(e);
        }

        if let Some(slot) = self.plugins.write().get_mut(&next.id) {
            slot.module = module;
            slot.plugin.manifest = next.clone();
            slot.plugin.descriptor = descriptor;
            slot.plugin.last_update = now;
        }

        if enabled {
            if let Err(e) = old_module.shutdown().await {
                warn!(plugin_id = %current.id, error = %e, "Previous module shutdown failed");
            }
        }

        info!(
            plugin_id = %current.id,
            from = %current.version,
            to = %next.version,
            "Plugin updated"
        );
        Ok(UpdateOutcome::Updated {
            from: current.version,
            to: next.version,
        })
    }

    /// 원격 매니페스트가 더 새 버전인지 (updateUrl이 없으면 false)
    pub async fn check_for_update(&self, id: &str) -> Result<bool> {
        let manifest = self
            .get_plugin(id)
            .ok_or_else(|| Error::not_found("plugin", id))?
            .manifest;
        let Some(url) = manifest.update_url.as_deref() else {
            return Ok(false);
        };

        let remote = self.source.fetch_manifest(url).await?;
        Ok(remote.id == manifest.id && remote.version > manifest.version)
    }

    /// 모든 플러그인 업데이트 확인 (조회 실패는 "업데이트 없음")
    pub async fn check_all_updates(&self) -> BTreeMap<String, bool> {
        let ids: Vec<String> = self.get_plugins().into_iter().map(|p| p.id).collect();

        let checks = ids.iter().map(|id| async move {
            let available = match self.check_for_update(id).await {
                Ok(available) => available,
                Err(e) => {
                    warn!(plugin_id = %id, error = %e, "Update check failed");
                    false
                }
            };
            (id.clone(), available)
        });
        let results: BTreeMap<String, bool> = join_all(checks).await.into_iter().collect();

        *self.last_check.write() = Some(UpdateCheck {
            checked_at: Utc::now(),
            available: results.clone(),
        });
        results
    }

    /// 업데이트가 있는 플러그인을 하나씩 순서대로 업데이트
    pub async fn auto_update_all(&self) -> AutoUpdateReport {
        let mut report = AutoUpdateReport::default();

        for (id, available) in self.check_all_updates().await {
            if !available {
                continue;
            }
            match self.update_plugin(&id).await {
                Ok(UpdateOutcome::Updated { .. }) => report.updated.push(id),
                Ok(UpdateOutcome::UpToDate { .. }) => {}
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        if !report.updated.is_empty() || !report.failed.is_empty() {
            info!(
                updated = report.updated.len(),
                failed = report.failed.len(),
                "Auto-update finished"
            );
        }
        report
    }

    pub fn last_update_check(&self) -> Option<UpdateCheck> {
        self.last_check.read().clone()
    }

    // ========================================================================
    // 주기적 업데이트 확인
    // ========================================================================

    /// 백그라운드 확인 시작 (tokio 런타임 안에서 호출). 이미 실행 중이면 false.
    ///
    /// `autoUpdate` 설정이 켜져 있으면 확인 대신 `auto_update_all`을 실행한다.
    pub fn start_update_checker(self: &Arc<Self>, interval: Duration) -> bool {
        let mut checker = self.checker.lock();
        if checker.as_ref().map(|c| c.is_running()).unwrap_or(false) {
            return false;
        }

        *checker = Some(UpdateChecker::spawn(
            Arc::downgrade(self),
            interval,
            self.config.auto_update,
        ));
        info!(interval_secs = interval.as_secs(), "Update checker started");
        true
    }

    /// 설정된 주기로 시작
    pub fn start_default_update_checker(self: &Arc<Self>) -> bool {
        self.start_update_checker(self.config.update_check_interval())
    }

    /// 태스크 종료까지 대기
    pub async fn stop_update_checker(&self) {
        let checker = self.checker.lock().take();
        if let Some(checker) = checker {
            checker.stop().await;
            info!("Update checker stopped");
        }
    }

    pub fn is_update_checker_running(&self) -> bool {
        self.checker
            .lock()
            .as_ref()
            .map(|c| c.is_running())
            .unwrap_or(false)
    }

    // ========================================================================
    // 복원
    // ========================================================================

    /// 인덱스에서 플러그인 복원 (활성 상태였던 것은 다시 활성화)
    ///
    /// 복원에 실패한 항목은 경고만 남기고 인덱스에는 보존한다.
    pub async fn restore(&self) -> Result<usize> {
        let _guard = self.op_lock.lock().await;
        let records = self.index.load().await?;

        let mut restored = 0;
        let mut failed = Vec::new();
        for record in records {
            if self.plugins.read().contains_key(&record.id) {
                continue;
            }
            match self.restore_record(&record).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(plugin_id = %record.id, error = %e, "Failed to restore plugin");
                    failed.push(record);
                }
            }
        }

        *self.unrestored.write() = failed;
        info!("Restored {} plugins", restored);
        Ok(restored)
    }

    async fn restore_record(&self, record: &PluginRecord) -> Result<()> {
        let manifest = &record.manifest;
        self.validate_manifest(manifest)?;
        let module = self.loader.load(&record.source_url, manifest).await?;

        let descriptor = manifest.to_descriptor();
        self.registry
            .register_service(descriptor.clone())?
            .into_result()?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.plugins.write().insert(
            record.id.clone(),
            PluginSlot {
                sequence,
                plugin: Plugin {
                    id: record.id.clone(),
                    manifest: manifest.clone(),
                    descriptor,
                    source_url: record.source_url.clone(),
                    is_installed: true,
                    is_enabled: false,
                    is_updating: false,
                    last_update: record.last_update,
                    last_update_error: None,
                },
                module,
            },
        );

        if record.is_enabled {
            if let Err(e) = self.start_module(&record.id).await {
                warn!(plugin_id = %record.id, error = %e, "Restored plugin left disabled");
            }
        }
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 설치 순서대로
    pub fn get_plugins(&self) -> Vec<Plugin> {
        self.sorted_slots(|_| true)
    }

    pub fn get_plugin(&self, id: &str) -> Option<Plugin> {
        self.plugins.read().get(id).map(|s| s.plugin.clone())
    }

    pub fn get_enabled_plugins(&self) -> Vec<Plugin> {
        self.sorted_slots(|p| p.is_enabled)
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.plugins.read().contains_key(id)
    }

    pub fn module(&self, id: &str) -> Option<Arc<dyn PluginModule>> {
        self.plugins.read().get(id).map(|s| s.module.clone())
    }

    /// 활성 플러그인 모듈 호출
    pub async fn invoke(&self, id: &str, method: &str, params: Value) -> Result<Value> {
        let module = {
            let plugins = self.plugins.read();
            let slot = plugins
                .get(id)
                .ok_or_else(|| Error::not_found("plugin", id))?;
            if !slot.plugin.is_enabled {
                return Err(DeliveryError::NotRunning(format!("plugin {}", id)).into());
            }
            slot.module.clone()
        };
        module.invoke(method, params).await
    }

    pub fn stats(&self) -> PluginStats {
        let plugins = self.plugins.read();
        let enabled = plugins.values().filter(|s| s.plugin.is_enabled).count();
        PluginStats {
            total: plugins.len(),
            enabled,
            disabled: plugins.len() - enabled,
            updating: plugins.values().filter(|s| s.plugin.is_updating).count(),
            failed_updates: plugins
                .values()
                .filter(|s| s.plugin.last_update_error.is_some())
                .count(),
        }
    }

    /// 모든 플러그인 제거 (설치 역순) 후 인덱스 삭제
    pub async fn clear_all(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        let ids: Vec<String> = self
            .get_plugins()
            .into_iter()
            .rev()
            .map(|p| p.id)
            .collect();
        for id in &ids {
            self.remove_locked(id).await?;
        }

        self.unrestored.write().clear();
        self.index.clear().await?;
        info!("Cleared {} plugins", ids.len());
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// 매니페스트 형식, 플랫폼 범위, 의존성 확인
    fn validate_manifest(&self, manifest: &PluginManifest) -> Result<()> {
        manifest.validate(&self.platform).into_result()?;

        for (dependency, raw) in &manifest.dependencies {
            let entry = self.registry.get_service(dependency).ok_or_else(|| {
                DependencyError::Missing {
                    service_id: manifest.id.clone(),
                    dependency: dependency.clone(),
                }
            })?;

            let requirement = VersionRequirement::parse(raw).unwrap_or(VersionRequirement::Any);
            let satisfied = PluginVersion::parse(&entry.descriptor.version)
                .map(|found| requirement.matches(&found))
                .unwrap_or(false);
            if !satisfied {
                return Err(DependencyError::VersionMismatch {
                    service_id: manifest.id.clone(),
                    dependency: dependency.clone(),
                    requirement: requirement.to_string(),
                    found: entry.descriptor.version.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn sorted_slots(&self, filter: impl Fn(&Plugin) -> bool) -> Vec<Plugin> {
        let plugins = self.plugins.read();
        let mut slots: Vec<&PluginSlot> = plugins.values().filter(|s| filter(&s.plugin)).collect();
        slots.sort_by_key(|s| s.sequence);
        slots.into_iter().map(|s| s.plugin.clone()).collect()
    }

    /// 현재 상태의 인덱스 항목 (복원 실패 항목 포함)
    fn records(&self) -> Vec<PluginRecord> {
        let mut records: Vec<PluginRecord> = self.get_plugins().iter().map(record_of).collect();
        records.extend(self.unrestored.read().iter().cloned());
        records
    }

    async fn persist(&self) -> Result<()> {
        self.index.save(&self.records()).await
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if let Some(checker) = self.checker.get_mut().take() {
            checker.cancel();
        }
    }
}

fn record_of(plugin: &Plugin) -> PluginRecord {
    PluginRecord {
        id: plugin.id.clone(),
        manifest: plugin.manifest.clone(),
        is_enabled: plugin.is_enabled,
        last_update: plugin.last_update,
        source_url: plugin.source_url.clone(),
    }
}

/// 적용하지 않을 새 모듈 정리
async fn discard(module: &Arc<dyn PluginModule>, initialized: bool) {
    if initialized {
        if let Err(e) = module.shutdown().await {
            debug!(error = %e, "Discarded module shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nexus_foundation::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeSource {
        manifests: Mutex<HashMap<String, PluginManifest>>,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn publish(&self, url: &str, manifest: PluginManifest) {
            self.manifests.lock().insert(url.to_string(), manifest);
        }

        fn take_down(&self, url: &str) {
            self.manifests.lock().remove(url);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ManifestSource for FakeSource {
        async fn fetch_manifest(&self, url: &str) -> Result<PluginManifest> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.manifests
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Http(format!("connection refused: {}", url)))
        }
    }

    #[derive(Default)]
    struct Lifecycle {
        initialized: AtomicUsize,
        shut_down: AtomicUsize,
    }

    struct FakeModule {
        version: PluginVersion,
        lifecycle: Arc<Lifecycle>,
        fail_init: bool,
    }

    #[async_trait]
    impl PluginModule for FakeModule {
        fn capabilities(&self) -> Vec<String> {
            vec!["forecast".into()]
        }

        async fn initialize(&self) -> Result<()> {
            if self.fail_init {
                return Err(Error::Internal("init failed".into()));
            }
            self.lifecycle.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            self.lifecycle.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn invoke(&self, _method: &str, _params: Value) -> Result<Value> {
            Ok(json!(self.version.to_string()))
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        lifecycle: Arc<Lifecycle>,
        loads: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        broken: Mutex<Vec<String>>,
        failing_init: Mutex<Vec<PluginVersion>>,
    }

    #[async_trait]
    impl ModuleLoader for FakeLoader {
        async fn load(&self, _url: &str, manifest: &PluginManifest) -> Result<Arc<dyn PluginModule>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.lock().contains(&manifest.id) {
                return Err(Error::Internal("module download failed".into()));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeModule {
                version: manifest.version,
                lifecycle: self.lifecycle.clone(),
                fail_init: self.failing_init.lock().contains(&manifest.version),
            }))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }
        async fn remove(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
    }

    /// `failing`이 켜지면 쓰기만 실패
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key).await
        }
    }

    struct Harness {
        registry: Arc<ServiceRegistry>,
        source: Arc<FakeSource>,
        loader: Arc<FakeLoader>,
        store: Arc<MemoryStore>,
        manager: Arc<PluginManager>,
    }

    fn harness_with(config: PluginConfig) -> Harness {
        let registry = Arc::new(ServiceRegistry::new());
        let source = Arc::new(FakeSource::default());
        let loader = Arc::new(FakeLoader::default());
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(
            PluginManager::new(
                config,
                registry.clone(),
                source.clone(),
                loader.clone(),
                store.clone(),
            )
            .unwrap(),
        );
        Harness {
            registry,
            source,
            loader,
            store,
            manager,
        }
    }

    fn harness() -> Harness {
        harness_with(PluginConfig::default())
    }

    fn weather(version: PluginVersion) -> PluginManifest {
        PluginManifest::new("weather", "Weather", version)
            .with_capability("forecast")
            .with_update_url("https://updates.example.com/weather")
    }

    const WEATHER_URL: &str = "https://plugins.example.com/weather";
    const WEATHER_UPDATES: &str = "https://updates.example.com/weather";

    async fn installed(h: &Harness) -> Plugin {
        h.source.publish(WEATHER_URL, weather(PluginVersion::new(1, 0, 0)));
        h.manager.install_plugin(WEATHER_URL).await.unwrap()
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_invalid_platform_version() {
        let result = PluginManager::new(
            PluginConfig {
                platform_version: "next".into(),
                ..PluginConfig::default()
            },
            Arc::new(ServiceRegistry::new()),
            Arc::new(FakeSource::default()),
            Arc::new(FakeLoader::default()),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_install_registers_inactive_and_persists() {
        let h = harness();
        let plugin = installed(&h).await;

        assert!(plugin.is_installed);
        assert!(!plugin.is_enabled);
        let entry = h.registry.get_service("weather").unwrap();
        assert!(!entry.is_active);

        let index = PluginIndex::new(h.store.clone()).load().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].id, "weather");
        assert!(!index[0].is_enabled);
    }

    #[tokio::test]
    async fn test_incompatible_manifest_leaves_no_trace() {
        let h = harness();
        h.source.publish(
            WEATHER_URL,
            weather(PluginVersion::new(1, 0, 0)).with_platform_range(Some("2.0.0"), None),
        );

        let err = h.manager.install_plugin(WEATHER_URL).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(h.manager.get_plugins().is_empty());
        assert!(!h.registry.is_registered("weather"));
        assert_eq!(h.loader.loads.load(Ordering::SeqCst), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_mismatched_dependencies() {
        let h = harness();
        h.source.publish(
            WEATHER_URL,
            weather(PluginVersion::new(1, 0, 0)).with_dependency("location", ">=2.0.0"),
        );

        let err = h.manager.install_plugin(WEATHER_URL).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Dependency(DependencyError::Missing { .. })
        ));

        h.registry
            .register_service(ServiceDescriptor::new("location", "Location", "1.5.0"))
            .unwrap();
        let err = h.manager.install_plugin(WEATHER_URL).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Dependency(DependencyError::VersionMismatch { .. })
        ));
        assert!(h.manager.get_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_module_load_failure_leaves_no_trace() {
        let h = harness();
        h.loader.broken.lock().push("weather".into());
        h.source.publish(WEATHER_URL, weather(PluginVersion::new(1, 0, 0)));

        assert!(h.manager.install_plugin(WEATHER_URL).await.is_err());
        assert!(!h.manager.is_installed("weather"));
        assert!(!h.registry.is_registered("weather"));
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back_registration() {
        let registry = Arc::new(ServiceRegistry::new());
        let source = Arc::new(FakeSource::default());
        source.publish(WEATHER_URL, weather(PluginVersion::new(1, 0, 0)));
        let manager = PluginManager::new(
            PluginConfig::default(),
            registry.clone(),
            source,
            Arc::new(FakeLoader::default()),
            Arc::new(BrokenStore),
        )
        .unwrap();

        assert!(matches!(
            manager.install_plugin(WEATHER_URL).await,
            Err(Error::Storage(_))
        ));
        assert!(!registry.is_registered("weather"));
        assert!(manager.get_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_keeps_plugin_when_index_save_fails() {
        let registry = Arc::new(ServiceRegistry::new());
        let source = Arc::new(FakeSource::default());
        let loader = Arc::new(FakeLoader::default());
        let store = Arc::new(FlakyStore::default());
        source.publish(WEATHER_URL, weather(PluginVersion::new(1, 0, 0)));
        let manager = PluginManager::new(
            PluginConfig::default(),
            registry.clone(),
            source,
            loader.clone(),
            store.clone(),
        )
        .unwrap();
        manager.install_plugin(WEATHER_URL).await.unwrap();
        manager.enable_plugin("weather").await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.uninstall_plugin("weather").await,
            Err(Error::Storage(_))
        ));

        assert!(manager.is_installed("weather"));
        assert!(manager.get_plugin("weather").unwrap().is_enabled);
        assert!(registry.is_active("weather"));
        assert_eq!(loader.lifecycle.shut_down.load(Ordering::SeqCst), 0);
        let index = PluginIndex::new(store.clone()).load().await.unwrap();
        assert_eq!(index.len(), 1);

        store.failing.store(false, Ordering::SeqCst);
        manager.uninstall_plugin("weather").await.unwrap();
        assert!(!registry.is_registered("weather"));
        assert!(PluginIndex::new(store).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_restores_index_when_teardown_fails() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();
        h.registry
            .register_service(
                ServiceDescriptor::new("radar", "Radar", "1.0.0").with_dependency("weather"),
            )
            .unwrap();
        h.registry.activate_service("radar").unwrap();

        assert!(matches!(
            h.manager.uninstall_plugin("weather").await,
            Err(Error::Dependency(DependencyError::ActiveDependents { .. }))
        ));
        assert!(h.manager.is_installed("weather"));
        assert!(h.registry.is_active("weather"));
        let index = PluginIndex::new(h.store.clone()).load().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index[0].is_enabled);
    }

    #[tokio::test]
    async fn test_duplicate_install_rejected() {
        let h = harness();
        installed(&h).await;
        assert!(matches!(
            h.manager.install_plugin(WEATHER_URL).await,
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_installs_are_serialized() {
        let h = harness();
        h.source.publish(WEATHER_URL, weather(PluginVersion::new(1, 0, 0)));

        let (a, b) = tokio::join!(
            h.manager.install_plugin(WEATHER_URL),
            h.manager.install_plugin(WEATHER_URL)
        );
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(h.manager.get_plugins().len(), 1);
        assert_eq!(h.loader.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enable_disable_lifecycle() {
        let h = harness();
        installed(&h).await;

        h.manager.enable_plugin("weather").await.unwrap();
        assert!(h.registry.is_active("weather"));
        assert_eq!(h.manager.get_enabled_plugins().len(), 1);
        assert_eq!(h.loader.lifecycle.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.manager.invoke("weather", "forecast", json!({})).await.unwrap(),
            json!("1.0.0")
        );

        // 이미 활성
        h.manager.enable_plugin("weather").await.unwrap();
        assert_eq!(h.loader.lifecycle.initialized.load(Ordering::SeqCst), 1);

        h.manager.disable_plugin("weather").await.unwrap();
        assert!(!h.registry.is_active("weather"));
        assert_eq!(h.loader.lifecycle.shut_down.load(Ordering::SeqCst), 1);
        assert!(matches!(
            h.manager.invoke("weather", "forecast", json!({})).await,
            Err(Error::Delivery(DeliveryError::NotRunning(_)))
        ));

        let index = PluginIndex::new(h.store.clone()).load().await.unwrap();
        assert!(!index[0].is_enabled);
    }

    #[tokio::test]
    async fn test_enable_requires_active_dependency() {
        let h = harness();
        h.registry
            .register_service(ServiceDescriptor::new("location", "Location", "1.0.0"))
            .unwrap();
        h.source.publish(
            WEATHER_URL,
            weather(PluginVersion::new(1, 0, 0)).with_dependency("location", "*"),
        );
        h.manager.install_plugin(WEATHER_URL).await.unwrap();

        assert!(matches!(
            h.manager.enable_plugin("weather").await,
            Err(Error::Dependency(DependencyError::Inactive { .. }))
        ));
        assert!(!h.manager.get_plugin("weather").unwrap().is_enabled);

        h.registry.activate_service("location").unwrap();
        h.manager.enable_plugin("weather").await.unwrap();
        assert!(h.manager.get_plugin("weather").unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_failed_initialize_keeps_plugin_disabled() {
        let h = harness();
        h.loader.failing_init.lock().push(PluginVersion::new(1, 0, 0));
        installed(&h).await;

        assert!(h.manager.enable_plugin("weather").await.is_err());
        assert!(!h.registry.is_active("weather"));
        assert!(!h.manager.get_plugin("weather").unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_uninstall_removes_everything() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();

        h.manager.uninstall_plugin("weather").await.unwrap();
        assert!(!h.manager.is_installed("weather"));
        assert!(!h.registry.is_registered("weather"));
        assert_eq!(h.loader.lifecycle.shut_down.load(Ordering::SeqCst), 1);
        assert!(PluginIndex::new(h.store.clone()).load().await.unwrap().is_empty());

        assert!(matches!(
            h.manager.uninstall_plugin("weather").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_swaps_module() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();
        h.source.publish(WEATHER_UPDATES, weather(PluginVersion::new(1, 1, 0)));

        let outcome = h.manager.update_plugin("weather").await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                from: PluginVersion::new(1, 0, 0),
                to: PluginVersion::new(1, 1, 0),
            }
        );

        assert_eq!(
            h.manager.invoke("weather", "forecast", json!({})).await.unwrap(),
            json!("1.1.0")
        );
        assert_eq!(h.registry.get_service("weather").unwrap().descriptor.version, "1.1.0");
        assert!(h.registry.is_active("weather"));
        assert_eq!(h.loader.lifecycle.initialized.load(Ordering::SeqCst), 2);
        assert_eq!(h.loader.lifecycle.shut_down.load(Ordering::SeqCst), 1);

        let index = PluginIndex::new(h.store.clone()).load().await.unwrap();
        assert_eq!(index[0].manifest.version, PluginVersion::new(1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_module() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();
        h.source.publish(
            WEATHER_UPDATES,
            weather(PluginVersion::new(2, 0, 0)).with_platform_range(Some("9.0.0"), None),
        );

        let err = h.manager.update_plugin("weather").await.unwrap_err();
        assert!(matches!(err, Error::Update { .. }));

        let plugin = h.manager.get_plugin("weather").unwrap();
        assert_eq!(plugin.version(), PluginVersion::new(1, 0, 0));
        assert!(!plugin.is_updating);
        assert!(plugin.last_update_error.is_some());
        assert!(plugin.is_enabled);
        assert_eq!(
            h.manager.invoke("weather", "forecast", json!({})).await.unwrap(),
            json!("1.0.0")
        );
        assert_eq!(h.manager.stats().failed_updates, 1);
        assert_eq!(h.registry.get_service("weather").unwrap().descriptor.version, "1.0.0");
    }

    #[tokio::test]
    async fn test_failed_new_module_init_rolls_back() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();
        h.loader.failing_init.lock().push(PluginVersion::new(1, 1, 0));
        h.source.publish(WEATHER_UPDATES, weather(PluginVersion::new(1, 1, 0)));

        assert!(h.manager.update_plugin("weather").await.is_err());
        assert_eq!(
            h.manager.invoke("weather", "forecast", json!({})).await.unwrap(),
            json!("1.0.0")
        );
        assert_eq!(h.loader.lifecycle.shut_down.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_up_to_date_and_mismatch() {
        let h = harness();
        installed(&h).await;

        h.source.publish(WEATHER_UPDATES, weather(PluginVersion::new(1, 0, 0)));
        assert_eq!(
            h.manager.update_plugin("weather").await.unwrap(),
            UpdateOutcome::UpToDate {
                version: PluginVersion::new(1, 0, 0)
            }
        );

        let mut impostor = weather(PluginVersion::new(3, 0, 0));
        impostor.id = "other".into();
        h.source.publish(WEATHER_UPDATES, impostor);
        assert!(h.manager.update_plugin("weather").await.is_err());
        assert_eq!(
            h.manager.get_plugin("weather").unwrap().version(),
            PluginVersion::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_check_all_updates_treats_failure_as_false() {
        let h = harness();
        installed(&h).await;

        let results = h.manager.check_all_updates().await;
        assert_eq!(results.get("weather"), Some(&false));

        h.source.publish(WEATHER_UPDATES, weather(PluginVersion::new(1, 2, 0)));
        let results = h.manager.check_all_updates().await;
        assert_eq!(results.get("weather"), Some(&true));
        assert_eq!(
            h.manager.last_update_check().unwrap().pending(),
            vec!["weather".to_string()]
        );
    }

    #[tokio::test]
    async fn test_auto_update_all_is_sequential() {
        let h = harness();
        for id in ["alpha", "beta", "gamma"] {
            let url = format!("https://plugins.example.com/{}", id);
            let updates = format!("https://updates.example.com/{}", id);
            h.source.publish(
                &url,
                PluginManifest::new(id, id, PluginVersion::new(1, 0, 0)).with_update_url(&updates),
            );
            h.manager.install_plugin(&url).await.unwrap();
            h.source.publish(
                &updates,
                PluginManifest::new(id, id, PluginVersion::new(1, 1, 0)).with_update_url(&updates),
            );
        }
        h.loader.broken.lock().push("beta".into());

        let report = h.manager.auto_update_all().await;
        assert_eq!(report.updated, vec!["alpha", "gamma"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "beta");
        assert_eq!(h.loader.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.manager.get_plugin("beta").unwrap().version(),
            PluginVersion::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_restore_from_index() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();

        let registry = Arc::new(ServiceRegistry::new());
        let restarted = PluginManager::new(
            PluginConfig::default(),
            registry.clone(),
            h.source.clone(),
            h.loader.clone(),
            h.store.clone(),
        )
        .unwrap();

        assert_eq!(restarted.restore().await.unwrap(), 1);
        let plugin = restarted.get_plugin("weather").unwrap();
        assert!(plugin.is_enabled);
        assert_eq!(plugin.source_url, WEATHER_URL);
        assert!(registry.is_active("weather"));
    }

    #[tokio::test]
    async fn test_unrestored_records_survive_next_save() {
        let h = harness();
        installed(&h).await;

        let registry = Arc::new(ServiceRegistry::new());
        let loader = Arc::new(FakeLoader::default());
        loader.broken.lock().push("weather".into());
        let restarted = PluginManager::new(
            PluginConfig::default(),
            registry,
            h.source.clone(),
            loader,
            h.store.clone(),
        )
        .unwrap();
        assert_eq!(restarted.restore().await.unwrap(), 0);

        h.source.publish(
            "https://plugins.example.com/radar",
            PluginManifest::new("radar", "Radar", PluginVersion::default()),
        );
        restarted
            .install_plugin("https://plugins.example.com/radar")
            .await
            .unwrap();

        let ids: Vec<String> = PluginIndex::new(h.store.clone())
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["radar", "weather"]);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let h = harness();
        installed(&h).await;
        h.manager.enable_plugin("weather").await.unwrap();

        h.manager.clear_all().await.unwrap();
        assert!(h.manager.get_plugins().is_empty());
        assert!(h.registry.is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_checker_start_and_stop() {
        let h = harness();
        installed(&h).await;
        h.source.take_down(WEATHER_UPDATES);
        let before = h.source.fetches();

        assert!(h.manager.start_update_checker(Duration::from_secs(60)));
        assert!(!h.manager.start_update_checker(Duration::from_secs(60)));
        assert!(h.manager.is_update_checker_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.source.fetches(), before + 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.source.fetches(), before + 2);

        h.manager.stop_update_checker().await;
        assert!(!h.manager.is_update_checker_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.source.fetches(), before + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_checker_auto_updates() {
        let h = harness_with(PluginConfig {
            auto_update: true,
            ..PluginConfig::default()
        });
        installed(&h).await;
        h.source.publish(WEATHER_UPDATES, weather(PluginVersion::new(1, 0, 1)));

        h.manager.start_update_checker(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        h.manager.stop_update_checker().await;

        assert_eq!(
            h.manager.get_plugin("weather").unwrap().version(),
            PluginVersion::new(1, 0, 1)
        );
    }
}
