//! Service Registry - 서비스 등록, 의존성 그래프, 활성 상태
//!
//! 모든 연산은 동기이며 내부 맵 갱신이 끝난 뒤에 리스너를 호출한다.
//! 리스너 안에서 레지스트리를 다시 호출해도 교착되지 않는다.

use super::entry::{ServiceDescriptor, ServiceRegistryEntry};
use super::events::{RegistryEvent, RegistryListener};
use super::validator::ServiceValidator;
use crate::subscription::{SubscriptionId, SubscriptionIds};
use nexus_foundation::{DependencyError, Error, Result, ValidationReport};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 변경 스트림 채널 크기
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 레지스트리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
}

// ============================================================================
// ServiceRegistry
// ============================================================================

pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, ServiceRegistryEntry>>,
    validator: ServiceValidator,
    listeners: RwLock<HashMap<SubscriptionId, RegistryListener>>,
    listener_ids: SubscriptionIds,
    sequence: AtomicU64,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl ServiceRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            validator: ServiceValidator::new(),
            listeners: RwLock::new(HashMap::new()),
            listener_ids: SubscriptionIds::new(),
            sequence: AtomicU64::new(0),
            event_tx,
        }
    }

    // ========================================================================
    // 등록 / 해제
    // ========================================================================

    /// 서비스 등록
    ///
    /// 스키마 위반과 ID 중복은 `is_valid = false` 리포트로 반환된다.
    /// 순환 의존성은 `DependencyError::Cycle`로 거부되며 흔적을 남기지 않는다.
    /// 아직 등록되지 않은 의존성과 충돌 선언은 경고로 남는다.
    pub fn register_service(&self, descriptor: ServiceDescriptor) -> Result<ValidationReport> {
        let mut report = self.validator.validate(&descriptor);
        if !report.is_valid {
            debug!(service_id = %descriptor.id, errors = ?report.errors, "Service rejected by validator");
            return Ok(report);
        }

        let event = {
            let mut entries = self.entries.write();

            if entries.contains_key(&descriptor.id) {
                report.error(format!("service '{}' is already registered", descriptor.id));
                return Ok(report);
            }

            if let Some(path) = find_cycle(&entries, &descriptor) {
                warn!(service_id = %descriptor.id, path = ?path, "Dependency cycle rejected");
                return Err(DependencyError::Cycle { path }.into());
            }

            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            let mut entry = ServiceRegistryEntry::new(descriptor, sequence);

            for link in entry.dependencies.iter_mut() {
                link.satisfied = entries.contains_key(&link.service_id);
                if !link.satisfied {
                    report.warn(format!(
                        "dependency '{}' is not registered yet; activation is blocked until it is",
                        link.service_id
                    ));
                }
            }

            for other in entries.values() {
                if entry.conflicts_with(other) {
                    report.warn(format!("conflicts with registered service '{}'", other.id()));
                }
            }

            let id = entry.id().to_string();
            for other in entries.values_mut() {
                for link in other.dependencies.iter_mut().filter(|l| l.service_id == id) {
                    link.satisfied = true;
                }
            }

            let event = RegistryEvent::Registered {
                service_id: id.clone(),
                version: entry.descriptor.version.clone(),
            };
            entries.insert(id, entry);
            event
        };

        info!(service_id = %event.service_id(), "Service registered");
        self.emit(event);
        Ok(report)
    }

    /// 서비스 등록 해제
    ///
    /// 활성 상태의 서비스가 이 서비스에 의존하고 있으면 거부한다.
    pub fn unregister_service(&self, id: &str) -> Result<()> {
        {
            let mut entries = self.entries.write();
            if !entries.contains_key(id) {
                return Err(Error::not_found("service", id));
            }

            let dependents = active_dependents(&entries, id);
            if !dependents.is_empty() {
                return Err(DependencyError::ActiveDependents {
                    service_id: id.to_string(),
                    dependents,
                }
                .into());
            }

            entries.remove(id);
            for other in entries.values_mut() {
                for link in other.dependencies.iter_mut().filter(|l| l.service_id == id) {
                    link.satisfied = false;
                }
            }
        }

        info!(service_id = %id, "Service unregistered");
        self.emit(RegistryEvent::Unregistered {
            service_id: id.to_string(),
        });
        Ok(())
    }

    /// 등록된 서비스의 디스크립터 교체 (활성 상태와 등록 순번 유지)
    ///
    /// 활성 서비스라면 새 의존성도 모두 활성이어야 하고 활성 충돌 서비스가 없어야 한다.
    pub fn update_service(&self, descriptor: ServiceDescriptor) -> Result<ValidationReport> {
        let mut report = self.validator.validate(&descriptor);
        if !report.is_valid {
            return Ok(report);
        }

        let event = {
            let mut entries = self.entries.write();
            let previous = entries
                .get(&descriptor.id)
                .ok_or_else(|| Error::not_found("service", &descriptor.id))?;

            if let Some(path) = find_cycle(&entries, &descriptor) {
                return Err(DependencyError::Cycle { path }.into());
            }

            let mut entry = ServiceRegistryEntry::new(descriptor, previous.sequence);
            entry.is_active = previous.is_active;
            entry.registered_at = previous.registered_at;

            for link in entry.dependencies.iter_mut() {
                let dependency = entries.get(&link.service_id);
                link.satisfied = dependency.is_some();
                if entry.is_active && !dependency.map(|d| d.is_active).unwrap_or(false) {
                    return Err(DependencyError::Inactive {
                        service_id: entry.descriptor.id.clone(),
                        dependency: link.service_id.clone(),
                    }
                    .into());
                }
                if !link.satisfied {
                    report.warn(format!("dependency '{}' is not registered", link.service_id));
                }
            }

            if entry.is_active {
                if let Some(other) = entries.values().find(|other| {
                    other.is_active && other.id() != entry.id() && entry.conflicts_with(other)
                }) {
                    return Err(DependencyError::Conflict {
                        service_id: entry.id().to_string(),
                        other: other.id().to_string(),
                    }
                    .into());
                }
            }

            let event = RegistryEvent::Updated {
                service_id: entry.id().to_string(),
                version: entry.descriptor.version.clone(),
            };
            entries.insert(entry.id().to_string(), entry);
            event
        };

        info!(service_id = %event.service_id(), "Service updated");
        self.emit(event);
        Ok(report)
    }

    // ========================================================================
    // 의존성 그래프
    // ========================================================================

    /// 전이 의존성을 위상 정렬 순서로 반환 (의존 대상이 먼저, 자신은 제외)
    pub fn resolve_dependency_tree(&self, id: &str) -> Result<Vec<String>> {
        let entries = self.entries.read();
        if !entries.contains_key(id) {
            return Err(Error::not_found("service", id));
        }

        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = vec![id.to_string()];
        visit(&entries, id, &mut stack, &mut done, &mut order)?;

        order.retain(|s| s != id);
        Ok(order)
    }

    /// 이 서비스에 의존하는 서비스 ID 목록
    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        let entries = self.entries.read();
        let mut dependents: Vec<&ServiceRegistryEntry> =
            entries.values().filter(|e| e.depends_on(id)).collect();
        dependents.sort_by_key(|e| e.sequence);
        dependents.into_iter().map(|e| e.id().to_string()).collect()
    }

    /// 충돌 관계에 있는 등록 서비스 ID 목록
    pub fn check_conflicts(&self, id: &str) -> Vec<String> {
        let entries = self.entries.read();
        let Some(entry) = entries.get(id) else {
            return Vec::new();
        };

        let mut conflicts: Vec<&ServiceRegistryEntry> = entries
            .values()
            .filter(|other| other.id() != id && entry.conflicts_with(other))
            .collect();
        conflicts.sort_by_key(|e| e.sequence);
        conflicts.into_iter().map(|e| e.id().to_string()).collect()
    }

    // ========================================================================
    // 활성화 / 비활성화
    // ========================================================================

    /// 서비스 활성화 (모든 의존성이 활성이고 활성 충돌 서비스가 없어야 함)
    pub fn activate_service(&self, id: &str) -> Result<()> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .get(id)
                .ok_or_else(|| Error::not_found("service", id))?;

            if entry.is_active {
                return Ok(());
            }

            for link in &entry.dependencies {
                match entries.get(&link.service_id) {
                    None => {
                        return Err(DependencyError::Missing {
                            service_id: id.to_string(),
                            dependency: link.service_id.clone(),
                        }
                        .into())
                    }
                    Some(dep) if !dep.is_active => {
                        return Err(DependencyError::Inactive {
                            service_id: id.to_string(),
                            dependency: link.service_id.clone(),
                        }
                        .into())
                    }
                    Some(_) => {}
                }
            }

            if let Some(other) = entries
                .values()
                .find(|other| other.is_active && other.id() != id && entry.conflicts_with(other))
            {
                return Err(DependencyError::Conflict {
                    service_id: id.to_string(),
                    other: other.id().to_string(),
                }
                .into());
            }

            if let Some(entry) = entries.get_mut(id) {
                entry.set_active(true);
            }
        }

        info!(service_id = %id, "Service activated");
        self.emit(RegistryEvent::Activated {
            service_id: id.to_string(),
        });
        Ok(())
    }

    /// 의존성 트리를 순서대로 활성화한 뒤 자신을 활성화
    pub fn activate_with_dependencies(&self, id: &str) -> Result<Vec<String>> {
        let mut order = self.resolve_dependency_tree(id)?;
        order.push(id.to_string());

        let mut activated = Vec::new();
        for service_id in &order {
            if !self.is_active(service_id) {
                self.activate_service(service_id)?;
                activated.push(service_id.clone());
            }
        }
        Ok(activated)
    }

    /// 서비스 비활성화 (활성 의존 서비스가 남아 있으면 거부)
    pub fn deactivate_service(&self, id: &str) -> Result<()> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .get(id)
                .ok_or_else(|| Error::not_found("service", id))?;

            if !entry.is_active {
                return Ok(());
            }

            let dependents = active_dependents(&entries, id);
            if !dependents.is_empty() {
                return Err(DependencyError::ActiveDependents {
                    service_id: id.to_string(),
                    dependents,
                }
                .into());
            }

            if let Some(entry) = entries.get_mut(id) {
                entry.set_active(false);
            }
        }

        info!(service_id = %id, "Service deactivated");
        self.emit(RegistryEvent::Deactivated {
            service_id: id.to_string(),
        });
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get_service(&self, id: &str) -> Option<ServiceRegistryEntry> {
        self.entries.read().get(id).cloned()
    }

    /// 등록 순서대로 전체 서비스
    pub fn get_all_services(&self) -> Vec<ServiceRegistryEntry> {
        let mut all: Vec<ServiceRegistryEntry> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|e| e.sequence);
        all
    }

    pub fn get_active_services(&self) -> Vec<ServiceRegistryEntry> {
        self.get_all_services()
            .into_iter()
            .filter(|e| e.is_active)
            .collect()
    }

    /// 특정 기능을 제공하는 서비스
    pub fn find_by_capability(&self, capability: &str) -> Vec<ServiceRegistryEntry> {
        self.get_all_services()
            .into_iter()
            .filter(|e| e.capabilities.has(capability))
            .collect()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.entries.read().get(id).map(|e| e.is_active).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        RegistryStats {
            total: entries.len(),
            active: entries.values().filter(|e| e.is_active).count(),
        }
    }

    // ========================================================================
    // 이벤트
    // ========================================================================

    /// 동기 리스너 등록
    pub fn subscribe(&self, listener: RegistryListener) -> SubscriptionId {
        let id = self.listener_ids.next();
        self.listeners.write().insert(id, listener);
        debug!(listener_id = %id, "Registry listener added");
        id
    }

    /// 리스너 해제 (여러 번 호출해도 안전)
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// 변경 스트림 수신자
    pub fn receiver(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        let mut listeners: Vec<(SubscriptionId, RegistryListener)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, l.clone()))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);

        for (_, listener) in listeners {
            listener(&event);
        }

        // 수신자가 없으면 send가 실패하지만 무시
        let _ = self.event_tx.send(event);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 그래프 헬퍼
// ============================================================================

fn active_dependents(entries: &HashMap<String, ServiceRegistryEntry>, id: &str) -> Vec<String> {
    let mut dependents: Vec<&ServiceRegistryEntry> = entries
        .values()
        .filter(|e| e.is_active && e.depends_on(id))
        .collect();
    dependents.sort_by_key(|e| e.sequence);
    dependents.into_iter().map(|e| e.id().to_string()).collect()
}

/// 후보의 의존성을 따라가다 후보 자신에 도달하면 그 경로를 반환
fn find_cycle(
    entries: &HashMap<String, ServiceRegistryEntry>,
    candidate: &ServiceDescriptor,
) -> Option<Vec<String>> {
    let mut path = vec![candidate.id.clone()];
    let mut visited = HashSet::new();

    for dep in &candidate.dependencies {
        if reaches(entries, &candidate.id, dep, &mut path, &mut visited) {
            return Some(path);
        }
    }
    None
}

fn reaches(
    entries: &HashMap<String, ServiceRegistryEntry>,
    target: &str,
    current: &str,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    path.push(current.to_string());
    if current == target {
        return true;
    }

    if visited.insert(current.to_string()) {
        if let Some(entry) = entries.get(current) {
            for link in &entry.dependencies {
                if reaches(entries, target, &link.service_id, path, visited) {
                    return true;
                }
            }
        }
    }

    path.pop();
    false
}

/// 후위 순회 DFS (stack = 현재 경로, done = 완료 노드)
fn visit(
    entries: &HashMap<String, ServiceRegistryEntry>,
    id: &str,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    let Some(entry) = entries.get(id) else {
        return Ok(());
    };

    for link in &entry.dependencies {
        let dep = link.service_id.as_str();
        if done.contains(dep) {
            continue;
        }
        if let Some(pos) = stack.iter().position(|s| s == dep) {
            let mut path = stack[pos..].to_vec();
            path.push(dep.to_string());
            return Err(DependencyError::Cycle { path }.into());
        }
        if !entries.contains_key(dep) {
            return Err(DependencyError::Missing {
                service_id: id.to_string(),
                dependency: dep.to_string(),
            }
            .into());
        }

        stack.push(dep.to_string());
        visit(entries, dep, stack, done, order)?;
        stack.pop();
    }

    done.insert(id.to_string());
    order.push(id.to_string());
    Ok(())
}
