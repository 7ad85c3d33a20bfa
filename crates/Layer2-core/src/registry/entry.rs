//! Registry Entry - 서비스 디스크립터와 레지스트리 항목

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// ServiceDescriptor - 서비스 정적 선언
// ============================================================================

/// 서비스의 정체성, 기능, 의존성 선언
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// 고유 ID
    pub id: String,

    /// 표시 이름
    pub name: String,

    /// 버전 (x.y.z)
    pub version: String,

    /// 카테고리 (ai, utility, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// 우선순위 (0..=1000)
    #[serde(default)]
    pub priority: i64,

    /// 제공 기능 이름
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// 의존하는 서비스 ID
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 함께 활성화될 수 없는 서비스 ID
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            category: None,
            description: String::new(),
            author: None,
            priority: 0,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_dependency(mut self, service_id: impl Into<String>) -> Self {
        self.dependencies.push(service_id.into());
        self
    }

    pub fn with_conflict(mut self, service_id: impl Into<String>) -> Self {
        self.conflicts.push(service_id.into());
        self
    }
}

// ============================================================================
// ServiceCapabilities - 정규화된 기능 집합
// ============================================================================

/// 선언된 기능을 trim + 소문자 + 중복 제거한 집합
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCapabilities(BTreeSet<String>);

impl ServiceCapabilities {
    pub fn from_declared(declared: &[String]) -> Self {
        Self(
            declared
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    pub fn has(&self, capability: &str) -> bool {
        self.0.contains(&capability.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// DependencyLink - 해석된 의존성
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    pub service_id: String,

    /// 의존 대상이 현재 등록되어 있는지
    pub satisfied: bool,
}

// ============================================================================
// ServiceRegistryEntry - 레지스트리 항목
// ============================================================================

/// 레지스트리가 보관하는 항목
///
/// 외부에는 복제본만 전달되며 변경은 레지스트리 메서드로만 가능하다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistryEntry {
    pub descriptor: ServiceDescriptor,
    pub capabilities: ServiceCapabilities,
    pub dependencies: Vec<DependencyLink>,
    pub is_registered: bool,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    /// 등록 순번
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl ServiceRegistryEntry {
    pub(crate) fn new(descriptor: ServiceDescriptor, sequence: u64) -> Self {
        let now = Utc::now();
        let dependencies = {
            let mut seen = BTreeSet::new();
            descriptor
                .dependencies
                .iter()
                .filter(|d| seen.insert(d.as_str()))
                .map(|d| DependencyLink {
                    service_id: d.clone(),
                    satisfied: false,
                })
                .collect()
        };

        Self {
            capabilities: ServiceCapabilities::from_declared(&descriptor.capabilities),
            descriptor,
            dependencies,
            is_registered: true,
            is_active: false,
            registered_at: now,
            last_updated: now,
            sequence,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn depends_on(&self, service_id: &str) -> bool {
        self.dependencies.iter().any(|d| d.service_id == service_id)
    }

    /// 양방향 충돌 선언 확인
    pub fn conflicts_with(&self, other: &ServiceRegistryEntry) -> bool {
        self.descriptor.conflicts.iter().any(|c| c == other.id())
            || other.descriptor.conflicts.iter().any(|c| c == self.id())
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_normalized() {
        let caps = ServiceCapabilities::from_declared(&[
            " Search ".to_string(),
            "search".to_string(),
            "".to_string(),
            "Index".to_string(),
        ]);
        assert_eq!(caps.len(), 2);
        assert!(caps.has("SEARCH"));
        assert!(caps.has("index"));
    }

    #[test]
    fn test_entry_dedups_dependencies() {
        let descriptor = ServiceDescriptor::new("pricing", "Pricing", "1.0.0")
            .with_dependency("catalog")
            .with_dependency("catalog");
        let entry = ServiceRegistryEntry::new(descriptor, 1);

        assert_eq!(entry.dependencies.len(), 1);
        assert!(entry.depends_on("catalog"));
        assert!(entry.is_registered);
        assert!(!entry.is_active);
    }

    #[test]
    fn test_conflicts_are_symmetric() {
        let a = ServiceRegistryEntry::new(
            ServiceDescriptor::new("a", "A", "1.0.0").with_conflict("b"),
            1,
        );
        let b = ServiceRegistryEntry::new(ServiceDescriptor::new("b", "B", "1.0.0"), 2);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }
}
