//! Plugin Manifest - 원격 플러그인 메타데이터

use crate::registry::{is_valid_service_id, ServiceDescriptor};
use nexus_foundation::ValidationReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// PluginVersion
// ============================================================================

/// 플러그인 버전 (major.minor.patch 순으로 비교)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// 버전 문자열 파싱 (예: "1.2.3", "v1.2.3")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            major: parts[0].parse().ok()?,
            minor: parts[1].parse().ok()?,
            patch: parts[2].parse().ok()?,
        })
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl TryFrom<String> for PluginVersion {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid version '{}'", value))
    }
}

impl From<PluginVersion> for String {
    fn from(version: PluginVersion) -> Self {
        version.to_string()
    }
}

// ============================================================================
// VersionRequirement
// ============================================================================

/// 의존성 버전 조건: `*`, `1.2.3`, `>=1.2.3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRequirement {
    Any,
    Exact(PluginVersion),
    AtLeast(PluginVersion),
}

impl VersionRequirement {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Some(Self::Any);
        }
        match s.strip_prefix(">=") {
            Some(rest) => PluginVersion::parse(rest).map(Self::AtLeast),
            None => PluginVersion::parse(s.strip_prefix('=').unwrap_or(s)).map(Self::Exact),
        }
    }

    pub fn matches(&self, version: &PluginVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => version == v,
            Self::AtLeast(v) => version >= v,
        }
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) => write!(f, "{}", v),
            Self::AtLeast(v) => write!(f, ">={}", v),
        }
    }
}

// ============================================================================
// PluginManifest
// ============================================================================

/// 플러그인 매니페스트 (`{url}/manifest.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// 고유 플러그인 ID (서비스 ID로도 사용)
    pub id: String,

    pub name: String,

    pub version: PluginVersion,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// 제공 기능
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// 의존 서비스 ID -> 버전 조건
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub conflicts: Vec<String>,

    /// 업데이트 확인 위치 (없으면 업데이트 불가)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_platform_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_platform_version: Option<String>,
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: PluginVersion) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version,
            description: String::new(),
            author: None,
            homepage: None,
            license: None,
            category: None,
            keywords: Vec::new(),
            capabilities: Vec::new(),
            dependencies: BTreeMap::new(),
            conflicts: Vec::new(),
            update_url: None,
            min_platform_version: None,
            max_platform_version: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.dependencies.insert(id.into(), requirement.into());
        self
    }

    pub fn with_conflict(mut self, id: impl Into<String>) -> Self {
        self.conflicts.push(id.into());
        self
    }

    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = Some(url.into());
        self
    }

    pub fn with_platform_range(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_platform_version = min.map(str::to_string);
        self.max_platform_version = max.map(str::to_string);
        self
    }

    /// 레지스트리에 등록할 디스크립터
    pub fn to_descriptor(&self) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new(&self.id, &self.name, self.version.to_string())
            .with_description(&self.description);
        descriptor.category = self.category.clone();
        descriptor.author = self.author.clone();
        descriptor.capabilities = self.capabilities.clone();
        descriptor.dependencies = self.dependencies.keys().cloned().collect();
        descriptor.conflicts = self.conflicts.clone();
        descriptor
    }

    /// 형식 및 플랫폼 호환성 검사
    pub fn validate(&self, platform: &PluginVersion) -> ValidationReport {
        let mut report = ValidationReport::new();

        if !is_valid_service_id(&self.id) {
            report.error(format!("invalid plugin id '{}'", self.id));
        }
        if self.name.trim().is_empty() {
            report.error("plugin name is required");
        }

        for (field, bound) in [
            ("minPlatformVersion", &self.min_platform_version),
            ("maxPlatformVersion", &self.max_platform_version),
        ] {
            let Some(raw) = bound else { continue };
            let Some(bound) = PluginVersion::parse(raw) else {
                report.error(format!("{} '{}' is not a valid version", field, raw));
                continue;
            };

            let compatible = if field == "minPlatformVersion" {
                *platform >= bound
            } else {
                *platform <= bound
            };
            if !compatible {
                report.error(format!(
                    "platform {} is outside the supported range ({} {})",
                    platform, field, bound
                ));
            }
        }

        for (id, requirement) in &self.dependencies {
            if id == &self.id {
                report.error("plugin cannot depend on itself");
            }
            if VersionRequirement::parse(requirement).is_none() {
                report.error(format!(
                    "dependency '{}' has invalid version requirement '{}'",
                    id, requirement
                ));
            }
        }

        if self.update_url.is_none() {
            report.suggest("set updateUrl to receive updates");
        }

        report
    }
}
