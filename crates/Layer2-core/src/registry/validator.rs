//! Service Validator - 디스크립터 형태/의미 검사
//!
//! 순수 함수만 포함한다. 레지스트리 상태(중복 ID, 순환)는 레지스트리가 검사한다.

use super::entry::ServiceDescriptor;
use nexus_foundation::ValidationReport;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// 알려진 서비스 카테고리
pub const VALID_CATEGORIES: &[&str] = &[
    "ai",
    "utility",
    "communication",
    "productivity",
    "entertainment",
    "system",
    "settings",
    "file",
    "time",
    "transcription",
    "chat",
    "rewrite",
    "summary",
    "translation",
    "commands",
    "create",
    "upload",
    "search",
    "organize",
    "analysis",
    "generation",
    "actions",
    "business",
];

/// 우선순위 상한
pub const MAX_PRIORITY: i64 = 1000;

/// 설명 최소 권장 길이
const MIN_DESCRIPTION_LEN: usize = 10;

static SERVICE_ID: OnceLock<Option<Regex>> = OnceLock::new();
static VERSION: OnceLock<Option<Regex>> = OnceLock::new();

fn pattern_matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

pub fn is_valid_service_id(id: &str) -> bool {
    pattern_matches(&SERVICE_ID, r"^[a-zA-Z0-9_-]+$", id)
}

pub fn is_valid_version(version: &str) -> bool {
    pattern_matches(&VERSION, r"^[0-9]+\.[0-9]+\.[0-9]+$", version)
}

// ============================================================================
// ServiceValidator
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ServiceValidator;

impl ServiceValidator {
    pub fn new() -> Self {
        Self
    }

    /// 디스크립터 검증
    pub fn validate(&self, descriptor: &ServiceDescriptor) -> ValidationReport {
        let mut report = ValidationReport::new();

        self.check_required(descriptor, &mut report);
        self.check_format(descriptor, &mut report);
        self.check_relations(descriptor, &mut report);
        self.check_capabilities(descriptor, &mut report);
        self.suggest(descriptor, &mut report);

        report
    }

    fn check_required(&self, d: &ServiceDescriptor, report: &mut ValidationReport) {
        if d.id.trim().is_empty() {
            report.error("id is required");
        }
        if d.name.trim().is_empty() {
            report.error("name is required");
        }
        if d.version.trim().is_empty() {
            report.error("version is required");
        }
    }

    fn check_format(&self, d: &ServiceDescriptor, report: &mut ValidationReport) {
        if !d.id.is_empty() && !is_valid_service_id(&d.id) {
            report.error(format!(
                "invalid service id '{}': only letters, digits, '-' and '_' are allowed",
                d.id
            ));
        }

        if !d.version.is_empty() && !is_valid_version(&d.version) {
            report.error(format!(
                "invalid version '{}': expected MAJOR.MINOR.PATCH",
                d.version
            ));
        }

        if let Some(category) = &d.category {
            if !VALID_CATEGORIES.contains(&category.as_str()) {
                report.warn(format!("unknown category '{}'", category));
            }
        }

        if !(0..=MAX_PRIORITY).contains(&d.priority) {
            report.warn(format!(
                "priority {} is outside 0..={}",
                d.priority, MAX_PRIORITY
            ));
        }
    }

    fn check_relations(&self, d: &ServiceDescriptor, report: &mut ValidationReport) {
        let mut seen = HashSet::new();
        for dep in &d.dependencies {
            if dep.trim().is_empty() {
                report.error("dependency id must not be empty");
                continue;
            }
            if !is_valid_service_id(dep) {
                report.warn(format!("dependency '{}' is not a valid service id", dep));
            }
            if !seen.insert(dep.as_str()) {
                report.warn(format!("dependency '{}' is declared twice", dep));
            }
        }

        for conflict in &d.conflicts {
            if conflict.trim().is_empty() {
                report.error("conflict id must not be empty");
                continue;
            }
            if conflict == &d.id {
                report.error(format!("service '{}' cannot conflict with itself", d.id));
            }
            if d.dependencies.contains(conflict) {
                report.error(format!(
                    "'{}' is declared as both dependency and conflict",
                    conflict
                ));
            }
        }
    }

    fn check_capabilities(&self, d: &ServiceDescriptor, report: &mut ValidationReport) {
        if d.capabilities.iter().any(|c| c.trim().is_empty()) {
            report.error("capability names must not be empty");
        }
    }

    fn suggest(&self, d: &ServiceDescriptor, report: &mut ValidationReport) {
        if d.description.trim().len() < MIN_DESCRIPTION_LEN {
            report.suggest("add a more detailed description");
        }
        if d.author.is_none() {
            report.suggest("declare an author");
        }
        if d.capabilities.is_empty() {
            report.suggest("declare at least one capability");
        }
    }
}
