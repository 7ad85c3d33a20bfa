//! 검증 결과 리포트

use serde::{Deserialize, Serialize};
use std::fmt;

/// 검증 결과 (에러 / 경고 / 제안)
///
/// 스키마 위반은 에러로 던지지 않고 이 리포트로 반환된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// 에러 추가 (is_valid = false)
    pub fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn suggest(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }

    /// 다른 리포트 병합
    pub fn merge(&mut self, other: ValidationReport) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.suggestions.extend(other.suggestions);
    }

    /// 유효하지 않으면 `Error::Validation`으로 변환
    pub fn into_result(self) -> crate::Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(crate::Error::Validation(self))
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "valid ({} warnings)", self.warnings.len())
        } else {
            write!(f, "{}", self.errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_marks_invalid() {
        let mut report = ValidationReport::new();
        report.warn("unknown category");
        assert!(report.is_valid);

        report.error("name is required");
        assert!(!report.is_valid);
        assert_eq!(report.to_string(), "name is required");
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_merge() {
        let mut a = ValidationReport::new();
        a.warn("w1");
        let mut b = ValidationReport::new();
        b.error("e1");
        b.suggest("s1");

        a.merge(b);
        assert!(!a.is_valid);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.warnings.len(), 1);
        assert_eq!(a.suggestions.len(), 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ValidationReport::new()).unwrap();
        assert_eq!(json["isValid"], true);
    }
}
