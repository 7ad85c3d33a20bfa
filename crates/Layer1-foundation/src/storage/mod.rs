//! Storage module for Nexus
//!
//! - `json`: JSON - 범용 파일 저장/로드
//! - `kv`: 문자열 키-값 저장소 포트 (플러그인 인덱스 등)

mod json;
mod kv;

// JSON Storage (범용)
pub use json::JsonStore;

// Key-Value Storage
pub use kv::{FileStore, KeyValueStore, MemoryStore};
