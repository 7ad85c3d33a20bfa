//! # Plugin System
//!
//! 원격 매니페스트로 설치되는 플러그인과 그 라이프사이클
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     PluginManager                        │
//! │   install / enable / disable / uninstall / update        │
//! │        │                 │                   │           │
//! │        ▼                 ▼                   ▼           │
//! │  ManifestSource     ModuleLoader       PluginIndex       │
//! │  (HTTP, fake)       (declarative,      (KeyValueStore)   │
//! │                      static)                             │
//! │        │                                                 │
//! │        ▼                                                 │
//! │  ServiceRegistry (플러그인 = 서비스)   UpdateChecker      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let manager = Arc::new(PluginManager::new(
//!     config.plugins.clone(),
//!     registry,
//!     Arc::new(HttpManifestSource::new()),
//!     Arc::new(DeclarativeModuleLoader::new()),
//!     Arc::new(FileStore::global()?),
//! )?);
//!
//! manager.restore().await?;
//! let plugin = manager.install_plugin("https://plugins.example.com/weather").await?;
//! manager.enable_plugin(&plugin.id).await?;
//! manager.start_default_update_checker();
//! ```

mod loader;
mod manager;
mod manifest;
mod store;
mod traits;
mod updater;

pub use loader::{
    manifest_url, DeclarativeModuleLoader, HttpManifestSource, ModuleFactory, StaticModuleLoader,
    MANIFEST_FILE,
};
pub use manager::{AutoUpdateReport, Plugin, PluginManager, PluginStats, UpdateOutcome};
pub use manifest::{PluginManifest, PluginVersion, VersionRequirement};
pub use store::{PluginIndex, PluginRecord, PLUGIN_INDEX_KEY};
pub use traits::{ManifestSource, ModuleLoader, PluginModule};
pub use updater::UpdateCheck;
