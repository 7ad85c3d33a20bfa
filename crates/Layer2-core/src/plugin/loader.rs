//! Plugin Loader - 매니페스트 조회와 모듈 로더 구현

use super::manifest::PluginManifest;
use super::traits::{ManifestSource, ModuleLoader, PluginModule};
use async_trait::async_trait;
use nexus_foundation::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "manifest.json";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// `{url}/manifest.json` (이미 .json으로 끝나면 그대로)
pub fn manifest_url(url: &str) -> String {
    if url.ends_with(".json") {
        url.to_string()
    } else {
        format!("{}/{}", url.trim_end_matches('/'), MANIFEST_FILE)
    }
}

// ============================================================================
// HttpManifestSource
// ============================================================================

/// HTTP GET으로 매니페스트 조회
pub struct HttpManifestSource {
    client: Client,
    timeout: Duration,
}

impl HttpManifestSource {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpManifestSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_manifest(&self, url: &str) -> Result<PluginManifest> {
        let target = manifest_url(url);
        debug!("Fetching manifest from {}", target);

        let response = self
            .client
            .get(&target)
            .header("User-Agent", "Nexus")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Failed to fetch {}: HTTP {}",
                target,
                response.status()
            )));
        }

        response
            .json::<PluginManifest>()
            .await
            .map_err(|e| Error::Http(format!("Invalid manifest at {}: {}", target, e)))
    }
}

// ============================================================================
// DeclarativeModuleLoader
// ============================================================================

/// 매니페스트에 선언된 기능만으로 모듈을 구성
///
/// 실행 코드를 받지 않는 호스트(CLI 등)에서 사용한다.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeModuleLoader;

impl DeclarativeModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModuleLoader for DeclarativeModuleLoader {
    async fn load(&self, _url: &str, manifest: &PluginManifest) -> Result<Arc<dyn PluginModule>> {
        Ok(Arc::new(DeclarativeModule {
            manifest: manifest.clone(),
            initialized: AtomicBool::new(false),
        }))
    }
}

struct DeclarativeModule {
    manifest: PluginManifest,
    initialized: AtomicBool,
}

#[async_trait]
impl PluginModule for DeclarativeModule {
    fn capabilities(&self) -> Vec<String> {
        self.manifest.capabilities.clone()
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn invoke(&self, method: &str, _params: Value) -> Result<Value> {
        match method {
            "describe" => Ok(json!({
                "id": self.manifest.id,
                "version": self.manifest.version,
                "capabilities": self.manifest.capabilities,
                "initialized": self.initialized.load(Ordering::SeqCst),
            })),
            "capabilities" => Ok(json!(self.manifest.capabilities)),
            _ => Err(Error::not_found(
                "method",
                format!("{}.{}", self.manifest.id, method),
            )),
        }
    }
}

// ============================================================================
// StaticModuleLoader
// ============================================================================

/// 매니페스트로 모듈을 만드는 팩토리
pub type ModuleFactory = Arc<dyn Fn(&PluginManifest) -> Arc<dyn PluginModule> + Send + Sync>;

/// 플러그인 ID별로 미리 링크된 모듈 팩토리
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, plugin_id: impl Into<String>, factory: ModuleFactory) -> Self {
        self.factories.insert(plugin_id.into(), factory);
        self
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, _url: &str, manifest: &PluginManifest) -> Result<Arc<dyn PluginModule>> {
        let factory = self
            .factories
            .get(&manifest.id)
            .ok_or_else(|| Error::not_found("module", &manifest.id))?;
        Ok(factory(manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::PluginVersion;

    fn manifest() -> PluginManifest {
        PluginManifest::new("weather", "Weather", PluginVersion::new(1, 0, 0))
            .with_capability("forecast")
    }

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://plugins.example.com/weather/"),
            "https://plugins.example.com/weather/manifest.json"
        );
        assert_eq!(
            manifest_url("https://plugins.example.com/weather/v2.json"),
            "https://plugins.example.com/weather/v2.json"
        );
    }

    #[tokio::test]
    async fn test_declarative_module() {
        let module = DeclarativeModuleLoader::new()
            .load("mem://weather", &manifest())
            .await
            .unwrap();
        assert_eq!(module.capabilities(), vec!["forecast"]);

        module.initialize().await.unwrap();
        let described = module.invoke("describe", Value::Null).await.unwrap();
        assert_eq!(described["initialized"], true);
        assert_eq!(described["version"], "1.0.0");

        assert!(module.invoke("launch", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_static_loader() {
        let loader = StaticModuleLoader::new().with_module(
            "weather",
            Arc::new(|m: &PluginManifest| -> Arc<dyn PluginModule> {
                Arc::new(DeclarativeModule {
                    manifest: m.clone(),
                    initialized: AtomicBool::new(false),
                })
            }),
        );
        assert!(loader.contains("weather"));
        assert!(loader.load("mem://weather", &manifest()).await.is_ok());

        let other = PluginManifest::new("other", "Other", PluginVersion::default());
        assert!(matches!(
            loader.load("mem://other", &other).await,
            Err(Error::NotFound { kind: "module", .. })
        ));
    }
}
