//! `nexus plugins` 명령

use crate::PluginAction;
use nexus_core::{Orchestrator, Plugin, UpdateOutcome};

pub(crate) async fn run(nexus: &Orchestrator, action: PluginAction) -> anyhow::Result<()> {
    let plugins = nexus.plugins();
    let restored = plugins.restore().await?;
    tracing::debug!("Restored {} plugins", restored);

    match action {
        PluginAction::List => {
            let installed = plugins.get_plugins();
            if installed.is_empty() {
                println!("No plugins installed.");
                return Ok(());
            }
            for plugin in &installed {
                print_plugin(plugin);
            }
            let stats = plugins.stats();
            println!(
                "\n{} installed, {} enabled, {} disabled",
                stats.total, stats.enabled, stats.disabled
            );
        }
        PluginAction::Install { url, enable } => {
            let plugin = plugins.install_plugin(&url).await?;
            println!("✓ Installed {} v{}", plugin.id, plugin.version());
            if enable {
                plugins.enable_plugin(&plugin.id).await?;
                println!("✓ Enabled {}", plugin.id);
            }
        }
        PluginAction::Enable { id } => {
            plugins.enable_plugin(&id).await?;
            println!("✓ Enabled {}", id);
        }
        PluginAction::Disable { id } => {
            plugins.disable_plugin(&id).await?;
            println!("✓ Disabled {}", id);
        }
        PluginAction::Uninstall { id } => {
            plugins.uninstall_plugin(&id).await?;
            println!("✓ Uninstalled {}", id);
        }
        PluginAction::Update { id: Some(id) } => match plugins.update_plugin(&id).await? {
            UpdateOutcome::Updated { from, to } => println!("✓ Updated {} {} -> {}", id, from, to),
            UpdateOutcome::UpToDate { version } => println!("{} is up to date (v{})", id, version),
        },
        PluginAction::Update { id: None } => {
            let report = plugins.auto_update_all().await;
            for id in &report.updated {
                println!("✓ Updated {}", id);
            }
            for (id, reason) in &report.failed {
                println!("✗ {}: {}", id, reason);
            }
            if report.updated.is_empty() && report.failed.is_empty() {
                println!("All plugins are up to date.");
            }
        }
        PluginAction::CheckUpdates => {
            let results = plugins.check_all_updates().await;
            if results.is_empty() {
                println!("No plugins installed.");
            }
            for (id, available) in results {
                let status = if available { "update available" } else { "up to date" };
                println!("{:<24} {}", id, status);
            }
        }
    }

    Ok(())
}

fn print_plugin(plugin: &Plugin) {
    let status = if plugin.is_enabled { "enabled" } else { "disabled" };
    println!(
        "{:<24} v{:<10} {:<9} {}",
        plugin.id,
        plugin.version().to_string(),
        status,
        plugin.manifest.description
    );
    if let Some(error) = &plugin.last_update_error {
        println!("    last update failed: {}", error);
    }
}
