use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde_json::json;

use gatepool_core::modules::AccountRepository;
use gatepool_core::monitor::scheduler::{select_targets, ProbeScheduler};
use gatepool_core::monitor::{ProbeResult, Shutdown};
use gatepool_core::utils::text::truncate_chars;
use gatepool_types::models::{Account, AppConfig, Platform};

use crate::bootstrap;

const TABLE_MESSAGE_CHARS: usize = 120;

pub async fn handle_serve(config: &AppConfig) -> Result<()> {
    let Some(monitor) = bootstrap::build_monitor(config).await? else {
        return Ok(());
    };
    if !monitor.start() {
        tracing::info!("Account monitor not running, nothing to serve");
        return Ok(());
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");
    monitor.stop().await;
    Ok(())
}

/// One-off probe through the production probe path. Never writes.
pub async fn handle_probe(config: &AppConfig, account_ids: Vec<i64>, json: bool) -> Result<()> {
    let repository = bootstrap::connect_repository(config)
        .await?
        .context("No database configured (set GATEPOOL_DATABASE_URL)")?;

    let mut monitor_config = config.gateway.account_monitor.clone();
    if !account_ids.is_empty() {
        monitor_config.include_account_ids = account_ids;
        monitor_config.exclude_account_ids.clear();
        monitor_config.normalize();
    }

    let accounts = repository
        .list_by_platform(Platform::Anthropic)
        .await
        .context("Failed to list accounts")?;
    let targets = select_targets(accounts, &monitor_config);
    if targets.is_empty() {
        println!("{}", "No accounts to probe.".yellow());
        return Ok(());
    }

    let scheduler = ProbeScheduler::new(
        bootstrap::build_prober(config),
        monitor_config.effective_max_concurrency(),
    );
    let results = scheduler.run(&targets, &Shutdown::never()).await.unwrap_or_default();

    if json {
        let rows: Vec<_> = results.iter().map(|(acc, res)| result_json(acc, res)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(&results);
    }
    Ok(())
}

pub fn handle_config(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

fn result_json(account: &Account, result: &ProbeResult) -> serde_json::Value {
    json!({
        "account_id": account.id,
        "name": account.name,
        "schedulable": account.schedulable,
        "success": result.success,
        "latency_ms": result.latency.as_millis() as u64,
        "message": result.message,
    })
}

fn print_table(results: &[(Account, ProbeResult)]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Name", "Schedulable", "Result", "Latency", "Message"]);

    for (acc, res) in results {
        let outcome = if res.success {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(acc.id),
            Cell::new(&acc.name),
            Cell::new(if acc.schedulable { "yes" } else { "no" }),
            outcome,
            Cell::new(format!("{}ms", res.latency.as_millis())),
            Cell::new(if res.message.is_empty() {
                "-".to_string()
            } else {
                truncate_chars(&res.message, TABLE_MESSAGE_CHARS)
            }),
        ]);
    }

    let failed = results.iter().filter(|(_, res)| !res.success).count();
    println!("{table}");
    println!("\n{} probed, {} failed", results.len(), failed);
}
