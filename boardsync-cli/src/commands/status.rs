//! `boardsync status` — baseline visibility.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use boardsync_core::{baseline, Baseline, Config};

/// Arguments for `boardsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let sync_root = config.sync_path();
        let (baseline, _) = baseline::load(&sync_root, config.baseline_prefix())
            .context("failed to load the baseline file")?;

        if self.json {
            print_json(&baseline)?;
            return Ok(());
        }

        print_table(&baseline);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "kind")]
    kind: &'static str,
    #[tabled(rename = "uid")]
    uid: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "version")]
    version: String,
}

#[derive(Serialize)]
struct EntityJson {
    kind: &'static str,
    uid: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
}

fn rows(baseline: &Baseline) -> Vec<EntityJson> {
    let mut rows = Vec::new();

    for (uid, meta) in &baseline.folder_meta {
        rows.push(EntityJson {
            kind: "folder",
            uid: uid.0.clone(),
            title: meta.title.clone(),
            version: None,
        });
    }
    for (uid, meta) in &baseline.dashboard_meta {
        rows.push(EntityJson {
            kind: "dashboard",
            uid: uid.0.clone(),
            title: meta.title.clone(),
            version: baseline.dashboard_versions.get(uid).copied(),
        });
    }
    for (uid, meta) in &baseline.library_meta {
        rows.push(EntityJson {
            kind: "library",
            uid: uid.0.clone(),
            title: meta.name.clone(),
            version: baseline.library_versions.get(uid).copied(),
        });
    }

    rows
}

fn print_table(baseline: &Baseline) {
    let rows = rows(baseline);
    if rows.is_empty() {
        println!("baseline is empty — run `boardsync pull` first");
        return;
    }

    let table_rows: Vec<StatusRow> = rows
        .iter()
        .map(|r| StatusRow {
            kind: r.kind,
            uid: r.uid.clone(),
            title: r.title.clone(),
            version: r
                .version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(table_rows);
    table.with(Style::sharp());
    println!("{table}");
    println!(
        "{} {} folders, {} dashboards, {} library elements",
        "✓".green(),
        baseline.folder_meta.len(),
        baseline.dashboard_meta.len(),
        baseline.library_meta.len()
    );
}

fn print_json(baseline: &Baseline) -> Result<()> {
    let payload = serde_json::json!({
        "summary": {
            "folders": baseline.folder_meta.len(),
            "dashboards": baseline.dashboard_meta.len(),
            "libraries": baseline.library_meta.len(),
        },
        "entities": rows(baseline),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
    );
    Ok(())
}
