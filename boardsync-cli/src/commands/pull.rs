//! `boardsync pull` — store → files reconciliation.

use anyhow::{Context, Result};
use colored::Colorize;

use boardsync_core::Config;
use boardsync_engine::{Engine, PullReport, SyncOptions};
use boardsync_repo::Repository;

use crate::commands::build_context;

pub fn run(config: &Config) -> Result<()> {
    let context = build_context(config)?;
    let repo = context.repo.as_ref().map(|r| r as &dyn Repository);
    let engine = Engine::new(&context.store, repo, SyncOptions::from_config(config));

    let report = engine.pull().context("pull reconciliation failed")?;
    print_report(&report);
    Ok(())
}

pub(crate) fn print_report(report: &PullReport) {
    if report.written == 0 && report.deleted == 0 {
        println!("{} nothing to do", "✓".green());
    } else {
        println!(
            "{} {} written, {} deleted",
            "✓".green(),
            report.written,
            report.deleted
        );
    }

    match &report.commit {
        Some(rev) => {
            let pushed = if report.pushed { ", pushed" } else { "" };
            println!("  committed {}{pushed}", &rev[..rev.len().min(12)]);
        }
        None => {
            if report.pushed {
                println!("  pushed");
            }
        }
    }
}
