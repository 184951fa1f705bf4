//! `boardsync push` — files → store reconciliation.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use boardsync_core::Config;
use boardsync_engine::{Engine, PushReport, SyncOptions};
use boardsync_repo::Repository;

use crate::commands::build_context;

/// Arguments for `boardsync push`.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Push every canonical file on disk (never deletes anything).
    #[arg(long, conflicts_with = "since")]
    pub all: bool,

    /// Push only what changed in the repository since this revision.
    #[arg(long)]
    pub since: Option<String>,

    /// Delete store entities whose files were removed since the revision.
    #[arg(long, requires = "since")]
    pub delete_removed: bool,
}

impl PushArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let context = build_context(config)?;
        let repo = context.repo.as_ref().map(|r| r as &dyn Repository);
        let engine = Engine::new(&context.store, repo, SyncOptions::from_config(config));

        let (push_report, pull_report) = if self.all {
            engine.push_all().context("push --all failed")?
        } else if let Some(since) = &self.since {
            let Some(repo) = repo else {
                bail!("push --since requires a repo section in the config");
            };
            repo.sync().context("repository sync failed")?;
            let head = repo.head_rev().context("failed to resolve HEAD")?;
            let changes = repo
                .changed_between(since, &head)
                .with_context(|| format!("failed to diff {since}..{head}"))?;
            if changes.is_empty() {
                println!("{} no changes since {since}", "✓".green());
                return Ok(());
            }
            let delete_removed = self.delete_removed || config.delete_removed;
            engine
                .push_changes(&changes, Some(since), delete_removed)
                .with_context(|| format!("push since {since} failed"))?
        } else {
            bail!("provide --all or --since <rev>");
        };

        print_report(&push_report);
        super::pull::print_report(&pull_report);
        Ok(())
    }
}

fn print_report(report: &PushReport) {
    println!(
        "{} {} upserted, {} deleted, {} skipped",
        "✓".green(),
        report.upserted,
        report.deleted,
        report.skipped
    );
    if report.skipped > 0 {
        println!(
            "  {} {} entities skipped; see the log for details",
            "!".yellow(),
            report.skipped
        );
    }
}
