//! # Operator Commands
//!
//! Offline maintenance against the catalog file and the ledger database,
//! for use while the server is stopped or from a one-off container.
//!
//! ## Validate
//! Loads a catalog exactly like the server does and summarizes each
//! candidate. Deploy pipelines run this before swapping the catalog and
//! triggering `/api/platform/catalog/reload`.
//!
//! ## Reset
//! Deletes analytics for one candidate or all of them in a single
//! transaction. Irreversible, so the binary insists on `--yes`.
use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use catalog::{Catalog, load_catalog};
use indicatif::{ProgressBar, ProgressStyle};
use server::ledger::{Ledger, ResetCounts, Scope};

#[derive(Debug, PartialEq, Eq)]
pub struct CandidateSummary {
    pub slug: String,
    pub name: String,
    pub pages: usize,
    pub polls: usize,
    pub quizzes: usize,
}

pub fn summarize(catalog: &Catalog) -> Vec<CandidateSummary> {
    catalog
        .candidates()
        .map(|candidate| CandidateSummary {
            slug: candidate.slug.clone(),
            name: candidate.name.clone(),
            pages: candidate.pages.len(),
            polls: catalog.polls(&candidate.slug).len(),
            quizzes: catalog.quizzes(&candidate.slug).len(),
        })
        .collect()
}

pub fn validate(path: &Path) -> Result<Vec<CandidateSummary>> {
    let catalog =
        load_catalog(path).with_context(|| format!("Invalid catalog {}", path.display()))?;

    Ok(summarize(&catalog))
}

pub fn reset(db: &Path, scope: &Scope) -> Result<ResetCounts> {
    if !db.exists() {
        anyhow::bail!("No ledger at {}", db.display());
    }

    let ledger =
        Ledger::open(db).with_context(|| format!("Failed to open ledger {}", db.display()))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(match scope {
        Scope::Tenant(slug) => format!("Resetting {slug}"),
        Scope::All => "Resetting all candidates".to_string(),
    });

    let counts = ledger.reset(scope).context("Reset failed, nothing was deleted")?;

    spinner.finish_with_message("Done");
    Ok(counts)
}
