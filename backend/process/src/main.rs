use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use server::ledger::Scope;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a catalog file
    Validate { catalog: PathBuf },

    /// Irreversibly delete analytics
    Reset {
        #[arg(long)]
        db: PathBuf,

        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        slug: Option<String>,

        #[arg(long)]
        all: bool,

        /// Confirm that the records should be deleted
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Validate { catalog } => {
            let summary = process::validate(&catalog)?;

            println!("Loaded Candidates: {}\n", summary.len());
            for candidate in summary {
                println!(
                    "{} ({}): {} pages, {} polls, {} quizzes",
                    candidate.slug,
                    candidate.name,
                    candidate.pages,
                    candidate.polls,
                    candidate.quizzes
                );
            }
        }
        Command::Reset { db, slug, all, yes } => {
            let scope = match (slug, all) {
                (Some(slug), false) => Scope::Tenant(slug),
                (None, true) => Scope::All,
                _ => bail!("Pass either --slug or --all"),
            };

            if !yes {
                bail!("Reset deletes records permanently, rerun with --yes");
            }

            let counts = process::reset(&db, &scope)?;

            println!("Deleted Visits: {}", counts.visits);
            println!("Deleted Poll Votes: {}", counts.poll_votes);
            println!("Deleted Quiz Answers: {}", counts.quiz_answers);
            println!("Deleted Feedback: {}", counts.feedback);
        }
    }

    Ok(())
}
