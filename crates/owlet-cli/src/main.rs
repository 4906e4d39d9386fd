//! Operator CLI for the Owlet pipeline.
//!
//! One human operator runs these jobs serially; everything is synchronous
//! and idempotent, so an aborted run is rerun as-is.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use owlet_client::ExperimenterClient;
use owlet_coding::batching::{self, BatchTarget};
use owlet_coding::clips::{self, SessionSelection};
use owlet_coding::coding::update_coding;
use owlet_coding::ingest::{self, IngestSelection};
use owlet_coding::matching::update_videos_found;
use owlet_coding::reconcile::concatenate_session_videos;
use owlet_coding::sheets;
use owlet_coding::sync;
use owlet_coding::{OwletConfig, RunContext};
use owlet_models::{BatchId, TrimSpec, VARIANT_TRIMMED, VARIANT_WHOLE};

#[derive(Parser)]
#[command(name = "owlet", version, about = "Research-video operations pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    Whole,
    Trimmed,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh session and account snapshots from the server
    Sync {
        study: String,
    },
    /// Update the video snapshot from files in the video directory
    Ingest {
        /// Restrict to these study ids
        #[arg(long)]
        study: Vec<String>,
        /// Re-probe files that already have records
        #[arg(long)]
        reprocess: bool,
        /// Reset processed-variant fields to unprocessed
        #[arg(long)]
        reset_paths: bool,
    },
    /// Create/refresh coding records from session data
    UpdateCoding {
        study: String,
    },
    /// Match expected video fragments to discovered raw files
    MatchVideos {
        study: String,
    },
    /// Produce processed clip variants for a study
    ProcessClips {
        study: String,
        #[arg(long, value_enum, default_value_t = Variant::Trimmed)]
        variant: Variant,
        /// Rebuild clips that already exist
        #[arg(long)]
        replace: bool,
    },
    /// Concatenate each session's clips into one artifact
    Reconcile {
        study: String,
        /// Rebuild artifacts that already exist
        #[arg(long)]
        replace: bool,
    },
    /// Partition trimmed clips into coding batches
    Batch {
        study: String,
        /// Minimum batch length in minutes
        #[arg(long, default_value_t = 5.0)]
        min_minutes: f64,
        /// Drop the leftover partial batch instead of keeping it
        #[arg(long)]
        drop_incomplete: bool,
    },
    /// Remove a batch (or all batches) and its back-references
    RemoveBatch {
        study: String,
        /// Batch id to remove
        #[arg(long, conflicts_with_all = ["filename", "all"])]
        id: Option<String>,
        /// Batch filename to remove
        #[arg(long, conflicts_with = "all")]
        filename: Option<String>,
        /// Remove every batch for the study
        #[arg(long)]
        all: bool,
        /// Also delete the batch mp4s
        #[arg(long)]
        delete_videos: bool,
    },
    /// Generate the CSV coding sheet for a coder
    Codesheet {
        study: String,
        coder: String,
        /// Include every column, not just the standard set
        #[arg(long)]
        all_headers: bool,
        /// Hide other coders' columns
        #[arg(long)]
        hide_other_coders: bool,
    },
    /// Commit a coder's sheet edits back into coding data
    Commit {
        study: String,
        coder: String,
        /// Global columns to commit as well (e.g. consent, usable, feedback)
        #[arg(long = "global")]
        global_columns: Vec<String>,
    },
    /// Export all account data as a CSV sheet
    ExportAccounts,
    /// Push changed feedback from coding data to the server
    Feedback {
        study: String,
    },
    /// The nightly composite: sync, coding, ingest, match, clips, reconcile
    Update {
        study: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = OwletConfig::from_env()?;
    let ctx = RunContext::new(config)?;

    run(&ctx, cli.command).await
}

async fn run(ctx: &RunContext, command: Command) -> Result<()> {
    match command {
        Command::Sync { study } => {
            let client = api_client(ctx)?;
            sync::update_session_data(ctx, &client, &study).await?;
            sync::update_account_data(ctx, &client).await?;
        }
        Command::Ingest {
            study,
            reprocess,
            reset_paths,
        } => {
            let selection = if reprocess || reset_paths {
                IngestSelection::All
            } else {
                IngestSelection::NewOnly
            };
            let outcome =
                ingest::update_video_data(ctx, selection, reprocess, reset_paths, &study).await?;
            info!(
                "Ingest done: {} sessions affected, {} improper, {} unmatched",
                outcome.sessions_affected.len(),
                outcome.improper.len(),
                outcome.unmatched.len()
            );
        }
        Command::UpdateCoding { study } => {
            update_coding(ctx, &study).await?;
        }
        Command::MatchVideos { study } => {
            update_videos_found(ctx, &study).await?;
        }
        Command::ProcessClips {
            study,
            variant,
            replace,
        } => {
            let (name, trim) = match variant {
                Variant::Whole => (VARIANT_WHOLE, TrimSpec::None),
                Variant::Trimmed => (VARIANT_TRIMMED, ctx.study_config(&study).trim),
            };
            let changes = clips::process_study_clips(
                ctx,
                &study,
                &SessionSelection::All,
                name,
                &trim,
                replace,
            )
            .await?;
            info!("Processed {} {} clips", changes.len(), name);
        }
        Command::Reconcile { study, replace } => {
            concatenate_session_videos(ctx, &study, &SessionSelection::All, replace).await?;
        }
        Command::Batch {
            study,
            min_minutes,
            drop_incomplete,
        } => {
            let criteria: BTreeMap<String, Vec<String>> = [
                ("consent".to_string(), vec!["yes".to_string()]),
                ("usable".to_string(), vec!["yes".to_string()]),
            ]
            .into_iter()
            .collect();
            let created =
                batching::batch_videos(ctx, &study, min_minutes, &criteria, !drop_incomplete)
                    .await?;
            info!("Created {} batch(es)", created.len());
        }
        Command::RemoveBatch {
            study,
            id,
            filename,
            all,
            delete_videos,
        } => {
            let target = if all {
                BatchTarget::All
            } else if let Some(id) = id {
                BatchTarget::Id(BatchId::from(id.as_str()))
            } else if let Some(filename) = filename {
                BatchTarget::Filename(filename)
            } else {
                anyhow::bail!("remove-batch needs --id, --filename, or --all");
            };
            batching::remove_batch(ctx, &study, target, delete_videos).await?;
        }
        Command::Codesheet {
            study,
            coder,
            all_headers,
            hide_other_coders,
        } => {
            let path = sheets::generate_codesheet(
                ctx,
                &study,
                &coder,
                !hide_other_coders,
                all_headers,
                &BTreeMap::new(),
            )
            .await?;
            info!("Coding sheet written to {}", path.display());
        }
        Command::Commit {
            study,
            coder,
            global_columns,
        } => {
            let applied = sheets::commit_coding(ctx, &study, &coder).await?;
            info!("Applied {} coder-field edits", applied);
            if !global_columns.is_empty() {
                let applied = sheets::commit_global(ctx, &study, &coder, &global_columns).await?;
                info!("Applied {} global-field edits", applied);
            }
        }
        Command::ExportAccounts => {
            let path = sheets::export_accounts(ctx).await?;
            info!("Accounts exported to {}", path.display());
        }
        Command::Feedback { study } => {
            let client = api_client(ctx)?;
            sync::send_feedback(ctx, &client, &study).await?;
        }
        Command::Update { study } => {
            info!("Starting full update for study {}", study);
            let client = api_client(ctx)?;
            sync::update_session_data(ctx, &client, &study).await?;
            sync::update_account_data(ctx, &client).await?;
            update_coding(ctx, &study).await?;
            let outcome = ingest::update_video_data(
                ctx,
                IngestSelection::NewOnly,
                false,
                false,
                &[study.clone()],
            )
            .await?;
            update_videos_found(ctx, &study).await?;
            let config = ctx.study_config(&study);
            clips::process_study_clips(
                ctx,
                &study,
                &SessionSelection::All,
                VARIANT_TRIMMED,
                &config.trim,
                false,
            )
            .await?;
            concatenate_session_videos(
                ctx,
                &study,
                &SessionSelection::Keys(outcome.sessions_affected),
                false,
            )
            .await?;
            info!("Full update done for study {}", study);
        }
    }
    Ok(())
}

fn api_client(ctx: &RunContext) -> Result<ExperimenterClient> {
    Ok(ExperimenterClient::new(
        ctx.config.api_base_url.clone(),
        ctx.config.api_token.clone(),
    )?)
}
