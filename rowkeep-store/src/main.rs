//! rowkeep - versioned tabular datasets with reviewed edits
//!
//! Command-line front end over [`rowkeep_store::Hub`]. Results are printed
//! to stdout as JSON (CSV for `export`); logs go to stderr or the configured
//! log file.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rowkeep_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use rowkeep_store::models::{
    ConsentFlags, DetailOverride, FieldChange, MediaKind, MediaUpload, SubmissionMeta, Submitter, Visibility,
};
use rowkeep_store::parser::FileFormat;
use rowkeep_store::services::{AuditSink, SqliteAuditSink, StaticRoleLookup, TracingAuditSink};
use rowkeep_store::{Hub, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for rowkeep
#[derive(Parser, Debug)]
#[command(name = "rowkeep")]
#[command(about = "Versioned tabular datasets with reviewed row edits")]
#[command(version)]
struct Cli {
    /// Root folder holding rowkeep.db and the media store
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Users reported as admins to the role lookup
    #[arg(long = "admin", global = true, env = "ROWKEEP_ADMINS", value_delimiter = ',')]
    admins: Vec<String>,

    /// Emit audit entries as log events instead of writing the audit_log table
    #[arg(long, global = true)]
    audit_to_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a dataset from a CSV, TSV or xlsx file
    Ingest {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        /// csv, tsv or xlsx; taken from the file extension when omitted
        #[arg(long)]
        format: Option<String>,
        #[arg(long, default_value = "private")]
        visibility: String,
        #[arg(long)]
        actor: String,
    },
    /// Replace a dataset's rows with a new upload
    Replace {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        actor: String,
    },
    /// Clone an earlier version into a new current version
    Revert {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        version: i64,
        #[arg(long)]
        actor: String,
    },
    /// Print the rows of one version
    Read {
        #[arg(long)]
        dataset: i64,
        /// Defaults to the current version
        #[arg(long)]
        version: Option<i64>,
    },
    /// List datasets visible to a reader
    Datasets {
        #[arg(long)]
        reader: String,
    },
    /// List the versions of a dataset
    Versions {
        #[arg(long)]
        dataset: i64,
    },
    /// Give a user read access to a private dataset
    Grant {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        user: String,
        #[arg(long)]
        actor: String,
    },
    /// Soft-delete a dataset
    Delete {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        actor: String,
    },
    /// Propose field changes to a row, or a new row when --row is omitted
    Submit {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        row: Option<i64>,
        /// FIELD=NEW or FIELD=OLD=>NEW, repeatable
        #[arg(long = "change", required = true)]
        changes: Vec<String>,
        #[arg(long = "photo")]
        photos: Vec<PathBuf>,
        #[arg(long = "document")]
        documents: Vec<PathBuf>,
        /// Category recorded on every attachment
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        consent_publish: bool,
        #[arg(long)]
        consent_contact: bool,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List edit requests (pending only unless --status is given)
    Requests {
        #[arg(long = "status")]
        statuses: Vec<String>,
        #[arg(long)]
        submitter: Option<String>,
    },
    /// Show one edit request with its details and attachments
    Request {
        #[arg(long)]
        id: i64,
    },
    /// Approve a pending edit request
    Approve {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        approver: String,
        /// DETAIL_ID=VALUE, repeatable
        #[arg(long = "override")]
        overrides: Vec<String>,
    },
    /// Reject a pending edit request
    Reject {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        reviewer: String,
    },
    /// Approve photo attachments
    ApprovePhotos {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        reviewer: String,
    },
    /// Reject photo attachments
    RejectPhotos {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        reviewer: String,
    },
    /// Per-field counts of proposed changes
    Summary {
        #[arg(long)]
        dataset: i64,
    },
    /// CSV of every proposed change on a dataset
    Export {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write an attachment's bytes to a file
    Fetch {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Return interrupted approvals to pending
    Recover,
    /// Most recent audit entries
    Audit {
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

/// Install the tracing subscriber; `RUST_LOG` overrides the TOML level
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));

    match &toml_config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_format(format: Option<&str>, file: &Path) -> Result<FileFormat> {
    match format {
        Some(format) => Ok(format.parse()?),
        None => {
            let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            FileFormat::from_filename(name)
                .ok_or_else(|| anyhow!("Cannot tell the format of {}; pass --format", file.display()))
        }
    }
}

/// Parse `FIELD=NEW` or `FIELD=OLD=>NEW`
fn parse_change(arg: &str) -> Result<FieldChange> {
    let (field, rest) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Change '{}' is not FIELD=NEW or FIELD=OLD=>NEW", arg))?;
    let change = match rest.split_once("=>") {
        Some((old, new)) => FieldChange::new(field.trim(), old, new),
        None => FieldChange::new(field.trim(), "", rest),
    };
    Ok(change)
}

fn parse_override(arg: &str) -> Result<DetailOverride> {
    let (id, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Override '{}' is not DETAIL_ID=VALUE", arg))?;
    let detail_id = id
        .trim()
        .parse()
        .with_context(|| format!("Override '{}' has a non-numeric detail id", arg))?;
    Ok(DetailOverride { detail_id, new_value: value.to_string() })
}

async fn read_upload(path: &Path, kind: MediaKind, category: &str) -> Result<MediaUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(MediaUpload {
        content_type: mime_guess::from_path(path).first_raw().map(str::to_string),
        filename,
        bytes,
        kind,
        category: category.to_string(),
    })
}

/// Cancel in-flight work on Ctrl+C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolver = RootFolderResolver::new("rowkeep").with_cli_override(cli.root_folder.clone());
    let toml_config = resolver.load_toml();
    init_tracing(&toml_config)?;

    info!(
        "Starting rowkeep v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolver.resolve();
    info!("Root folder: {}", root_folder.display());
    let initializer = RootFolderInitializer::new(root_folder);

    let roles = Arc::new(StaticRoleLookup::new(cli.admins.iter().cloned()));
    let audit: Option<Arc<dyn AuditSink>> = if cli.audit_to_log {
        Some(Arc::new(TracingAuditSink))
    } else {
        None
    };
    let hub = Hub::open_local(&initializer, &toml_config, roles, audit)
        .await
        .context("Failed to open the store")?;

    let recovered = hub.recover_interrupted_approvals().await?;
    if recovered > 0 {
        warn!("Returned {} interrupted approvals to pending", recovered);
    }

    match run(&hub, cli.command).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<StoreError>() {
            Some(store_error) => {
                error!("{}", store_error);
                bail!("{}", store_error.public_message())
            }
            None => Err(e),
        },
    }
}

async fn run(hub: &Hub, command: Command) -> Result<()> {
    match command {
        Command::Ingest { name, file, format, visibility, actor } => {
            let format = resolve_format(format.as_deref(), &file)?;
            let visibility: Visibility = visibility.parse()?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_json(&hub.ingest_dataset(&name, &bytes, format, visibility, &actor).await?)
        }
        Command::Replace { dataset, file, format, actor } => {
            let format = resolve_format(format.as_deref(), &file)?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_json(&hub.replace_dataset(dataset, &bytes, format, &actor).await?)
        }
        Command::Revert { dataset, version, actor } => {
            print_json(&hub.revert_dataset(dataset, version, &actor).await?)
        }
        Command::Read { dataset, version } => {
            let version = match version {
                Some(version) => version,
                None => hub.get_dataset(dataset).await?.current_version,
            };
            print_json(&hub.read_dataset_rows(dataset, version).await?)
        }
        Command::Datasets { reader } => print_json(&hub.list_datasets(&reader).await?),
        Command::Versions { dataset } => print_json(&hub.list_versions(dataset).await?),
        Command::Grant { dataset, user, actor } => hub.grant_access(dataset, &user, &actor).await.map_err(Into::into),
        Command::Delete { dataset, actor } => hub.delete_dataset(dataset, &actor).await.map_err(Into::into),
        Command::Submit {
            dataset,
            row,
            changes,
            photos,
            documents,
            category,
            user,
            first_name,
            last_name,
            consent_publish,
            consent_contact,
            tags,
        } => {
            let changes = changes.iter().map(|c| parse_change(c)).collect::<Result<Vec<_>>>()?;

            let mut uploads = Vec::with_capacity(photos.len() + documents.len());
            for path in &photos {
                uploads.push(read_upload(path, MediaKind::Photo, &category).await?);
            }
            for path in &documents {
                uploads.push(read_upload(path, MediaKind::Document, &category).await?);
            }

            let submitter = Submitter::new(&user, &first_name, &last_name);
            let meta = SubmissionMeta {
                consent: ConsentFlags { publish: consent_publish, contact: consent_contact },
                community_tags: tags,
            };
            let cancel = cancel_on_interrupt();
            let record = hub
                .submit_edit_request(dataset, row, &changes, &uploads, &submitter, &meta, &cancel)
                .await?;
            print_json(&record)
        }
        Command::Requests { statuses, submitter } => {
            let statuses = if statuses.is_empty() { None } else { Some(statuses.as_slice()) };
            print_json(&hub.list_edit_requests(statuses, submitter.as_deref()).await?)
        }
        Command::Request { id } => print_json(&hub.get_edit_request(id).await?),
        Command::Approve { id, approver, overrides } => {
            let overrides = overrides.iter().map(|o| parse_override(o)).collect::<Result<Vec<_>>>()?;
            let cancel = cancel_on_interrupt();
            print_json(&hub.approve_edit_request(id, &overrides, &approver, &cancel).await?)
        }
        Command::Reject { id, reviewer } => hub.reject_edit_request(id, &reviewer).await.map_err(Into::into),
        Command::ApprovePhotos { ids, reviewer } => hub.approve_photos(&ids, &reviewer).await.map_err(Into::into),
        Command::RejectPhotos { ids, reviewer } => hub.reject_photos(&ids, &reviewer).await.map_err(Into::into),
        Command::Summary { dataset } => print_json(&hub.change_summary(dataset).await?),
        Command::Export { dataset, out } => {
            let csv = hub.export_changes(dataset).await?;
            match out {
                Some(path) => tokio::fs::write(&path, csv)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display())),
                None => {
                    print!("{}", csv);
                    Ok(())
                }
            }
        }
        Command::Fetch { id, out } => {
            let (attachment, bytes) = hub.fetch_attachment(id).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&attachment)
        }
        Command::Recover => {
            let recovered = hub.recover_interrupted_approvals().await?;
            print_json(&serde_json::json!({ "recovered": recovered }))
        }
        Command::Audit { limit } => {
            let sink = SqliteAuditSink::new(hub.pool().clone());
            print_json(&sink.recent(limit).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_change_forms() {
        assert_eq!(parse_change("name=Blue Door").unwrap(), FieldChange::new("name", "", "Blue Door"));
        assert_eq!(
            parse_change("hours=9-5=>10-6").unwrap(),
            FieldChange::new("hours", "9-5", "10-6")
        );
        assert!(parse_change("no separator").is_err());
    }

    #[test]
    fn test_parse_override() {
        let o = parse_override("14=a=b").unwrap();
        assert_eq!(o, DetailOverride { detail_id: 14, new_value: "a=b".to_string() });
        assert!(parse_override("x=1").is_err());
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "rowkeep", "submit", "--dataset", "3", "--change", "name=New", "--user", "u1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Submit { dataset: 3, row: None, .. }));
    }
}
