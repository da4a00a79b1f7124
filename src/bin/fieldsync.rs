/**
 * FieldSync Command Line Entry Point
 *
 * Drives the sync engine against the on-disk queue: capture files into the
 * queue, inspect it, and run sync passes by hand.
 */
use clap::{Parser, Subcommand};
use fieldsync::client::{Config, SyncEngine};
use fieldsync::shared::{ItemPayload, MediaType, NewItem, NewMedia, SettingsPatch, SyncEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fieldsync")]
#[command(about = "Offline-first field capture queue", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults to FIELDSYNC_* environment variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every queued item, newest first
    List,
    /// Queue an observation (or a task with --task) from capture files
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Queue a voice task instead of an observation
        #[arg(long, default_value_t = false)]
        task: bool,
    },
    /// Run one sync pass and print its events
    Sync,
    /// Re-queue a failed or partial item
    Retry { local_id: String },
    /// Remove an item and its durable media
    Remove { local_id: String },
    /// Accept a reviewed voice task for upload
    Accept { local_id: String },
    /// Drop completed items
    ClearCompleted,
    /// Show or change sync settings
    Settings {
        #[arg(long)]
        wifi_only: Option<bool>,
        #[arg(long)]
        auto_sync: Option<bool>,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        retry_delay_ms: Option<u64>,
    },
    /// Show pass metrics for this process
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env()?,
    };
    tracing::debug!("[STARTUP] Data directory {}", config.app().data_dir.display());

    let engine = SyncEngine::open(config).await?;
    let result = run(&engine, cli.command).await;
    engine.dispose();
    result
}

async fn run(engine: &Arc<SyncEngine>, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => {
            let items = engine.get_items().await;
            if items.is_empty() {
                println!("Queue is empty");
            }
            for item in items {
                let uploaded = item.media.iter().filter(|asset| asset.is_complete()).count();
                println!(
                    "{}  {:<24} {}/{} files  retries {}{}",
                    item.local_id,
                    item.sync_state.to_string(),
                    uploaded,
                    item.media.len(),
                    item.retry_count,
                    item.last_sync_error
                        .map(|error| format!("  ({})", error))
                        .unwrap_or_default()
                );
            }
        }
        Command::Add {
            files,
            title,
            project,
            description,
            task,
        } => {
            let payload = ItemPayload {
                project_id: project,
                title,
                description,
                ..Default::default()
            };
            let media = files.iter().map(|path| media_for(path)).collect();
            let item = if task {
                NewItem::task(payload, media)
            } else {
                NewItem::observation(payload, media)
            };
            let local_id = engine.add_item(item).await?;
            println!("Queued {}", local_id);
        }
        Command::Sync => {
            while engine.is_syncing() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let mut events = engine.subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        SyncEvent::ProgressUpdated { progress } => {
                            eprint!("\r{:>3}%", progress.overall_progress);
                        }
                        SyncEvent::ItemSynced { local_id, remote_id } => {
                            eprintln!("\r{} -> {}", local_id, remote_id);
                        }
                        SyncEvent::ItemFailed { local_id, error, .. } => {
                            eprintln!("\r{} failed: {}", local_id, error);
                        }
                        SyncEvent::SyncCompleted { .. } => break,
                        _ => {}
                    }
                }
            });
            let report = engine.start_sync().await;
            printer.abort();
            println!("\n{:?}", report);
        }
        Command::Retry { local_id } => {
            engine.retry_item(&local_id).await?;
            println!("Re-queued {}", local_id);
        }
        Command::Remove { local_id } => {
            engine.remove_item(&local_id).await?;
            println!("Removed {}", local_id);
        }
        Command::Accept { local_id } => {
            engine.accept_task(&local_id).await?;
            println!("Accepted {}", local_id);
        }
        Command::ClearCompleted => {
            let removed = engine.clear_completed().await;
            println!("Removed {} completed items", removed);
        }
        Command::Settings {
            wifi_only,
            auto_sync,
            max_retries,
            retry_delay_ms,
        } => {
            let patch = SettingsPatch {
                wifi_only,
                auto_sync,
                max_retries,
                retry_delay_ms,
            };
            let settings = if patch == SettingsPatch::default() {
                engine.settings().await
            } else {
                engine.save_settings(patch).await
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Status => {
            let metrics = engine.metrics().await;
            println!(
                "passes {} (success rate {:.0}%), items synced {}, bytes {}",
                metrics.total_passes,
                metrics.success_rate() * 100.0,
                metrics.items_synced,
                metrics.total_bytes_uploaded
            );
        }
    }
    Ok(())
}

/// Pick the media type and MIME type from the file extension
fn media_for(path: &Path) -> NewMedia {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let (media_type, content_type) = match extension.as_str() {
        "png" => (MediaType::Photo, "image/png"),
        "heic" => (MediaType::Photo, "image/heic"),
        "mp4" => (MediaType::Video, "video/mp4"),
        "mov" => (MediaType::Video, "video/quicktime"),
        "m4a" => (MediaType::Audio, "audio/mp4"),
        "mp3" => (MediaType::Audio, "audio/mpeg"),
        "wav" => (MediaType::Audio, "audio/wav"),
        _ => (MediaType::Photo, "image/jpeg"),
    };
    NewMedia::new(path, media_type, content_type)
}
