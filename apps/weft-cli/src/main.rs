mod ui;

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;
use weft_codec::{
    mosaic::{plan_grid, render_mosaic},
    SnapshotCompressor,
};
use weft_coordinator::Coordinator;
use weft_network::{LocalServer, RealtimeServer};
use weft_ops::ActivityLog;
use weft_store::EventStore;
use weft_types::{
    config::{CodecConfig, WeftConfig},
    frame::ImageFrame,
    record::EventQuery,
};

use crate::ui::UiMessage;

const DEFAULT_CONFIG_PATH: &str = "configs/weft.toml";
const MONITOR_LOG_FILE: &str = "logs/weft.log";

#[derive(Parser)]
#[command(
    name = "weft",
    version,
    about = "NFC-triggered generative visuals: coordinator, viewer and snapshot tools"
)]
struct Cli {
    /// Config file. Falls back to $WEFT_CONFIG, then configs/weft.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator (HTTP + WebSocket).
    Serve {
        /// Show live events in a terminal view.
        #[arg(long)]
        monitor: bool,
    },
    /// Run a headless viewer against a coordinator.
    Viewer,
    /// Report a tag read, like the physical reader does.
    Trigger {
        index: i64,
        #[arg(long)]
        server: Option<String>,
    },
    /// Compress a PNG into a hex snapshot on stdout.
    Compress {
        input: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Render a hex snapshot (or @file holding one) as a palette PNG.
    Preview {
        snapshot: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Render stored snapshots as a mosaic PNG.
    Mosaic {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "1920x1080", value_parser = parse_viewport)]
        viewport: (u32, u32),
        #[arg(long, default_value_t = 1200)]
        limit: usize,
    },
    /// Delete every stored event.
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config);

    if matches!(cli.command, Command::Serve { monitor: true }) && config.ops.log_file.is_none() {
        config.ops.log_file = Some(MONITOR_LOG_FILE.into());
    }
    weft_ops::init_tracing(&config.ops)?;

    match cli.command {
        Command::Serve { monitor } => serve(config, monitor).await,
        Command::Viewer => {
            weft_viewer::run_viewer(config.viewer, config.codec).await?;
            Ok(())
        }
        Command::Trigger { index, server } => {
            let server = server.unwrap_or(config.viewer.server_url);
            trigger(&server, index).await
        }
        Command::Compress { input, width, height } => {
            compress(&input, codec_for(config.codec, width, height))
        }
        Command::Preview {
            snapshot,
            out,
            width,
            height,
        } => preview(&snapshot, &out, codec_for(config.codec, width, height)),
        Command::Mosaic {
            out,
            viewport,
            limit,
        } => mosaic(&config, &out, viewport, limit),
        Command::Purge => {
            let store = EventStore::open(&config.storage.database_path)?;
            let removed = store.purge()?;
            println!("removed {removed} events from {}", config.storage.database_path);
            Ok(())
        }
    }
}

async fn serve(config: WeftConfig, monitor: bool) -> Result<()> {
    let store = EventStore::open(&config.storage.database_path)?;
    let network = LocalServer::new(256);
    let mut events = network.subscribe();
    let coordinator = Arc::new(Coordinator::new(
        config.storage.clone(),
        store,
        network,
        ActivityLog::new(),
    ));

    if !monitor {
        coordinator.boot().await?;
        weft_coordinator::serve(coordinator, &config.network).await?;
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if tx.send(UiMessage::Event(event)).is_err() {
                break;
            }
        }
    });
    coordinator.boot().await?;

    let network_config = config.network.clone();
    let server =
        tokio::spawn(async move { weft_coordinator::serve(coordinator, &network_config).await });
    let summary = format!(
        "{}:{} db={}",
        config.network.bind_addr, config.network.port, config.storage.database_path
    );
    let ui = tokio::task::spawn_blocking(move || ui::run(rx, summary));

    tokio::select! {
        closed = ui => closed??,
        served = server => served??,
    }
    forwarder.abort();
    Ok(())
}

async fn trigger(server: &str, index: i64) -> Result<()> {
    let url = format!("{}/api/nfc", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "index": index }))
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .error_for_status()?;
    let body: serde_json::Value = response.json().await?;
    println!("{body}");
    Ok(())
}

fn compress(input: &Path, codec: CodecConfig) -> Result<()> {
    let image = image::open(input)
        .with_context(|| format!("failed to read {}", input.display()))?
        .to_rgba8();
    let frame = ImageFrame::from_rgba(image.width(), image.height(), image.into_raw());
    let snapshot = SnapshotCompressor::new(codec).try_compress(&frame)?;
    println!("{}", snapshot.to_hex());
    Ok(())
}

fn preview(snapshot: &str, out: &Path, codec: CodecConfig) -> Result<()> {
    let hex_text = match snapshot.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?,
        None => snapshot.to_string(),
    };
    let image = SnapshotCompressor::new(codec).preview(hex_text.trim())?;
    image
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!("Preview written to {}", out.display());
    Ok(())
}

fn mosaic(config: &WeftConfig, out: &Path, viewport: (u32, u32), limit: usize) -> Result<()> {
    let store = EventStore::open(&config.storage.database_path)?;
    let limit = limit.clamp(1, config.storage.max_list_limit);
    let snapshots: Vec<String> = store
        .list(EventQuery::latest(limit))?
        .into_iter()
        .map(|event| event.snapshot_data)
        .collect();

    let (width, height) = viewport;
    let Some(layout) = plan_grid(width, height, snapshots.len()) else {
        println!("no snapshots stored, nothing to render");
        return Ok(());
    };
    let compressor = SnapshotCompressor::new(config.codec);
    render_mosaic(&compressor, &snapshots, &layout, width, height)
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "{}x{} grid, {} snapshots, {} empty cells -> {}",
        layout.cols,
        layout.rows,
        layout.shown,
        layout.empty_cells,
        out.display()
    );
    Ok(())
}

fn codec_for(base: CodecConfig, width: Option<u32>, height: Option<u32>) -> CodecConfig {
    CodecConfig {
        target_width: width.unwrap_or(base.target_width),
        target_height: height.unwrap_or(base.target_height),
    }
}

fn parse_viewport(raw: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw}"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width in {raw}"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height in {raw}"))?;
    if width == 0 || height == 0 {
        return Err(format!("viewport must be non-empty, got {raw}"));
    }
    Ok((width, height))
}

fn load_config(explicit: Option<PathBuf>) -> WeftConfig {
    let from_env = env::var_os("WEFT_CONFIG").map(PathBuf::from);
    let requested = explicit.or(from_env);
    let path = requested
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if requested.is_none() && !path.exists() {
        return WeftConfig::defaults();
    }
    match WeftConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                WeftConfig::defaults()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            WeftConfig::defaults()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_both_separators() {
        assert_eq!(parse_viewport("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_viewport("800X600").unwrap(), (800, 600));
        assert!(parse_viewport("1920").is_err());
        assert!(parse_viewport("0x10").is_err());
    }

    #[test]
    fn sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/weft.toml");
        let config = WeftConfig::from_file(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.codec, CodecConfig::default());
        assert_eq!(config.storage.max_list_limit, 1200);
    }

    #[test]
    fn codec_overrides_apply_per_axis() {
        let base = CodecConfig::default();
        let codec = codec_for(base, Some(40), None);
        assert_eq!(codec.target_width, 40);
        assert_eq!(codec.target_height, base.target_height);
    }

    #[test]
    fn cli_accepts_subcommands() {
        let args = ["weft", "trigger", "2", "--server", "http://x:3000"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Command::Trigger { index: 2, .. }));

        let args = ["weft", "--config", "a.toml", "mosaic", "--out", "m.png"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(matches!(
            cli.command,
            Command::Mosaic { viewport: (1920, 1080), limit: 1200, .. }
        ));
    }
}
