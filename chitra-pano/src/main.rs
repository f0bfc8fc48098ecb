//! ChitraPano - Panorama capture daemon for VacuumTiger
//!
//! Runs the capture orchestrator against the simulated base and capture
//! service, takes one panorama with the configured default request and
//! saves the stitched image.
//!
//! ## Threads
//!
//! - **Node**: owns the orchestrator, drains the event queue
//! - **Base** (~50Hz): integrates velocity commands, publishes odometry
//! - **Capture service**: answers goals, snapshots and stitches
//!
//! The main thread forwards velocity commands from the node to the base and
//! waits for the session outcome.

use chitra_pano::sim::{BaseCommand, spawn_base, spawn_capture_server};
use chitra_pano::{
    CaptureMode, CaptureOutcome, ChannelActionClient, ChannelSink, NodeOutput, PanoConfig,
    PanoError, PanoEvent, PanoNode, Result, StitchedImage, event_queue,
};

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `chitra-pano <path>` (positional)
/// - `chitra-pano --config <path>` / `-c <path>`
///
/// Returns None when no path is given.
fn parse_config_path(args: &[String]) -> Option<String> {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn load_config(args: &[String]) -> Result<PanoConfig> {
    let mut config = match parse_config_path(args) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            PanoConfig::load(Path::new(&path))?
        }
        None if Path::new("chitra.toml").exists() => {
            info!("Loading configuration from chitra.toml");
            PanoConfig::load(Path::new("chitra.toml"))?
        }
        None => {
            info!("Using default configuration");
            PanoConfig::default()
        }
    };

    // Mode override
    if args.iter().any(|a| a == "--stepwise") {
        config.defaults.mode = CaptureMode::Stepwise;
    } else if args.iter().any(|a| a == "--continuous") {
        config.defaults.mode = CaptureMode::Continuous;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize logging
    let directive: tracing_subscriber::filter::Directive = "chitra_pano=info"
        .parse()
        .map_err(|e| PanoError::Config(format!("Invalid log directive: {}", e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = load_config(&args)?;

    info!("ChitraPano v{}", env!("CARGO_PKG_VERSION"));
    info!("Default request: {}", config.defaults.request());

    // Channels
    let (event_tx, event_rx) = event_queue(config.node.event_queue_capacity);
    let (action_tx, action_rx) = crossbeam_channel::unbounded();
    let (output_tx, output_rx) = crossbeam_channel::unbounded();

    // Simulated collaborators
    let command = Arc::new(BaseCommand::new());
    let auto_capture = config.defaults.mode == CaptureMode::Continuous;
    let server = spawn_capture_server(
        &config.simulation,
        auto_capture,
        action_rx,
        event_tx.clone(),
    )?;
    let base = spawn_base(
        config.simulation.clone(),
        Arc::clone(&command),
        event_tx.clone(),
    )?;

    // Node thread
    let node_config = config.clone();
    let node = thread::Builder::new()
        .name("pano-node".into())
        .spawn(move || {
            let mut node = PanoNode::new(
                &node_config,
                ChannelActionClient::new(action_tx),
                ChannelSink::new(output_tx),
            );
            node.run(&event_rx)
        })?;

    event_tx.send(PanoEvent::StartDefault)?;

    // Main thread: forward commands until the session ends
    let outcome = loop {
        match output_rx.recv() {
            Ok(NodeOutput::Velocity(velocity)) => command.set_angular(velocity.angular),
            Ok(NodeOutput::Log(line)) => debug!("pano: {}", line),
            Ok(NodeOutput::Outcome(outcome)) => break Some(outcome),
            Err(_) => {
                warn!("Node exited without reporting an outcome");
                break None;
            }
        }
    };

    // Shutdown
    command.set_angular(0.0);
    if event_tx.send(PanoEvent::Shutdown).is_err() {
        debug!("Node already stopped");
    }
    drop(event_tx);
    command.signal_shutdown();

    info!("Waiting for threads to finish...");
    match node.join() {
        Ok(Err(e)) => error!("Node failed: {}", e),
        Err(e) => error!("Node thread panicked: {:?}", e),
        Ok(Ok(())) => {}
    }
    if let Err(e) = base.join() {
        error!("Base thread panicked: {:?}", e);
    }
    if let Err(e) = server.join() {
        error!("Capture service thread panicked: {:?}", e);
    }

    match outcome {
        Some(CaptureOutcome::Stitched(image)) => {
            save_pgm(&image, Path::new(&config.output.image_path))?;
            info!("ChitraPano finished");
            Ok(())
        }
        Some(CaptureOutcome::Failed(reason)) => {
            error!("Panorama failed: {}", reason);
            Err(PanoError::Action(reason))
        }
        None => Err(PanoError::Channel("node output closed".into())),
    }
}

/// Save a mono8 panorama as binary PGM
fn save_pgm(image: &StitchedImage, path: &Path) -> Result<()> {
    if image.encoding != "mono8" {
        return Err(PanoError::Action(format!(
            "Cannot save {} image as PGM",
            image.encoding
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "P5\n{} {}\n255\n", image.width, image.height)?;
    writer.write_all(&image.data)?;
    writer.flush()?;

    info!(
        "Panorama saved to {:?} ({}x{})",
        path, image.width, image.height
    );
    Ok(())
}
