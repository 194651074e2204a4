use anyhow::Context;
use clap::Parser;
use gui_bridge::StatusBridge;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::CaptureConfig;
use workflow::runner::SessionRunner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline driver for the multimodal capture core")]
struct Args {
    /// Run one offline recording session and print its summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a capture config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Session length in radar frames
    #[arg(long, default_value_t = 16)]
    frames: usize,
    #[arg(long, default_value_t = 100.0)]
    frame_period_ms: f64,
    #[arg(long)]
    output_root: Option<PathBuf>,
    /// Keep the status bridge alive for external consumers
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = if let Some(path) = args.workflow {
        CaptureConfig::load(path)?
    } else {
        CaptureConfig::from_args(args.frames, args.frame_period_ms)
    };
    if let Some(root) = args.output_root {
        config.output_root = root;
    }

    let bridge = StatusBridge::new(args.serve);
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating pipeline runtime")?;

    if args.offline {
        let runner = SessionRunner::new(config);
        let report = runtime.block_on(runner.execute(&bridge))?;
        let summary = &report.summary;

        println!(
            "Offline run -> session {} at {}",
            summary.session_id,
            report.session_root.display()
        );
        println!(
            "  sets {}, sync mean offset {:.2} ms, max {:.2} ms, timeouts {}",
            summary.sets_recorded,
            summary.sync.mean_offset_ms,
            summary.sync.max_offset_ms,
            summary.sync.timeouts
        );
        for (modality, counts) in &summary.counts {
            println!(
                "  {}: produced {}, accepted {}, dropped {}",
                modality, counts.produced, counts.accepted, counts.dropped
            );
        }
        if let Some(error) = &summary.error {
            println!("  session ended with error: {}", error);
        }
    }

    if args.serve {
        bridge.publish_status("status bridge running (Ctrl+C to stop)...");
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
