// Simulates a dashboard host driving the sample datasource

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamsource::channel::STREAM_PATH;
use streamsource::prelude::*;
use streamsource::util::logging;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Command line arguments for the demo host
#[derive(Parser, Debug)]
#[command(name = "streamsource-demo", about = "Drive the sample datasource like a dashboard host would")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to stream before simulating a settings change
    #[arg(short, long, default_value = "2")]
    duration: u64,

    /// Numeric id of the simulated datasource
    #[arg(long, default_value = "1")]
    datasource_id: i64,
}

fn load(args: &Args) -> streamsource::error::Result<PluginConfig> {
    let mut builder = ConfigBuilder::new();
    if let Some(path) = &args.config {
        builder = builder.add_file(path);
    }
    builder.add_env("STREAMSOURCE").build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    logging::init(&config.log_level);

    info!("streamsource {} starting", streamsource::VERSION);
    let plugin = Arc::new(Plugin::sample("sample-datasource", &config)?);

    let settings = DataSourceInstanceSettings::new(args.datasource_id, "Sample");
    let ctx = PluginContext::for_datasource(plugin.plugin_id(), settings.clone());

    let now = Utc::now();
    let range = TimeRange {
        from: now - ChronoDuration::hours(1),
        to: now,
    };
    let response = plugin
        .query_data(QueryDataRequest {
            plugin_context: ctx.clone(),
            queries: vec![DataQuery::new(
                "A",
                r#"{"withStreaming": true, "format": "time_series"}"#,
                range,
            )],
        })
        .await?;
    for (ref_id, result) in &response.responses {
        match &result.error {
            Some(e) => warn!("Query {} failed: {}", ref_id, e),
            None => info!(
                "Query {} returned {} frame(s), channel {:?}",
                ref_id,
                result.frames.len(),
                result.frames.first().and_then(|f| f.channel())
            ),
        }
    }

    let health = plugin
        .check_health(CheckHealthRequest {
            plugin_context: ctx.clone(),
        })
        .await?;
    info!("Health: {:?} ({})", health.status, health.message);

    let subscribed = plugin
        .subscribe_stream(SubscribeStreamRequest {
            plugin_context: ctx.clone(),
            path: STREAM_PATH.to_string(),
            data: None,
        })
        .await?;
    info!("Subscribe: {:?}", subscribed.status);

    if !subscribed.use_run_stream {
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<StreamPacket>(16);
    let cancel = CancellationToken::new();
    let stream = tokio::spawn({
        let plugin = Arc::clone(&plugin);
        let cancel = cancel.clone();
        let req = RunStreamRequest {
            plugin_context: ctx.clone(),
            path: STREAM_PATH.to_string(),
            data: None,
        };
        async move { plugin.run_stream(req, cancel, &tx).await }
    });

    let printer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            println!("{}", String::from_utf8_lossy(&packet.data));
        }
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling stream");
            cancel.cancel();
        }
    }

    // Saving the datasource bumps its timestamp, which replaces the instance
    info!("Simulating a settings change");
    let changed = settings.with_updated(Utc::now());
    plugin
        .check_health(CheckHealthRequest {
            plugin_context: PluginContext::for_datasource(plugin.plugin_id(), changed),
        })
        .await?;

    match stream.await? {
        Ok(()) => info!("Stream stopped"),
        Err(e) if e.is_closed() => info!("Stream closed by instance disposal"),
        Err(e) => error!("Stream failed: {}", e),
    }

    printer.await?;
    plugin.shutdown()?;

    Ok(())
}
