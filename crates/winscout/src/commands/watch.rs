use std::time::Duration;

use clap::ArgMatches;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use winscout_core::events;

use super::helpers;

pub fn handle_watch_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = helpers::load_config_with_warning();
    let interval = matches
        .get_one::<u64>("interval-ms")
        .map(|ms| Duration::from_millis(*ms))
        .unwrap_or_else(|| config.refresh_interval());
    let use_worker = !matches.get_flag("no-worker");
    let settings = helpers::settings_for(&config, matches);

    info!(
        event = "cli.watch_started",
        interval_ms = interval.as_millis() as u64,
        use_worker = use_worker
    );

    let engine = match helpers::build_engine(&config, use_worker) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ Failed to set up providers: {}", e);
            error!(event = "cli.watch_failed", error = %e);
            events::log_app_error(&e);
            return Err(e.into());
        }
    };

    let runtime = helpers::build_runtime()?;
    runtime.block_on(async {
        let mut updates = engine.subscribe();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        println!(
            "Watching windows every {}ms. Press Ctrl-C to stop.",
            interval.as_millis()
        );

        let reason = loop {
            tokio::select! {
                _ = &mut ctrl_c => break "interrupted",
                _ = ticker.tick() => {
                    // Overlapping refreshes are dropped by the engine.
                    let engine = engine.clone();
                    let settings = settings.clone();
                    tokio::spawn(async move {
                        engine.refresh(&settings).await;
                    });
                }
                update = updates.recv() => match update {
                    Ok(update) => {
                        let kind = if update.structural { "changed" } else { "updated" };
                        println!(
                            "{:<8} {} ({} windows, {} total)",
                            kind,
                            update.provider,
                            engine.window_count(&update.provider),
                            engine.current_windows().len()
                        );
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(event = "cli.watch_updates_lagged", skipped = skipped);
                    }
                    Err(RecvError::Closed) => break "updates closed",
                },
            }
        };

        events::log_app_shutdown(reason);
        engine.shutdown().await;
    });

    info!(event = "cli.watch_completed");
    Ok(())
}
