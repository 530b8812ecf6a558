use clap::ArgMatches;
use tracing::{error, info};

use winscout_core::{PathOutcome, events};

use super::helpers;
use crate::table::TableFormatter;

pub fn handle_list_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let use_worker = !matches.get_flag("no-worker");

    info!(
        event = "cli.list_started",
        json_output = json_output,
        use_worker = use_worker
    );

    let config = helpers::load_config_with_warning();
    let settings = helpers::settings_for(&config, matches);

    let engine = match helpers::build_engine(&config, use_worker) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ Failed to set up providers: {}", e);
            error!(event = "cli.list_failed", error = %e);
            events::log_app_error(&e);
            return Err(e.into());
        }
    };

    let runtime = helpers::build_runtime()?;
    let windows = runtime.block_on(async {
        let report = engine.refresh(&settings).await;
        if report.slow == PathOutcome::Started {
            // Bounded by the worker timeout
            engine.wait_for_slow_path().await;
        }
        let windows = engine.current_windows();
        engine.shutdown().await;
        windows
    });

    if json_output {
        println!("{}", serde_json::to_string_pretty(&windows)?);
    } else if windows.is_empty() {
        println!("No windows found.");
    } else {
        println!("Windows ({}):", windows.len());
        let formatter = TableFormatter::new(&windows);
        formatter.print_table(&windows);
    }

    info!(event = "cli.list_completed", count = windows.len());

    Ok(())
}
