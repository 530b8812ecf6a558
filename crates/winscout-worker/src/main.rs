//! Worker process: reads one scan request on stdin and streams one result
//! line per plugin on stdout, ending with the final marker.

use std::io;

use winscout_core::init_logging;

mod plugins;
mod runner;

fn main() {
    // stdout carries the protocol; logs go to stderr, which the parent forwards
    init_logging(false);

    let plugins = plugins::builtin_plugins();
    let stdin = io::stdin();
    let stdout = io::stdout();

    if let Err(e) = runner::run(stdin.lock(), stdout.lock(), &plugins) {
        tracing::error!(event = "worker.run_failed", error = %e);
        std::process::exit(1);
    }
}
