use clap::{Arg, ArgAction, Command, value_parser};

pub fn build_cli() -> Command {
    Command::new("winscout")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Discover open windows from every source and keep one stable list")
        .long_about("winscout gathers windows from fast in-process providers and a slow out-of-process scanner, reconciles them into one identity-preserving list, and prints or watches that list.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("list")
                .about("Run one refresh and print the discovered windows")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Output in JSON format")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("disable")
                        .long("disable")
                        .short('d')
                        .value_name("NAME")
                        .help("Disable a provider for this run (repeatable)")
                        .action(ArgAction::Append)
                )
                .arg(
                    Arg::new("no-worker")
                        .long("no-worker")
                        .help("Skip the out-of-process worker")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(
            Command::new("watch")
                .about("Refresh on an interval and print list updates until Ctrl-C")
                .arg(
                    Arg::new("interval-ms")
                        .long("interval-ms")
                        .short('i')
                        .value_name("MS")
                        .help("Milliseconds between refreshes (overrides config)")
                        .value_parser(value_parser!(u64).range(1..))
                )
                .arg(
                    Arg::new("disable")
                        .long("disable")
                        .short('d')
                        .value_name("NAME")
                        .help("Disable a provider while watching (repeatable)")
                        .action(ArgAction::Append)
                )
                .arg(
                    Arg::new("no-worker")
                        .long("no-worker")
                        .help("Skip the out-of-process worker")
                        .action(ArgAction::SetTrue)
                )
        )
}
