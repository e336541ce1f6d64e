//! Command line entry of the forwarder
//!
//! Binds and remotes come either from repeatable `-l`/`-r` URL options or
//! from a JSON configuration file (`-c`, `-` for stdin); both sources merge.

use std::{io, process::ExitCode};

use clap::{Arg, ArgAction, Command};
use log::info;
use tokio::runtime::Builder;

use portfwd::{
    config::{BindConfig, Config, RemoteConfig},
    logging, monitor,
    service::Service,
    EXIT_CODE_INSUFFICIENT_PARAMS, EXIT_CODE_LOAD_CONFIG_FAILURE, EXIT_CODE_SERVER_ABORTED, VERSION,
};

fn main() -> ExitCode {
    let mut app = Command::new("portfwd")
        .version(VERSION)
        .about("A user-space TCP/UDP port forwarder")
        .after_help(
            "Examples:\n  \
             # Forward local port 9500 to 1.2.3.4:48000\n  \
             portfwd -l \"tcp+udp://:9500?remote=example\" -r \"example://1.2.3.4:48000\"\n\n  \
             # Start from a config file\n  \
             portfwd -c config.json",
        )
        .arg(
            Arg::new("LISTEN")
                .short('l')
                .long("listen")
                .num_args(1)
                .action(ArgAction::Append)
                .help("A listen address and options, as an url"),
        )
        .arg(
            Arg::new("REMOTE")
                .short('r')
                .long("remote")
                .num_args(1)
                .action(ArgAction::Append)
                .help("A forward remote address and options, as an url"),
        )
        .arg(
            Arg::new("CONFIG")
                .short('c')
                .long("config")
                .num_args(1)
                .action(ArgAction::Set)
                .help("JSON configuration file path, `-` reads from stdin"),
        );

    let matches = app.get_matches_mut();

    let mut config = match matches.get_one::<String>("CONFIG") {
        Some(path) if path == "-" => match Config::load_from_reader(io::stdin()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("loading config from stdin failed, {}", err);
                return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
            }
        },
        Some(path) => match Config::load_from_path(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("loading config {} failed, {}", path, err);
                return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
            }
        },
        None => Config::default(),
    };

    if let Some(urls) = matches.get_many::<String>("LISTEN") {
        for url in urls {
            match BindConfig::parse(url) {
                Ok(bind) => config.binds.push(bind),
                Err(err) => {
                    eprintln!("parse listen {} failed, {}", url, err);
                    return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
                }
            }
        }
    }

    if let Some(urls) = matches.get_many::<String>("REMOTE") {
        for url in urls {
            match RemoteConfig::parse(url) {
                Ok(remote) => config.remotes.push(remote),
                Err(err) => {
                    eprintln!("parse remote {} failed, {}", url, err);
                    return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
                }
            }
        }
    }

    if config.binds.is_empty() || config.remotes.is_empty() {
        let _ = app.print_help();
        println!();
        eprintln!("no binds or remotes configured");
        return EXIT_CODE_INSUFFICIENT_PARAMS.into();
    }

    if let Err(err) = logging::init_with_config(&config.log) {
        eprintln!("initializing logging failed, {}", err);
        return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
    }

    info!("portfwd {}", VERSION);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("create tokio Runtime");

    runtime.block_on(async move {
        let mut service = match Service::new(config) {
            Ok(service) => service,
            Err(err) => {
                eprintln!("create service failed, {}", err);
                return EXIT_CODE_LOAD_CONFIG_FAILURE.into();
            }
        };

        if let Err(err) = service.start().await {
            eprintln!("start service failed, {}", err);
            return EXIT_CODE_SERVER_ABORTED.into();
        }

        let _ = monitor::create_signal_monitor().await;

        service.close();
        ExitCode::SUCCESS
    })
}
