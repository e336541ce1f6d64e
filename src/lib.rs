//! portfwd is a user-space L4 port forwarder.
//!
//! It accepts TCP connections and UDP datagrams on configured local sockets
//! ("binds") and relays bytes to configured upstream targets ("remotes"),
//! matched by a logical name. TCP and UDP may share one endpoint, upstream
//! hostnames are resolved with a configurable strategy, and dual-stack
//! targets are dialed with Happy-Eyeballs (RFC 6555).
//!
//! ## Usage
//!
//! Forward local port 9500 to `1.2.3.4:48000`:
//!
//! ```bash
//! portfwd -l "tcp+udp://:9500?remote=example" -r "example://1.2.3.4:48000"
//! ```
//!
//! Or start from a JSON configuration file:
//!
//! ```bash
//! portfwd -c config.json
//! ```
//!
//! where `config.json` looks like
//!
//! ```json
//! {
//!     "log": { "level": "info" },
//!     "binds": [ "tcp+udp://:9500?remote=example" ],
//!     "remotes": [ { "name": "example", "server": "1.2.3.4", "port": 48000 } ]
//! }
//! ```
//!
//! ## API Usage
//!
//! ```no_run
//! use portfwd::{config::Config, service::Service};
//!
//! # async fn run() {
//! let config = Config::load_from_str(
//!     r#"{"binds": ["tcp://127.0.0.1:9500?remote=web"],
//!         "remotes": ["web://example.com:80"]}"#,
//! )
//! .unwrap();
//!
//! let mut service = Service::new(config).unwrap();
//! service.start().await.unwrap();
//! # }
//! ```

pub use self::{
    config::{BindConfig, Config, ConfigError, RemoteConfig},
    service::Service,
};

pub mod config;
pub mod dialer;
pub mod listener;
pub mod logging;
pub mod monitor;
pub mod net;
pub mod relay;
pub mod resolver;
pub mod service;

/// Build version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code when the command line or configuration provides nothing to run
pub const EXIT_CODE_INSUFFICIENT_PARAMS: u8 = 64;
/// Exit code when loading or validating the configuration fails
pub const EXIT_CODE_LOAD_CONFIG_FAILURE: u8 = 78;
/// Exit code when the server fails at startup
pub const EXIT_CODE_SERVER_ABORTED: u8 = 70;
