//! Configuration model
//!
//! Binds and remotes come from three equivalent surfaces: command-line URLs,
//! JSON objects and JSON strings holding the same URLs. A configuration list
//! element is accepted as either form.
//!
//! Bind URLs look like
//!
//! ```plain
//! tcp+udp://127.0.0.1:5353?remote=dns&udp_ttl=60s
//! ```
//!
//! and remote URLs use the scheme as the default name:
//!
//! ```plain
//! dns://1.1.1.1:53?strategy=prefer_ipv4&timeout=5s
//! ```

use std::{
    fs,
    io::{self, Read},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    path::Path,
    str::FromStr,
    time::Duration,
};

use serde::{de, Deserialize, Deserializer};
use thiserror::Error;
use url::{Host, Url};

use crate::{
    net::{AddrFamily, Protocol},
    resolver::Strategy,
};

/// Default idle TTL of a UDP flow
pub const DEFAULT_UDP_TTL: Duration = Duration::from_secs(60);
/// Default receive buffer for UDP datagrams, the maximum UDP payload on IPv4
pub const DEFAULT_UDP_BUFFER_SIZE: usize = 65507;
/// Default dial timeout of a remote
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse {scope}: empty string")]
    EmptyUrl { scope: &'static str },

    #[error("parse {scope}: invalid url `{url}`: {source}")]
    InvalidUrl {
        scope: &'static str,
        url: String,
        source: url::ParseError,
    },

    #[error("parse {scope}: listen address must be an IP, got `{addr}`")]
    InvalidListenAddr { scope: &'static str, addr: String },

    #[error("parse {scope}({key}): invalid value `{value}`")]
    InvalidOptionValue {
        scope: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("parse {scope}: unknown option: {key}")]
    UnknownOption { scope: &'static str, key: String },

    #[error("bind: listen a ipv6 address with ipv4 family")]
    ListenV6WithV4Family,

    #[error("bind: listen a ipv4 address with ipv6 family")]
    ListenV4WithV6Family,

    #[error("bind: no port specified")]
    MissingBindPort,

    #[error("remote: no server specified")]
    MissingServer,

    #[error("remote: no server port specified")]
    MissingRemotePort,

    #[error("no name specified for {0}")]
    MissingRemoteName(String),

    #[error("duplicated remote name: {0}")]
    DuplicateRemoteName(String),

    #[error("no remote specified for {0}")]
    MissingRemoteRef(String),

    #[error("no remote with name: {0}")]
    UnknownRemoteRef(String),

    #[error("remote: invalid dns server address `{0}`")]
    InvalidDnsServer(String),

    #[error("`fwmark` is only supported on Linux")]
    FwmarkUnsupported,

    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Logging section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Silence all output
    #[serde(default)]
    pub disable: bool,

    /// `trace`, `debug`, `info`, `warn`, `error`, `fatal`, `panic`
    #[serde(default)]
    pub level: String,
}

/// A local listening endpoint plus its options
#[derive(Debug, Clone)]
pub struct BindConfig {
    pub listen: Option<IpAddr>,
    pub port: u16,
    pub remote: String,

    pub name: Option<String>,
    pub protocol: Protocol,
    pub family: Option<AddrFamily>,
    pub interface: Option<String>,
    pub reuse_addr: bool,

    pub tfo: bool,
    pub mptcp: bool,

    pub udp_ttl: Duration,
    pub udp_buffer_size: usize,
    pub udp_fragment: bool,
}

impl Default for BindConfig {
    fn default() -> BindConfig {
        BindConfig {
            listen: None,
            port: 0,
            remote: String::new(),
            name: None,
            protocol: Protocol::TcpUdp,
            family: None,
            interface: None,
            reuse_addr: false,
            tfo: false,
            mptcp: false,
            udp_ttl: DEFAULT_UDP_TTL,
            udp_buffer_size: DEFAULT_UDP_BUFFER_SIZE,
            udp_fragment: false,
        }
    }
}

impl BindConfig {
    /// Parses a bind URL, `scheme://[host][:port]?key=value&...`
    pub fn parse(s: &str) -> Result<BindConfig, ConfigError> {
        if s.is_empty() {
            return Err(ConfigError::EmptyUrl { scope: "bind" });
        }

        let url = Url::parse(s).map_err(|source| ConfigError::InvalidUrl {
            scope: "bind",
            url: s.to_owned(),
            source,
        })?;

        let mut config = BindConfig {
            listen: parse_url_host_ip(&url)?,
            ..Default::default()
        };

        if let Some(port) = url.port() {
            config.port = port;
        }

        if let Some(protocol) = Protocol::parse(url.scheme()) {
            config.protocol = protocol;
        }

        // Repeated keys: the last value wins
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "family" => {
                    config.family = Some(AddrFamily::parse(&value).ok_or_else(|| invalid_value("bind", "family", &value))?)
                }
                "interface" => config.interface = Some(value.into_owned()),
                "reuse_addr" => config.reuse_addr = parse_bool(&value).ok_or_else(|| invalid_value("bind", "reuse_addr", &value))?,
                "name" => config.name = Some(value.into_owned()),
                "tfo" => config.tfo = parse_bool(&value).ok_or_else(|| invalid_value("bind", "tfo", &value))?,
                "udp_ttl" => {
                    config.udp_ttl = parse_duration(&value).ok_or_else(|| invalid_value("bind", "udp_ttl", &value))?
                }
                "remote" => config.remote = value.into_owned(),
                "udp_buffer_size" => {
                    config.udp_buffer_size = value
                        .parse()
                        .map_err(|_| invalid_value("bind", "udp_buffer_size", &value))?
                }
                "udp_fragment" => {
                    config.udp_fragment = parse_bool(&value).ok_or_else(|| invalid_value("bind", "udp_fragment", &value))?
                }
                "mptcp" => config.mptcp = parse_bool(&value).ok_or_else(|| invalid_value("bind", "mptcp", &value))?,
                _ => {
                    return Err(ConfigError::UnknownOption {
                        scope: "bind",
                        key: key.into_owned(),
                    });
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Fills defaults and checks the invariants
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        match (self.listen, self.family) {
            (Some(IpAddr::V6(..)), Some(AddrFamily::Ipv4)) => return Err(ConfigError::ListenV6WithV4Family),
            (Some(IpAddr::V4(..)), Some(AddrFamily::Ipv6)) => return Err(ConfigError::ListenV4WithV6Family),
            (None, family) => {
                self.listen = Some(match family {
                    Some(AddrFamily::Ipv4) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    _ => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                });
            }
            _ => {}
        }

        if self.port == 0 {
            return Err(ConfigError::MissingBindPort);
        }

        Ok(())
    }

    /// Name shown in logs; defaults to the listen endpoint
    pub fn display_name(&self) -> String {
        match self.name {
            Some(ref name) => name.clone(),
            None => {
                let listen = self.listen.unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
                std::net::SocketAddr::new(listen, self.port).to_string()
            }
        }
    }
}

impl<'de> Deserialize<'de> for BindConfig {
    fn deserialize<D>(deserializer: D) -> Result<BindConfig, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Url(String),
            Fields(BindFields),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Url(url) => {
                if !url.contains("://") {
                    return Err(de::Error::custom("bind: a string entry must be an url"));
                }
                BindConfig::parse(&url).map_err(de::Error::custom)
            }
            Repr::Fields(fields) => fields.build().map_err(de::Error::custom),
        }
    }
}

#[derive(Deserialize)]
struct BindFields {
    #[serde(default)]
    listen: Option<IpAddr>,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    remote: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "de_protocol")]
    network: Option<Protocol>,
    #[serde(default, deserialize_with = "de_family")]
    family: Option<AddrFamily>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    reuse_addr: bool,
    #[serde(default)]
    tfo: bool,
    #[serde(default)]
    mptcp: bool,
    #[serde(default, deserialize_with = "de_duration")]
    udp_ttl: Option<Duration>,
    #[serde(default)]
    udp_buffer_size: Option<usize>,
    #[serde(default)]
    udp_fragment: bool,
}

impl BindFields {
    fn build(self) -> Result<BindConfig, ConfigError> {
        let mut config = BindConfig {
            listen: self.listen,
            port: self.port,
            remote: self.remote,
            name: self.name,
            protocol: self.network.unwrap_or(Protocol::TcpUdp),
            family: self.family,
            interface: self.interface,
            reuse_addr: self.reuse_addr,
            tfo: self.tfo,
            mptcp: self.mptcp,
            udp_ttl: self.udp_ttl.unwrap_or(DEFAULT_UDP_TTL),
            udp_buffer_size: self.udp_buffer_size.unwrap_or(DEFAULT_UDP_BUFFER_SIZE),
            udp_fragment: self.udp_fragment,
        };
        config.validate()?;
        Ok(config)
    }
}

/// A named upstream forwarding target plus dial options
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub name: String,
    pub server: String,
    pub port: u16,

    pub dns: Option<String>,
    pub strategy: Strategy,
    pub timeout: Duration,
    pub reuse_addr: bool,
    pub interface: Option<String>,
    pub bind_address4: Option<Ipv4Addr>,
    pub bind_address6: Option<Ipv6Addr>,
    pub fwmark: u32,

    pub tfo: bool,
    pub mptcp: bool,

    pub udp_fragment: bool,
}

impl Default for RemoteConfig {
    fn default() -> RemoteConfig {
        RemoteConfig {
            name: String::new(),
            server: String::new(),
            port: 0,
            dns: None,
            strategy: Strategy::Default,
            timeout: DEFAULT_DIAL_TIMEOUT,
            reuse_addr: false,
            interface: None,
            bind_address4: None,
            bind_address6: None,
            fwmark: 0,
            tfo: false,
            mptcp: false,
            udp_fragment: false,
        }
    }
}

impl RemoteConfig {
    /// Parses a remote URL, `name://host[:port]?key=value&...`. The scheme
    /// doubles as the default name.
    pub fn parse(s: &str) -> Result<RemoteConfig, ConfigError> {
        if s.is_empty() {
            return Err(ConfigError::EmptyUrl { scope: "remote" });
        }

        let url = Url::parse(s).map_err(|source| ConfigError::InvalidUrl {
            scope: "remote",
            url: s.to_owned(),
            source,
        })?;

        let mut config = RemoteConfig {
            name: url.scheme().to_owned(),
            server: url_host_string(&url),
            ..Default::default()
        };

        if let Some(port) = url.port() {
            config.port = port;
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "dns" => config.dns = Some(value.into_owned()),
                "strategy" => {
                    config.strategy = Strategy::from_str(&value).map_err(|_| invalid_value("remote", "strategy", &value))?
                }
                "timeout" => {
                    config.timeout = parse_duration(&value).ok_or_else(|| invalid_value("remote", "timeout", &value))?
                }
                "reuse_addr" => {
                    config.reuse_addr = parse_bool(&value).ok_or_else(|| invalid_value("remote", "reuse_addr", &value))?
                }
                "tfo" => config.tfo = parse_bool(&value).ok_or_else(|| invalid_value("remote", "tfo", &value))?,
                "fwmark" => config.fwmark = value.parse().map_err(|_| invalid_value("remote", "fwmark", &value))?,
                "udp_fragment" => {
                    config.udp_fragment = parse_bool(&value).ok_or_else(|| invalid_value("remote", "udp_fragment", &value))?
                }
                "interface" => config.interface = Some(value.into_owned()),
                "mptcp" => config.mptcp = parse_bool(&value).ok_or_else(|| invalid_value("remote", "mptcp", &value))?,
                "bind_address4" => {
                    config.bind_address4 = Some(value.parse().map_err(|_| invalid_value("remote", "bind_address4", &value))?)
                }
                "bind_address6" => {
                    config.bind_address6 = Some(value.parse().map_err(|_| invalid_value("remote", "bind_address6", &value))?)
                }
                "name" => config.name = value.into_owned(),
                _ => {
                    return Err(ConfigError::UnknownOption {
                        scope: "remote",
                        key: key.into_owned(),
                    });
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants. Name uniqueness is a service level concern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::MissingServer);
        }
        if self.port == 0 {
            return Err(ConfigError::MissingRemotePort);
        }
        Ok(())
    }

    /// `host:port` with IPv6 hosts bracketed
    pub fn server_address(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

impl<'de> Deserialize<'de> for RemoteConfig {
    fn deserialize<D>(deserializer: D) -> Result<RemoteConfig, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Url(String),
            Fields(RemoteFields),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Url(url) => {
                if !url.contains("://") {
                    return Err(de::Error::custom("remote: a string entry must be an url"));
                }
                RemoteConfig::parse(&url).map_err(de::Error::custom)
            }
            Repr::Fields(fields) => fields.build().map_err(de::Error::custom),
        }
    }
}

#[derive(Deserialize)]
struct RemoteFields {
    #[serde(default)]
    name: String,
    #[serde(default)]
    server: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    dns: Option<String>,
    #[serde(default, deserialize_with = "de_strategy")]
    strategy: Option<Strategy>,
    #[serde(default, deserialize_with = "de_duration")]
    timeout: Option<Duration>,
    #[serde(default)]
    reuse_addr: bool,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    bind_address4: Option<Ipv4Addr>,
    #[serde(default)]
    bind_address6: Option<Ipv6Addr>,
    #[serde(default)]
    fwmark: u32,
    #[serde(default)]
    tfo: bool,
    #[serde(default)]
    mptcp: bool,
    #[serde(default)]
    udp_fragment: bool,
}

impl RemoteFields {
    fn build(self) -> Result<RemoteConfig, ConfigError> {
        let config = RemoteConfig {
            name: self.name,
            server: self.server,
            port: self.port,
            dns: self.dns,
            strategy: self.strategy.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_DIAL_TIMEOUT),
            reuse_addr: self.reuse_addr,
            interface: self.interface,
            bind_address4: self.bind_address4,
            bind_address6: self.bind_address6,
            fwmark: self.fwmark,
            tfo: self.tfo,
            mptcp: self.mptcp,
            udp_fragment: self.udp_fragment,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Whole configuration: logging plus bind and remote lists
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub binds: Vec<BindConfig>,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl Config {
    /// Loads configuration from a JSON string
    pub fn load_from_str(s: &str) -> Result<Config, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Loads configuration from a JSON reader, e.g. stdin
    pub fn load_from_reader<R: Read>(reader: R) -> Result<Config, ConfigError> {
        serde_json::from_reader(reader).map_err(ConfigError::Json)
    }

    /// Loads configuration from a JSON file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Config::load_from_str(&content)
    }
}

fn invalid_value(scope: &'static str, key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidOptionValue {
        scope,
        key,
        value: value.to_owned(),
    }
}

/// Accepts the usual spellings of a boolean flag
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parses durations of the form `<int><unit>`, unit one of `ns`, `us`, `ms`,
/// `s`, `m`, `h`; segments may be chained (`1m30s`)
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().ok()?;

        let (unit_len, part) = if tail.starts_with("ns") {
            (2, Duration::from_nanos(value))
        } else if tail.starts_with("us") {
            (2, Duration::from_micros(value))
        } else if tail.starts_with("ms") {
            (2, Duration::from_millis(value))
        } else if tail.starts_with('s') {
            (1, Duration::from_secs(value))
        } else if tail.starts_with('m') {
            (1, Duration::from_secs(value.checked_mul(60)?))
        } else if tail.starts_with('h') {
            (1, Duration::from_secs(value.checked_mul(3600)?))
        } else {
            return None;
        };

        total = total.checked_add(part)?;
        rest = &tail[unit_len..];
    }

    Some(total)
}

/// Listen host of a bind URL; absent and empty hosts mean unspecified
fn parse_url_host_ip(url: &Url) -> Result<Option<IpAddr>, ConfigError> {
    match url.host() {
        None => Ok(None),
        Some(Host::Ipv4(ip)) => Ok(Some(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => Ok(Some(IpAddr::V6(ip))),
        Some(Host::Domain(domain)) if domain.is_empty() => Ok(None),
        Some(Host::Domain(domain)) => domain.parse::<IpAddr>().map(Some).map_err(|_| {
            ConfigError::InvalidListenAddr {
                scope: "bind",
                addr: domain.to_owned(),
            }
        }),
    }
}

/// Server host of a remote URL, unbracketed
fn url_host_string(url: &Url) -> String {
    match url.host() {
        None => String::new(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        Some(Host::Domain(domain)) => domain.to_owned(),
    }
}

fn de_protocol<'de, D>(deserializer: D) -> Result<Option<Protocol>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(Protocol::parse))
}

fn de_family<'de, D>(deserializer: D) -> Result<Option<AddrFamily>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => AddrFamily::parse(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid family `{}`", s))),
    }
}

fn de_strategy<'de, D>(deserializer: D) -> Result<Option<Strategy>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) => Strategy::from_str(&s)
            .map(Some)
            .map_err(|err| de::Error::custom(err.to_string())),
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) => parse_duration(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid duration `{}`", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_url_full() {
        let config = BindConfig::parse("tcp+udp://:5353?remote=dns&udp_ttl=60s&udp_buffer_size=4096").unwrap();
        assert_eq!(config.protocol, Protocol::TcpUdp);
        assert_eq!(config.listen, Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)));
        assert_eq!(config.port, 5353);
        assert_eq!(config.remote, "dns");
        assert_eq!(config.udp_ttl, Duration::from_secs(60));
        assert_eq!(config.udp_buffer_size, 4096);
    }

    #[test]
    fn bind_url_explicit_listen() {
        let config = BindConfig::parse("udp://127.0.0.1:9500?remote=up").unwrap();
        assert_eq!(config.protocol, Protocol::Udp);
        assert_eq!(config.listen, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(config.port, 9500);
    }

    #[test]
    fn bind_url_family_defaults_listen() {
        let config = BindConfig::parse("tcp://:9500?remote=up&family=4").unwrap();
        assert_eq!(config.listen, Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));

        let err = BindConfig::parse("tcp://[::1]:9500?remote=up&family=4").unwrap_err();
        assert!(matches!(err, ConfigError::ListenV6WithV4Family));
    }

    #[test]
    fn bind_url_rejects_unknown_options() {
        let err = BindConfig::parse("tcp://:9500?remote=up&ttl=60s").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn bind_url_requires_port() {
        let err = BindConfig::parse("tcp://127.0.0.1?remote=up").unwrap_err();
        assert!(matches!(err, ConfigError::MissingBindPort));
    }

    #[test]
    fn bind_url_last_value_wins() {
        let config = BindConfig::parse("tcp://:9500?remote=a&remote=b&tfo=true&tfo=false").unwrap();
        assert_eq!(config.remote, "b");
        assert!(!config.tfo);
    }

    #[test]
    fn remote_url_scheme_is_default_name() {
        let config = RemoteConfig::parse("r://1.1.1.1:53?strategy=prefer_ipv4").unwrap();
        assert_eq!(config.name, "r");
        assert_eq!(config.server, "1.1.1.1");
        assert_eq!(config.port, 53);
        assert_eq!(config.strategy, Strategy::PreferIpv4);
        assert_eq!(config.server_address(), "1.1.1.1:53");
    }

    #[test]
    fn remote_url_name_override_and_options() {
        let config =
            RemoteConfig::parse("fallback://example.com:8080?name=origin&timeout=5s&tfo=true&fwmark=255").unwrap();
        assert_eq!(config.name, "origin");
        assert_eq!(config.server, "example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.tfo);
        assert_eq!(config.fwmark, 255);
    }

    #[test]
    fn remote_url_ipv6_server_is_bracketed() {
        let config = RemoteConfig::parse("v6://[2001:db8::1]:443").unwrap();
        assert_eq!(config.server, "2001:db8::1");
        assert_eq!(config.server_address(), "[2001:db8::1]:443");
    }

    #[test]
    fn remote_url_requires_server_and_port() {
        assert!(matches!(
            RemoteConfig::parse("r://:80").unwrap_err(),
            ConfigError::MissingServer
        ));
        assert!(matches!(
            RemoteConfig::parse("r://1.2.3.4").unwrap_err(),
            ConfigError::MissingRemotePort
        ));
    }

    #[test]
    fn remote_url_rejects_bad_strategy() {
        let err = RemoteConfig::parse("r://1.1.1.1:53?strategy=prefer_v4").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOptionValue { .. }));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("10us"), Some(Duration::from_micros(10)));
        assert_eq!(parse_duration("100ns"), Some(Duration::from_nanos(100)));
        assert_eq!(parse_duration("100"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10x"), None);
    }

    #[test]
    fn json_mixed_forms() {
        let config = Config::load_from_str(
            r#"{
                "log": { "level": "debug" },
                "binds": [
                    "tcp+udp://:5353?remote=dns&udp_ttl=60s",
                    { "listen": "127.0.0.1", "port": 8080, "remote": "web", "network": "tcp" }
                ],
                "remotes": [
                    "dns://1.1.1.1:53?strategy=prefer_ipv4",
                    { "name": "web", "server": "example.com", "port": 80, "timeout": "5s" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.binds.len(), 2);
        assert_eq!(config.remotes.len(), 2);

        assert_eq!(config.binds[0].remote, "dns");
        assert_eq!(config.binds[1].protocol, Protocol::Tcp);
        assert_eq!(config.binds[1].listen, Some("127.0.0.1".parse().unwrap()));

        assert_eq!(config.remotes[0].strategy, Strategy::PreferIpv4);
        assert_eq!(config.remotes[1].timeout, Duration::from_secs(5));
        assert_eq!(config.remotes[1].udp_fragment, false);
    }

    #[test]
    fn json_invalid_entries_fail() {
        assert!(Config::load_from_str(r#"{"binds": ["not an url"]}"#).is_err());
        assert!(Config::load_from_str(r#"{"binds": [{"port": 0, "remote": "x"}]}"#).is_err());
        assert!(Config::load_from_str(r#"{"remotes": [{"name": "x", "server": "", "port": 80}]}"#).is_err());
    }

    #[test]
    fn bind_display_name() {
        let config = BindConfig::parse("tcp://127.0.0.1:8080?remote=up").unwrap();
        assert_eq!(config.display_name(), "127.0.0.1:8080");

        let config = BindConfig::parse("tcp://127.0.0.1:8080?remote=up&name=edge").unwrap();
        assert_eq!(config.display_name(), "edge");
    }
}
