use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the push relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "pushd")]
#[command(about = "Push relay bridging a backend message bus to WebSocket clients")]
#[command(version)]
pub struct Args {
    /// Socket address clients connect to.
    #[arg(long, default_value = "0.0.0.0:9001", env = "PUSHD_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the status endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "PUSHD_STATUS")]
    pub status_addr: SocketAddr,
    /// Shared secret used to verify signed handshakes.
    #[arg(long, env = "PUSHD_SECRET")]
    pub secret: Option<String>,
    /// Tenant identifier scoping the bus channel.
    #[arg(long, env = "PUSHD_TENANT")]
    pub tenant: Option<String>,
    /// Redis URL used for the bus subscription and the rekey token store.
    #[arg(long, default_value = "redis://localhost", env = "PUSHD_REDIS")]
    pub redis: String,
    /// Keep per-message-name counters in the status document.
    #[arg(long, env = "PUSHD_ENABLE_STATS")]
    pub enable_stats: bool,
    /// Interval between rekey token renewals in seconds.
    #[arg(long, default_value = "60", env = "PUSHD_REKEY_INTERVAL")]
    pub rekey_interval: u64,
    /// Handshake timeout in seconds.
    #[arg(long, default_value = "5", env = "PUSHD_AUTH_TIMEOUT")]
    pub auth_timeout: u64,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "PUSHD_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "120", env = "PUSHD_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Maximum concurrent client connections.
    #[arg(long, default_value = "100000", env = "PUSHD_MAX_CONNS")]
    pub max_conns: usize,
}

/// Runtime configuration derived from [`Args`]. Read once at startup,
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address clients connect to.
    pub listen: SocketAddr,
    /// Socket address for the status endpoint.
    pub status_addr: SocketAddr,
    /// Shared secret used to verify signed handshakes.
    pub secret: String,
    /// Tenant identifier scoping the bus channel.
    pub tenant: String,
    /// Redis URL used for the bus subscription and the rekey token store.
    pub redis: String,
    /// Keep per-message-name counters in the status document.
    pub enable_stats: bool,
    /// Interval between rekey token renewals in seconds.
    pub rekey_interval: u64,
    /// Handshake timeout in seconds.
    pub auth_timeout: u64,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
    /// Maximum concurrent client connections.
    pub max_conns: usize,
}

impl ServerConfig {
    /// Builds the runtime configuration. The signing secret and the tenant
    /// identifier have no defaults; starting without them is a fatal
    /// configuration error.
    pub fn from_args(args: Args) -> Result<Self, String> {
        let secret = args
            .secret
            .ok_or_else(|| "signing secret is required (--secret / PUSHD_SECRET)".to_owned())?;
        let tenant = args
            .tenant
            .ok_or_else(|| "tenant identifier is required (--tenant / PUSHD_TENANT)".to_owned())?;
        Ok(Self {
            listen: args.listen,
            status_addr: args.status_addr,
            secret,
            tenant,
            redis: args.redis,
            enable_stats: args.enable_stats,
            rekey_interval: args.rekey_interval,
            auth_timeout: args.auth_timeout,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
            max_conns: args.max_conns,
        })
    }

    /// Validates the configuration values are within acceptable bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("secret must not be empty".to_owned());
        }
        if self.tenant.is_empty() {
            return Err("tenant must not be empty".to_owned());
        }

        if self.rekey_interval == 0 {
            return Err("rekey_interval must be greater than 0".to_owned());
        }
        if self.rekey_interval > 3600 {
            return Err("rekey_interval exceeds reasonable limit (3600 seconds)".to_owned());
        }

        if self.auth_timeout == 0 {
            return Err("auth_timeout must be greater than 0".to_owned());
        }
        if self.auth_timeout > 300 {
            return Err("auth_timeout exceeds reasonable limit (300 seconds)".to_owned());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_owned());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_owned());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_owned());
        }
        if self.idle_timeout > 86_400 {
            return Err("idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_owned());
        }

        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_owned());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_owned());
        }
        Ok(())
    }

    /// Channel the backend publishes push messages on.
    #[must_use]
    pub fn bus_channel(&self) -> String {
        format!("{}:nodePush", self.tenant)
    }

    /// How often fresh rekey tokens are issued.
    #[must_use]
    pub fn rekey_period(&self) -> Duration {
        Duration::from_secs(self.rekey_interval)
    }

    /// Lifetime of a minted rekey token: three rekey periods, so a client
    /// that misses a renewal or races a rekey boundary can still resume.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.rekey_interval.saturating_mul(3))
    }
}
