//! # Configuration
//!
//! The source pulls every tunable off a global `brain.Const` tree populated
//! from JSON config files (see the teacher's `lib_common::config_sys`). The
//! fabric doesn't need that whole layered-config machinery — just the
//! handful of values §6 says it consumes — so `FabricConfig` assembles them
//! from environment variables via `dotenvy`, the same env-first layering
//! style, with typed `Default`s standing in for the teacher's JSON defaults.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Buffer size and heartbeat interval for one transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportParam {
    pub buffer_size: usize,
    pub interval_ms: u64,
}

impl TransportParam {
    pub const fn new(buffer_size: usize, interval_ms: u64) -> Self {
        Self { buffer_size, interval_ms }
    }

    /// The read loop's I/O deadline for this transport's *client/stream*
    /// variants: bare interval, no grace window (§4.3).
    pub fn bare_deadline(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The read loop's I/O deadline for TCP-server/WS handlers: interval
    /// plus the mandated 3000ms grace window (§4.3).
    pub fn grace_deadline(&self) -> Duration {
        Duration::from_millis(self.interval_ms + 3000)
    }
}

/// `Const.{WS,TCP,UDP}Param` plus `Const.UDPParam.MaxLen`, bundled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EndpointParams {
    pub ws: TransportParam,
    pub tcp: TransportParam,
    pub udp: TransportParam,
    pub udp_max_len: usize,
}

impl Default for EndpointParams {
    fn default() -> Self {
        Self {
            ws: TransportParam::new(4096, 30_000),
            tcp: TransportParam::new(4096, 30_000),
            udp: TransportParam::new(2048, 30_000),
            udp_max_len: 64,
        }
    }
}

/// `Const.HTTPServer.{StaticPath,XPoweredBy,ACAO}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    pub static_path: String,
    pub x_powered_by: String,
    pub acao: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            static_path: "./public".to_string(),
            x_powered_by: "fabric_core".to_string(),
            acao: false,
        }
    }
}

/// The handful of host-supplied values the core actually consumes (§6):
/// buffer sizes, heartbeat intervals, the UDP pool cap, the diagnostic log
/// level (`RunEnv`), the HTTP static-file/control-plane surface, and the
/// query-parameter prefix for the start/stop control plane (`NeuronId`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    pub endpoint: EndpointParams,
    /// `<2` enables the WS `HEART`-filtered hex-dump log line (§6).
    pub run_env: i32,
    pub http: HttpServerConfig,
    pub neuron_id: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointParams::default(),
            run_env: 2,
            http: HttpServerConfig::default(),
            neuron_id: "neuronId".to_string(),
        }
    }
}

impl FabricConfig {
    /// Loads `.env` (if present) then layers environment overrides on top of
    /// [`FabricConfig::default`]. Unset/unparsable variables silently keep
    /// the default — this mirrors the teacher's `config_sys.rs`, which logs
    /// a missing config file and falls through rather than failing to boot.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();

        if let Some(v) = env_usize("FABRIC_TCP_BUFFER_SIZE") {
            cfg.endpoint.tcp.buffer_size = v;
        }
        if let Some(v) = env_u64("FABRIC_TCP_INTERVAL_MS") {
            cfg.endpoint.tcp.interval_ms = v;
        }
        if let Some(v) = env_usize("FABRIC_UDP_BUFFER_SIZE") {
            cfg.endpoint.udp.buffer_size = v;
        }
        if let Some(v) = env_u64("FABRIC_UDP_INTERVAL_MS") {
            cfg.endpoint.udp.interval_ms = v;
        }
        if let Some(v) = env_usize("FABRIC_WS_BUFFER_SIZE") {
            cfg.endpoint.ws.buffer_size = v;
        }
        if let Some(v) = env_u64("FABRIC_WS_INTERVAL_MS") {
            cfg.endpoint.ws.interval_ms = v;
        }
        if let Some(v) = env_usize("FABRIC_UDP_MAX_LEN") {
            cfg.endpoint.udp_max_len = v;
        }
        if let Some(v) = env_i32("FABRIC_RUN_ENV") {
            cfg.run_env = v;
        }
        if let Ok(v) = env::var("FABRIC_STATIC_PATH") {
            cfg.http.static_path = v;
        }
        if let Ok(v) = env::var("FABRIC_X_POWERED_BY") {
            cfg.http.x_powered_by = v;
        }
        if let Some(v) = env_bool("FABRIC_ACAO") {
            cfg.http.acao = v;
        }
        if let Ok(v) = env::var("FABRIC_NEURON_ID") {
            cfg.neuron_id = v;
        }

        cfg
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_i32(key: &str) -> Option<i32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_deadline_adds_3000ms() {
        let p = TransportParam::new(1024, 1000);
        assert_eq!(p.bare_deadline(), Duration::from_millis(1000));
        assert_eq!(p.grace_deadline(), Duration::from_millis(4000));
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = FabricConfig::default();
        assert!(cfg.endpoint.tcp.buffer_size > 0);
        assert!(cfg.endpoint.udp_max_len > 0);
    }
}
