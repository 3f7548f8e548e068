// rest_api/src/config.rs

use std::net::{AddrParseError, IpAddr, SocketAddr};

/// Default listen port, matching the service's historical deployment.
pub const DEFAULT_PORT: u16 = 5000;

/// Default bind host. The service fronts a browser UI on other machines,
/// so it binds all interfaces unless told otherwise.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default directory of static frontend assets.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            static_dir: DEFAULT_STATIC_DIR.to_string(),
        }
    }
}

impl ApiConfig {
    /// The socket address to bind, parsed from the host and port.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
