//! Sonic Pi OSC client
//!
//! Sends GUI commands to Spider using the connection parameters found by
//! discovery. The parameters are process-wide state: they are replaced on
//! every (re)connect and never persisted.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use rosc::{OscMessage, OscPacket, OscType};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::sonic_pi::osc;
use crate::error::{MusicboxError, Result, SonicPiError, ValidationError};
use crate::sonic_pi::discovery::ConnectionParams;
use crate::sonic_pi::transport::OscTransport;

/// Sonic Pi client
pub struct SonicPiClient {
    /// Host Sonic Pi listens on
    host: IpAddr,

    /// Delivery of encoded packets
    transport: Arc<dyn OscTransport>,

    /// Current connection parameters, if connected
    params: RwLock<Option<ConnectionParams>>,
}

impl SonicPiClient {
    /// Create an unconfigured client
    pub fn new(host: IpAddr, transport: Arc<dyn OscTransport>) -> Self {
        Self {
            host,
            transport,
            params: RwLock::new(None),
        }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Apply discovered connection parameters
    pub async fn configure(&self, params: ConnectionParams) {
        tracing::info!("Configured Sonic Pi client: {}:{} ({})", self.host, params.gui_port, params);
        *self.params.write().await = Some(params);
    }

    /// Current connection parameters
    pub async fn connection(&self) -> Option<ConnectionParams> {
        *self.params.read().await
    }

    pub async fn is_configured(&self) -> bool {
        self.params.read().await.is_some()
    }

    /// Ask Sonic Pi to evaluate a buffer of code
    pub async fn run_code(&self, code: &str) -> Result<()> {
        let params = self.require_params().await?;
        self.send_gui(
            &params,
            osc::RUN_CODE,
            vec![OscType::Int(params.token), OscType::String(code.to_string())],
        )
        .await
    }

    /// Stop every running job
    pub async fn stop_all_jobs(&self) -> Result<()> {
        let params = self.require_params().await?;
        self.send_gui(&params, osc::STOP_ALL_JOBS, vec![OscType::Int(params.token)])
            .await
    }

    /// Set a Time State variable
    pub async fn set_variable(&self, name: &str, value: &Value) -> Result<()> {
        let code = set_variable_code(name, value)?;
        self.run_code(&code).await
    }

    async fn require_params(&self) -> Result<ConnectionParams> {
        self.connection()
            .await
            .ok_or(MusicboxError::SonicPi(SonicPiError::NotConnected))
    }

    async fn send_gui(
        &self,
        params: &ConnectionParams,
        addr: &str,
        args: Vec<OscType>,
    ) -> Result<()> {
        let target = SocketAddr::new(self.host, params.gui_port);
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        tracing::debug!("Sending {} to {}", addr, target);
        self.transport.send(target, &packet).await
    }
}

/// Build the Sonic Pi code that sets one Time State variable
///
/// Booleans become `1`/`0`. Only numbers and booleans are accepted.
pub fn set_variable_code(name: &str, value: &Value) -> Result<String> {
    let rendered = match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(MusicboxError::Validation(ValidationError::InvalidParameter {
                name: name.to_string(),
                message: "value must be a number or boolean".to_string(),
            }))
        }
    };

    if name.is_empty() {
        return Err(MusicboxError::Validation(ValidationError::InvalidParameter {
            name: name.to_string(),
            message: "parameter name must not be empty".to_string(),
        }));
    }

    Ok(format!("set {}, {}", symbol(name), rendered))
}

/// Ruby symbol literal for `name`
fn symbol(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if plain {
        format!(":{}", name)
    } else {
        // `#` would start `#{..}`, `#@..` or `#$..` interpolation
        let escaped = name
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('#', "\\#");
        format!(":\"{}\"", escaped)
    }
}
