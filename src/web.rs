use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info};

use crate::auth::{AuthGate, Credential, SessionStore};
use crate::captcha::{CaptchaVerifier, RecaptchaVerifier};
use crate::config::{Config, NetworkConfig, ServerConfig};
use crate::wol::{self, PacketKind, PacketSender, UdpBroadcaster, WolError};

/// Query string accepted by `GET /`.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub action: Option<String>,
    pub logout: Option<String>,
}

/// Body accepted by `POST /`: either a login attempt or a device action.
#[derive(Deserialize, Debug, Default)]
pub struct PostForm {
    pub login: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "g-recaptcha-response", default)]
    pub captcha_token: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Serialize, Debug)]
pub struct StatusResponse {
    pub status: bool,
}

#[derive(Serialize, Debug)]
pub struct ActionResponse {
    pub result: String,
}

/// Privileged actions reachable through `POST /`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Wake,
    Sleep,
}

impl DeviceAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "wake" => Some(Self::Wake),
            "sleep" => Some(Self::Sleep),
            _ => None,
        }
    }

    pub fn packet_kind(self) -> PacketKind {
        match self {
            Self::Wake => PacketKind::Wake,
            Self::Sleep => PacketKind::Sleep,
        }
    }
}

/// Result of a privileged request, rendered to text only in the response.
#[derive(Debug)]
pub enum ActionOutcome {
    Sent(PacketKind),
    Failed(PacketKind, WolError),
    AuthenticationRequired,
    InvalidAction,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Sent(PacketKind::Wake) => "Magic packet sent.",
            Self::Sent(PacketKind::Sleep) => "Sleep packet sent.",
            Self::Failed(_, WolError::InvalidMacAddress) => "Invalid MAC address.",
            Self::Failed(_, WolError::SocketCreate(_)) => "Failed to create socket.",
            Self::Failed(_, WolError::SocketOption(_)) => "Failed to set socket options.",
            Self::Failed(PacketKind::Wake, WolError::Send(_)) => "Failed to send magic packet.",
            Self::Failed(PacketKind::Sleep, WolError::Send(_)) => "Failed to send sleep packet.",
            Self::AuthenticationRequired => "Authentication required",
            Self::InvalidAction => "Invalid action.",
        };
        f.write_str(msg)
    }
}

impl From<ActionOutcome> for ActionResponse {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            result: outcome.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthGate,
    pub sender: Arc<dyn PacketSender>,
    pub network: Arc<NetworkConfig>,
    pub server: Arc<ServerConfig>,
    pub captcha_site_key: Arc<str>,
}

impl AppState {
    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let verifier = RecaptchaVerifier::new(
            config.auth.recaptcha_secret_key.clone(),
            config.auth.recaptcha_verify_url.clone(),
        )
        .context("Failed to build the CAPTCHA HTTP client")?;
        let captcha: Arc<dyn CaptchaVerifier> = Arc::new(verifier);
        let sender: Arc<dyn PacketSender> =
            Arc::new(UdpBroadcaster::new(config.server.send_timeout()));
        Ok(Self::with_collaborators(config, captcha, sender))
    }

    pub fn with_collaborators(
        config: &Config,
        captcha: Arc<dyn CaptchaVerifier>,
        sender: Arc<dyn PacketSender>,
    ) -> Self {
        let credential = Credential {
            username: config.auth.username.clone(),
            password: config.auth.password.clone(),
        };
        let sessions = SessionStore::new(config.server.session_ttl());
        Self {
            auth: AuthGate::new(credential, captcha, sessions),
            sender,
            network: Arc::new(config.network.clone()),
            server: Arc::new(config.server.clone()),
            captcha_site_key: Arc::from(config.auth.recaptcha_site_key.as_str()),
        }
    }

    /// Send the packet for `action` to the configured device.
    ///
    /// The socket work (including broadcast address resolution) runs on the
    /// blocking pool and is abandoned after `server.send_timeout_ms`.
    pub async fn perform(&self, action: DeviceAction) -> ActionOutcome {
        let kind = action.packet_kind();
        let net = Arc::clone(&self.network);
        let sender = Arc::clone(&self.sender);

        let task = tokio::task::spawn_blocking(move || {
            wol::send_packet(
                sender.as_ref(),
                kind,
                &net.mac_address,
                &net.broadcast_ip,
                net.wol_port,
            )
        });

        let result = match timeout(self.server.send_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(WolError::Send(io::Error::new(io::ErrorKind::Other, join))),
            Err(_) => Err(WolError::Send(io::Error::new(
                io::ErrorKind::TimedOut,
                "send timed out",
            ))),
        };

        let net = &self.network;
        match result {
            Ok(mac) => {
                info!(
                    "Sent {} packet to {} via {}:{}",
                    kind, mac, net.broadcast_ip, net.wol_port
                );
                ActionOutcome::Sent(kind)
            }
            Err(e) => {
                error!("{} request failed: {}", kind, e);
                ActionOutcome::Failed(kind, e)
            }
        }
    }
}

/// Remote desktop connection descriptor for `target` (`host:port`).
pub fn rdp_descriptor(target: &str) -> String {
    format!(
        "full address:s:{target}\r\n\
         prompt for credentials:i:1\r\n\
         administrative session:i:1\r\n\
         screen mode id:i:2\r\n"
    )
}
