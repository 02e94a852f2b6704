//! OTA/activation handshake against the assistant's bootstrap endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::BridgeError;
use crate::types::DeviceIdentity;

const OTA_TIMEOUT: Duration = Duration::from_secs(10);

/// Synthetic device descriptor sent in the OTA request body. The
/// assistant service only keys on the MAC; the rest is display metadata.
#[derive(Debug, Serialize)]
struct OtaRequest<'a> {
    application: ApplicationDescriptor<'a>,
    board: BoardDescriptor<'a>,
}

#[derive(Debug, Serialize)]
struct ApplicationDescriptor<'a> {
    name: &'a str,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct BoardDescriptor<'a> {
    #[serde(rename = "type")]
    board_type: &'a str,
    name: &'a str,
    mac: &'a str,
}

#[derive(Debug, Deserialize)]
struct OtaResponse {
    activation: Option<Activation>,
    websocket: Option<WebsocketDetails>,
}

#[derive(Debug, Deserialize)]
struct Activation {
    code: String,
}

#[derive(Debug, Deserialize)]
struct WebsocketDetails {
    url: String,
    token: Option<String>,
}

/// What the activation endpoint decided about this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaOutcome {
    /// The device is unbound; the user must enter this code on the
    /// assistant side before connecting can proceed.
    BindingRequired { code: String },
    /// Connection details for the voice session.
    Ready {
        ws_url: String,
        token: Option<String>,
    },
}

/// Posts the device descriptor and interprets the activation response.
pub async fn fetch_ota(
    http: &reqwest::Client,
    endpoint: &str,
    identity: &DeviceIdentity,
) -> Result<OtaOutcome, BridgeError> {
    let body = OtaRequest {
        application: ApplicationDescriptor {
            name: "deskfriends",
            version: env!("CARGO_PKG_VERSION"),
        },
        board: BoardDescriptor {
            board_type: "desktop",
            name: &identity.name,
            mac: &identity.mac,
        },
    };

    debug!(endpoint = %endpoint, mac = %identity.mac, "requesting OTA details");
    let response = http
        .post(endpoint)
        .header("Device-Id", &identity.mac)
        .header("Client-Id", &identity.client_id)
        .json(&body)
        .timeout(OTA_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let parsed: OtaResponse = response.json().await?;

    if let Some(activation) = parsed.activation {
        info!(code = %activation.code, "device binding required");
        return Ok(OtaOutcome::BindingRequired {
            code: activation.code,
        });
    }
    match parsed.websocket {
        Some(ws) => Ok(OtaOutcome::Ready {
            ws_url: ws.url,
            token: ws.token,
        }),
        None => Err(BridgeError::Protocol(
            "OTA response carries neither activation code nor websocket details".into(),
        )),
    }
}
