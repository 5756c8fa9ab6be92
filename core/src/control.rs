//! Control backend interface for establishing tunnels.
//!
//! The HTTP adapter talks to the cluster proxy endpoint that owns the
//! actual tunnels:
//!
//! - `POST   /pods/port-forward/{namespace}/{kind}/{name}?port&forwardPort` -> `{"port": n}`
//! - `DELETE /pods/port-forward/{namespace}/{kind}/{name}?port&forwardPort`
//! - `GET    /pods/port-forward/{namespace}/{kind}/{name}?port&forwardPort` -> `{"port": n}`, 404/empty when not active

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ForwardError, Result};
use crate::models::ForwardTarget;

/// Interface to the backend that establishes and tears down tunnels.
///
/// Implementations perform a single request per call; retry policy, if
/// any, belongs to the caller.
pub trait ControlApi: Send + Sync {
    /// Requests a tunnel to `target` bound to `forward_port` locally
    /// (`0` = any free port). Returns the port actually bound.
    fn start_tunnel(
        &self,
        target: &ForwardTarget,
        forward_port: u16,
    ) -> impl Future<Output = Result<u16>> + Send;

    /// Tears down the tunnel to `target` bound at `forward_port`.
    fn stop_tunnel(
        &self,
        target: &ForwardTarget,
        forward_port: u16,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Queries the live tunnel to `target`. Returns the bound port, or
    /// `None` if no tunnel is active.
    fn query_tunnel(
        &self,
        target: &ForwardTarget,
        forward_port: u16,
    ) -> impl Future<Output = Result<Option<u16>>> + Send;
}

/// Response body for start and query requests.
#[derive(Debug, Deserialize)]
struct TunnelResponse {
    port: u16,
}

/// HTTP client for the port-forward control endpoint.
pub struct HttpControlApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpControlApi {
    /// Creates a client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn tunnel_url(&self, target: &ForwardTarget, forward_port: u16) -> String {
        format!(
            "{}/pods/port-forward/{}/{}/{}?port={}&forwardPort={}",
            self.base_url, target.namespace, target.kind, target.name, target.port, forward_port
        )
    }
}

impl ControlApi for HttpControlApi {
    async fn start_tunnel(&self, target: &ForwardTarget, forward_port: u16) -> Result<u16> {
        let response = self
            .http
            .post(self.tunnel_url(target, forward_port))
            .send()
            .await
            .map_err(|e| ForwardError::Control(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwardError::Control(format!(
                "Start returned {}",
                response.status()
            )));
        }

        let body: TunnelResponse = response
            .json()
            .await
            .map_err(|e| ForwardError::Control(e.to_string()))?;
        Ok(body.port)
    }

    async fn stop_tunnel(&self, target: &ForwardTarget, forward_port: u16) -> Result<()> {
        let response = self
            .http
            .delete(self.tunnel_url(target, forward_port))
            .send()
            .await
            .map_err(|e| ForwardError::Control(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwardError::Control(format!(
                "Stop returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn query_tunnel(&self, target: &ForwardTarget, forward_port: u16) -> Result<Option<u16>> {
        let response = self
            .http
            .get(self.tunnel_url(target, forward_port))
            .send()
            .await
            .map_err(|e| ForwardError::Control(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ForwardError::Control(format!(
                "Query returned {}",
                response.status()
            )));
        }

        // An empty body also means no active tunnel.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForwardError::Control(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let body: TunnelResponse = serde_json::from_slice(&bytes)?;
        Ok(Some(body.port))
    }
}
