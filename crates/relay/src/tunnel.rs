//! Tunnel management for exposing the relay under a public domain
//!
//! The tunnel is an opaque collaborator: given a local port it yields a
//! public base URL and a handle that shuts the tunnel down. Setup failure
//! is reported but never fatal; the relay keeps serving locally.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;

use crate::error::{RelayError, RelayResult};

/// Tunnel provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelProvider {
    /// Cloudflare Tunnel - requires the cloudflared binary
    Cloudflare,
    /// No tunnel - serve on the local base URL only
    None,
}

impl std::str::FromStr for TunnelProvider {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudflare" | "cf" => Ok(TunnelProvider::Cloudflare),
            "none" | "disabled" | "" => Ok(TunnelProvider::None),
            _ => Err(RelayError::Tunnel(format!("unknown tunnel provider: {}", s))),
        }
    }
}

/// Result of starting a tunnel
#[derive(Debug, Clone)]
pub struct TunnelInfo {
    /// Public URL under which the relay is reachable
    pub public_url: String,
    /// Provider name
    pub provider: String,
}

/// Handle for controlling a running tunnel
pub struct TunnelHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl TunnelHandle {
    /// Signal the tunnel to shut down
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Start a tunnel to expose the local relay
///
/// # Arguments
/// * `provider` - Tunnel provider to use
/// * `local_port` - Local port to tunnel
/// * `static_domain` - Fixed public domain for a named tunnel
/// * `auth_token` - Provider auth token paired with the static domain
pub async fn start_tunnel(
    provider: TunnelProvider,
    local_port: u16,
    static_domain: Option<String>,
    auth_token: Option<String>,
) -> RelayResult<(TunnelInfo, TunnelHandle)> {
    match provider {
        TunnelProvider::Cloudflare => {
            start_cloudflare_tunnel(local_port, static_domain, auth_token).await
        }
        TunnelProvider::None => Err(RelayError::Tunnel(
            "no tunnel provider configured".to_string(),
        )),
    }
}

/// Start a Cloudflare tunnel
///
/// A static domain plus auth token runs a named tunnel whose public URL is
/// known up front; otherwise an ephemeral quick tunnel is created and its
/// assigned URL parsed from cloudflared's output.
async fn start_cloudflare_tunnel(
    local_port: u16,
    static_domain: Option<String>,
    auth_token: Option<String>,
) -> RelayResult<(TunnelInfo, TunnelHandle)> {
    tracing::info!("Starting Cloudflare tunnel for port {}", local_port);

    if !is_command_available("cloudflared").await {
        return Err(RelayError::Tunnel(
            "cloudflared command not found in PATH".to_string(),
        ));
    }

    let local_url = format!("http://localhost:{}", local_port);
    let (args, known_url) = match (static_domain, auth_token) {
        (Some(domain), Some(token)) => (
            vec![
                "tunnel".to_string(),
                "run".to_string(),
                "--token".to_string(),
                token,
                "--url".to_string(),
                local_url,
            ],
            Some(format!("https://{}", domain)),
        ),
        (Some(domain), None) => {
            return Err(RelayError::Tunnel(format!(
                "tunnel domain {} configured without an auth token",
                domain
            )));
        }
        _ => (
            vec!["tunnel".to_string(), "--url".to_string(), local_url],
            None,
        ),
    };

    let mut child = tunnel_command("cloudflared")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RelayError::Tunnel(format!("failed to spawn cloudflared: {}", e)))?;

    let public_url = match known_url {
        Some(url) => url,
        None => {
            let stderr = child.stderr.take().ok_or_else(|| {
                RelayError::Tunnel("failed to capture cloudflared output".to_string())
            })?;
            wait_for_quick_tunnel_url(&mut child, stderr).await?
        }
    };

    tracing::info!("Cloudflare tunnel established: {}", public_url);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Manage the process lifetime in the background
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Shutting down Cloudflare tunnel");
                    let _ = child.kill().await;
                }
            }
            status = child.wait() => {
                if let Ok(status) = status {
                    tracing::warn!("Cloudflare tunnel exited: {}", status);
                }
            }
        }
    });

    Ok((
        TunnelInfo {
            public_url,
            provider: "Cloudflare".to_string(),
        },
        TunnelHandle { shutdown_tx },
    ))
}

/// Command builder for the tunnel child process. The child is tied to its
/// handle, so a dropped tunnel cannot leave an orphaned process behind.
fn tunnel_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd
}

/// Read cloudflared's output until it announces the quick tunnel URL
async fn wait_for_quick_tunnel_url(child: &mut Child, stderr: ChildStderr) -> RelayResult<String> {
    let mut reader = BufReader::new(stderr).lines();
    let mut attempts = 0;
    const MAX_ATTEMPTS: u32 = 30;

    while attempts < MAX_ATTEMPTS {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        tracing::debug!("cloudflared: {}", line);

                        if let Some(url) = extract_url_from_line(&line) {
                            if url.contains("trycloudflare.com") {
                                return Ok(url);
                            }
                        }
                    }
                    Ok(None) => {
                        if let Ok(Some(status)) = child.try_wait() {
                            return Err(RelayError::Tunnel(format!(
                                "cloudflared exited unexpectedly: {}",
                                status
                            )));
                        }
                        return Err(RelayError::Tunnel(
                            "cloudflared output closed unexpectedly".to_string(),
                        ));
                    }
                    Err(e) => {
                        return Err(RelayError::Tunnel(format!(
                            "error reading cloudflared output: {}",
                            e
                        )));
                    }
                }
            }
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(1)) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(RelayError::Tunnel(format!(
                        "cloudflared exited before tunnel ready: {}",
                        status
                    )));
                }
                attempts += 1;
            }
        }
    }

    Err(RelayError::Tunnel(
        "timeout waiting for Cloudflare tunnel URL".to_string(),
    ))
}

/// Extract URL from a line of text
fn extract_url_from_line(line: &str) -> Option<String> {
    if let Some(start) = line.find("https://") {
        let url_part = &line[start..];
        let end = url_part
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(url_part.len());

        let url = url_part[..end].trim().to_string();
        if url.len() > 10 {
            return Some(url);
        }
    }
    None
}

/// Check if a command is available in PATH
async fn is_command_available(cmd: &str) -> bool {
    #[cfg(target_os = "windows")]
    let which_cmd = "where";

    #[cfg(not(target_os = "windows"))]
    let which_cmd = "which";

    Command::new(which_cmd)
        .arg(cmd)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
