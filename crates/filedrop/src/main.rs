use relay::{start_tunnel, BlobStore, FileRelayApi, RelayState, TunnelProvider};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
    let local_base_url =
        std::env::var("DOMAIN").unwrap_or_else(|_| format!("http://localhost:{}", port));

    let provider = match std::env::var("TUNNEL_PROVIDER")
        .unwrap_or_default()
        .parse::<TunnelProvider>()
    {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!("{}, tunnel disabled", e);
            TunnelProvider::None
        }
    };

    // A working tunnel replaces the local base URL; a failing one only
    // costs the public address, never local serving.
    let mut base_url = local_base_url;
    let mut tunnel_handle = None;
    if provider != TunnelProvider::None {
        let static_domain = std::env::var("TUNNEL_DOMAIN").ok();
        let auth_token = std::env::var("TUNNEL_TOKEN").ok();
        match start_tunnel(provider, port, static_domain, auth_token).await {
            Ok((info, handle)) => {
                tracing::info!("Public URL via {}: {}", info.provider, info.public_url);
                base_url = info.public_url;
                tunnel_handle = Some(handle);
            }
            Err(e) => {
                tracing::warn!("Tunnel setup failed, serving locally only: {}", e);
            }
        }
    }

    let store = match BlobStore::new(&upload_dir).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to prepare upload directory '{}': {}", upload_dir, e);
            return;
        }
    };

    let api = FileRelayApi::new(RelayState::new(store, base_url));
    let server = tokio::spawn(api.serve("0.0.0.0", port));

    tokio::select! {
        result = server => {
            if let Ok(Err(e)) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    // The tunnel comes down before the listener does
    if let Some(handle) = tunnel_handle {
        handle.shutdown();
    }
}
