pub mod api;
pub mod error;
pub mod rate_limit;
pub mod sse;

use crate::cli::Args;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use log::{ error, info };
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Server {
    addr: String,
    app: Router,
    tls: Option<(String, String)>,
}

impl Server {
    /// Fails when TLS is enabled without both a certificate and a key.
    pub fn new(addr: String, app: Router, args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let tls = if args.enable_tls {
            match (&args.tls_cert_path, &args.tls_key_path) {
                (Some(cert_path), Some(key_path)) => Some((cert_path.clone(), key_path.clone())),
                _ => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("TLS enabled without cert/key".into());
                }
            }
        } else {
            None
        };
        Ok(Self { addr, app, tls })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let service = self.app.into_make_service_with_connect_info::<SocketAddr>();

        match self.tls {
            Some((cert_path, key_path)) => {
                let addr: SocketAddr = self.addr.parse()?;
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;
                let handle = Handle::new();
                drain_on(handle.clone(), shutdown_signal());
                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, config).handle(handle).serve(service).await?;
            }
            None => {
                let listener = tokio::net::TcpListener::bind(&self.addr).await?;
                info!("HTTP server listening on: http://{}", listener.local_addr()?);
                axum::serve(listener, service).with_graceful_shutdown(shutdown_signal()).await?;
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Starts a graceful shutdown of `handle` once `signal` resolves.
fn drain_on<F>(handle: Handle, signal: F) where F: Future<Output = ()> + Send + 'static {
    tokio::spawn(async move {
        signal.await;
        info!("Draining connections");
        handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
