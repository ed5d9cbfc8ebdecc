//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

/// Underlying transport (TCP or TLS).
#[derive(Debug)]
enum Inner {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

/// SMTP stream with a per-operation timeout.
///
/// Every read and write is bounded by the timeout given at connect time,
/// so a stalled server cannot hold a worker beyond the configured limit.
#[derive(Debug)]
pub struct SmtpStream {
    inner: Inner,
    timeout: Duration,
}

impl SmtpStream {
    /// Reads a line from the stream, without the trailing line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or exceeds the timeout.
    pub async fn read_line(&mut self) -> Result<String> {
        let limit = self.timeout;
        let mut line = String::new();
        let read = async {
            match &mut self.inner {
                Inner::Tcp(reader) => reader.read_line(&mut line).await,
                Inner::Tls(reader) => reader.read_line(&mut line).await,
            }
        };

        tokio::time::timeout(limit, read)
            .await
            .map_err(|_| Error::Timeout(limit))??;

        Ok(line.trim_end().to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or exceeds the timeout.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.timeout;
        let write = async {
            match &mut self.inner {
                Inner::Tcp(reader) => {
                    reader.get_mut().write_all(data).await?;
                    reader.get_mut().flush().await
                }
                Inner::Tls(reader) => {
                    reader.get_mut().write_all(data).await?;
                    reader.get_mut().flush().await
                }
            }
        };

        tokio::time::timeout(limit, write)
            .await
            .map_err(|_| Error::Timeout(limit))??;

        Ok(())
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails or exceeds the timeout.
pub async fn connect(hostname: &str, port: u16, timeout: Duration) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    Ok(SmtpStream {
        inner: Inner::Tcp(BufReader::new(stream)),
        timeout,
    })
}

/// Connects to an SMTP server over implicit TLS (port 465 style).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails or exceeds
/// the timeout.
pub async fn connect_tls(hostname: &str, port: u16, timeout: Duration) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let tcp_stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    let connector = create_tls_connector();
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp_stream))
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    Ok(SmtpStream {
        inner: Inner::Tls(Box::new(BufReader::new(tls_stream))),
        timeout,
    })
}

/// Creates a TLS connector with webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
