//! Connection establishment for the NNTP client
//!
//! Handles TCP connect with timeout, socket tuning, the optional TLS
//! handshake, and server greeting validation.

use crate::config::NntpConfig;
use crate::error::{Result, TriageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::{NntpClient, NntpIo, NntpStream, SessionState};

/// TLS handshake timeout
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Certificate verifier that accepts anything
///
/// **Security Warning:** disables all certificate validation. Only used
/// when `allow_insecure_tls` is set.
#[derive(Debug)]
struct DangerousAcceptAnyCertificate;

impl ServerCertVerifier for DangerousAcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

impl NntpClient {
    /// Connect to an NNTP server, optionally over TLS
    ///
    /// Does not authenticate; call [`authenticate`](Self::authenticate)
    /// after connecting.
    ///
    /// # Errors
    ///
    /// - [`TriageError::Io`] - TCP connection fails
    /// - [`TriageError::ConnectTimeout`] - connect or handshake times out
    /// - [`TriageError::Tls`] - TLS handshake fails
    /// - [`TriageError::Protocol`] - server greeting is not 200/201
    pub async fn connect(config: &NntpConfig) -> Result<Self> {
        debug!("connecting to NNTP server {}:{}", config.host, config.port);

        let tcp_stream = Self::connect_tcp(config).await?;

        let stream = if config.use_tls {
            let tls_stream = Self::tls_handshake(config, tcp_stream).await?;
            NntpStream::Tls(Box::new(BufReader::new(tls_stream)))
        } else {
            NntpStream::Plain(BufReader::new(Box::new(tcp_stream) as Box<dyn NntpIo>))
        };

        let mut client = Self {
            stream,
            state: SessionState::Ready,
        };

        client.read_greeting().await?;
        Ok(client)
    }

    async fn connect_tcp(config: &NntpConfig) -> Result<TcpStream> {
        use socket2::{Domain, Protocol, Socket, Type};
        use std::net::ToSocketAddrs;

        let addr = format!("{}:{}", config.host, config.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| {
                TriageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("failed to resolve {}: {}", addr, e),
                ))
            })?
            .next()
            .ok_or_else(|| {
                TriageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no address resolved for {}", addr),
                ))
            })?;

        let domain = if socket_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket =
            Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(TriageError::Io)?;

        // Low-latency request/response pattern
        socket.set_nodelay(true).map_err(TriageError::Io)?;

        // socket2 connect is blocking; run it off the reactor and switch to
        // non-blocking mode only after the connect succeeds
        let std_stream = timeout(
            Duration::from_millis(config.conn_timeout_ms),
            tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
                socket.connect(&socket_addr.into())?;
                socket.set_nonblocking(true)?;
                Ok(socket.into())
            }),
        )
        .await
        .map_err(|_| TriageError::ConnectTimeout)?
        .map_err(|e| TriageError::Io(std::io::Error::other(format!("task join error: {}", e))))?
        .map_err(TriageError::Io)?;

        TcpStream::from_std(std_stream).map_err(TriageError::Io)
    }

    async fn tls_handshake(
        config: &NntpConfig,
        tcp_stream: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
        let _ = CryptoProvider::install_default(ring::default_provider());

        let tls_config = if config.allow_insecure_tls {
            warn!("TLS certificate validation disabled for {}", config.host);
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertificate))
                .with_no_client_auth()
        } else {
            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(config.host.as_str())
            .map_err(|e| TriageError::Tls(format!("invalid domain: {}", e)))?
            .to_owned();

        timeout(
            TLS_HANDSHAKE_TIMEOUT,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| TriageError::ConnectTimeout)?
        .map_err(|e| TriageError::Tls(format!("TLS handshake failed: {}", e)))
    }

    pub(super) async fn read_greeting(&mut self) -> Result<()> {
        let greeting = self.read_response().await?;
        debug!("server greeting: {} {}", greeting.code, greeting.message);

        if !greeting.is_success() {
            return Err(TriageError::Protocol {
                code: greeting.code,
                message: greeting.message,
            });
        }
        Ok(())
    }
}
