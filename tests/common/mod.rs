//! Shared utilities for integration testing: a throwaway PKI, echo backends
//! and a running proxy.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, http::header, Router};
use mtls_proxy::http::ProxyServer;
use mtls_proxy::config::{BackendTarget, ProxyConfig, TlsConfig};
use mtls_proxy::lifecycle::{startup, Shutdown};
use mtls_proxy::net::listener;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// A certificate authority and the certificates it issued.
pub struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue a leaf for `names`; returns (certificate PEM, key PEM).
    pub fn issue(&self, common_name: &str, names: &[&str]) -> (String, String) {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let mut params = CertificateParams::new(names).unwrap();
        params.distinguished_name.push(DnType::CommonName, common_name);
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    /// Client identity for reqwest (certificate followed by key).
    pub fn client_identity(&self, names: &[&str]) -> reqwest::Identity {
        let (cert, key) = self.issue("test client", names);
        reqwest::Identity::from_pem(format!("{cert}{key}").as_bytes()).unwrap()
    }
}

/// Files backing the proxy's `[tls]` section.
pub struct Pki {
    pub ca: TestCa,
    dir: TempDir,
}

impl Pki {
    /// One CA that signs both the server certificate (for `localhost` and
    /// the test vhosts) and the trusted client certificates.
    pub fn new() -> Self {
        let ca = TestCa::new("Test Root CA");
        let dir = TempDir::new().unwrap();
        let (server_cert, server_key) = ca.issue(
            "mtls-proxy",
            &["localhost", "127.0.0.1", "a.example.com", "b.example.com"],
        );

        fs::write(dir.path().join("ca.pem"), ca.pem()).unwrap();
        fs::write(dir.path().join("server.pem"), server_cert).unwrap();
        fs::write(dir.path().join("server-key.pem"), server_key).unwrap();

        Self { ca, dir }
    }

    pub fn tls_config(&self) -> TlsConfig {
        let path = |name: &str| self.dir.path().join(name).display().to_string();
        TlsConfig {
            ca: path("ca.pem"),
            cert: path("server.pem"),
            key: path("server-key.pem"),
        }
    }

    /// HTTPS client trusting the test CA, optionally presenting `identity`.
    pub fn client(&self, identity: Option<reqwest::Identity>) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(reqwest::Certificate::from_pem(self.ca.pem().as_bytes()).unwrap())
            .http1_only()
            .no_proxy()
            .timeout(Duration::from_secs(10));
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        builder.build().unwrap()
    }

    /// HTTP/2-only client presenting `identity`.
    pub fn h2_client(&self, identity: reqwest::Identity) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(reqwest::Certificate::from_pem(self.ca.pem().as_bytes()).unwrap())
            .http2_prior_knowledge()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .identity(identity)
    }

    /// Raw TLS connection to the proxy with a trusted client certificate,
    /// for driving HTTP/1.1 byte by byte.
    pub async fn connect_raw(&self, addr: SocketAddr) -> TlsStream<TcpStream> {
        let (cert_pem, key_pem) = self.ca.issue("raw client", &["client.example.com"]);
        let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes()).unwrap().unwrap();

        let mut roots = rustls::RootCertStore::empty();
        for ca in rustls_pemfile::certs(&mut self.ca.pem().as_bytes()) {
            roots.add(ca.unwrap()).unwrap();
        }

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .unwrap();

        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
        TlsConnector::from(Arc::new(config)).connect(name, tcp).await.unwrap()
    }
}

/// Read until the peer closes the connection (cleanly or not).
pub async fn read_until_closed<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return received,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
        }
    }
}

/// An echo backend that counts the requests it served.
pub struct EchoBackend {
    pub name: &'static str,
    pub port: u16,
    hits: Arc<AtomicUsize>,
}

impl EchoBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn target(&self) -> BackendTarget {
        BackendTarget::Port(self.port)
    }
}

/// Start a backend answering `name|host|path|x-forwarded-for`.
pub async fn start_echo_backend(name: &'static str) -> EchoBackend {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().fallback(move |request: Request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let read = |name: &str| {
                request
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            let host = read(header::HOST.as_str());
            let xff = read("x-forwarded-for");
            let path = request
                .uri()
                .path_and_query()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            format!("{name}|{host}|{path}|{xff}")
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    EchoBackend { name, port, hits }
}

/// Start a backend that reads the whole request body, then answers
/// `name|<body length>`.
pub async fn start_sink_backend(name: &'static str) -> EchoBackend {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().fallback(move |request: Request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            match axum::body::to_bytes(request.into_body(), usize::MAX).await {
                Ok(body) => format!("{name}|{}", body.len()),
                Err(_) => format!("{name}|aborted"),
            }
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    EchoBackend { name, port, hits }
}

/// Start a backend that sends response headers and part of the body, then
/// holds the connection open without finishing.
pub async fn start_stalling_backend() -> BackendTarget {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                .await;
            held.push(socket);
        }
    });

    BackendTarget::Port(port)
}

/// Proxy configuration on an ephemeral local port.
pub fn proxy_config(pki: &Pki, vhosts: Vec<(&str, BackendTarget)>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listen = "127.0.0.1:0".into();
    config.tls = pki.tls_config();
    config.vhosts = vhosts
        .into_iter()
        .map(|(host, target)| (host.to_string(), target))
        .collect::<BTreeMap<_, _>>();
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// A proxy running in the background.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr.port(), path)
    }
}

pub fn start_proxy(config: &ProxyConfig) -> RunningProxy {
    let listener = listener::bind(&config.listen).unwrap();
    start_proxy_on(config, listener)
}

/// Start a proxy on an already bound listener, for configs that need the
/// port up front.
pub fn start_proxy_on(config: &ProxyConfig, listener: std::net::TcpListener) -> RunningProxy {
    let server: ProxyServer = startup::prepare(config).unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningProxy { addr, shutdown, task }
}
