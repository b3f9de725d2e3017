use crate::{
  configuration::ClientConfig,
  error::ConfigurationError,
  error_response::{bad_gateway, handle_internal_server_error},
};
use async_trait::async_trait;
use hyper::{
  client::HttpConnector,
  header::{HeaderName, HeaderValue, CONNECTION, TE, UPGRADE},
  http::{
    self,
    uri::{Authority, Scheme},
  },
  upgrade::OnUpgrade,
  Body, Client, HeaderMap, Request, Response, StatusCode, Uri, Version,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_timeout::TimeoutConnector;
use log::{debug, error};
use std::{
  net::SocketAddr,
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};
use url::Url;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

// Headers that only apply to a single connection and must not be forwarded.
const HOP_HEADERS: [&str; 9] = [
  "connection",
  "keep-alive",
  "proxy-connection",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
];

type ProxyClient = Client<TimeoutConnector<HttpsConnector<HttpConnector>>, Body>;

/// A backend that requests can be forwarded to.
#[async_trait]
pub trait Server: Send + Sync + std::fmt::Debug {
  /// The address this server was configured with, used for diagnostics.
  fn address(&self) -> &str;

  fn is_alive(&self) -> bool;

  /// Forwards the request and returns the response that should be sent back to the client.
  /// Transport failures are reported as an error response, never retried.
  async fn serve(&self, request: Request<Body>, client_address: SocketAddr) -> Response<Body>;
}

/// Where a [`SimpleServer`] sends its requests to, parsed once at construction.
#[derive(Debug, PartialEq)]
struct Target {
  scheme: Scheme,
  authority: Authority,
  path: String,
  query: Option<String>,
}

impl Target {
  fn parse(address: &str) -> Result<Target, String> {
    let url = Url::parse(address).map_err(|e| e.to_string())?;
    let scheme = match url.scheme() {
      "http" => Scheme::HTTP,
      "https" => Scheme::HTTPS,
      other => return Err(format!("unsupported scheme {:?}, expected http or https", other)),
    };
    let host = url.host_str().ok_or_else(|| String::from("missing host"))?;
    let authority = match url.port() {
      Some(port) => format!("{}:{}", host, port),
      None => host.to_string(),
    };
    let authority = authority.parse::<Authority>().map_err(|e| e.to_string())?;

    Ok(Target {
      scheme,
      authority,
      path: url.path().to_string(),
      query: url.query().map(String::from),
    })
  }

  /// Rewrites an inbound request URI so that it points at this target.
  fn backend_uri(&self, inbound: &Uri) -> Result<Uri, http::Error> {
    let path = join_paths(&self.path, inbound.path());
    let path_and_query = match (self.query.as_deref(), inbound.query()) {
      (Some(target_query), Some(inbound_query)) => format!("{}?{}&{}", path, target_query, inbound_query),
      (Some(query), None) | (None, Some(query)) => format!("{}?{}", path, query),
      (None, None) => path,
    };

    Uri::builder()
      .scheme(self.scheme.clone())
      .authority(self.authority.clone())
      .path_and_query(path_and_query)
      .build()
  }
}

/// Joins two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
  match (base.ends_with('/'), path.starts_with('/')) {
    (true, true) => format!("{}{}", base, &path[1..]),
    (false, false) => format!("{}/{}", base, path),
    _ => format!("{}{}", base, path),
  }
}

/// Lowercased, comma separated tokens of all lines of a header.
fn header_tokens(headers: &HeaderMap, name: HeaderName) -> Vec<String> {
  headers
    .get_all(name)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .flat_map(|value| value.split(','))
    .map(|token| token.trim().to_ascii_lowercase())
    .filter(|token| !token.is_empty())
    .collect()
}

/// The protocol the client asks to switch to, if `Connection` carries the `upgrade` token.
fn upgrade_type(headers: &HeaderMap) -> Option<HeaderValue> {
  if header_tokens(headers, CONNECTION).iter().any(|token| token == "upgrade") {
    headers.get(UPGRADE).cloned()
  } else {
    None
  }
}

fn remove_hop_headers(headers: &mut HeaderMap) {
  for name in header_tokens(headers, CONNECTION) {
    headers.remove(name.as_str());
  }
  for name in HOP_HEADERS {
    headers.remove(name);
  }
}

fn set_upgrade_headers(headers: &mut HeaderMap, upgrade: HeaderValue) {
  headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
  headers.insert(UPGRADE, upgrade);
}

fn append_forwarded_for(headers: &mut HeaderMap, client_address: &SocketAddr) {
  // raw bytes, so earlier values survive even when they are not valid UTF-8
  let mut forwarded_for = Vec::new();
  for previous in headers.get_all(X_FORWARDED_FOR) {
    forwarded_for.extend_from_slice(previous.as_bytes());
    forwarded_for.extend_from_slice(b", ");
  }
  forwarded_for.extend_from_slice(client_address.ip().to_string().as_bytes());

  if let Ok(value) = HeaderValue::from_bytes(&forwarded_for) {
    headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
  }
}

fn build_client(config: &ClientConfig) -> ProxyClient {
  let https = HttpsConnectorBuilder::new()
    .with_webpki_roots()
    .https_or_http()
    .enable_http1()
    .build();

  let mut connector = TimeoutConnector::new(https);
  connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout)));
  connector.set_read_timeout(Some(Duration::from_millis(config.read_timeout)));
  connector.set_write_timeout(Some(Duration::from_millis(config.write_timeout)));
  Client::builder().build::<_, Body>(connector)
}

/// Forwards every request to one fixed address, like a single host reverse proxy.
#[derive(Debug)]
pub struct SimpleServer {
  address: String,
  target: Target,
  alive: AtomicBool,
  client: ProxyClient,
}

impl SimpleServer {
  pub fn new(address: &str, config: &ClientConfig) -> Result<SimpleServer, ConfigurationError> {
    let target = Target::parse(address).map_err(|reason| ConfigurationError::InvalidAddress {
      address: address.to_string(),
      reason,
    })?;

    Ok(SimpleServer {
      address: address.to_string(),
      target,
      alive: AtomicBool::new(true),
      client: build_client(config),
    })
  }

  /// Nothing probes backends yet; this is the hook a health checker would use.
  pub fn set_alive(&self, alive: bool) {
    self.alive.store(alive, Ordering::Release);
  }

  /// Copies bytes in both directions once client and backend connections are upgraded.
  fn tunnel(&self, client_upgrade: OnUpgrade, backend_upgrade: OnUpgrade) {
    let address = self.address.clone();
    tokio::spawn(async move {
      match futures::try_join!(client_upgrade, backend_upgrade) {
        Ok((mut client, mut backend)) => {
          if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut backend).await {
            debug!("Upgraded connection to {} closed: {}", address, e);
          }
        }
        Err(e) => error!("Failed to upgrade connection to {}: {}", address, e),
      }
    });
  }

  fn backend_request(&self, request: Request<Body>, client_address: &SocketAddr) -> Result<Request<Body>, http::Error> {
    let (mut parts, body) = request.into_parts();
    parts.uri = self.target.backend_uri(&parts.uri)?;
    parts.version = Version::HTTP_11;

    let upgrade = upgrade_type(&parts.headers);
    let te_trailers = header_tokens(&parts.headers, TE).iter().any(|token| token == "trailers");
    remove_hop_headers(&mut parts.headers);
    if te_trailers {
      parts.headers.insert(TE, HeaderValue::from_static("trailers"));
    }
    if let Some(upgrade) = upgrade {
      set_upgrade_headers(&mut parts.headers, upgrade);
    }
    append_forwarded_for(&mut parts.headers, client_address);
    Ok(Request::from_parts(parts, body))
  }
}

#[async_trait]
impl Server for SimpleServer {
  fn address(&self) -> &str {
    &self.address
  }

  fn is_alive(&self) -> bool {
    self.alive.load(Ordering::Acquire)
  }

  async fn serve(&self, mut request: Request<Body>, client_address: SocketAddr) -> Response<Body> {
    let upgrade = upgrade_type(request.headers());
    let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut request));

    let backend_request = match self.backend_request(request, &client_address) {
      Ok(backend_request) => backend_request,
      Err(e) => return handle_internal_server_error(e),
    };

    match self.client.request(backend_request).await {
      Ok(mut response) if response.status() == StatusCode::SWITCHING_PROTOCOLS => {
        let backend_upgrade = upgrade_type(response.headers());
        match (upgrade, client_upgrade, backend_upgrade) {
          (Some(requested), Some(client_upgrade), Some(switched))
            if requested.as_bytes().eq_ignore_ascii_case(switched.as_bytes()) =>
          {
            let backend_connection = hyper::upgrade::on(&mut response);
            self.tunnel(client_upgrade, backend_connection);
            remove_hop_headers(response.headers_mut());
            set_upgrade_headers(response.headers_mut(), switched);
            response
          }
          (requested, _, switched) => {
            error!(
              "Backend {} switched protocols to {:?}, but the client requested {:?}",
              self.address, switched, requested
            );
            bad_gateway()
          }
        }
      }
      Ok(mut response) => {
        remove_hop_headers(response.headers_mut());
        response
      }
      Err(e) => {
        error!("Failed to forward request to {}: {}", self.address, e);
        bad_gateway()
      }
    }
  }
}
