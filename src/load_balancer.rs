use crate::{
  backend::Server,
  error::{ConfigurationError, LoadBalancerError},
  error_response::service_unavailable,
};
use hyper::{Body, Request, Response};
use log::{info, warn};
use std::{
  net::SocketAddr,
  sync::{Arc, Mutex, PoisonError},
};

/// Distributes requests over a fixed pool of servers in round-robin order.
#[derive(Debug)]
pub struct LoadBalancer {
  servers: Vec<Arc<dyn Server>>,
  // always < servers.len()
  cursor: Mutex<usize>,
}

impl LoadBalancer {
  pub fn new(servers: Vec<Arc<dyn Server>>) -> Result<LoadBalancer, ConfigurationError> {
    if servers.is_empty() {
      return Err(ConfigurationError::EmptyPool);
    }

    Ok(LoadBalancer {
      servers,
      cursor: Mutex::new(0),
    })
  }

  /// Returns the next alive server, starting at the cursor and skipping servers that are down.
  ///
  /// Every server is probed at most once per call. If none of them is alive the cursor has made
  /// a full cycle and [`LoadBalancerError::AllServersDown`] is returned.
  pub fn next_available_server(&self) -> Result<Arc<dyn Server>, LoadBalancerError> {
    let len = self.servers.len();
    // the counter is always left in a valid state, so a panic elsewhere doesn't matter here
    let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

    for _ in 0..len {
      let server = &self.servers[*cursor];
      *cursor = (*cursor + 1) % len;
      if server.is_alive() {
        return Ok(server.clone());
      }
    }

    Err(LoadBalancerError::AllServersDown)
  }

  pub async fn serve_proxy(&self, request: Request<Body>, client_address: SocketAddr) -> Response<Body> {
    let server = match self.next_available_server() {
      Ok(server) => server,
      Err(e) => {
        warn!("Unable to forward {} {}: {}", request.method(), request.uri(), e);
        return service_unavailable();
      }
    };

    info!("forwarding request to address {:?}", server.address());
    server.serve(request, client_address).await
  }
}
