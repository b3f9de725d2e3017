use crate::{listeners::RemoteAddress, load_balancer::LoadBalancer};
use futures::{Future, TryFutureExt};
use hyper::{
  server::accept::Accept,
  service::{make_service_fn, Service},
  Body, Request, Response, Server,
};
use log::debug;
use std::{
  convert::Infallible,
  error::Error,
  io,
  net::SocketAddr,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Serves every connection of the acceptor through the load balancer until `shutdown` resolves.
pub async fn create<I, IE, IO, S>(acceptor: I, load_balancer: Arc<LoadBalancer>, shutdown: S) -> Result<(), io::Error>
where
  I: Accept<Conn = IO, Error = IE>,
  IE: Into<Box<dyn Error + Send + Sync>>,
  IO: AsyncRead + AsyncWrite + Unpin + Send + RemoteAddress + 'static,
  S: Future<Output = ()>,
{
  let service = make_service_fn(move |stream: &IO| {
    let client_address = stream.remote_addr();
    let load_balancer = load_balancer.clone();

    async move {
      Ok::<_, io::Error>(MainService {
        client_address: client_address?,
        load_balancer,
      })
    }
  });
  Server::builder(acceptor)
    .serve(service)
    .with_graceful_shutdown(shutdown)
    .map_err(|e| {
      let msg = format!("Failed to listen server: {}", e);
      io::Error::new(io::ErrorKind::Other, msg)
    })
    .await
}

pub struct MainService {
  client_address: SocketAddr,
  load_balancer: Arc<LoadBalancer>,
}

impl Service<Request<Body>> for MainService {
  type Response = Response<Body>;
  type Error = Infallible;

  // let's allow this complex type. A refactor would make it more complicated due to the used trait types
  #[allow(clippy::type_complexity)]
  type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

  fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
    Poll::Ready(Ok(()))
  }

  fn call(&mut self, request: Request<Body>) -> Self::Future {
    debug!("{:?} {} {}", request.version(), request.method(), request.uri());

    let load_balancer = self.load_balancer.clone();
    let client_address = self.client_address;

    Box::pin(async move { Ok(load_balancer.serve_proxy(request, client_address).await) })
  }
}
