use async_stream::stream;
use futures::{Future, Stream};
use log::error;
use std::{
  io,
  net::SocketAddr,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
  time::Duration,
};
use tokio::net::{TcpListener, TcpStream};

// Accept errors like EMFILE tend to persist, retrying immediately would spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct HyperAcceptor {
  local_address: SocketAddr,
  acceptor: Pin<Box<dyn Stream<Item = Result<TcpStream, io::Error>> + Send>>,
}

impl HyperAcceptor {
  /// The address the listener is actually bound to, useful when binding to port 0.
  pub fn local_address(&self) -> SocketAddr {
    self.local_address
  }
}

impl hyper::server::accept::Accept for HyperAcceptor {
  type Conn = TcpStream;
  type Error = io::Error;

  fn poll_accept(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Result<Self::Conn, Self::Error>>> {
    self.acceptor.as_mut().poll_next(cx)
  }
}

pub async fn bind(address: SocketAddr) -> Result<HyperAcceptor, io::Error> {
  let listener = Arc::new(TcpListener::bind(address).await?);
  let local_address = listener.local_addr()?;

  let incoming_stream = incoming(move || {
    let listener = listener.clone();
    async move { listener.accept().await.map(|(socket, _)| socket) }
  });

  Ok(HyperAcceptor {
    local_address,
    acceptor: Box::pin(incoming_stream),
  })
}

/// Yields accepted connections forever. Failed accepts are logged and retried after a pause.
fn incoming<T, F, Fut>(mut accept: F) -> impl Stream<Item = Result<T, io::Error>>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, io::Error>>,
{
  stream! {
    loop {
      match accept().await {
        Ok(connection) => yield Ok::<_, io::Error>(connection),
        Err(e) => {
          error!("Failed to accept TCP socket: {}", e);
          tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
        }
      }
    }
  }
}

pub trait RemoteAddress {
  fn remote_addr(&self) -> io::Result<SocketAddr>;
}

impl RemoteAddress for TcpStream {
  fn remote_addr(&self) -> io::Result<SocketAddr> {
    self.peer_addr()
  }
}
