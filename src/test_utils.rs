use hyper::{
  header::{CONNECTION, UPGRADE},
  service::{make_service_fn, service_fn},
  Body, Request, Response, StatusCode,
};
use std::{convert::Infallible, net::SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Starts a backend that answers with its name, the request URI and the `x-forwarded-for` header.
pub async fn spawn_backend(name: &'static str) -> SocketAddr {
  let make_service = make_service_fn(move |_| async move {
    Ok::<_, Infallible>(service_fn(move |request: Request<Body>| async move {
      let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
      let body = format!("{} {} {}", name, request.uri(), forwarded_for);
      Ok::<_, Infallible>(Response::new(Body::from(body)))
    }))
  });

  let server = hyper::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_service);
  let address = server.local_addr();
  tokio::spawn(server);
  address
}

/// Starts a backend that switches every request to the `echo` protocol and then sends back
/// the first four bytes it receives.
pub async fn spawn_upgrade_backend() -> SocketAddr {
  let make_service = make_service_fn(|_| async {
    Ok::<_, Infallible>(service_fn(|mut request: Request<Body>| async move {
      let on_upgrade = hyper::upgrade::on(&mut request);
      tokio::spawn(async move {
        if let Ok(mut upgraded) = on_upgrade.await {
          let mut buffer = [0; 4];
          if upgraded.read_exact(&mut buffer).await.is_ok() {
            let _ = upgraded.write_all(&buffer).await;
          }
        }
      });

      let response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "upgrade")
        .header(UPGRADE, "echo")
        .body(Body::empty())
        .unwrap();
      Ok::<_, Infallible>(response)
    }))
  });

  let server = hyper::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_service);
  let address = server.local_addr();
  tokio::spawn(server);
  address
}

/// An address nothing listens on.
pub fn unused_address() -> SocketAddr {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  listener.local_addr().unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
  let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
  String::from_utf8(bytes.to_vec()).unwrap()
}
