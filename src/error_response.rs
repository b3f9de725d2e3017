use hyper::{Body, Response, StatusCode};
use log::error;
use std::error::Error;

fn empty_response(status: StatusCode) -> Response<Body> {
  let mut response = Response::new(Body::empty());
  *response.status_mut() = status;
  response
}

pub fn bad_gateway() -> Response<Body> {
  empty_response(StatusCode::BAD_GATEWAY)
}

pub fn service_unavailable() -> Response<Body> {
  empty_response(StatusCode::SERVICE_UNAVAILABLE)
}

pub fn handle_internal_server_error<E: Error>(error: E) -> Response<Body> {
  log_error(error);
  internal_server_error()
}

pub fn internal_server_error() -> Response<Body> {
  empty_response(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn log_error<E: Error>(error: E) {
  error!("{}", error);
}
