//! Liveness HTTP endpoint, independent of pipeline state.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::GET && req.uri().path() == "/health" {
        Ok(Response::new(Body::from("ok")))
    } else {
        let mut not_found = Response::new(Body::empty());
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        Ok(not_found)
    }
}

/// Binds `0.0.0.0:port` and serves `GET /health` in a background task.
///
/// A bind failure is fatal at startup, so it is returned rather than logged.
pub fn spawn(port: u16) -> Result<tokio::task::JoinHandle<()>, hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let builder = Server::try_bind(&addr)?;
    let server = builder.serve(make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(handle))
    }));
    log::info!("health endpoint listening on http://{addr}/health");
    Ok(tokio::spawn(async move {
        if let Err(e) = server.await {
            log::error!("health endpoint terminated: {e}");
        }
    }))
}
