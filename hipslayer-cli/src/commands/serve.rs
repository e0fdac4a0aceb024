//! Serve command - expose `/hips` over HTTP.
//!
//! Requests are handled by [`HipsService::handle`] on tokio's blocking
//! pool, since tile generation is CPU-bound and may wait on locks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Method as HttpMethod, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

use hipslayer::service::{HipsRequest, HipsService};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the serve command until Ctrl-C.
pub fn run(runner: &CliRunner, bind: SocketAddr) -> Result<(), CliError> {
    runner.log_startup("serve");

    let service = runner.shared_service();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Serve)?;

    runtime.block_on(async move {
        let app = router(service.clone());
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(CliError::Serve)?;

        info!(address = %bind, "Serving HiPS layers");
        for served in service.layers() {
            let layer = served.layer();
            println!("{}: http://{}/hips/{}/properties", layer.title(), bind, layer.name());
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down tile server");
            })
            .await
            .map_err(CliError::Serve)
    })
}

fn router(service: Arc<HipsService>) -> Router {
    Router::new()
        .route("/hips/*path", get(hips).head(hips))
        .with_state(service)
}

async fn hips(State(service): State<Arc<HipsService>>, method: HttpMethod, uri: Uri) -> Response {
    let request = if method == HttpMethod::HEAD {
        HipsRequest::head(uri.path())
    } else {
        HipsRequest::get(uri.path())
    };

    match tokio::task::spawn_blocking(move || service.handle(&request)).await {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                [(header::CONTENT_TYPE, response.content_type)],
                response.body,
            )
                .into_response()
        }
        Err(e) => {
            error!(path = %uri.path(), error = %e, "Request handler panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
