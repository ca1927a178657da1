//! Forwarding of admitted requests to the upstream service.

use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, InvalidUriParts, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::UpstreamConfig;
use crate::http::server::ServerError;
use crate::observability::metrics;

/// Client bound to the single upstream.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ServerError> {
        let authority = Authority::from_str(&config.address)
            .map_err(|_| ServerError::InvalidUpstream(config.address.clone()))?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client, authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn rewrite(&self, uri: &Uri) -> Result<Uri, InvalidUriParts> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts)
    }
}

/// Fallback handler: send the request on unchanged and stream the answer back.
pub async fn forward_handler(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    parts.uri = match upstream.rewrite(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "Cannot rewrite request URI");
            return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
        }
    };
    // The upstream leg is always plain HTTP/1.1.
    parts.version = Version::HTTP_11;

    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    match upstream.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => relay(response),
        Err(e) => {
            tracing::error!(
                method = %method,
                path = %path,
                upstream = %upstream.authority,
                error = %e,
                "Upstream error"
            );
            metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Hand the upstream response back to the client, streaming its body.
fn relay(response: Response<Incoming>) -> Response {
    metrics::record_upstream(response.status().as_u16());
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}
