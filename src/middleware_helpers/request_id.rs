use crate::tracing::{scope_request_id, RequestId};
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied id we echo back
const MAX_CLIENT_ID_LEN: usize = 128;

/// Picks up a usable `x-request-id` from the client, if any.
fn inbound_request_id(headers: &HeaderMap) -> Option<(RequestId, HeaderValue)> {
    let raw = headers.get(REQUEST_ID_HEADER)?;
    let text = raw.to_str().ok()?.trim();
    if text.is_empty() || text.len() > MAX_CLIENT_ID_LEN {
        return None;
    }
    Some((RequestId::new(text), raw.clone()))
}

fn generated_request_id() -> (RequestId, HeaderValue) {
    let id = RequestId::default();
    let value = HeaderValue::from_str(id.as_str()).unwrap_or(HeaderValue::from_static("unknown"));
    (id, value)
}

/// Tags every request with an id, scopes it for error bodies and envelopes,
/// and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let (request_id, header_value) =
        inbound_request_id(request.headers()).unwrap_or_else(generated_request_id);
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    request
        .headers_mut()
        .insert(header_name.clone(), header_value.clone());
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "grn.request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = scope_request_id(request_id, next.run(request))
        .instrument(span)
        .await;
    response.headers_mut().insert(header_name, header_value);
    response
}
