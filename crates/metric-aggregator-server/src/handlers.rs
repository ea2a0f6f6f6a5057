//! `/concepts/metrics` request handling and the JSON response helpers shared
//! by the router.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use metric_aggregator::{ConceptMetricsSource, RequestContext, ValidationError};
use serde::Serialize;
use url::form_urlencoded;

pub(crate) const UUIDS_PARAM: &str = "uuids";

pub(crate) fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value)
        .unwrap_or_else(|_| b"{\"message\":\"failed to serialize response\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            Response::new(Full::new(Bytes::from_static(b"{\"message\":\"internal error\"}")))
        })
}

pub(crate) fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "message": msg });
    json_response(status, &v)
}

/// Reads the first `uuids` parameter and splits it on commas. Entries are
/// taken verbatim: no trimming, deduplication or format checks.
pub(crate) fn extract_concept_uuids(
    query: Option<&str>,
    max_batch_size: usize,
) -> Result<Vec<String>, ValidationError> {
    let raw = query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == UUIDS_PARAM)
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_default();

    if raw.is_empty() {
        return Err(ValidationError::MissingUuids);
    }

    let uuids: Vec<String> = raw.split(',').map(str::to_string).collect();
    if uuids.len() > max_batch_size {
        return Err(ValidationError::BatchTooLarge { max: max_batch_size });
    }
    Ok(uuids)
}

pub(crate) async fn get_metrics(
    source: &dyn ConceptMetricsSource,
    ctx: &RequestContext,
    query: Option<&str>,
    max_batch_size: usize,
) -> Response<Full<Bytes>> {
    let uuids = match extract_concept_uuids(query, max_batch_size) {
        Ok(uuids) => uuids,
        Err(e) => {
            tracing::info!(transaction_id = %ctx.transaction_id, error = %e, "rejected metrics request");
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    match source.concept_metrics(ctx, &uuids).await {
        Ok(results) => json_response(StatusCode::OK, &results),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
