use std::time::Duration;

use axum::http::header::{self, HeaderName};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};

use crate::encoder::OutgoingEvents;

/// Disables proxy buffering (nginx) so events are flushed as they are written.
pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Streams `events` as a `text/event-stream` response. With `keep_alive` set, a keep-alive
/// comment goes out whenever no event was written for that long.
///
/// An error in `events` aborts the body, so the client sees a stream without `close`.
pub fn sse_response(events: OutgoingEvents, keep_alive: Option<Duration>) -> Response {
    let mut sse = Sse::new(events);
    if let Some(period) = keep_alive {
        sse = sse.keep_alive(KeepAlive::new().interval(period));
    }
    (
        [
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        sse,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use tson::{handlers, Tson, Value};

    #[tokio::test]
    async fn test_response_headers_and_body() {
        let tson = Tson::new(handlers::all())
            .unwrap()
            .with_nonce(|| "n".to_string());
        let events = encode(&tson, &Value::from(1)).unwrap();
        let response = sse_response(events, None);

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[X_ACCEL_BUFFERING], "no");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.starts_with(':'));
        assert!(body.contains("data: {\"json\":1,\"nonce\":\"n\"}\n\n"));
        assert!(body.ends_with("event: close\ndata: null\n\n"));
    }
}
