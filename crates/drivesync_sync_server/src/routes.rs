//! HTTP routes.

use crate::auth::share_cookie_name;
use crate::error::{ServerError, ServerResult};
use crate::handler::{RequestAuth, RequestHandler};
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{
    ACCEPT_RANGES, AUTHORIZATION, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bytes::Bytes;
use drivesync_sync_protocol::{
    ChangesQuery, ChangesResponse, ChunkQuery, ChunkResponse, DeleteRequest, DeleteResponse,
    FinalizeRequest, FinalizeResponse, InitRequest, InitResponse, ListResponse, PathQuery,
    RangeRequest, UnlockRequest,
};
use std::fmt::Write as _;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Header carrying a share credential for clients without cookies.
pub const SHARE_CREDENTIAL_HEADER: &str = "x-share-credential";

/// Shared state of the router.
pub type AppState = Arc<RequestHandler>;

/// Create the application router.
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/changes", get(changes))
        .route("/api/v1/upload/init", post(upload_init))
        .route("/api/v1/upload/chunk", post(upload_chunk))
        .route("/api/v1/upload/finalize", post(upload_finalize))
        .route("/api/v1/delete", post(delete))
        .route("/api/v1/list", get(list))
        .route("/api/v1/download", get(download))
        .route("/api/v1/share/unlock", post(share_unlock))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Runs a handler call on the blocking pool.
async fn blocking<T, F>(handler: AppState, f: F) -> ServerResult<T>
where
    F: FnOnce(&RequestHandler) -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(handler.as_ref()))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|key| key.trim().to_string())
}

fn request_auth(headers: &HeaderMap, jar: &CookieJar, token: Option<&str>) -> RequestAuth {
    let from_cookie = token
        .map(crate::auth::sanitize_token)
        .filter(|t| !t.is_empty())
        .and_then(|t| jar.get(&share_cookie_name(&t)))
        .map(|c| c.value().to_string());
    let share_credential = from_cookie.or_else(|| {
        headers
            .get(SHARE_CREDENTIAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    RequestAuth {
        bearer: bearer(headers),
        share_credential,
    }
}

fn sync_auth(headers: &HeaderMap) -> RequestAuth {
    RequestAuth {
        bearer: bearer(headers),
        share_credential: None,
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn changes(
    State(handler): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ChangesQuery>, QueryRejection>,
) -> ServerResult<Json<ChangesResponse>> {
    let Query(query) = query?;
    let auth = sync_auth(&headers);
    blocking(handler, move |h| h.handle_changes(&auth, query))
        .await
        .map(Json)
}

async fn upload_init(
    State(handler): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> ServerResult<Json<InitResponse>> {
    let Json(req) = body?;
    let auth = sync_auth(&headers);
    blocking(handler, move |h| h.handle_init(&auth, req))
        .await
        .map(Json)
}

async fn upload_chunk(
    State(handler): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ChunkQuery>, QueryRejection>,
    body: Bytes,
) -> ServerResult<Json<ChunkResponse>> {
    let Query(query) = query?;
    let auth = sync_auth(&headers);
    blocking(handler, move |h| h.handle_chunk(&auth, &query, &body))
        .await
        .map(Json)
}

async fn upload_finalize(
    State(handler): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> ServerResult<Json<FinalizeResponse>> {
    let Json(req) = body?;
    let auth = sync_auth(&headers);
    blocking(handler, move |h| h.handle_finalize(&auth, &req))
        .await
        .map(Json)
}

async fn delete(
    State(handler): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ServerResult<Json<DeleteResponse>> {
    let Json(req) = body?;
    let auth = sync_auth(&headers);
    blocking(handler, move |h| h.handle_delete(&auth, req))
        .await
        .map(Json)
}

async fn list(
    State(handler): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ServerResult<Json<ListResponse>> {
    let Query(query) = query?;
    let auth = request_auth(&headers, &jar, query.token.as_deref());
    blocking(handler, move |h| h.handle_list(&auth, &query))
        .await
        .map(Json)
}

async fn download(
    State(handler): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ServerResult<Response> {
    let Query(query) = query?;
    let auth = request_auth(&headers, &jar, query.token.as_deref());
    let resolved = blocking(handler, move |h| h.resolve_download(&auth, &query)).await?;

    // The blob may have been replaced since it was resolved; size the
    // response from the handle actually opened.
    let mut file = match tokio::fs::File::open(&resolved.location).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(drivesync_core::CoreError::not_found(resolved.entry.rel_path).into());
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();

    let range_header = headers.get(RANGE).and_then(|v| v.to_str().ok());
    let range = RangeRequest::parse(range_header, size)?;
    let (offset, len) = range.span(size);
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }

    let name = resolved
        .entry
        .rel_path
        .rsplit('/')
        .next()
        .unwrap_or(&resolved.entry.rel_path);

    let mut builder = Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, len)
        .header(CONTENT_DISPOSITION, content_disposition(name))
        .header(ACCEPT_RANGES, "bytes")
        .header(CACHE_CONTROL, "private, no-store, max-age=0");
    builder = match range.content_range(size) {
        Some(content_range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_RANGE, content_range),
        None => builder.status(StatusCode::OK),
    };

    let body = Body::from_stream(ReaderStream::new(file.take(len)));
    builder
        .body(body)
        .map_err(|e| ServerError::Internal(format!("response: {e}")))
}

async fn share_unlock(
    State(handler): State<AppState>,
    jar: CookieJar,
    body: Result<Json<UnlockRequest>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(req) = body?;
    let secure = handler.context().config.cookie_secure;
    let (response, token) = blocking(handler, move |h| h.handle_unlock(&req)).await?;

    let cookie = Cookie::build((share_cookie_name(&token), response.credential.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .build();
    Ok((jar.add(cookie), Json(response)))
}

/// Builds an `attachment` disposition with an ASCII fallback name and an
/// RFC 5987 encoded one.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut encoded = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
            encoded.push(char::from(b));
        } else {
            let _ = write!(encoded, "%{b:02X}");
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn disposition_escapes_names() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        assert_eq!(
            content_disposition("a \"b\".txt"),
            "attachment; filename=\"a _b_.txt\"; filename*=UTF-8''a%20%22b%22.txt"
        );
        assert_eq!(
            content_disposition("é.txt"),
            "attachment; filename=\"_.txt\"; filename*=UTF-8''%C3%A9.txt"
        );
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer(&headers).as_deref(), Some("abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer(&headers), None);
    }

    #[test]
    fn credential_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(SHARE_CREDENTIAL_HEADER, HeaderValue::from_static("from-header"));
        let jar = CookieJar::new().add(Cookie::new(share_cookie_name("tok"), "from-cookie"));

        let auth = request_auth(&headers, &jar, Some("tok"));
        assert_eq!(auth.share_credential.as_deref(), Some("from-cookie"));

        let auth = request_auth(&headers, &CookieJar::new(), Some("tok"));
        assert_eq!(auth.share_credential.as_deref(), Some("from-header"));
    }
}
