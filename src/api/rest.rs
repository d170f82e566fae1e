//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn, Level};

use crate::error::FilterError;
use crate::service::FilterService;

use super::dto::*;

const INFERENCE_TIME_HEADER: &str = "x-inference-time-ms";

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<FilterService>,
    pub title: String,
    pub description: String,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Demo page
        .route("/", get(index_handler))
        // Filter operations
        .route("/api/v1/filters", get(list_filters_handler))
        .route("/api/v1/filter", post(apply_filter_handler))
        // System endpoints
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        // Middleware
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_status(error: &FilterError) -> StatusCode {
    match error {
        FilterError::UnknownFilter(_) => StatusCode::NOT_FOUND,
        FilterError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: FilterError) -> ApiError {
    let status = error_status(&error);
    if status.is_server_error() {
        error!("Filter request failed: {}", error);
    } else {
        warn!("Filter request rejected: {}", error);
    }
    (status, Json(ErrorResponse::new(&error.to_string(), error.code())))
}

/// Apply a filter to an uploaded image
///
/// Multipart fields: `image` (file) and `filter` (label). Responds with the
/// filtered image as PNG.
async fn apply_filter_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut filter: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "image" => {
                image_data = Some(field.bytes().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?.to_vec());
            }
            "filter" | "filter_type" => {
                filter = Some(field.text().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?);
            }
            _ => {}
        }
    }

    let image_data = image_data.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing image field", "MISSING_IMAGE")))
    })?;
    let filter = filter.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing filter field", "MISSING_FILTER")))
    })?;

    let output = state
        .service
        .apply_encoded(filter.trim(), &image_data)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (
                HeaderName::from_static(INFERENCE_TIME_HEADER),
                HeaderValue::from(output.inference_time_ms),
            ),
        ],
        output.png,
    )
        .into_response())
}

/// List available filters
async fn list_filters_handler(State(state): State<Arc<AppState>>) -> Json<FiltersResponse> {
    Json(FiltersResponse {
        filters: state.service.filters(),
    })
}

/// Health check
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        healthy: health.healthy,
        version: health.version,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        filters: health
            .filters
            .into_iter()
            .map(|f| FilterStatusDto {
                label: f.label,
                device: f.device,
            })
            .collect(),
    })
}

/// Upload form with one radio button per filter
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_index(
        &state.title,
        &state.description,
        &state.service.filters(),
    ))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_index(title: &str, description: &str, filters: &[String]) -> String {
    let radios: String = filters
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let label = escape_html(label);
            format!(
                r#"<label><input type="radio" name="filter" value="{label}"{checked}> {label}</label>"#,
                checked = if i == 0 { " checked" } else { "" },
            )
        })
        .collect::<Vec<_>>()
        .join("\n      ");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
</head>
<body>
  <h1>{title}</h1>
  <p>{description}</p>
  <form id="filter-form">
    <input type="file" name="image" accept="image/*" required>
    <fieldset>
      {radios}
    </fieldset>
    <button type="submit">Submit</button>
  </form>
  <p id="status"></p>
  <img id="output" alt="">
  <script>
    document.getElementById("filter-form").addEventListener("submit", async (event) => {{
      event.preventDefault();
      const status = document.getElementById("status");
      status.textContent = "Running...";
      const response = await fetch("/api/v1/filter", {{ method: "POST", body: new FormData(event.target) }});
      if (!response.ok) {{
        const body = await response.json();
        status.textContent = body.error;
        return;
      }}
      const blob = await response.blob();
      document.getElementById("output").src = URL.createObjectURL(blob);
      status.textContent = "Done in " + response.headers.get("{header}") + " ms";
    }});
  </script>
</body>
</html>
"#,
        title = escape_html(title),
        description = escape_html(description),
        radios = radios,
        header = INFERENCE_TIME_HEADER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::pipeline::tests::{FailingModel, IdentityModel};
    use crate::engine::{FilterModel, HwcImage, ModelRegistry};
    use crate::utils::image::{decode_image, encode_png};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    const BOUNDARY: &str = "filter-test-boundary";

    fn router() -> Router {
        let config = Config::default();
        let mut models: Vec<(String, Arc<dyn FilterModel>)> = config
            .filters
            .iter()
            .map(|f| (f.label.clone(), Arc::new(IdentityModel) as Arc<dyn FilterModel>))
            .collect();
        models.push(("Broken".to_string(), Arc::new(FailingModel) as Arc<dyn FilterModel>));

        let service = FilterService::new(Arc::new(ModelRegistry::from_models(models)));
        create_rest_router(Arc::new(AppState {
            service: Arc::new(service),
            title: config.server.title,
            description: config.server.description,
            start_time: Instant::now(),
        }))
    }

    fn multipart_body(image: Option<&[u8]>, filter: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(filter) = filter {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"filter\"\r\n\r\n{filter}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"in.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn filter_request(image: Option<&[u8]>, filter: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/filter")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(image, filter)))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_apply_filter_returns_png() {
        let image = HwcImage::filled(10, 12, [128, 128, 128]);
        let upload = encode_png(&image).unwrap();

        let response = router()
            .oneshot(filter_request(Some(&upload), Some("L0-Smoothing")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers().contains_key(INFERENCE_TIME_HEADER));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let filtered = decode_image(&bytes).unwrap();
        assert_eq!(filtered.dim(), (10, 12, 3));
        assert_eq!(filtered, image);
    }

    #[tokio::test]
    async fn test_unknown_filter_is_404() {
        let upload = encode_png(&HwcImage::filled(2, 2, [0, 0, 0])).unwrap();
        let response = router()
            .oneshot(filter_request(Some(&upload), Some("Sepia")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "UNKNOWN_FILTER");
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let response = router()
            .oneshot(filter_request(None, Some("Pencil")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MISSING_IMAGE");

        let upload = encode_png(&HwcImage::filled(2, 2, [0, 0, 0])).unwrap();
        let response = router()
            .oneshot(filter_request(Some(&upload), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MISSING_FILTER");
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let response = router()
            .oneshot(filter_request(Some(b"not an image"), Some("Pencil")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "INVALID_IMAGE");
    }

    #[tokio::test]
    async fn test_inference_failure_is_500() {
        let upload = encode_png(&HwcImage::filled(2, 2, [0, 0, 0])).unwrap();
        let response = router()
            .oneshot(filter_request(Some(&upload), Some("Broken")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "INFERENCE_FAILED");
    }

    #[tokio::test]
    async fn test_list_filters() {
        let response = router()
            .oneshot(Request::get("/api/v1/filters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["filters"],
            serde_json::json!(["L0-Smoothing", "Photographic-Style", "Pencil", "Broken"])
        );
    }

    #[derive(Clone, Default)]
    struct ResponseEvents(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ResponseEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let meta = event.metadata();
            if meta.target().starts_with("tower_http::trace") && *meta.level() <= Level::INFO {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_responses_logged_at_info() {
        let events = ResponseEvents::default();
        let subscriber = tracing_subscriber::registry()
            .with(events.clone().with_filter(LevelFilter::INFO));
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(events.0.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["filters"][0]["label"], "L0-Smoothing");
        assert_eq!(body["filters"][0]["device"], "cpu");
    }

    #[tokio::test]
    async fn test_index_lists_filters() {
        let response = router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Fast Image Filters using CNN"));
        assert!(html.contains(r#"value="Photographic-Style""#));
        assert!(html.contains(r#"value="L0-Smoothing" checked"#));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
