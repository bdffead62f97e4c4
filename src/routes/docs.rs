//! OpenAPI document and Swagger UI page.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};

use super::{analytics, auth, deployment, health, marketplace, models, training, users};
use crate::error::ErrorBody;
use crate::services;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "ModelVerse API", version = "1.0.0", description = "API documentation for ModelVerse"),
    paths(
        health::health,
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        models::list_models,
        models::create_model,
        models::get_model,
        models::update_model,
        models::delete_model,
        users::get_profile,
        users::update_profile,
        marketplace::list_marketplace,
        marketplace::get_listing,
        training::create_job,
        training::list_jobs,
        training::get_job,
        training::cancel_job,
        deployment::create_deployment,
        deployment::list_deployments,
        deployment::get_deployment,
        deployment::stop_deployment,
        analytics::summary,
    ),
    components(schemas(
        ErrorBody,
        services::auth::Identity,
        services::models::Model,
        services::models::Visibility,
        services::training::TrainingJob,
        services::training::JobStatus,
        services::deployment::Deployment,
        services::deployment::DeploymentStatus,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// Build the document with `api_url` as its only server.
#[must_use]
pub fn openapi(api_url: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(api_url)]);
    doc
}

/// `GET /api/docs/openapi.json`
pub async fn openapi_json(State(state): State<AppState>) -> Json<utoipa::openapi::OpenApi> {
    Json(openapi(&state.config.api_url))
}

const SWAGGER_UI_VERSION: &str = "5.17.14";

/// Swagger UI loads its assets from unpkg, so this page needs a looser CSP
/// than the API default.
const DOCS_CSP: &str = "default-src 'self';\
base-uri 'self';\
img-src 'self' data: https://unpkg.com;\
script-src 'self' 'unsafe-inline' https://unpkg.com;\
style-src 'self' 'unsafe-inline' https://unpkg.com;\
object-src 'none';\
frame-ancestors 'self'";

/// `GET /api/docs`
pub async fn swagger_ui() -> Response {
    let page = format!(
        r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>ModelVerse API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{v}/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@{v}/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {{
      window.ui = SwaggerUIBundle({{ url: "/api/docs/openapi.json", dom_id: "#swagger-ui" }});
    }};
  </script>
</body>
</html>"##,
        v = SWAGGER_UI_VERSION
    );

    let mut response = Html(page).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(DOCS_CSP));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_has_title_server_and_bearer_scheme() {
        let doc = openapi("https://api.example.com");
        assert_eq!(doc.info.title, "ModelVerse API");
        assert_eq!(doc.info.version, "1.0.0");
        let servers = doc.servers.as_ref().unwrap();
        assert_eq!(servers[0].url, "https://api.example.com");
        assert!(doc.components.as_ref().unwrap().security_schemes.contains_key("bearer"));
    }

    #[test]
    fn document_lists_every_route_group() {
        let doc = openapi("http://localhost:8000");
        for path in [
            "/health",
            "/api/auth/login",
            "/api/models/{id}",
            "/api/users/me",
            "/api/marketplace",
            "/api/training/{id}/cancel",
            "/api/deployment",
            "/api/analytics",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[tokio::test]
    async fn swagger_page_sets_its_own_csp() {
        let response = swagger_ui().await;
        let csp = response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap();
        assert!(csp.to_str().unwrap().contains("https://unpkg.com"));
    }
}
