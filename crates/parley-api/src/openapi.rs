use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers::chat;
use crate::routes::{credentials, health, threads};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        chat::chat,
        chat::branch_off,
        threads::list_threads,
        threads::get_thread,
        threads::rename_thread,
        threads::delete_thread,
        threads::delete_threads,
        credentials::list_credentials,
        credentials::delete_credential,
    ),
    components(schemas(
        health::HealthResponse,
        chat::ChatRequest,
        chat::BranchOffResponse,
        threads::ThreadResponse,
        threads::ThreadListResponse,
        threads::MessageResponse,
        threads::MessagePageResponse,
        threads::RenameThreadRequest,
        threads::DeleteThreadsRequest,
        threads::DeleteThreadsResponse,
        credentials::CredentialResponse,
        credentials::CredentialOwnerResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "chat", description = "Streaming chat turns and branch-off"),
        (name = "threads", description = "Thread history"),
        (name = "credentials", description = "Connected accounts"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
