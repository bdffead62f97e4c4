use super::*;

async fn body_of(response: Response) -> ErrorBody {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("body should be json");
    ErrorBody {
        error: value["error"].as_str().unwrap_or_default().to_owned(),
        message: value["message"].as_str().unwrap_or_default().to_owned(),
    }
}

#[test]
fn status_mapping() {
    assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
    assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    assert_eq!(ApiError::PayloadTooLarge { limit: 1 }.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(ApiError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ApiError::Database(sqlx::Error::RowNotFound).status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn client_errors_carry_their_message() {
    let response = ApiError::NotFound("model not found".into()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_of(response).await, ErrorBody::new("Not found", "model not found"));
}

#[tokio::test]
async fn database_errors_are_not_leaked() {
    let response = ApiError::Database(sqlx::Error::PoolTimedOut).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_of(response).await;
    assert_eq!(body.error, "Internal server error");
    assert!(!body.message.contains("pool"), "leaked detail: {}", body.message);
}

#[tokio::test]
async fn json_error_helper_sets_status_and_body() {
    let response = json_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests", "slow down");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_of(response).await, ErrorBody::new("Too many requests", "slow down"));
}

// =============================================================================
// service error mapping
// =============================================================================

#[test]
fn account_errors_map_to_client_statuses() {
    assert_eq!(ApiError::from(AccountError::WeakPassword).status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::from(AccountError::EmailTaken).status(), StatusCode::CONFLICT);
    assert_eq!(ApiError::from(AccountError::InvalidCredentials).status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ApiError::from(AccountError::Deactivated).status(), StatusCode::FORBIDDEN);
    assert_eq!(ApiError::from(AccountError::Hash("boom".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn training_conflict_keeps_message() {
    use crate::services::training::JobStatus;

    let err = ApiError::from(TrainingError::NotCancellable(JobStatus::Failed));
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.to_string(), "job is already failed");
    assert_eq!(ApiError::from(TrainingError::ModelNotFound).status(), StatusCode::NOT_FOUND);
}

#[test]
fn model_and_deployment_errors() {
    assert_eq!(ApiError::from(ModelError::Invalid("bad".into())).status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::from(ModelError::NotFound).status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::from(DeploymentError::InvalidReplicas).status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::from(DeploymentError::NotFound).status(), StatusCode::NOT_FOUND);
}
