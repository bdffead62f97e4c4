use super::*;
use serde_json::json;

fn request() -> NewTrainingJob {
    NewTrainingJob {
        model_type: "classifier".into(),
        dataset_path: "datasets/iris.csv".into(),
        model_id: None,
        hyperparameters: None,
        training_config: None,
    }
}

#[test]
fn terminal_statuses() {
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_value(JobStatus::Cancelled).unwrap(), json!("cancelled"));
    let parsed: JobStatus = serde_json::from_value(json!("running")).unwrap();
    assert_eq!(parsed, JobStatus::Running);
}

#[test]
fn not_cancellable_names_status() {
    assert_eq!(TrainingError::NotCancellable(JobStatus::Completed).to_string(), "job is already completed");
}

#[test]
fn validate_accepts_minimal_request() {
    assert!(validate(&request()).is_ok());
}

#[test]
fn validate_requires_model_type_and_dataset() {
    let mut req = request();
    req.model_type = "  ".into();
    assert!(matches!(validate(&req), Err(TrainingError::Invalid(_))));

    let mut req = request();
    req.dataset_path = String::new();
    assert!(matches!(validate(&req), Err(TrainingError::Invalid(_))));
}

#[test]
fn validate_rejects_non_object_hyperparameters() {
    let mut req = request();
    req.hyperparameters = Some(json!([1, 2, 3]));
    let err = validate(&req).unwrap_err();
    assert_eq!(err.to_string(), "hyperparameters must be an object");

    let mut req = request();
    req.training_config = Some(json!({"epochs": 10}));
    assert!(validate(&req).is_ok());
}

#[test]
fn job_columns_render_timestamps_as_text() {
    assert!(JOB_COLUMNS.contains("to_char(created_at AT TIME ZONE 'UTC'"));
    assert!(JOB_COLUMNS.ends_with("AS updated_at"));
}

// =============================================================================
// live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::state::test_helpers::{live_pool, live_user};

    #[tokio::test]
    async fn cancel_twice_conflicts() {
        let pool = live_pool().await;
        let user = live_user(&pool).await;

        let job = create_job(&pool, user, request()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.hyperparameters, json!({}));

        let cancelled = cancel_job(&pool, user, job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let again = cancel_job(&pool, user, job.id).await.unwrap_err();
        assert!(matches!(again, TrainingError::NotCancellable(JobStatus::Cancelled)));
        assert_eq!(again.to_string(), "job is already cancelled");
    }

    #[tokio::test]
    async fn jobs_are_scoped_to_their_owner() {
        let pool = live_pool().await;
        let owner = live_user(&pool).await;
        let stranger = live_user(&pool).await;
        let job = create_job(&pool, owner, request()).await.unwrap();

        assert!(matches!(get_job(&pool, stranger, job.id).await, Err(TrainingError::NotFound)));
        assert!(matches!(cancel_job(&pool, stranger, job.id).await, Err(TrainingError::NotFound)));
        assert_eq!(list_jobs(&pool, owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_model_is_rejected() {
        let pool = live_pool().await;
        let user = live_user(&pool).await;
        let req = NewTrainingJob { model_id: Some(Uuid::new_v4()), ..request() };
        assert!(matches!(create_job(&pool, user, req).await, Err(TrainingError::ModelNotFound)));
    }
}
