#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed worker record for {worker_id}: {reason}")]
    MalformedWorkerRecord { worker_id: String, reason: String },
}
