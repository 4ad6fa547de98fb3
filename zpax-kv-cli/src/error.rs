/// Errors a single connection handler can hit; distinct from
/// `zpax_kv::Error` because these are transport/codec failures rather
/// than protocol-level ones.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
