#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("graphql error: {0}")]
    Graphql(String),
    #[error("podcast not found: {0}")]
    PodcastNotFound(String),
    #[error("no podchaser token configured (set PODCHASER_DEV_KEY)")]
    MissingToken,
}
