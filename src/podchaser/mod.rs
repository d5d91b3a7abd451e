mod error;
mod episode;
mod client;
mod paginator;

pub use error::DiscoveryError;
pub use episode::{Episode, Podcast};
pub use client::PodchaserClient;
pub use paginator::EpisodePages;

use async_trait::async_trait;
use serde::Deserialize;

pub const API_URL: &str = "https://api.podchaser.com/graphql";

/// Where the pipeline gets its podcast identity and raw episode list from.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    async fn find_podcast(&self, name: &str) -> Result<Podcast, DiscoveryError>;

    /// At most `limit` episodes, in whatever order the source ranks them.
    async fn episodes(&self, podcast: &Podcast, limit: usize) -> Result<Vec<Episode>, DiscoveryError>;
}

#[derive(Deserialize, Debug)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Deserialize, Debug)]
pub struct GraphqlError {
    pub message: String,
}

impl<T> GraphqlResponse<T> {
    pub fn into_result(self) -> Result<T, DiscoveryError> {
        if !self.errors.is_empty() {
            let msg = self.errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
            return Err(DiscoveryError::Graphql(msg));
        }
        self.data.ok_or_else(|| DiscoveryError::Graphql("response carried no data".to_owned()))
    }
}

#[derive(Deserialize, Debug)]
pub struct PodchaserData<T> {
    pub data: Vec<T>,
    #[serde(rename = "paginatorInfo")]
    pub paginator_info: Option<PaginatorInfo>,
}

#[derive(Deserialize, Debug)]
pub struct PaginatorInfo {
    #[serde(rename = "currentPage")]
    pub current_page: u32,
    #[serde(rename = "hasMorePages")]
    pub has_more_pages: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_errors_win_over_data() {
        let resp: GraphqlResponse<serde_json::Value> = serde_json::from_str(
            r#"{"data": null, "errors": [{"message": "bad token"}, {"message": "try again"}]}"#,
        ).unwrap();
        match resp.into_result() {
            Err(DiscoveryError::Graphql(msg)) => assert_eq!(msg, "bad token; try again"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn page_parses() {
        let page: PodchaserData<Episode> = serde_json::from_str(r#"{
            "paginatorInfo": {"currentPage": 0, "hasMorePages": true},
            "data": [{"title": "Ep1", "airDate": "2024-01-02", "audioUrl": "http://a"}]
        }"#).unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(page.paginator_info.unwrap().has_more_pages);
    }
}
