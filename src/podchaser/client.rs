use std::sync::Arc;

use async_trait::async_trait;
#[allow(unused_imports)]
use log::{info,warn,debug,error,trace};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio_stream::StreamExt;

use crate::config::PodchaserConfig;
use super::{
    paginator::EpisodePages, DiscoveryError, Episode, EpisodeSource, GraphqlResponse, Podcast,
    PodchaserData,
};

const PODCAST_QUERY: &str = r#"query FindPodcast($term: String!) {
  podcasts(searchTerm: $term, first: 1) {
    data { id title }
  }
}"#;

pub(crate) const EPISODES_QUERY: &str = r#"query PodcastEpisodes($id: String!, $first: Int!, $page: Int!) {
  podcast(identifier: { id: $id, type: PODCHASER }) {
    episodes(first: $first, page: $page, sort: { sortBy: AIR_DATE, direction: DESCENDING }) {
      paginatorInfo { currentPage hasMorePages }
      data { id title description airDate audioUrl url }
    }
  }
}"#;

#[derive(Deserialize, Debug)]
struct PodcastsData {
    podcasts: PodchaserData<Podcast>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct EpisodesData {
    podcast: Option<PodcastEpisodes>,
}

#[derive(Deserialize, Debug)]
struct PodcastEpisodes {
    episodes: PodchaserData<Episode>,
}

impl EpisodesData {
    pub(crate) fn into_page(self, podcast_id: &str) -> Result<PodchaserData<Episode>, DiscoveryError> {
        self.podcast
            .map(|p| p.episodes)
            .ok_or_else(|| DiscoveryError::PodcastNotFound(podcast_id.to_owned()))
    }
}

/// Owned handle to the GraphQL endpoint, cheap to clone into spawned or boxed futures.
#[derive(Clone)]
pub(crate) struct Endpoint {
    cli: Arc<Client>,
    url: String,
    token: String,
}

impl Endpoint {
    pub(crate) async fn execute<T: DeserializeOwned>(self, query: &'static str, variables: Value) -> Result<T, DiscoveryError> {
        debug!("sending graphql request to {}", self.url);
        let req = self.cli
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;
        let content = req.text().await?;
        trace!("graphql response: {}", content);
        serde_json::from_str::<GraphqlResponse<T>>(&content)?.into_result()
    }
}

pub struct PodchaserClient {
    endpoint: Endpoint,
    page_size: usize,
}

impl PodchaserClient {
    pub fn new(cli: Arc<Client>, config: &PodchaserConfig) -> Result<Self, DiscoveryError> {
        let token = config.token.clone().filter(|t| !t.is_empty()).ok_or(DiscoveryError::MissingToken)?;
        Ok(Self {
            endpoint: Endpoint {
                cli,
                url: config.endpoint.clone(),
                token,
            },
            page_size: config.page_size.max(1),
        })
    }

    pub fn episode_pages(&self, podcast: &Podcast) -> EpisodePages {
        EpisodePages::new(self.endpoint.clone(), podcast.id.clone(), self.page_size)
    }
}

#[async_trait]
impl EpisodeSource for PodchaserClient {
    async fn find_podcast(&self, name: &str) -> Result<Podcast, DiscoveryError> {
        info!("searching podcast '{}'", name);
        let data: PodcastsData = self.endpoint
            .clone()
            .execute(PODCAST_QUERY, json!({ "term": name }))
            .await?;
        let podcast = data.podcasts.data
            .into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::PodcastNotFound(name.to_owned()))?;
        info!("found podcast '{}' (id {})", podcast.title, podcast.id);
        Ok(podcast)
    }

    async fn episodes(&self, podcast: &Podcast, limit: usize) -> Result<Vec<Episode>, DiscoveryError> {
        info!("fetching up to {} episodes for '{}'", limit, podcast.title);
        let mut it = self.episode_pages(podcast).take(limit);
        let mut episodes = Vec::with_capacity(limit.min(256));
        while let Some(e) = it.next().await {
            episodes.push(e?);
        }
        info!("got {} episodes", episodes.len());
        Ok(episodes)
    }
}
