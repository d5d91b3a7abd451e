use std::{collections::VecDeque, future::Future, pin::Pin, task::{Context, Poll}};

#[allow(unused_imports)]
use log::{info,debug,warn,error};
use serde_json::json;
use tokio_stream::Stream;

use super::client::{Endpoint, EpisodesData, EPISODES_QUERY};
use super::{DiscoveryError, Episode, PodchaserData};

const FIRST_PAGE: u32 = 0;

type PageFuture = Pin<Box<dyn Future<Output = Result<PodchaserData<Episode>, DiscoveryError>> + Send>>;

/// Streams a podcast's episodes page by page. A page is only requested once the
/// previous one has been drained, so `take(n)` never fetches more than it needs.
pub struct EpisodePages {
    endpoint: Endpoint,
    podcast_id: String,
    page_size: usize,
    next_page: Option<u32>,
    items: VecDeque<Episode>,
    future: Option<PageFuture>,
}

impl EpisodePages {
    pub(crate) fn new(endpoint: Endpoint, podcast_id: String, page_size: usize) -> Self {
        Self {
            endpoint,
            podcast_id,
            page_size,
            next_page: Some(FIRST_PAGE),
            items: VecDeque::new(),
            future: None,
        }
    }

    async fn fetch(endpoint: Endpoint, podcast_id: String, first: usize, page: u32) -> Result<PodchaserData<Episode>, DiscoveryError> {
        let data: EpisodesData = endpoint
            .execute(EPISODES_QUERY, json!({ "id": podcast_id, "first": first, "page": page }))
            .await?;
        data.into_page(&podcast_id)
    }
}

impl Stream for EpisodePages {
    type Item = Result<Episode, DiscoveryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(ep) = this.items.pop_front() {
                return Poll::Ready(Some(Ok(ep)));
            }

            if this.future.is_none() {
                match this.next_page.take() {
                    Some(page) => {
                        info!("fetching episode page {} of podcast {}", page, this.podcast_id);
                        this.future = Some(Box::pin(Self::fetch(
                            this.endpoint.clone(),
                            this.podcast_id.clone(),
                            this.page_size,
                            page,
                        )));
                    }
                    None => {
                        debug!("reached end of pagination");
                        return Poll::Ready(None);
                    }
                }
            }

            let polled = match this.future.as_mut() {
                Some(fut) => fut.as_mut().poll(cx),
                None => return Poll::Ready(None),
            };
            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(res) => {
                    this.future = None;
                    let page = match res {
                        Ok(page) => page,
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    };
                    debug!("got page: {} items", page.data.len());
                    if let Some(info) = page.paginator_info.as_ref() {
                        if info.has_more_pages && !page.data.is_empty() {
                            this.next_page = Some(info.current_page + 1);
                        }
                    }
                    this.items.extend(page.data);
                }
            }
        }
    }
}
