use basecamp_common::security::{resolve_url, same_origin};
use basecamp_domain::{BasecampError, Result};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::http::{Pipeline, RequestDescriptor, ResponseDescriptor};
use crate::observability::isolate;

/// Lazy stream of pages
pub type PageStream = BoxStream<'static, Result<ResponseDescriptor>>;

struct Walk {
    pipeline: Pipeline,
    next: Option<RequestDescriptor>,
    /// Error to yield after the page that produced it
    deferred: Option<BasecampError>,
    origin: Option<Url>,
    fetched: usize,
}

impl Walk {
    async fn step(mut self) -> Option<(Result<ResponseDescriptor>, Self)> {
        if let Some(err) = self.deferred.take() {
            return Some((Err(err), self));
        }
        let request = self.next.take()?;

        let request = match request.resolve(self.pipeline.base_url()).and_then(|r| r.full_url().map(|u| (r, u))) {
            Ok((request, url)) => {
                let page = self.fetched + 1;
                if page > 1 {
                    let hooks = &self.pipeline.hooks;
                    isolate("on_paginate", || hooks.on_paginate(url.as_str(), page));
                }
                self.origin.get_or_insert(url);
                request
            }
            Err(err) => return Some((Err(err), self)),
        };

        let response = match self.pipeline.execute(request.clone()).await {
            Ok(response) => response,
            Err(err) => return Some((Err(err), self)),
        };
        self.fetched += 1;

        if let Some(target) = response.next_link() {
            if self.fetched >= self.pipeline.max_pages {
                warn!(max_pages = self.pipeline.max_pages, "Pagination stopped at page limit");
            } else {
                match self.follow(&request, &response, &target) {
                    Ok(next) => self.next = Some(next),
                    Err(err) => self.deferred = Some(err),
                }
            }
        }

        Some((Ok(response), self))
    }

    /// Request for `target`, which must share the first request's origin
    fn follow(
        &self,
        current: &RequestDescriptor,
        response: &ResponseDescriptor,
        target: &str,
    ) -> Result<RequestDescriptor> {
        let next_url = resolve_url(&response.url, target)?;
        let origin_ok = self.origin.as_ref().map_or(false, |origin| same_origin(origin, &next_url));
        if !origin_ok {
            return Err(BasecampError::Usage(format!(
                "pagination link {next_url} leaves the origin of the original request"
            )));
        }
        debug!(next = %next_url, "Following next link");

        let mut next = RequestDescriptor::new(current.method.clone(), next_url.to_string());
        next.headers = current.headers.clone();
        Ok(next)
    }
}

fn page_items<T: DeserializeOwned>(page: &ResponseDescriptor, key: Option<&str>) -> Result<Vec<T>> {
    let value: Value = page.json()?;
    let array = match key {
        None => value,
        Some(key) => value
            .get(key)
            .cloned()
            .ok_or_else(|| BasecampError::Validation(format!("response has no `{key}` field")))?,
    };
    if !array.is_array() {
        return Err(BasecampError::Validation("paginated response is not a JSON array".into()));
    }
    serde_json::from_value(array).map_err(|e| BasecampError::Validation(format!("invalid page item: {e}")))
}

impl Pipeline {
    /// Lazily walk every page starting at `request`
    ///
    /// Stops at the last page, at `max_pages`, or when the consumer stops
    /// polling. A next link on a different origin ends the stream with a
    /// `Usage` error after the page that carried it.
    #[must_use]
    pub fn pages(&self, request: RequestDescriptor) -> PageStream {
        let walk = Walk {
            pipeline: self.clone(),
            next: Some(request),
            deferred: None,
            origin: None,
            fetched: 0,
        };
        stream::unfold(walk, Walk::step).boxed()
    }

    /// Items of every page, each page being a JSON array
    #[must_use]
    pub fn items<T>(&self, request: RequestDescriptor) -> BoxStream<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.flatten_pages(request, None)
    }

    /// Items of the array under `key` on every page, e.g. `{"events": [...]}`
    #[must_use]
    pub fn keyed_items<T>(&self, request: RequestDescriptor, key: &str) -> BoxStream<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.flatten_pages(request, Some(key.to_string()))
    }

    /// Collect every item of every page
    ///
    /// # Errors
    /// The first page or decode error.
    pub async fn get_all<T>(&self, request: RequestDescriptor) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.items(request).try_collect().await
    }

    fn flatten_pages<T>(&self, request: RequestDescriptor, key: Option<String>) -> BoxStream<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.pages(request)
            .map(move |page| page.and_then(|page| page_items::<T>(&page, key.as_deref())))
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, BasecampError>)))
            .try_flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::observability::RecordingHooks;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Project {
        id: u64,
    }

    fn pipeline(server: &MockServer, hooks: Arc<RecordingHooks>) -> Pipeline {
        Pipeline::builder().base_url(server.uri()).account_id("999").token("t").no_retry().hooks(hooks).build().unwrap()
    }

    async fn mount_page(server: &MockServer, page: &str, body: &str, next: Option<String>) {
        let mut template = ResponseTemplate::new(200).set_body_string(body);
        if let Some(next) = next {
            template = template.insert_header("link", format!("<{next}>; rel=\"next\"").as_str());
        }
        Mock::given(method("GET"))
            .and(path("/999/projects.json"))
            .and(query_param("page", page))
            .respond_with(template)
            .expect(1)
            .mount(server)
            .await;
    }

    /// Validates the multi-page walk scenario.
    ///
    /// Assertions:
    /// - absolute, root-relative and path-relative next links are followed
    /// - items arrive in order across pages
    /// - `on_paginate` fires for pages 2 and 3 only
    #[tokio::test]
    async fn walks_all_link_forms_in_order() {
        let server = MockServer::start().await;
        let hooks = Arc::new(RecordingHooks::new());

        // First page has no `page` param; route it separately
        Mock::given(method("GET"))
            .and(path("/999/projects.json"))
            .and(query_param("status", "active"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"id":1}]"#)
                    .insert_header("link", format!("<{}/999/projects.json?page=2>; rel=\"next\"", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_page(&server, "2", r#"[{"id":2}]"#, Some("/999/projects.json?page=3".into())).await;
        mount_page(&server, "3", r#"[{"id":3}]"#, None).await;

        let items: Vec<Project> = pipeline(&server, hooks.clone())
            .get_all(RequestDescriptor::get("projects.json").with_query("status", "active"))
            .await
            .unwrap();

        assert_eq!(items, vec![Project { id: 1 }, Project { id: 2 }, Project { id: 3 }]);
        assert_eq!(hooks.paginations(), 2);
    }

    #[tokio::test]
    async fn path_relative_link_resolves_against_current_page() {
        let server = MockServer::start().await;
        mount_page(&server, "1", r#"[{"id":1}]"#, Some("projects.json?page=2".into())).await;
        mount_page(&server, "2", r#"[{"id":2}]"#, None).await;

        let items: Vec<Project> = pipeline(&server, Arc::default())
            .get_all(RequestDescriptor::get("projects.json").with_query("page", "1"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn cross_origin_link_is_a_usage_error_after_the_page() {
        let server = MockServer::start().await;
        mount_page(&server, "1", r#"[{"id":1}]"#, Some("https://evil.example/999/projects.json?page=2".into()))
            .await;

        let mut pages = pipeline(&server, Arc::default()).pages(RequestDescriptor::get("projects.json").with_query("page", "1"));

        let first = pages.next().await.unwrap().unwrap();
        assert_eq!(first.status, 200);
        let err = pages.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BasecampError::Usage(_)), "got {err:?}");
        assert!(pages.next().await.is_none());
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let server = MockServer::start().await;
        mount_page(&server, "1", r#"[{"id":1}]"#, Some("/999/projects.json?page=2".into())).await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = Pipeline::builder()
            .base_url(server.uri())
            .account_id("999")
            .token("t")
            .max_pages(1)
            .build()
            .unwrap();
        let items: Vec<Project> =
            pipeline.get_all(RequestDescriptor::get("projects.json").with_query("page", "1")).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn pages_are_fetched_only_when_polled() {
        let server = MockServer::start().await;
        mount_page(&server, "1", r#"[{"id":1}]"#, Some("/999/projects.json?page=2".into())).await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&server)
            .await;

        let mut pages = pipeline(&server, Arc::default()).pages(RequestDescriptor::get("projects.json").with_query("page", "1"));
        assert!(pages.next().await.unwrap().is_ok());
        drop(pages);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn keyed_items_unwrap_named_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/999/reports/progress.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"events":[{"id":7},{"id":8}]}"#))
            .mount(&server)
            .await;

        let items: Vec<Project> = pipeline(&server, Arc::default())
            .keyed_items(RequestDescriptor::get("reports/progress.json"), "events")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec![Project { id: 7 }, Project { id: 8 }]);
    }

    #[tokio::test]
    async fn error_page_ends_the_walk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result: Result<Vec<Project>> =
            pipeline(&server, Arc::default()).get_all(RequestDescriptor::get("projects.json")).await;
        assert!(matches!(result, Err(BasecampError::NotFound(_))));
    }
}
