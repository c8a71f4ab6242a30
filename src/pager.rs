//! Paginated feed state.
//!
//! The pager does not perform I/O by itself: every operation that wants a
//! page hands back a [`PageRequest`], and the caller reports the outcome
//! through [`FeedPager::complete`]. [`FeedPager::fetch`] wires both halves
//! to a [`FeedService`] for synchronous callers.
//!
//! At most one request is in flight. Each reset bumps a generation counter
//! so a completion that arrives for an abandoned request is dropped instead
//! of being merged into the new feed.

use std::fmt;

use crate::api::ApiError;
use crate::data::FeedService;
use crate::model::{Audience, FeedFilter, FeedPage, Post, SortType};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Distance from the bottom of the document, in pixels, that triggers a
/// load-more.
pub const SCROLL_THRESHOLD: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeedQuery {
    pub audience: Audience,
    pub sort: SortType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub page: u32,
    pub filter: FeedFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LoadingInitial,
    LoadingMore,
    ErrorInitial,
    ErrorLoadMore,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    Network,
    Http,
    Unauthorized,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub kind: FeedErrorKind,
    pub page: u32,
    pub message: String,
}

impl FeedError {
    fn from_api(page: u32, err: &ApiError) -> Self {
        let kind = match err {
            ApiError::Network { .. } => FeedErrorKind::Network,
            ApiError::Http { status: 401, .. } => FeedErrorKind::Unauthorized,
            ApiError::Http { .. } | ApiError::Unsupported { .. } => FeedErrorKind::Http,
            ApiError::Malformed { .. } => FeedErrorKind::Malformed,
        };
        Self {
            kind,
            page,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FeedErrorKind::Malformed => write!(f, "unexpected feed data (page {})", self.page),
            _ => write!(f, "failed to load page {}: {}", self.page, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    pub fn near_bottom(&self) -> bool {
        self.viewport_height + self.scroll_top >= self.scroll_height - SCROLL_THRESHOLD
    }
}

#[derive(Debug, Clone)]
pub struct FeedPager {
    query: FeedQuery,
    page_size: u32,
    posts: Vec<Post>,
    page: u32,
    has_more: bool,
    initial_error: Option<FeedError>,
    more_error: Option<FeedError>,
    in_flight: Option<PageRequest>,
    generation: u64,
}

impl FeedPager {
    pub fn new(query: FeedQuery, page_size: u32) -> Self {
        Self {
            query,
            page_size: page_size.max(1),
            posts: Vec::new(),
            page: 0,
            has_more: true,
            initial_error: None,
            more_error: None,
            in_flight: None,
            generation: 0,
        }
    }

    pub fn query(&self) -> FeedQuery {
        self.query
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post_mut(&mut self, id: &str) -> Option<&mut Post> {
        self.posts.iter_mut().find(|post| post.id == id)
    }

    /// Last requested page number; 0 before the first request.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn initial_error(&self) -> Option<&FeedError> {
        self.initial_error.as_ref()
    }

    pub fn more_error(&self) -> Option<&FeedError> {
        self.more_error.as_ref()
    }

    pub fn phase(&self) -> Phase {
        if let Some(request) = &self.in_flight {
            return if request.page == 1 {
                Phase::LoadingInitial
            } else {
                Phase::LoadingMore
            };
        }
        if self.initial_error.is_some() {
            Phase::ErrorInitial
        } else if self.more_error.is_some() {
            Phase::ErrorLoadMore
        } else if !self.has_more {
            Phase::Exhausted
        } else {
            Phase::Idle
        }
    }

    /// Requests page 1 unless something is already in flight. Accumulated
    /// posts stay visible until the new first page replaces them.
    pub fn start(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        self.initial_error = None;
        self.more_error = None;
        self.has_more = true;
        Some(self.issue(1))
    }

    /// Switches audience or sort. A different query discards everything and
    /// requests page 1 of the new feed.
    pub fn set_query(&mut self, query: FeedQuery) -> Option<PageRequest> {
        if query == self.query {
            return None;
        }
        tracing::debug!(
            audience = %query.audience,
            sort = %query.sort,
            "feed query changed, resetting"
        );
        self.query = query;
        self.reset();
        Some(self.issue(1))
    }

    /// Drops all accumulated state. Any in-flight request becomes stale.
    pub fn reset(&mut self) {
        self.posts.clear();
        self.page = 0;
        self.has_more = true;
        self.initial_error = None;
        self.more_error = None;
        self.in_flight = None;
        self.generation += 1;
    }

    pub fn load_more(&mut self) -> Option<PageRequest> {
        if self.phase() != Phase::Idle || !self.has_more {
            return None;
        }
        Some(self.issue(self.page + 1))
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> Option<PageRequest> {
        if metrics.near_bottom() {
            self.load_more()
        } else {
            None
        }
    }

    pub fn retry(&mut self) -> Option<PageRequest> {
        match self.phase() {
            Phase::ErrorInitial => {
                self.initial_error = None;
                self.more_error = None;
                self.has_more = true;
                Some(self.issue(1))
            }
            Phase::ErrorLoadMore => {
                let page = self.more_error.take().map(|err| err.page).unwrap_or(self.page);
                self.has_more = true;
                Some(self.issue(page))
            }
            _ => None,
        }
    }

    /// Applies the outcome of `request`. Returns `false` when the request is
    /// not the one in flight (stale generation or unknown page).
    pub fn complete(&mut self, request: &PageRequest, result: Result<FeedPage, ApiError>) -> bool {
        if self.in_flight.as_ref() != Some(request) {
            tracing::debug!(
                page = request.page,
                generation = request.generation,
                "dropping stale feed page"
            );
            return false;
        }
        self.in_flight = None;
        let page = request.page;

        match result {
            Ok(feed_page) => {
                self.has_more = !feed_page.posts.is_empty() && page < feed_page.total_pages;
                if page == 1 {
                    self.posts = feed_page.posts;
                    self.initial_error = None;
                } else {
                    self.posts.extend(feed_page.posts);
                    self.more_error = None;
                }
            }
            Err(err) => {
                tracing::warn!(page, error = %err, "feed page failed");
                let error = FeedError::from_api(page, &err);
                if page == 1 {
                    self.initial_error = Some(error);
                } else {
                    self.more_error = Some(error);
                }
                self.has_more = false;
            }
        }
        true
    }

    /// Runs `request` against `service` and applies the result.
    pub fn fetch(&mut self, service: &dyn FeedService, request: &PageRequest) -> bool {
        let result = service.load_page(&request.filter);
        self.complete(request, result)
    }

    fn issue(&mut self, page: u32) -> PageRequest {
        self.page = page;
        let request = PageRequest {
            generation: self.generation,
            page,
            filter: FeedFilter {
                page,
                count: self.page_size,
                audience: self.query.audience,
                sort: self.query.sort,
            },
        };
        self.in_flight = Some(request.clone());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn posts(prefix: &str, n: usize) -> Vec<Post> {
        (0..n)
            .map(|i| {
                serde_json::from_value(serde_json::json!({"Id": format!("{prefix}-{i}")}))
                    .unwrap()
            })
            .collect()
    }

    fn page(prefix: &str, n: usize, total_pages: u32) -> Result<FeedPage, ApiError> {
        Ok(FeedPage {
            posts: posts(prefix, n),
            total_pages,
        })
    }

    fn network() -> Result<FeedPage, ApiError> {
        Err(ApiError::Network {
            message: "connection reset".into(),
        })
    }

    fn pager() -> FeedPager {
        FeedPager::new(FeedQuery::default(), DEFAULT_PAGE_SIZE)
    }

    #[test]
    fn single_page_feed_is_exhausted() {
        let mut pager = pager();
        let req = pager.start().unwrap();
        assert_eq!(pager.phase(), Phase::LoadingInitial);
        assert!(pager.complete(&req, page("a", 4, 1)));
        assert!(!pager.has_more());
        assert_eq!(pager.phase(), Phase::Exhausted);
        assert!(pager.load_more().is_none());
    }

    #[test]
    fn pages_accumulate_in_order() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("p1", 10, 3));
        let second = pager.load_more().unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(pager.phase(), Phase::LoadingMore);
        pager.complete(&second, page("p2", 10, 3));

        assert_eq!(pager.posts().len(), 20);
        assert_eq!(pager.posts()[0].id, "p1-0");
        assert_eq!(pager.posts()[9].id, "p1-9");
        assert_eq!(pager.posts()[10].id, "p2-0");
        assert!(pager.has_more());
        assert_eq!(pager.phase(), Phase::Idle);
        assert_eq!(pager.page(), 2);
    }

    #[test]
    fn empty_page_ends_feed() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("p1", 0, 5));
        assert!(!pager.has_more());
    }

    #[test]
    fn load_more_failure_keeps_posts() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("p1", 10, 3));
        let second = pager.load_more().unwrap();
        pager.complete(&second, network());

        assert_eq!(pager.posts().len(), 10);
        assert_eq!(pager.phase(), Phase::ErrorLoadMore);
        assert!(!pager.has_more());
        let err = pager.more_error().unwrap();
        assert_eq!(err.kind, FeedErrorKind::Network);
        assert_eq!(err.page, 2);
        assert!(pager.initial_error().is_none());
        assert!(pager.load_more().is_none());
    }

    #[test]
    fn retry_load_more_requests_same_page() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("p1", 10, 3));
        let second = pager.load_more().unwrap();
        pager.complete(&second, network());

        let again = pager.retry().unwrap();
        assert_eq!(again.page, 2);
        assert!(pager.more_error().is_none());
        pager.complete(&again, page("p2", 10, 3));
        assert_eq!(pager.posts().len(), 20);
        assert!(pager.has_more());
    }

    #[test]
    fn initial_failure_and_retry() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(
            &first,
            Err(ApiError::Http {
                status: 503,
                message: "Service Unavailable".into(),
                body: String::new(),
            }),
        );
        assert_eq!(pager.phase(), Phase::ErrorInitial);
        assert!(pager.posts().is_empty());
        assert_eq!(pager.initial_error().unwrap().kind, FeedErrorKind::Http);

        let again = pager.retry().unwrap();
        assert_eq!(again.page, 1);
        assert!(pager.initial_error().is_none());
        pager.complete(&again, page("p1", 3, 1));
        assert_eq!(pager.posts().len(), 3);
    }

    #[test]
    fn malformed_page_is_terminal_for_that_page() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("p1", 10, 3));
        let second = pager.load_more().unwrap();
        pager.complete(
            &second,
            Err(ApiError::Malformed {
                message: "missing field `totalPages`".into(),
            }),
        );
        assert_eq!(pager.phase(), Phase::ErrorLoadMore);
        assert_eq!(pager.more_error().unwrap().kind, FeedErrorKind::Malformed);
        assert!(!pager.has_more());
        assert_eq!(pager.posts().len(), 10);
    }

    #[test]
    fn query_change_resets_and_refetches() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("all1", 10, 5));
        let second = pager.load_more().unwrap();
        pager.complete(&second, page("all2", 10, 5));
        assert_eq!(pager.posts().len(), 20);

        let friends = FeedQuery {
            audience: Audience::Friends,
            sort: SortType::New,
        };
        let req = pager.set_query(friends).unwrap();
        assert!(pager.posts().is_empty());
        assert_eq!(req.page, 1);
        assert_eq!(req.filter.audience, Audience::Friends);
        assert_eq!(pager.phase(), Phase::LoadingInitial);
        assert!(pager.set_query(friends).is_none());

        pager.complete(&req, page("fr1", 2, 1));
        assert_eq!(pager.posts()[0].id, "fr1-0");
    }

    #[test]
    fn reset_counter_is_zero_before_refetch() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("a", 10, 5));
        pager.reset();
        assert_eq!(pager.page(), 0);
        assert!(pager.has_more());
        assert!(pager.posts().is_empty());
        assert_eq!(pager.phase(), Phase::Idle);
    }

    #[test]
    fn stale_completion_after_reset_is_ignored() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        pager.complete(&first, page("all1", 10, 5));
        let old = pager.load_more().unwrap();

        let fresh = pager
            .set_query(FeedQuery {
                audience: Audience::Following,
                sort: SortType::Top,
            })
            .unwrap();
        assert!(!pager.complete(&old, page("all2", 10, 5)));
        assert!(pager.posts().is_empty());
        assert!(pager.complete(&fresh, page("fo1", 1, 1)));
        assert_eq!(pager.posts().len(), 1);
    }

    #[test]
    fn no_second_request_while_loading() {
        let mut pager = pager();
        let first = pager.start().unwrap();
        assert!(pager.start().is_none());
        assert!(pager.load_more().is_none());
        assert!(pager.retry().is_none());
        pager.complete(&first, page("a", 10, 3));

        let near = ScrollMetrics {
            viewport_height: 800.0,
            scroll_top: 1050.0,
            scroll_height: 2000.0,
        };
        let second = pager.on_scroll(near).unwrap();
        assert!(pager.on_scroll(near).is_none());
        pager.complete(&second, page("b", 10, 3));

        let far = ScrollMetrics {
            viewport_height: 800.0,
            scroll_top: 0.0,
            scroll_height: 4000.0,
        };
        assert!(pager.on_scroll(far).is_none());
    }

    struct ScriptedFeed {
        pages: Mutex<VecDeque<Result<FeedPage, ApiError>>>,
        seen: Mutex<Vec<FeedFilter>>,
    }

    impl FeedService for ScriptedFeed {
        fn load_page(&self, filter: &FeedFilter) -> Result<FeedPage, ApiError> {
            self.seen.lock().push(filter.clone());
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| page("extra", 0, 0))
        }
    }

    #[test]
    fn fetch_drives_service_sequentially() {
        let feed = ScriptedFeed {
            pages: Mutex::new(VecDeque::from(vec![page("p1", 10, 2), page("p2", 5, 2)])),
            seen: Mutex::new(Vec::new()),
        };
        let mut pager = FeedPager::new(
            FeedQuery {
                audience: Audience::All,
                sort: SortType::Hot,
            },
            10,
        );
        while let Some(req) = pager.start_or_more() {
            assert!(pager.fetch(&feed, &req));
        }
        let pages: Vec<u32> = feed.seen.lock().iter().map(|f| f.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(pager.posts().len(), 15);
        assert_eq!(pager.phase(), Phase::Exhausted);
    }

    impl FeedPager {
        fn start_or_more(&mut self) -> Option<PageRequest> {
            if self.page() == 0 {
                self.start()
            } else {
                self.load_more()
            }
        }
    }
}
