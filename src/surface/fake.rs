use super::{
    AutomationSurface, LinkClass, PageMetadata, ScrollDirection, SearchKind, SurfaceError,
    SurfaceResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Scripted surface for tests. Every call is journaled; link and metadata
/// responses are served from per-class queues in the order they were pushed,
/// falling back to empty once a queue runs dry.
pub struct FakeSurface {
    journal: Mutex<Vec<String>>,
    links: Mutex<HashMap<LinkClass, VecDeque<Vec<String>>>>,
    metadata: Mutex<VecDeque<PageMetadata>>,
    search_found: AtomicBool,
    like_succeeds: AtomicBool,
    follow_succeeds: AtomicBool,
    expand_succeeds: AtomicBool,
    fail_navigate_to: Mutex<Vec<String>>,
}

impl Default for FakeSurface {
    fn default() -> Self {
        Self {
            journal: Mutex::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
            metadata: Mutex::new(VecDeque::new()),
            search_found: AtomicBool::new(true),
            like_succeeds: AtomicBool::new(true),
            follow_succeeds: AtomicBool::new(true),
            expand_succeeds: AtomicBool::new(false),
            fail_navigate_to: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_links(&self, class: LinkClass, links: Vec<&str>) {
        self.links
            .lock()
            .unwrap()
            .entry(class)
            .or_default()
            .push_back(links.into_iter().map(String::from).collect());
    }

    pub fn push_metadata(&self, title: &str, description: &str) {
        self.metadata.lock().unwrap().push_back(PageMetadata {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
        });
    }

    pub fn set_search_found(&self, found: bool) {
        self.search_found.store(found, Ordering::SeqCst);
    }

    pub fn set_like_succeeds(&self, ok: bool) {
        self.like_succeeds.store(ok, Ordering::SeqCst);
    }

    pub fn set_follow_succeeds(&self, ok: bool) {
        self.follow_succeeds.store(ok, Ordering::SeqCst);
    }

    pub fn set_expand_succeeds(&self, ok: bool) {
        self.expand_succeeds.store(ok, Ordering::SeqCst);
    }

    /// Make navigate() fail for any URL containing the fragment
    pub fn fail_navigation_containing(&self, fragment: &str) {
        self.fail_navigate_to
            .lock()
            .unwrap()
            .push(fragment.to_string());
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn record(&self, line: String) {
        self.journal.lock().unwrap().push(line);
    }
}

#[async_trait]
impl AutomationSurface for FakeSurface {
    async fn navigate(&self, url: &str) -> SurfaceResult<()> {
        self.record(format!("navigate:{}", url));
        let failing = self.fail_navigate_to.lock().unwrap();
        if failing.iter().any(|fragment| url.contains(fragment.as_str())) {
            return Err(SurfaceError::Other(format!("navigation failed: {}", url)));
        }
        Ok(())
    }

    async fn search(&self, term: &str, kind: SearchKind) -> SurfaceResult<bool> {
        self.record(format!("search:{:?}:{}", kind, term));
        Ok(self.search_found.load(Ordering::SeqCst))
    }

    async fn scroll_step(&self, direction: ScrollDirection) -> SurfaceResult<()> {
        self.record(format!("scroll:{:?}", direction));
        Ok(())
    }

    async fn attempt_like(&self) -> SurfaceResult<bool> {
        self.record("like".to_string());
        Ok(self.like_succeeds.load(Ordering::SeqCst))
    }

    async fn extract_links(&self, class: LinkClass) -> SurfaceResult<Vec<String>> {
        self.record(format!("extract:{:?}", class));
        Ok(self
            .links
            .lock()
            .unwrap()
            .get_mut(&class)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_default())
    }

    async fn click_follow(&self, identity: &str) -> SurfaceResult<bool> {
        self.record(format!("follow:{}", identity));
        Ok(self.follow_succeeds.load(Ordering::SeqCst))
    }

    async fn go_home(&self) -> SurfaceResult<()> {
        self.record("home".to_string());
        Ok(())
    }

    async fn page_metadata(&self) -> SurfaceResult<PageMetadata> {
        self.record("metadata".to_string());
        Ok(self.metadata.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn expand_engagement(&self) -> SurfaceResult<bool> {
        self.record("expand".to_string());
        Ok(self.expand_succeeds.load(Ordering::SeqCst))
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}
