use crate::error::Result;
use crate::models::SnapshotListPage;
use crate::snapshots::SnapshotsApi;

/// Walks the subscription-wide snapshot listing one page at a time.
pub struct SnapshotPager<'a> {
    api: &'a dyn SnapshotsApi,
    next_link: Option<String>,
    started: bool,
}

impl<'a> SnapshotPager<'a> {
    pub fn new(api: &'a dyn SnapshotsApi) -> Self {
        Self {
            api,
            next_link: None,
            started: false,
        }
    }

    /// True until a page without a `nextLink` has been fetched.
    pub fn more(&self) -> bool {
        !self.started || self.next_link.is_some()
    }

    pub async fn next_page(&mut self) -> Result<SnapshotListPage> {
        let page = self.api.list_page(self.next_link.as_deref()).await?;
        self.started = true;
        self.next_link = page.next_link.clone().filter(|link| !link.is_empty());
        Ok(page)
    }
}
