use anyhow::{Context, Result};
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::Cookie;
use tokio::time::sleep;
use tracing::debug;

use super::{
    AutomationSurface, LinkClass, PageMetadata, ScrollDirection, SearchKind, SurfaceError,
    SurfaceResult,
};
use crate::cli::config::SurfaceSettings;
use crate::storage::StoredCookie;
use async_trait::async_trait;

const ENTER_KEY: &str = "\u{E007}";

fn profile_url(base_url: &str, identity: &str) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        identity.trim_start_matches('@')
    )
}

/// Platform surface backed by a real browser over WebDriver. All element
/// locations come from configured selectors so a markup change is a config
/// edit, not a code change.
pub struct WebDriverSurface {
    driver: WebDriver,
    settings: SurfaceSettings,
}

impl WebDriverSurface {
    pub async fn connect(settings: &SurfaceSettings) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        if settings.headless {
            caps.set_headless()?;
        }

        let driver = WebDriver::new(&settings.webdriver_url, caps)
            .await
            .context("Failed to connect to WebDriver")?;
        driver
            .set_page_load_timeout(Duration::from_secs(settings.page_load_timeout_secs))
            .await?;
        debug!("browser session established at {}", settings.webdriver_url);

        Ok(Self {
            driver,
            settings: settings.clone(),
        })
    }

    /// Load persisted cookies into the browser. Individual rejects are
    /// logged and skipped; the platform drops cookies it does not like.
    pub async fn restore_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        self.driver
            .goto(&self.settings.base_url)
            .await
            .context("Failed to open base URL before restoring cookies")?;
        self.driver.delete_all_cookies().await?;

        let mut restored = 0usize;
        for stored in cookies {
            let mut cookie = Cookie::new(&stored.name, serde_json::json!(stored.value));
            cookie.domain = stored.domain.clone();
            cookie.path = stored.path.clone();
            cookie.secure = stored.secure;
            cookie.expiry = stored.expiry;
            match self.driver.add_cookie(cookie).await {
                Ok(()) => restored += 1,
                Err(e) => debug!("cookie {} rejected: {}", stored.name, e),
            }
        }
        debug!("restored {}/{} cookies", restored, cookies.len());

        // Reload so the restored session takes effect
        self.driver
            .goto(&self.settings.base_url)
            .await
            .context("Failed to reload after restoring cookies")?;
        Ok(())
    }

    fn link_selector(&self, class: LinkClass) -> &str {
        let selectors = &self.settings.selectors;
        match class {
            LinkClass::Items => &selectors.item_links,
            LinkClass::Identities => &selectors.identity_links,
            LinkClass::Engagement => &selectors.engagement_links,
        }
    }

    async fn results_present(&self) -> SurfaceResult<bool> {
        let found = self
            .driver
            .find_all(By::Css(&self.settings.selectors.result_marker))
            .await?;
        Ok(!found.is_empty())
    }

    async fn type_into_search(&self, term: &str) -> SurfaceResult<()> {
        let selectors = &self.settings.selectors;
        let input = match self.driver.find(By::Css(&selectors.search_input)).await {
            Ok(element) => element,
            Err(_) => {
                // The search field may hide behind a toggle
                if let Ok(toggle) = self.driver.find(By::Css(&selectors.search_toggle)).await {
                    let _ = toggle.click().await;
                    sleep(Duration::from_millis(800)).await;
                }
                self.driver
                    .find(By::Css(&selectors.search_input))
                    .await
                    .map_err(|_| {
                        SurfaceError::Other(format!(
                            "search input not found: {}",
                            selectors.search_input
                        ))
                    })?
            }
        };

        input.clear().await?;
        for c in term.chars() {
            input.send_keys(c.to_string()).await?;
            sleep(Duration::from_millis(80)).await;
        }
        input.send_keys(ENTER_KEY.to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl AutomationSurface for WebDriverSurface {
    async fn navigate(&self, url: &str) -> SurfaceResult<()> {
        debug!("navigating to {}", url);
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn search(&self, term: &str, kind: SearchKind) -> SurfaceResult<bool> {
        match kind {
            SearchKind::Topic => {
                self.type_into_search(term).await?;
                sleep(Duration::from_millis(1500)).await;
            }
            SearchKind::Identity => {
                let url = profile_url(&self.settings.base_url, term);
                self.driver.goto(url).await?;
                sleep(Duration::from_millis(1200)).await;
            }
        }
        self.results_present().await
    }

    async fn scroll_step(&self, direction: ScrollDirection) -> SurfaceResult<()> {
        let script = match direction {
            ScrollDirection::Down => {
                "window.scrollBy({ top: window.innerHeight * 0.85, left: 0, behavior: 'smooth' });"
            }
            ScrollDirection::Up => {
                "window.scrollBy({ top: -window.innerHeight * 0.6, left: 0, behavior: 'smooth' });"
            }
        };
        self.driver.execute(script, Vec::new()).await?;
        Ok(())
    }

    async fn attempt_like(&self) -> SurfaceResult<bool> {
        let buttons = self
            .driver
            .find_all(By::Css(&self.settings.selectors.like_button))
            .await?;
        for button in buttons {
            if !matches!(button.is_displayed().await, Ok(true)) {
                continue;
            }
            match button.click().await {
                Ok(()) => return Ok(true),
                Err(e) => debug!("like click failed: {}", e),
            }
        }
        Ok(false)
    }

    async fn extract_links(&self, class: LinkClass) -> SurfaceResult<Vec<String>> {
        let elements = self.driver.find_all(By::Css(self.link_selector(class))).await?;
        let mut links = Vec::new();
        for element in elements {
            if let Ok(Some(href)) = element.attr("href").await {
                links.push(href);
            }
        }
        Ok(links)
    }

    async fn click_follow(&self, identity: &str) -> SurfaceResult<bool> {
        let label = &self.settings.selectors.follow_label;
        let buttons = self
            .driver
            .find_all(By::XPath(&self.settings.selectors.follow_button))
            .await?;
        for button in buttons {
            if !matches!(button.is_displayed().await, Ok(true)) {
                continue;
            }
            let text = match button.text().await {
                Ok(text) => text,
                Err(_) => continue,
            };
            if text.trim().eq_ignore_ascii_case(label) {
                debug!("following @{}", identity);
                button.click().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn go_home(&self) -> SurfaceResult<()> {
        self.driver.goto(&self.settings.base_url).await?;
        Ok(())
    }

    async fn page_metadata(&self) -> SurfaceResult<PageMetadata> {
        let title = self.driver.title().await?;
        let title = if title.trim().is_empty() {
            None
        } else {
            Some(title)
        };

        let description = match self
            .driver
            .find(By::Css(&self.settings.selectors.metadata_description))
            .await
        {
            Ok(element) => element.attr("content").await.ok().flatten(),
            Err(_) => None,
        };

        Ok(PageMetadata { title, description })
    }

    async fn expand_engagement(&self) -> SurfaceResult<bool> {
        let expanders = self
            .driver
            .find_all(By::XPath(&self.settings.selectors.engagement_expander))
            .await?;
        for expander in expanders {
            if matches!(expander.is_displayed().await, Ok(true)) {
                expander.click().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.driver.clone().quit().await?;
        debug!("browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::PilotConfig;

    #[test]
    fn test_profile_url_strips_handle_prefix() {
        assert_eq!(
            profile_url("https://www.example.com/", "@alice"),
            "https://www.example.com/alice/"
        );
        assert_eq!(
            profile_url("https://www.example.com", "bob"),
            "https://www.example.com/bob/"
        );
    }

    #[test]
    fn test_default_selectors_cover_every_link_class() {
        let settings = PilotConfig::default().surface;
        assert!(!settings.selectors.item_links.is_empty());
        assert!(!settings.selectors.identity_links.is_empty());
        assert!(!settings.selectors.engagement_links.is_empty());
    }
}
