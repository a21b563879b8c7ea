use core::time::Duration;
use std::{sync::Arc, thread, time::Instant};

use compact_str::CompactString;
use headless_chrome::{Browser, Tab};
use rand::Rng;
use scraper::{Html, Selector};
use tokio::task::spawn_blocking;

use crate::{
    config::Account,
    engage::{Session, TopicCandidate, VisitOutcome},
    selectors,
    util::approx_count,
};

use super::{element_title, eval_i64, find_first, first_tab, launch, safe_click};

const LOAD_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLE: Duration = Duration::from_secs(2);
const LOGIN_WAIT: Duration = Duration::from_secs(10);
const MARKER_WAIT: Duration = Duration::from_secs(8);

struct ParseCtx {
    base: String,
    sel_row: Selector,
    sel_title: Selector,
    sel_views: Selector,
    sel_pinned: Selector,
    reg_digits: regex::Regex,
}

impl ParseCtx {
    fn new(base: String) -> Self {
        Self {
            base,
            sel_row: Selector::parse(selectors::TOPIC_ROW).unwrap(),
            sel_title: Selector::parse(selectors::TOPIC_TITLE).unwrap(),
            sel_views: Selector::parse(selectors::TOPIC_VIEWS).unwrap(),
            sel_pinned: Selector::parse(selectors::PINNED_MARKER).unwrap(),
            reg_digits: regex::Regex::new(r"\d+").unwrap(),
        }
    }
}

/// One Chrome process, exclusively owned for the duration of a single
/// account's run and killed at teardown, so nothing leaks into the next
/// account's session.
pub struct ChromeSession {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
    listing_url: String,
    ctx: Arc<ParseCtx>,
}

impl ChromeSession {
    pub async fn open(account: &Account, headless: bool) -> anyhow::Result<Self> {
        let base = account.forum_url.trim_end_matches('/').to_owned();

        let (browser, tab) = spawn_blocking(move || -> anyhow::Result<(Browser, Arc<Tab>)> {
            let browser = launch(headless)?;
            let tab = first_tab(&browser)?;
            tab.set_default_timeout(LOAD_TIMEOUT);

            let user_agent = {
                use rand::seq::IndexedRandom;
                let mut rng = rand::rng();
                *super::USER_AGENTS.choose(&mut rng).unwrap_or(&super::USER_AGENTS[0])
            };
            tab.set_user_agent(user_agent, None, None)?;
            tracing::info!(target: "scrape", "user-agent \x1b[1;36m{user_agent}\x1b[0m");

            Ok((browser, tab))
        })
        .await??;

        Ok(Self {
            browser: Arc::new(browser),
            tab,
            ctx: Arc::new(ParseCtx::new(base.clone())),
            listing_url: base,
        })
    }

    /// Runs the login flow; `Ok(false)` means the forum rejected us or
    /// the markup matched nothing, which fails only this account.
    pub async fn login(&self, account: &Account) -> anyhow::Result<bool> {
        let tab = Arc::clone(&self.tab);
        let url = self.listing_url.clone();
        let username = account.username.to_string();
        let password = account.password.clone();

        spawn_blocking(move || login_blocking(&tab, &url, &username, &password)).await?
    }

    /// Releases the session: storage cleared, extra tabs closed, browser
    /// process killed when the last handle drops.
    pub async fn teardown(self) {
        let Self { browser, tab, .. } = self;

        let res = spawn_blocking(move || {
            let _ = tab.evaluate(
                "window.localStorage.clear(); window.sessionStorage.clear()",
                false,
            );

            let extras = {
                let tabs_guard = browser
                    .get_tabs()
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                tabs_guard
                    .iter()
                    .filter(|t| !Arc::ptr_eq(t, &tab))
                    .cloned()
                    .collect::<Vec<_>>()
            };
            for extra in extras {
                let _ = extra.close(true);
            }

            drop(tab);
            drop(browser);
        })
        .await;

        if let Err(e) = res {
            tracing::warn!(target: "scrape", "teardown task failed: {e:?}");
        }
    }
}

impl Session for ChromeSession {
    async fn discover(&mut self, scroll_budget: Duration) -> anyhow::Result<Vec<TopicCandidate>> {
        let tab = Arc::clone(&self.tab);
        let ctx = Arc::clone(&self.ctx);

        spawn_blocking(move || {
            scroll_to_bottom(&tab, scroll_budget);
            let html = tab.get_content()?;
            Ok(parse_listing(&html, &ctx))
        })
        .await?
    }

    async fn reload(&mut self) -> anyhow::Result<()> {
        let tab = Arc::clone(&self.tab);
        let url = self.listing_url.clone();

        spawn_blocking(move || -> anyhow::Result<()> {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            thread::sleep(SETTLE);
            Ok(())
        })
        .await?
    }

    async fn visit(
        &mut self,
        candidate: &TopicCandidate,
        like: bool,
    ) -> anyhow::Result<VisitOutcome> {
        let browser = Arc::clone(&self.browser);
        let url = candidate.link.clone();

        spawn_blocking(move || visit_blocking(&browser, &url, like)).await?
    }
}

fn login_blocking(tab: &Tab, url: &str, username: &str, password: &str) -> anyhow::Result<bool> {
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;
    thread::sleep(SETTLE);

    let Some(button) = find_first(tab, selectors::LOGIN_BUTTON, LOGIN_WAIT) else {
        tracing::warn!(target: "login", "login button not found");
        return Ok(false);
    };
    if !safe_click(&button) {
        tracing::warn!(target: "login", "login button would not click");
        return Ok(false);
    }
    thread::sleep(SETTLE);

    let Some(field) = find_first(tab, selectors::USERNAME_FIELD, LOGIN_WAIT) else {
        tracing::warn!(target: "login", "username field not found");
        return Ok(false);
    };
    let _ = field.call_js_fn("function() { this.value = ''; }", Vec::new(), false);
    field.click()?;
    field.type_into(username)?;

    let Some(field) = find_first(tab, selectors::PASSWORD_FIELD, LOGIN_WAIT) else {
        tracing::warn!(target: "login", "password field not found");
        return Ok(false);
    };
    let _ = field.call_js_fn("function() { this.value = ''; }", Vec::new(), false);
    field.click()?;
    field.type_into(password)?;

    let Some(submit) = find_first(tab, selectors::SUBMIT_BUTTON, LOGIN_WAIT) else {
        tracing::warn!(target: "login", "submit button not found");
        return Ok(false);
    };
    if !safe_click(&submit) {
        tracing::warn!(target: "login", "submit button would not click");
        return Ok(false);
    }
    thread::sleep(Duration::from_secs(3));

    Ok(find_first(tab, selectors::LOGGED_IN_MARKER, MARKER_WAIT).is_some())
}

/// Keeps scrolling to the bottom until the page height stops growing
/// (two stagnant reads) or the budget runs out.
fn scroll_to_bottom(tab: &Tab, budget: Duration) {
    const HEIGHT: &str = "document.body.scrollHeight";

    let deadline = Instant::now() + budget;
    let mut last_height = eval_i64(tab, HEIGHT).unwrap_or(0);

    while Instant::now() < deadline {
        let _ = tab.evaluate("window.scrollTo(0, document.body.scrollHeight)", false);
        thread::sleep(SETTLE);

        let mut height = eval_i64(tab, HEIGHT).unwrap_or(last_height);
        if height == last_height {
            thread::sleep(SETTLE);
            height = eval_i64(tab, HEIGHT).unwrap_or(last_height);
            if height == last_height {
                break;
            }
        }
        last_height = height;
    }
}

fn parse_listing(html: &str, ctx: &ParseCtx) -> Vec<TopicCandidate> {
    let doc = Html::parse_document(html);

    doc.select(&ctx.sel_row)
        .filter_map(|row| {
            let anchor = row.select(&ctx.sel_title).next()?;
            let href = anchor.attr("href")?;
            let title = anchor
                .text()
                .map(str::trim)
                .collect::<CompactString>();
            if title.is_empty() {
                return None;
            }

            let link = if href.starts_with('/') {
                format!("{}{href}", ctx.base)
            } else {
                href.to_owned()
            };

            let pinned = row
                .attr("class")
                .is_some_and(|c| c.contains("pinned") || c.contains("sticky"))
                || row.select(&ctx.sel_pinned).next().is_some();

            let views = row.select(&ctx.sel_views).next().map_or(0, |cell| {
                cell.attr("title")
                    .and_then(|t| {
                        let flat = t.replace(',', "");
                        ctx.reg_digits.find(&flat)?.as_str().parse().ok()
                    })
                    .unwrap_or_else(|| approx_count(&cell.text().collect::<String>()))
            });

            Some(TopicCandidate { title, link, views, pinned })
        })
        .collect()
}

fn visit_blocking(browser: &Browser, url: &str, like: bool) -> anyhow::Result<VisitOutcome> {
    let started = Instant::now();

    let tab = browser.new_tab()?;
    tab.set_default_timeout(LOAD_TIMEOUT);

    let loaded: anyhow::Result<()> = (|| {
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;
        Ok(())
    })();
    if let Err(e) = loaded {
        let _ = tab.close(true);
        return Err(e);
    }
    thread::sleep(SETTLE);

    let liked = like && try_like(&tab);
    read_through(&tab);

    let _ = tab.close(true);
    Ok(VisitOutcome { engaged: started.elapsed(), liked })
}

fn try_like(tab: &Tab) -> bool {
    for selector in selectors::LIKE_BUTTON {
        let Ok(buttons) = tab.find_elements(selector) else {
            continue;
        };
        for button in buttons {
            let title = element_title(&button).to_lowercase();
            if selectors::UNDO_LIKE_WORDS.iter().any(|w| title.contains(w)) {
                continue;
            }
            if safe_click(&button) {
                thread::sleep(Duration::from_secs(1));
                return true;
            }
        }
    }
    false
}

/// Pages through the topic in viewport steps with per-step jitter, so the
/// engagement time both throttles us and accrues toward the quota.
fn read_through(tab: &Tab) {
    let total = eval_i64(tab, "document.body.scrollHeight").unwrap_or(0);
    let viewport = eval_i64(tab, "window.innerHeight").unwrap_or(0).max(1);
    let steps = (total / viewport + 1).clamp(1, 30);

    let mut rng = rand::rng();
    for step in 0..steps {
        let _ = tab.evaluate(&format!("window.scrollTo(0, {})", step * viewport), false);
        thread::sleep(Duration::from_millis(rng.random_range(1000..2000)));
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseCtx, parse_listing};

    const LISTING: &str = r#"
        <table class="topic-list"><tbody>
            <tr class="topic-list-item pinned">
                <td class="main-link"><a class="title" href="/t/welcome/1">Welcome</a></td>
                <td class="num views"><span class="number" title="5,214 views">5.2k</span></td>
            </tr>
            <tr class="topic-list-item">
                <td class="main-link"><a class="title" href="/t/hot-topic/42"> Hot topic </a></td>
                <td class="num views"><span class="number" title="1,501">1.5k</span></td>
            </tr>
            <tr class="topic-list-item">
                <td class="main-link"><a class="title" href="https://forum.example.com/t/abs/7">Abs</a></td>
                <td class="num views"><span class="number">870</span></td>
            </tr>
            <tr class="topic-list-item"><td class="main-link">no anchor here</td></tr>
        </tbody></table>
    "#;

    #[test]
    fn listing_rows_become_candidates() {
        let ctx = ParseCtx::new("https://forum.example.com".to_owned());
        let topics = parse_listing(LISTING, &ctx);

        assert_eq!(topics.len(), 3);

        assert_eq!(topics[0].title, "Welcome");
        assert_eq!(topics[0].link, "https://forum.example.com/t/welcome/1");
        assert_eq!(topics[0].views, 5214);
        assert!(topics[0].pinned);

        assert_eq!(topics[1].title, "Hot topic");
        assert_eq!(topics[1].views, 1501);
        assert!(!topics[1].pinned);

        // absolute hrefs pass through untouched, text views still parse
        assert_eq!(topics[2].link, "https://forum.example.com/t/abs/7");
        assert_eq!(topics[2].views, 870);
    }

    #[test]
    fn empty_listing_parses_to_nothing() {
        let ctx = ParseCtx::new("https://forum.example.com".to_owned());
        assert!(parse_listing("<html><body></body></html>", &ctx).is_empty());
    }
}
