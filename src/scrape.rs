use core::time::Duration;
use std::{ffi::OsStr, path::PathBuf, sync::Arc};

use headless_chrome::{Browser, Element, LaunchOptions, Tab, browser::default_executable};

pub mod session;

pub static USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
];

/// How long an alternative selector in a fallback chain gets once the
/// primary has already timed out.
const ALT_TIMEOUT: Duration = Duration::from_secs(2);

const CLICK_ATTEMPTS: u32 = 3;

/// Locates the browser binary; a miss here is a fatal setup error.
pub fn browser_binary() -> anyhow::Result<PathBuf> {
    default_executable().map_err(|e| anyhow::anyhow!("no usable browser binary: {e}"))
}

pub fn launch(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        path: Some(browser_binary()?),
        headless,
        sandbox: false,
        window_size: Some((1920, 1080)),
        idle_browser_timeout: Duration::from_secs(300),
        args: vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
        ],
        ..LaunchOptions::default()
    })
}

pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                let _ = remain.close(true);
            }
        }
    }

    Ok(tab)
}

/// Tries a selector fallback chain in order; the first variant gets the
/// full timeout, the rest a short one.
pub fn find_first<'t>(tab: &'t Tab, chain: &[&str], timeout: Duration) -> Option<Element<'t>> {
    for (i, selector) in chain.iter().enumerate() {
        let per = if i == 0 { timeout } else { ALT_TIMEOUT };
        if let Ok(element) = tab.wait_for_element_with_custom_timeout(selector, per) {
            tracing::debug!(target: "scrape", "matched {selector:?}");
            return Some(element);
        }
    }
    None
}

/// Clicks with up to three attempts, falling back to a JavaScript click
/// when the regular path is intercepted or the element went stale.
pub fn safe_click(element: &Element<'_>) -> bool {
    for attempt in 1..=CLICK_ATTEMPTS {
        let _ = element.scroll_into_view();
        if element.click().is_ok() {
            return true;
        }
        if element
            .call_js_fn("function() { this.click(); }", Vec::new(), false)
            .is_ok()
        {
            return true;
        }
        tracing::debug!(target: "scrape", "click attempt {attempt} failed");
        std::thread::sleep(Duration::from_secs(1));
    }
    false
}

pub fn eval_i64(tab: &Tab, expr: &str) -> anyhow::Result<i64> {
    let object = tab.evaluate(expr, false)?;
    object
        .value
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .map(|v| v as i64)
        .ok_or_else(|| anyhow::anyhow!("{expr}: no numeric result"))
}

/// `title` attribute of an element, empty when absent or unreadable.
pub fn element_title(element: &Element<'_>) -> String {
    element
        .call_js_fn("function() { return this.title || ''; }", Vec::new(), false)
        .ok()
        .and_then(|o| o.value)
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_default()
}
