use core::time::Duration;
use std::{io::BufReader, path::Path};

use compact_str::CompactString;
use serde::Deserialize;

use crate::util::domain_of;

pub const PRIMARY_KEY: &str = "DISCOURSE_USER";

const DEFAULT_VIEW_THRESHOLD: i64 = 1000;
const DEFAULT_SCROLL_SECS: u64 = 5;

/// One forum identity, immutable once parsed.
#[derive(Debug, Clone)]
pub struct Account {
    pub forum_url: String,
    pub domain: CompactString,
    pub username: CompactString,
    pub password: String,
    /// Topics viewed more than this many times get a like.
    pub view_threshold: i64,
    /// How long the listing is scrolled per discovery pass.
    pub scroll_budget: Duration,
}

pub fn parse_accounts() -> Vec<Account> {
    parse_accounts_with(|key| std::env::var(key).ok())
}

/// Reads `DISCOURSE_USER`, then `DISCOURSE_USER_1`, `_2`, … until the
/// first missing or empty entry. Malformed entries are logged and skipped,
/// never fatal.
pub fn parse_accounts_with<F>(lookup: F) -> Vec<Account>
where
    F: Fn(&str) -> Option<String>,
{
    let mut accounts = Vec::new();

    if let Some(raw) = lookup(PRIMARY_KEY)
        && !raw.trim().is_empty()
    {
        parse_single(&raw, PRIMARY_KEY, &lookup, &mut accounts);
    }

    for index in 1u32.. {
        let key = format!("{PRIMARY_KEY}_{index}");
        let Some(raw) = lookup(&key) else { break };
        if raw.trim().is_empty() {
            break;
        }
        parse_single(&raw, &key, &lookup, &mut accounts);
    }

    accounts
}

fn parse_single<F>(raw: &str, key: &str, lookup: &F, accounts: &mut Vec<Account>)
where
    F: Fn(&str) -> Option<String>,
{
    let fields = raw.split_whitespace().collect::<Vec<_>>();
    let &[forum, username, password] = fields.as_slice() else {
        tracing::warn!(
            target: "config",
            "{key} has {} fields, want `forum-url username password`, skipping",
            fields.len(),
        );
        return;
    };

    let forum_url = if forum.starts_with("http://") || forum.starts_with("https://") {
        forum.to_owned()
    } else {
        format!("https://{forum}")
    };

    let view_threshold = numeric_or(
        lookup,
        &key.replace(PRIMARY_KEY, "VIEW_COUNT"),
        DEFAULT_VIEW_THRESHOLD,
    );
    let scroll_secs = numeric_or(
        lookup,
        &key.replace(PRIMARY_KEY, "SCROLL_DURATION"),
        DEFAULT_SCROLL_SECS as i64,
    );

    accounts.push(Account {
        domain: domain_of(&forum_url).into(),
        forum_url,
        username: username.into(),
        password: password.to_owned(),
        view_threshold,
        scroll_budget: Duration::from_secs(scroll_secs.max(0) as u64),
    });
}

fn numeric_or<F>(lookup: &F, key: &str, default: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(target: "config", "{key}={v:?} is not a number, using {default}");
            default
        }),
    }
}

/// Daily engagement target for one forum. Both halves must be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DailyQuota {
    pub topics: u32,
    pub seconds: u64,
}

impl Default for DailyQuota {
    fn default() -> Self {
        Self { topics: 50, seconds: 180 }
    }
}

impl DailyQuota {
    #[must_use]
    pub const fn required_time(self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

type QuotaMap = hashbrown::HashMap<CompactString, DailyQuota>;

/// Per-domain quota lookup. Missing file, malformed file, and unknown
/// domains all fall back to [`DailyQuota::default`].
#[derive(Debug, Default)]
pub struct QuotaBook {
    by_domain: QuotaMap,
}

impl QuotaBook {
    pub fn load(path: &Path) -> Self {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::info!(target: "quota", "no quota file at {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };

        match read_quotas(BufReader::new(file)) {
            Ok(by_domain) => {
                tracing::info!(target: "quota", "loaded quotas for {} domain(s)", by_domain.len());
                Self { by_domain }
            }
            Err(e) => {
                tracing::warn!(target: "quota", "quota file {} is malformed: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn resolve(&self, domain: &str) -> DailyQuota {
        self.by_domain.get(domain).copied().unwrap_or_default()
    }
}

fn read_quotas(reader: impl std::io::Read) -> serde_json::Result<QuotaMap> {
    serde_json::from_reader(reader)
}

#[cfg(test)]
mod tests {
    use super::{DailyQuota, QuotaBook, parse_accounts_with, read_quotas};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<hashbrown::HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parses_primary_and_numbered_accounts() {
        let accounts = parse_accounts_with(env(&[
            ("DISCOURSE_USER", "meta.discourse.org alice hunter2"),
            ("DISCOURSE_USER_1", "https://forum.example.com bob s3cret"),
            ("VIEW_COUNT_1", "500"),
            ("SCROLL_DURATION_1", "9"),
        ]));

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].forum_url, "https://meta.discourse.org");
        assert_eq!(accounts[0].domain, "meta.discourse.org");
        assert_eq!(accounts[0].view_threshold, 1000);
        assert_eq!(accounts[0].scroll_budget.as_secs(), 5);
        assert_eq!(accounts[1].username, "bob");
        assert_eq!(accounts[1].view_threshold, 500);
        assert_eq!(accounts[1].scroll_budget.as_secs(), 9);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let accounts = parse_accounts_with(env(&[
            ("DISCOURSE_USER", "forum.example.com alice"),
            ("DISCOURSE_USER_1", "forum.example.com bob pw extra"),
            ("DISCOURSE_USER_2", "forum.example.com carol pw"),
        ]));

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "carol");
    }

    #[test]
    fn numbered_scan_stops_at_first_gap() {
        let accounts = parse_accounts_with(env(&[
            ("DISCOURSE_USER_1", "a.example alice pw"),
            ("DISCOURSE_USER_3", "c.example carol pw"),
        ]));

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "alice");
    }

    #[test]
    fn bad_numeric_settings_fall_back() {
        let accounts = parse_accounts_with(env(&[
            ("DISCOURSE_USER", "forum.example.com alice pw"),
            ("VIEW_COUNT", "lots"),
        ]));

        assert_eq!(accounts[0].view_threshold, 1000);
    }

    #[test]
    fn quota_defaults() {
        let quota = DailyQuota::default();
        assert_eq!(quota.topics, 50);
        assert_eq!(quota.seconds, 180);
    }

    #[test]
    fn quota_resolution_and_fallbacks() {
        let by_domain = read_quotas(
            br#"{"forum.example.com": {"topics": 2, "seconds": 10}}"#.as_slice(),
        )
        .unwrap();
        let book = QuotaBook { by_domain };

        assert_eq!(
            book.resolve("forum.example.com"),
            DailyQuota { topics: 2, seconds: 10 },
        );
        assert_eq!(book.resolve("other.example.com"), DailyQuota::default());

        assert!(read_quotas(br"{ not json".as_slice()).is_err());

        let missing = QuotaBook::load(std::path::Path::new("/nonexistent/quota.json"));
        assert_eq!(missing.resolve("forum.example.com"), DailyQuota::default());
    }
}
