use core::{fmt, time::Duration};

use compact_str::CompactString;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    LoginFailed,
    Error,
    Interrupted,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::LoginFailed => "login failed",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record for one account, failed or not. Every configured
/// account that started processing shows up in the report.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub domain: CompactString,
    pub username: CompactString,
    pub status: RunStatus,
    pub visited: u32,
    pub liked: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct Report {
    results: Vec<RunResult>,
}

impl Report {
    pub fn push(&mut self, result: RunResult) {
        self.results.push(result);
    }

    #[must_use]
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    fn success_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .count()
    }

    #[must_use]
    pub fn summary(&self, total: Duration) -> String {
        use core::fmt::Write;

        let visited = self.results.iter().map(|r| u64::from(r.visited)).sum::<u64>();
        let liked = self.results.iter().map(|r| u64::from(r.liked)).sum::<u64>();
        let secs = total.as_secs();

        let mut out = String::new();
        let _ = writeln!(out, "run finished");
        let _ = writeln!(out, "success: {}/{}", self.success_count(), self.results.len());
        let _ = writeln!(out, "topics visited: {visited}");
        let _ = writeln!(out, "likes given: {liked}");
        let _ = writeln!(out, "elapsed: {}m{}s", secs / 60, secs % 60);
        for r in &self.results {
            let _ = writeln!(out);
            let _ = writeln!(out, "{} - {}", r.domain, r.username);
            let _ = writeln!(
                out,
                "  {} | visited: {} | liked: {} | {}s",
                r.status,
                r.visited,
                r.liked,
                r.elapsed.as_secs(),
            );
        }
        out
    }

    pub fn log_summary(&self, total: Duration) {
        for r in &self.results {
            let color = if r.status == RunStatus::Completed { "\x1b[32m" } else { "\x1b[31m" };
            log::info!(
                target: "report",
                "{color}{}\x1b[0m {} - {}: visited {}, liked {}, {}s",
                r.status,
                r.domain,
                r.username,
                r.visited,
                r.liked,
                r.elapsed.as_secs(),
            );
        }
        log::info!(
            target: "report",
            "\x1b[1m{}/{} accounts ok, {}s total\x1b[0m",
            self.success_count(),
            self.results.len(),
            total.as_secs(),
        );
    }
}

/// Pushes the summary to a webhook. An unset sink is handled by the
/// caller; a failing one only loses the notification, never the run.
pub async fn notify(webhook: &str, title: &str, body: &str) -> reqwest::Result<()> {
    #[derive(Serialize)]
    struct Payload<'a> {
        title: &'a str,
        body: &'a str,
    }

    reqwest::Client::new()
        .post(webhook)
        .json(&Payload { title, body })
        .send()
        .await?
        .error_for_status()
        .map(drop)
}
