mod run;

use core::time::Duration;
use std::{path::PathBuf, time::Instant};

use clap::Parser;
use dalive::{
    config,
    report::{self, Report, RunResult, RunStatus},
    scrape,
};

#[derive(Parser)]
#[command(version, about = "Keeps Discourse accounts alive by browsing and liking topics")]
struct Args {
    /// Per-domain daily quota file (JSON: domain -> {topics, seconds}).
    #[arg(long, value_name = "file", default_value = "quota.json")]
    quota: PathBuf,

    /// Run with a visible browser window.
    #[arg(long)]
    headed: bool,

    /// Cap on topics taken from one discovery pass.
    #[arg(long, default_value_t = 20)]
    max_topics: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();
    let args = Args::parse();

    let accounts = config::parse_accounts();
    anyhow::ensure!(
        !accounts.is_empty(),
        "no valid account configuration, set {}",
        config::PRIMARY_KEY,
    );
    tracing::info!(target: "main", "parsed {} account(s)", accounts.len());
    for account in &accounts {
        tracing::info!(target: "main", "  {} - {}", account.domain, account.username);
    }

    let chrome = scrape::browser_binary()?;
    tracing::info!(target: "main", "browser: {}", chrome.display());

    let quotas = config::QuotaBook::load(&args.quota);
    let opts = run::Opts {
        headless: !args.headed,
        max_topics: args.max_topics,
    };

    let started = Instant::now();
    let mut report = Report::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let total = accounts.len();
    for (i, account) in accounts.iter().enumerate() {
        tracing::info!(
            target: "main",
            "[{}/{total}] {} - {}", i + 1, account.domain, account.username,
        );

        let quota = quotas.resolve(&account.domain);
        tokio::select! {
            _ = &mut ctrl_c => {
                // dropping the in-flight future drops the session, which
                // kills its browser process
                tracing::warn!(target: "main", "interrupted, shutting down");
                report.push(RunResult {
                    domain: account.domain.clone(),
                    username: account.username.clone(),
                    status: RunStatus::Interrupted,
                    visited: 0,
                    liked: 0,
                    elapsed: Duration::ZERO,
                });
                break;
            }
            result = run::process_account(account, quota, &opts) => report.push(result),
        }

        if i + 1 < total {
            tokio::time::sleep(const { Duration::from_secs(5) }).await;
        }
    }

    report.log_summary(started.elapsed());

    if let Ok(webhook) = std::env::var("NOTIFY_WEBHOOK") {
        let body = report.summary(started.elapsed());
        if let Err(e) = report::notify(&webhook, "discourse-alive run finished", &body).await {
            tracing::warn!(target: "main", "notification failed: {e:?}");
        }
    } else {
        tracing::info!(target: "main", "no notification sink configured");
    }

    Ok(())
}
