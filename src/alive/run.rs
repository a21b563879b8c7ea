use std::time::Instant;

use dalive::{
    config::{Account, DailyQuota},
    engage::Controller,
    report::{RunResult, RunStatus},
    scrape::session::ChromeSession,
};

pub struct Opts {
    pub headless: bool,
    pub max_topics: usize,
}

fn finish(
    account: &Account,
    started: Instant,
    status: RunStatus,
    visited: u32,
    liked: u32,
) -> RunResult {
    RunResult {
        domain: account.domain.clone(),
        username: account.username.clone(),
        status,
        visited,
        liked,
        elapsed: started.elapsed(),
    }
}

/// Full lifecycle for one account: fresh browser, login, engagement loop,
/// teardown. Always comes back with a result row; failures here never
/// touch the accounts that follow.
pub async fn process_account(account: &Account, quota: DailyQuota, opts: &Opts) -> RunResult {
    let started = Instant::now();

    let mut session = match ChromeSession::open(account, opts.headless).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(target: "run", "session creation failed: {e:?}");
            return finish(account, started, RunStatus::Error, 0, 0);
        }
    };

    match session.login(account).await {
        Ok(true) => {
            tracing::info!(target: "run", "\x1b[32mlogged in\x1b[0m as {}", account.username);
        }
        Ok(false) => {
            tracing::warn!(target: "run", "login failed for {}", account.username);
            session.teardown().await;
            return finish(account, started, RunStatus::LoginFailed, 0, 0);
        }
        Err(e) => {
            tracing::warn!(target: "run", "login error for {}: {e:?}", account.username);
            session.teardown().await;
            return finish(account, started, RunStatus::LoginFailed, 0, 0);
        }
    }

    tracing::info!(
        target: "run",
        "quota for {}: {} topics / {}s", account.domain, quota.topics, quota.seconds,
    );

    let controller = Controller::new(&mut session, account, quota, opts.max_topics);
    let (_, progress) = controller.run().await;

    session.teardown().await;
    finish(
        account,
        started,
        RunStatus::Completed,
        progress.visited,
        progress.liked,
    )
}
