use core::time::Duration;

use compact_str::CompactString;
use hashbrown::HashSet;

use crate::config::{Account, DailyQuota};

/// One topic row from the current listing snapshot. Ephemeral: consumed
/// once (visited or skipped) and rediscovered from scratch after a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCandidate {
    pub title: CompactString,
    pub link: String,
    pub views: i64,
    pub pinned: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VisitOutcome {
    pub engaged: Duration,
    pub liked: bool,
}

/// Capability surface the controller needs from a browser session.
pub trait Session {
    /// Scrolls the listing for up to `scroll_budget`, then snapshots the
    /// visible topic rows. Successive calls may repeat candidates.
    async fn discover(&mut self, scroll_budget: Duration) -> anyhow::Result<Vec<TopicCandidate>>;

    /// Reloads the topic listing.
    async fn reload(&mut self) -> anyhow::Result<()>;

    /// Opens the candidate, simulates reading, optionally likes it.
    /// An error means the visit was abandoned and must not count.
    async fn visit(&mut self, candidate: &TopicCandidate, like: bool)
    -> anyhow::Result<VisitOutcome>;
}

/// Per-account progress. Counters only go up; `seen` keeps a candidate
/// from counting twice when it resurfaces after a reload.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub visited: u32,
    pub liked: u32,
    pub engaged: Duration,
    pub seen: HashSet<String>,
}

impl Progress {
    /// Both halves of the quota must hold; many short visits or one long
    /// one alone never satisfy it.
    #[must_use]
    pub fn meets(&self, quota: DailyQuota) -> bool {
        self.visited >= quota.topics && self.engaged >= quota.required_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Quota met.
    Satisfied,
    /// The page stopped yielding fresh content before the quota was met.
    /// Degraded but not an error; partial progress stands.
    Exhausted,
}

/// Consecutive empty discovery passes tolerated before giving up. Bounds
/// reload attempts so a dried-up listing cannot loop forever.
const MAX_EMPTY_PASSES: u32 = 2;

const PASS_PAUSE: Duration = Duration::from_millis(1500);

/// Drives one authenticated session toward its daily quota.
pub struct Controller<'s, S> {
    session: &'s mut S,
    quota: DailyQuota,
    view_threshold: i64,
    scroll_budget: Duration,
    max_topics: usize,
    progress: Progress,
}

impl<'s, S: Session> Controller<'s, S> {
    pub fn new(session: &'s mut S, account: &Account, quota: DailyQuota, max_topics: usize) -> Self {
        Self {
            session,
            quota,
            view_threshold: account.view_threshold,
            scroll_budget: account.scroll_budget,
            max_topics,
            progress: Progress::default(),
        }
    }

    #[must_use]
    pub fn has_met_requirements(&self) -> bool {
        self.progress.meets(self.quota)
    }

    /// Pinned rows never count toward the quota, and nothing is visited
    /// twice in one run.
    #[must_use]
    pub fn should_visit(&self, candidate: &TopicCandidate) -> bool {
        !candidate.pinned && !self.progress.seen.contains(&candidate.link)
    }

    /// Sole admission rule for liking: view count strictly above the
    /// account threshold.
    #[must_use]
    pub const fn decide_engagement(&self, candidate: &TopicCandidate) -> bool {
        candidate.views > self.view_threshold
    }

    pub async fn run(mut self) -> (Outcome, Progress) {
        let mut empty_passes = 0u32;

        let outcome = 'run: loop {
            if self.has_met_requirements() {
                break Outcome::Satisfied;
            }

            let batch = match self.session.discover(self.scroll_budget).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(target: "engage", "discovery failed: {e:?}");
                    Vec::new()
                }
            };

            let mut fresh = Vec::new();
            for candidate in batch {
                if !self.should_visit(&candidate) {
                    continue;
                }
                self.progress.seen.insert(candidate.link.clone());
                fresh.push(candidate);
                if fresh.len() >= self.max_topics {
                    break;
                }
            }

            if fresh.is_empty() {
                empty_passes += 1;
                tracing::info!(
                    target: "engage",
                    "discovery pass yielded nothing ({empty_passes}/{MAX_EMPTY_PASSES})",
                );
                if empty_passes >= MAX_EMPTY_PASSES {
                    break Outcome::Exhausted;
                }
            } else {
                empty_passes = 0;
                tracing::info!(target: "engage", "found {} fresh topic(s)", fresh.len());

                for candidate in &fresh {
                    let like = self.decide_engagement(candidate);
                    if like {
                        tracing::info!(
                            target: "engage",
                            "{} views beats threshold {}, will like {:?}",
                            candidate.views, self.view_threshold, candidate.title,
                        );
                    }

                    match self.session.visit(candidate, like).await {
                        Ok(outcome) => {
                            self.progress.visited += 1;
                            self.progress.engaged += outcome.engaged;
                            if outcome.liked {
                                self.progress.liked += 1;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                target: "engage",
                                "visit to {} failed, skipping: {e:?}", candidate.link,
                            );
                        }
                    }

                    if self.progress.visited % 5 == 0 && self.progress.visited > 0 {
                        tracing::info!(
                            target: "engage",
                            "\x1b[36m{}/{} topics, {}s/{}s\x1b[0m",
                            self.progress.visited,
                            self.quota.topics,
                            self.progress.engaged.as_secs(),
                            self.quota.seconds,
                        );
                    }

                    if self.has_met_requirements() {
                        break 'run Outcome::Satisfied;
                    }
                }
            }

            if let Err(e) = self.session.reload().await {
                tracing::warn!(target: "engage", "listing reload failed: {e:?}");
            }
            tokio::time::sleep(PASS_PAUSE).await;
        };

        match outcome {
            Outcome::Satisfied => tracing::info!(
                target: "engage",
                "\x1b[32mquota met\x1b[0m: {} topics, {}s",
                self.progress.visited,
                self.progress.engaged.as_secs(),
            ),
            Outcome::Exhausted => tracing::warn!(
                target: "engage",
                "listing exhausted at {} topics, {}s",
                self.progress.visited,
                self.progress.engaged.as_secs(),
            ),
        }

        (outcome, self.progress)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::collections::VecDeque;

    use compact_str::ToCompactString;

    use super::{Controller, Outcome, Progress, Session, TopicCandidate, VisitOutcome};
    use crate::config::{Account, DailyQuota};

    struct FakeSession {
        batches: VecDeque<Vec<TopicCandidate>>,
        visit_time: Duration,
        fail_links: hashbrown::HashSet<String>,
        visits: Vec<(String, bool)>,
        reloads: u32,
    }

    impl FakeSession {
        fn scripted(batches: Vec<Vec<TopicCandidate>>, visit_time: Duration) -> Self {
            Self {
                batches: batches.into(),
                visit_time,
                fail_links: hashbrown::HashSet::new(),
                visits: Vec::new(),
                reloads: 0,
            }
        }
    }

    impl Session for FakeSession {
        async fn discover(&mut self, _: Duration) -> anyhow::Result<Vec<TopicCandidate>> {
            Ok(self.batches.pop_front().unwrap_or_default())
        }

        async fn reload(&mut self) -> anyhow::Result<()> {
            self.reloads += 1;
            Ok(())
        }

        async fn visit(
            &mut self,
            candidate: &TopicCandidate,
            like: bool,
        ) -> anyhow::Result<VisitOutcome> {
            if self.fail_links.contains(&candidate.link) {
                anyhow::bail!("load timeout");
            }
            self.visits.push((candidate.link.clone(), like));
            Ok(VisitOutcome { engaged: self.visit_time, liked: like })
        }
    }

    fn topic(link: &str, views: i64, pinned: bool) -> TopicCandidate {
        TopicCandidate {
            title: link.to_compact_string(),
            link: link.to_owned(),
            views,
            pinned,
        }
    }

    fn account(view_threshold: i64) -> Account {
        Account {
            forum_url: "https://forum.example.com".to_owned(),
            domain: "forum.example.com".into(),
            username: "alice".into(),
            password: "pw".to_owned(),
            view_threshold,
            scroll_budget: Duration::from_secs(5),
        }
    }

    #[test]
    fn quota_needs_both_halves() {
        let quota = DailyQuota::default();
        let mut progress = Progress {
            visited: 50,
            engaged: Duration::from_secs(180),
            ..Progress::default()
        };
        assert!(progress.meets(quota));

        progress.engaged = Duration::from_secs(100);
        assert!(!progress.meets(quota));

        progress.engaged = Duration::from_secs(500);
        progress.visited = 49;
        assert!(!progress.meets(quota));
    }

    #[test]
    fn pinned_is_never_selected() {
        let mut session = FakeSession::scripted(Vec::new(), Duration::ZERO);
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota::default(),
            20,
        );

        assert!(!controller.should_visit(&topic("/t/pinned/1", 1_000_000, true)));
        assert!(controller.should_visit(&topic("/t/plain/2", 0, false)));
    }

    #[test]
    fn like_threshold_is_strict() {
        let mut session = FakeSession::scripted(Vec::new(), Duration::ZERO);
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota::default(),
            20,
        );

        assert!(controller.decide_engagement(&topic("/t/a/1", 1001, false)));
        assert!(!controller.decide_engagement(&topic("/t/b/2", 1000, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn two_empty_passes_exhaust() {
        let mut session = FakeSession::scripted(Vec::new(), Duration::ZERO);
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota::default(),
            20,
        );

        let (outcome, progress) = controller.run().await;
        assert_eq!(outcome, Outcome::Exhausted);
        assert_eq!(progress.visited, 0);
        // one reload between the two passes, none after giving up
        assert_eq!(session.reloads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_only_listing_exhausts() {
        let batches = vec![
            vec![topic("/t/pinned/1", 9999, true)],
            vec![topic("/t/pinned/1", 9999, true)],
            vec![topic("/t/pinned/1", 9999, true)],
        ];
        let mut session = FakeSession::scripted(batches, Duration::from_secs(1));
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota { topics: 1, seconds: 1 },
            20,
        );

        let (outcome, progress) = controller.run().await;
        assert_eq!(outcome, Outcome::Exhausted);
        assert!(session.visits.is_empty());
        assert_eq!(progress.visited, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rediscovered_links_never_count_twice() {
        let same = vec![topic("/t/one/1", 10, false), topic("/t/two/2", 10, false)];
        let batches = vec![same.clone(), same.clone(), same];
        let mut session = FakeSession::scripted(batches, Duration::from_secs(1));
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota { topics: 4, seconds: 1 },
            20,
        );

        let (outcome, progress) = controller.run().await;
        // only two distinct links exist, so the quota is unreachable
        assert_eq!(outcome, Outcome::Exhausted);
        assert_eq!(progress.visited, 2);
        assert_eq!(session.visits.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_visits_are_skipped_not_counted() {
        let batches = vec![vec![
            topic("/t/bad/1", 10, false),
            topic("/t/good/2", 10, false),
        ]];
        let mut session = FakeSession::scripted(batches, Duration::from_secs(5));
        session.fail_links.insert("/t/bad/1".to_owned());
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota { topics: 1, seconds: 5 },
            20,
        );

        let (outcome, progress) = controller.run().await;
        assert_eq!(outcome, Outcome::Satisfied);
        assert_eq!(progress.visited, 1);
        assert_eq!(session.visits, vec![("/t/good/2".to_owned(), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_after_exact_quota() {
        let batches = vec![vec![
            topic("/t/first/1", 500, false),
            topic("/t/second/2", 1500, false),
            topic("/t/third/3", 200, false),
        ]];
        let mut session = FakeSession::scripted(batches, Duration::from_secs(6));
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota { topics: 2, seconds: 10 },
            20,
        );

        let (outcome, progress) = controller.run().await;
        assert_eq!(outcome, Outcome::Satisfied);
        assert_eq!(progress.visited, 2);
        assert_eq!(progress.engaged, Duration::from_secs(12));
        assert_eq!(progress.liked, 1);
        assert_eq!(
            session.visits,
            vec![
                ("/t/first/1".to_owned(), false),
                ("/t/second/2".to_owned(), true),
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_topics_caps_a_batch() {
        let batch = (0..30)
            .map(|i| topic(&format!("/t/x/{i}"), 10, false))
            .collect::<Vec<_>>();
        let mut session = FakeSession::scripted(vec![batch], Duration::from_secs(1));
        let controller = Controller::new(
            &mut session,
            &account(1000),
            DailyQuota { topics: 100, seconds: 1000 },
            20,
        );

        let (outcome, progress) = controller.run().await;
        assert_eq!(outcome, Outcome::Exhausted);
        assert_eq!(progress.visited, 20);
    }
}
