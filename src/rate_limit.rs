//! Per-user throttling of incoming updates.
//!
//! Each user owns a single instant: the moment their budget would be full
//! again if they stopped now. Every accepted update pushes it one emission
//! interval (`window / burst`) further. An update is refused while that
//! instant lies more than `window - interval` ahead, which lets a quiet user
//! send `burst` updates back to back and then one every interval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use teloxide::types::UserId;
use tokio::sync::Mutex;

use crate::config::Config;

/// What to do with one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Administrators are never throttled.
    Exempt,
    Throttled { retry_after: Duration },
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Verdict::Throttled { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    full_at: Arc<Mutex<HashMap<UserId, Instant>>>,
    exempt: Arc<HashSet<UserId>>,
    interval: Duration,
    tolerance: Duration,
}

impl RateLimiter {
    /// `burst` updates per `window`; a burst of zero still lets one through.
    pub fn new(burst: u32, window: Duration, exempt: impl IntoIterator<Item = UserId>) -> Self {
        let burst = burst.max(1);
        let interval = window / burst;
        Self {
            full_at: Arc::new(Mutex::new(HashMap::new())),
            exempt: Arc::new(exempt.into_iter().collect()),
            interval,
            tolerance: interval * (burst - 1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rate_limit_requests,
            config.rate_limit_window(),
            config.admin_ids.iter().copied(),
        )
    }

    pub async fn check(&self, user: UserId) -> Verdict {
        if self.exempt.contains(&user) {
            return Verdict::Exempt;
        }

        let now = Instant::now();
        let mut full_at = self.full_at.lock().await;
        let due = full_at.get(&user).copied().filter(|at| *at > now).unwrap_or(now);
        let ahead = due - now;
        if ahead > self.tolerance {
            return Verdict::Throttled {
                retry_after: ahead - self.tolerance,
            };
        }
        full_at.insert(user, due + self.interval);
        Verdict::Allowed
    }

    /// Drop users whose budget has fully recovered; they are
    /// indistinguishable from users never seen.
    pub async fn purge_idle(&self) {
        let now = Instant::now();
        self.full_at.lock().await.retain(|_, at| *at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter(burst: u32) -> RateLimiter {
        RateLimiter::new(burst, MINUTE, [UserId(100)])
    }

    #[tokio::test]
    async fn burst_then_throttle() {
        let limiter = limiter(3);
        let user = UserId(1);

        for _ in 0..3 {
            assert_eq!(limiter.check(user).await, Verdict::Allowed);
        }
        match limiter.check(user).await {
            Verdict::Throttled { retry_after } => {
                assert!(retry_after > Duration::from_secs(19));
                assert!(retry_after <= Duration::from_secs(20));
            }
            other => panic!("expected throttling, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn users_have_separate_budgets() {
        let limiter = limiter(1);

        assert!(limiter.check(UserId(1)).await.is_allowed());
        assert!(!limiter.check(UserId(1)).await.is_allowed());
        assert!(limiter.check(UserId(2)).await.is_allowed());
    }

    #[tokio::test]
    async fn exempt_users_are_never_counted() {
        let limiter = limiter(1);
        for _ in 0..5 {
            assert_eq!(limiter.check(UserId(100)).await, Verdict::Exempt);
        }
        assert!(limiter.full_at.lock().await.is_empty());
    }

    #[tokio::test]
    async fn zero_budget_still_allows_one() {
        let limiter = limiter(0);
        assert!(limiter.check(UserId(9)).await.is_allowed());
        assert!(!limiter.check(UserId(9)).await.is_allowed());
    }

    #[tokio::test]
    async fn config_sets_budget_and_exemptions() {
        let config = Config {
            admin_ids: vec![UserId(7)],
            rate_limit_requests: 2,
            ..Config::default()
        };
        let limiter = RateLimiter::from_config(&config);

        assert_eq!(limiter.check(UserId(7)).await, Verdict::Exempt);
        assert!(limiter.check(UserId(8)).await.is_allowed());
        assert!(limiter.check(UserId(8)).await.is_allowed());
        assert!(!limiter.check(UserId(8)).await.is_allowed());
    }

    #[tokio::test]
    async fn purge_forgets_recovered_users() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30), std::iter::empty());
        limiter.check(UserId(1)).await;
        limiter.purge_idle().await;
        assert_eq!(limiter.full_at.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        limiter.purge_idle().await;
        assert!(limiter.full_at.lock().await.is_empty());
        assert!(limiter.check(UserId(1)).await.is_allowed());
    }
}
