//! Quota-aware pacing and retry for remote calls
//!
//! Every remote call is issued through [`QuotaScheduler::execute`] with a
//! [`CallClass`]. The class decides how long to pause before the call and
//! how many times a rate-limit rejection is retried (and after what wait).

use crate::error::SyncResult;
use std::time::Duration;
use tracing::{debug, warn};

/// Kinds of remote calls that share a pacing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    Read,
    Write,
    Format,
    Clear,
    RuleDeletion,
    Layout,
    Chart,
}

/// `(pre-delay, max-retries, backoff)` for one call class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub pre_delay: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub const fn immediate() -> Self {
        Self {
            pre_delay: Duration::ZERO,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub const fn paced(pre_delay: Duration) -> Self {
        Self {
            pre_delay,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// Pacing policy table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub read: CallPolicy,
    pub write: CallPolicy,
    pub format: CallPolicy,
    pub clear: CallPolicy,
    pub rule_deletion: CallPolicy,
    pub layout: CallPolicy,
    pub chart: CallPolicy,
    /// Pause before the dashboard starts, to let the quota recover
    pub cooldown: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            read: CallPolicy::immediate(),
            write: CallPolicy::immediate(),
            format: CallPolicy::immediate(),
            clear: CallPolicy::paced(Duration::from_secs(1)),
            rule_deletion: CallPolicy::paced(Duration::from_secs(2)),
            layout: CallPolicy::paced(Duration::from_secs(2)),
            chart: CallPolicy {
                pre_delay: Duration::from_secs(6),
                max_retries: 1,
                backoff: Duration::from_secs(15),
            },
            cooldown: Duration::from_secs(5),
        }
    }
}

impl QuotaPolicy {
    pub fn for_class(&self, class: CallClass) -> CallPolicy {
        match class {
            CallClass::Read => self.read,
            CallClass::Write => self.write,
            CallClass::Format => self.format,
            CallClass::Clear => self.clear,
            CallClass::RuleDeletion => self.rule_deletion,
            CallClass::Layout => self.layout,
            CallClass::Chart => self.chart,
        }
    }
}

/// Something that can wait. Injected so tests and dry runs do not sleep.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested pauses without waiting
#[derive(Debug, Default)]
pub struct NoPacer {
    pub pauses: Vec<Duration>,
}

impl Pacer for NoPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.pauses.push(duration);
        }
    }
}

impl NoPacer {
    pub fn total(&self) -> Duration {
        self.pauses.iter().sum()
    }
}

/// Issues remote calls under a [`QuotaPolicy`]
pub struct QuotaScheduler {
    policy: QuotaPolicy,
    pacer: Box<dyn Pacer>,
}

impl QuotaScheduler {
    pub fn new(policy: QuotaPolicy, pacer: Box<dyn Pacer>) -> Self {
        Self { policy, pacer }
    }

    /// Default policy, real sleeps
    pub fn blocking() -> Self {
        Self::new(QuotaPolicy::default(), Box::new(ThreadPacer))
    }

    /// Default policy, no waiting
    pub fn unpaced() -> Self {
        Self::new(QuotaPolicy::default(), Box::new(NoPacer::default()))
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Let the quota recover before a burst of expensive calls
    pub fn cool_down(&mut self) {
        let pause = self.policy.cooldown;
        debug!("Cooling down for {:?}", pause);
        self.pacer.pause(pause);
    }

    /// Run `op` after the class pre-delay, retrying rate-limit rejections
    /// as many times as the class allows. Any other error is returned as is.
    pub fn execute<T>(
        &mut self,
        class: CallClass,
        description: &str,
        mut op: impl FnMut() -> SyncResult<T>,
    ) -> SyncResult<T> {
        let policy = self.policy.for_class(class);
        self.pacer.pause(policy.pre_delay);
        debug!("{:?} call: {}", class, description);

        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limit() && attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(
                        "🔁 {} hit the rate limit (attempt {}/{}), retrying in {:?}",
                        description, attempt, policy.max_retries, policy.backoff
                    );
                    self.pacer.pause(policy.backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shares the recorded pauses with the test after the scheduler took
    /// ownership of the pacer
    #[derive(Clone, Default)]
    struct SharedPacer(Rc<RefCell<Vec<Duration>>>);

    impl Pacer for SharedPacer {
        fn pause(&mut self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    fn scheduler() -> (QuotaScheduler, SharedPacer) {
        let pacer = SharedPacer::default();
        (
            QuotaScheduler::new(QuotaPolicy::default(), Box::new(pacer.clone())),
            pacer,
        )
    }

    #[test]
    fn test_chart_retries_once_after_backoff() {
        let (mut scheduler, pacer) = scheduler();
        let mut attempts = 0;
        let result = scheduler.execute(CallClass::Chart, "add charts", || {
            attempts += 1;
            if attempts == 1 {
                Err(SyncError::RateLimited("429".to_string()))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            *pacer.0.borrow(),
            vec![Duration::from_secs(6), Duration::from_secs(15)]
        );
    }

    #[test]
    fn test_chart_gives_up_after_one_retry() {
        let (mut scheduler, _) = scheduler();
        let mut attempts = 0;
        let result: SyncResult<()> = scheduler.execute(CallClass::Chart, "add charts", || {
            attempts += 1;
            Err(SyncError::RateLimited("429".to_string()))
        });
        assert!(result.unwrap_err().is_rate_limit());
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_write_is_not_retried() {
        let (mut scheduler, pacer) = scheduler();
        let mut attempts = 0;
        let result: SyncResult<()> = scheduler.execute(CallClass::Write, "write", || {
            attempts += 1;
            Err(SyncError::RateLimited("429".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(*pacer.0.borrow(), vec![Duration::ZERO]);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let (mut scheduler, _) = scheduler();
        let mut attempts = 0;
        let result: SyncResult<()> = scheduler.execute(CallClass::Chart, "add charts", || {
            attempts += 1;
            Err(SyncError::Api {
                status: 500,
                message: "backend".to_string(),
            })
        });
        assert!(matches!(result, Err(SyncError::Api { status: 500, .. })));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_pre_delays_per_class() {
        let (mut scheduler, pacer) = scheduler();
        scheduler.execute(CallClass::Clear, "clear", || Ok(())).unwrap();
        scheduler
            .execute(CallClass::RuleDeletion, "rules", || Ok(()))
            .unwrap();
        scheduler.cool_down();
        assert_eq!(
            *pacer.0.borrow(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5)
            ]
        );
    }

    #[test]
    fn test_no_pacer_skips_zero_pauses() {
        let mut pacer = NoPacer::default();
        pacer.pause(Duration::ZERO);
        pacer.pause(Duration::from_secs(2));
        pacer.pause(Duration::from_secs(3));
        assert_eq!(pacer.pauses.len(), 2);
        assert_eq!(pacer.total(), Duration::from_secs(5));
    }
}
