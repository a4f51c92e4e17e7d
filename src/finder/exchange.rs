//! Sequential exchange finder.

use tracing::{debug, trace, warn};

use crate::error::{ConnectFailures, Error, Result};

use super::plan::{ConnectResult, Plan, RoutePlanner};
use super::state::{FindStats, FinderState};

/// Connection produced by a planner's plans.
pub type PlannedConnection<P> = <<P as RoutePlanner>::Plan as Plan>::Connection;

/// Attempts routes one at a time until one connects.
///
/// The finder owns the planner for one logical call. Routes are never
/// raced: each plan is driven to completion before the next one is
/// requested, and follow-up plans produced mid-handshake are pushed to the
/// front of the planner's deferred queue so they run before any other
/// route.
pub struct ExchangeFinder<P> {
    planner: P,
    state: FinderState,
    stats: FindStats,
}

impl<P: RoutePlanner> ExchangeFinder<P> {
    /// Create a finder driving the given planner.
    pub fn new(planner: P) -> Self {
        Self {
            planner,
            state: FinderState::default(),
            stats: FindStats::default(),
        }
    }

    /// Get the planner.
    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Get a mutable reference to the planner.
    pub fn planner_mut(&mut self) -> &mut P {
        &mut self.planner
    }

    /// Consume the finder and return the planner.
    pub fn into_planner(self) -> P {
        self.planner
    }

    /// Get the state reached by the last `find()`.
    pub fn state(&self) -> FinderState {
        self.state
    }

    /// Get statistics for the last `find()`.
    pub fn stats(&self) -> &FindStats {
        &self.stats
    }

    /// Find a live connection.
    ///
    /// Fails with [`Error::Canceled`] as soon as the planner reports
    /// cancellation, and with [`Error::Exhausted`] once every route has
    /// failed. The exhaustion error keeps the first failure as primary and
    /// every later one as a suppressed cause.
    pub fn find(&mut self) -> Result<PlannedConnection<P>> {
        self.stats.record_start();
        let mut failures: Option<ConnectFailures> = None;

        loop {
            self.state = FinderState::TryingNextRoute;

            if self.planner.is_canceled() {
                debug!(attempts = self.stats.plans_requested, "call canceled");
                return self.finish(FinderState::Canceled, Err(Error::Canceled));
            }

            let error = match self.attempt() {
                Ok(Some(connection)) => {
                    return self.finish(FinderState::Success, Ok(connection));
                }
                Ok(None) => continue,
                Err(e) => e,
            };

            self.stats.record_failure();
            warn!(error = %error, "connect attempt failed");

            let recorded = match failures.take() {
                Some(mut recorded) => {
                    recorded.suppress(error);
                    recorded
                }
                None => ConnectFailures::new(error),
            };

            if !self.planner.has_next() {
                debug!(failures = recorded.len(), "all routes exhausted");
                return self.finish(FinderState::Exhausted, Err(recorded.into()));
            }
            failures = Some(recorded);
        }
    }

    /// Run one plan. `Ok(None)` means a follow-up plan was queued.
    fn attempt(&mut self) -> Result<Option<PlannedConnection<P>>> {
        self.stats.record_plan();
        let mut plan = self.planner.plan()?;

        if plan.is_ready() {
            trace!("reusing pooled connection");
            self.stats.record_reuse();
        } else {
            self.state = FinderState::StagingConnect;

            let result = match plan.connect_transport() {
                ConnectResult::Success => plan.connect_secure_layer(),
                failed => failed,
            };

            match result {
                ConnectResult::Success => self.stats.record_connect(),
                ConnectResult::Deferred(next) => {
                    trace!("queueing follow-up plan");
                    self.state = FinderState::DeferredRetry;
                    self.stats.record_deferred();
                    self.planner.deferred_plans().push_front(next);
                    return Ok(None);
                }
                ConnectResult::Failure(e) => return Err(e),
            }
        }

        plan.handle_success().map(Some)
    }

    fn finish<T>(&mut self, state: FinderState, result: Result<T>) -> Result<T> {
        self.state = state;
        self.stats.record_finish();
        result
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for ExchangeFinder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeFinder")
            .field("planner", &self.planner)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    enum Outcome {
        Ok,
        Fail,
        Defer(Box<FakePlan>),
    }

    struct FakePlan {
        id: u32,
        ready: bool,
        transport: Option<Outcome>,
        secure: Option<Outcome>,
        log: Log,
    }

    impl FakePlan {
        fn connect(id: u32, log: &Log) -> Self {
            Self {
                id,
                ready: false,
                transport: Some(Outcome::Ok),
                secure: Some(Outcome::Ok),
                log: log.clone(),
            }
        }

        fn reuse(id: u32, log: &Log) -> Self {
            Self {
                ready: true,
                ..Self::connect(id, log)
            }
        }

        fn failing_transport(id: u32, log: &Log) -> Self {
            Self {
                transport: Some(Outcome::Fail),
                ..Self::connect(id, log)
            }
        }

        fn failing_secure(id: u32, log: &Log) -> Self {
            Self {
                secure: Some(Outcome::Fail),
                ..Self::connect(id, log)
            }
        }

        fn deferring(id: u32, next: FakePlan, log: &Log) -> Self {
            Self {
                secure: Some(Outcome::Defer(Box::new(next))),
                ..Self::connect(id, log)
            }
        }

        fn run(&mut self, stage: &str, outcome: Option<Outcome>) -> ConnectResult<Self> {
            self.log.borrow_mut().push(format!("{stage} {}", self.id));
            match outcome {
                Some(Outcome::Ok) => ConnectResult::Success,
                Some(Outcome::Fail) => ConnectResult::Failure(Error::Io(io::Error::other(
                    format!("plan {} failed", self.id),
                ))),
                Some(Outcome::Defer(next)) => ConnectResult::Deferred(*next),
                None => ConnectResult::Failure(Error::InvalidState("stage ran twice")),
            }
        }
    }

    impl Plan for FakePlan {
        type Connection = u32;

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn connect_transport(&mut self) -> ConnectResult<Self> {
            let outcome = self.transport.take();
            self.run("transport", outcome)
        }

        fn connect_secure_layer(&mut self) -> ConnectResult<Self> {
            let outcome = self.secure.take();
            self.run("secure", outcome)
        }

        fn handle_success(self) -> Result<u32> {
            self.log.borrow_mut().push(format!("success {}", self.id));
            Ok(self.id)
        }
    }

    struct FakePlanner {
        routes: VecDeque<FakePlan>,
        deferred: VecDeque<FakePlan>,
        requested: usize,
        fresh_taken: usize,
        canceled: bool,
        cancel_after: Option<usize>,
        plan_errors: usize,
    }

    impl FakePlanner {
        fn new(routes: Vec<FakePlan>) -> Self {
            Self {
                routes: routes.into(),
                deferred: VecDeque::new(),
                requested: 0,
                fresh_taken: 0,
                canceled: false,
                cancel_after: None,
                plan_errors: 0,
            }
        }
    }

    impl RoutePlanner for FakePlanner {
        type Plan = FakePlan;

        fn is_canceled(&self) -> bool {
            self.canceled || self.cancel_after == Some(self.requested)
        }

        fn plan(&mut self) -> Result<FakePlan> {
            self.requested += 1;
            if self.plan_errors > 0 {
                self.plan_errors -= 1;
                return Err(Error::UnknownHost {
                    host: "fake.test".into(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
                });
            }
            if let Some(plan) = self.deferred.pop_front() {
                return Ok(plan);
            }
            let plan = self
                .routes
                .pop_front()
                .ok_or_else(|| Error::NoMoreRoutes("fake".into()))?;
            self.fresh_taken += 1;
            Ok(plan)
        }

        fn has_next(&self) -> bool {
            self.plan_errors > 0 || !self.deferred.is_empty() || !self.routes.is_empty()
        }

        fn deferred_plans(&mut self) -> &mut VecDeque<FakePlan> {
            &mut self.deferred
        }
    }

    fn io_message(error: &Error) -> String {
        match error {
            Error::Io(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    #[test]
    fn test_returns_first_success_after_failures() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::failing_secure(2, &log),
            FakePlan::connect(3, &log),
            FakePlan::connect(4, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 3);
        assert_eq!(finder.planner().requested, 3);
        assert_eq!(finder.state(), FinderState::Success);
        assert_eq!(finder.stats().plans_requested, 3);
        assert_eq!(finder.stats().failures, 2);
        assert_eq!(finder.stats().connected, 1);
        assert_eq!(finder.planner().routes.len(), 1);
    }

    #[test]
    fn test_canceled_before_first_plan() {
        let log = Log::default();
        let mut planner = FakePlanner::new(vec![FakePlan::connect(1, &log)]);
        planner.canceled = true;
        let mut finder = ExchangeFinder::new(planner);

        let err = finder.find().unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(finder.planner().requested, 0);
        assert_eq!(finder.state(), FinderState::Canceled);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_cancel_between_attempts_discards_failures() {
        let log = Log::default();
        let mut planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::connect(2, &log),
        ]);
        planner.cancel_after = Some(1);
        let mut finder = ExchangeFinder::new(planner);

        let err = finder.find().unwrap_err();
        assert!(matches!(err, Error::Canceled));
        assert_eq!(finder.planner().requested, 1);
        assert_eq!(*log.borrow(), vec!["transport 1"]);
    }

    #[test]
    fn test_transport_failure_skips_secure_layer() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::connect(2, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 2);
        assert_eq!(
            *log.borrow(),
            vec!["transport 1", "transport 2", "secure 2", "success 2"]
        );
    }

    #[test]
    fn test_deferred_plan_preempts_fresh_routes() {
        let log = Log::default();
        let follow_up = FakePlan::connect(10, &log);
        let planner = FakePlanner::new(vec![
            FakePlan::deferring(1, follow_up, &log),
            FakePlan::connect(2, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 10);
        assert_eq!(finder.planner().fresh_taken, 1);
        assert_eq!(finder.planner().requested, 2);
        assert_eq!(finder.stats().deferred, 1);
        assert_eq!(
            *log.borrow(),
            vec![
                "transport 1",
                "secure 1",
                "transport 10",
                "secure 10",
                "success 10"
            ]
        );
    }

    #[test]
    fn test_deferred_failure_moves_to_next_route() {
        let log = Log::default();
        let follow_up = FakePlan::failing_transport(10, &log);
        let planner = FakePlanner::new(vec![
            FakePlan::deferring(1, follow_up, &log),
            FakePlan::connect(2, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 2);
        assert_eq!(finder.stats().failures, 1);
        assert_eq!(
            *log.borrow(),
            vec![
                "transport 1",
                "secure 1",
                "transport 10",
                "transport 2",
                "secure 2",
                "success 2"
            ]
        );
    }

    #[test]
    fn test_exhaustion_keeps_first_failure_primary() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::failing_secure(2, &log),
            FakePlan::failing_transport(3, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        let err = finder.find().unwrap_err();
        assert_eq!(finder.state(), FinderState::Exhausted);

        let failures = err.failures().unwrap();
        assert_eq!(io_message(failures.primary()), "plan 1 failed");
        let suppressed: Vec<String> = failures.suppressed().iter().map(io_message).collect();
        assert_eq!(suppressed, vec!["plan 2 failed", "plan 3 failed"]);
    }

    #[test]
    fn test_queued_deferred_plans_run_before_routes() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![FakePlan::failing_transport(1, &log)]);
        let mut finder = ExchangeFinder::new(planner);
        finder
            .planner_mut()
            .deferred_plans()
            .push_back(FakePlan::failing_transport(2, &log));

        let err = finder.find().unwrap_err();
        let failures = err.failures().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(io_message(failures.primary()), "plan 2 failed");
        assert_eq!(*log.borrow(), vec!["transport 2", "transport 1"]);
    }

    #[test]
    fn test_planner_errors_are_aggregated() {
        let log = Log::default();
        let mut planner = FakePlanner::new(vec![FakePlan::connect(1, &log)]);
        planner.plan_errors = 1;
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 1);
        assert_eq!(finder.stats().failures, 1);
        assert_eq!(finder.stats().plans_requested, 2);

        let mut planner = FakePlanner::new(Vec::new());
        planner.plan_errors = 2;
        let mut finder = ExchangeFinder::new(planner);

        let err = finder.find().unwrap_err();
        let failures = err.failures().unwrap();
        assert!(matches!(failures.primary(), Error::UnknownHost { .. }));
        assert_eq!(failures.suppressed().len(), 1);
    }

    #[test]
    fn test_reuse_skips_connect_stages() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![FakePlan::reuse(7, &log)]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 7);
        assert_eq!(*log.borrow(), vec!["success 7"]);
        assert_eq!(finder.stats().reused, 1);
        assert_eq!(finder.stats().connected, 0);
    }

    #[test]
    fn test_later_success_discards_earlier_failures() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::deferring(2, FakePlan::connect(20, &log), &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);

        assert_eq!(finder.find().unwrap(), 20);
        assert_eq!(finder.stats().failures, 1);
        assert_eq!(finder.planner().requested, 3);
    }

    #[test]
    fn test_find_again_with_fresh_backlog() {
        let log = Log::default();
        let planner = FakePlanner::new(vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::connect(2, &log),
        ]);
        let mut finder = ExchangeFinder::new(planner);
        assert_eq!(finder.find().unwrap(), 2);
        let first_stats = finder.stats().clone();

        finder.planner_mut().routes = vec![
            FakePlan::failing_transport(1, &log),
            FakePlan::connect(2, &log),
        ]
        .into();
        assert_eq!(finder.find().unwrap(), 2);
        assert_eq!(finder.stats().plans_requested, first_stats.plans_requested);
        assert_eq!(finder.stats().failures, first_stats.failures);
        assert!(finder.planner().deferred.is_empty());
    }
}
