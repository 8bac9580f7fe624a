//! Simulation execution loop.
//!
//! Drives the scheduler: pops events, advances simulated time, dispatches
//! to a user-supplied handler. The loop is synchronous and
//! single-threaded. Each `Simulation` owns its own clock and queue, so
//! independent runs never share state.

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventType};
use crate::scheduler::Scheduler;
use crate::time::{SimDuration, SimTime};

// ── Handler trait ─────────────────────────────────────────────────────

/// User-defined event handler.
///
/// Implement this trait to react to dispatched events. The handler
/// receives a mutable reference to `SimulationContext` so it can
/// schedule and cancel follow-up events.
pub trait EventHandler {
    /// Called for every dispatched event.
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event);

    /// Deterministic digest of the handler's state, for replay checks.
    /// The default returns `0` (opt-out).
    fn compute_state_hash(&self) -> u64 {
        0
    }
}

/// A handler backed by a closure, useful for tests.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event),
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        (self)(ctx, event);
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable context passed to the handler on every event dispatch.
///
/// The context borrows the scheduler mutably, so a handler cannot
/// interfere with dispatch ordering outside of the schedule API.
pub struct SimulationContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) now: SimTime,
}

impl<'a> SimulationContext<'a> {
    /// Build a context over an external scheduler. Used when driving a
    /// handler outside of [`Simulation::step`].
    pub fn new(scheduler: &'a mut Scheduler, now: SimTime) -> Self {
        SimulationContext { scheduler, now }
    }

    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule an event at an absolute time.
    ///
    /// Fails with `InvalidArgument` if `at` is before the current time.
    pub fn schedule_at(&mut self, at: SimTime, payload: EventType) -> SimResult<EventId> {
        if at < self.now {
            return Err(SimError::InvalidArgument(format!(
                "cannot schedule in the past: now={}, at={}",
                self.now, at
            )));
        }
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Schedule an event `delay` after now. A zero delay queues the event
    /// behind everything already pending at the current instant.
    pub fn schedule_after(&mut self, delay: SimDuration, payload: EventType) -> EventId {
        let at = self.now.saturating_plus(delay);
        self.scheduler.schedule(at, payload)
    }

    /// Schedule an event `secs` seconds from now.
    ///
    /// Fails with `InvalidArgument` for a negative or non-finite delay.
    pub fn schedule_in_secs(&mut self, secs: f64, payload: EventType) -> SimResult<EventId> {
        let delay = SimDuration::from_secs_f64(secs)?;
        Ok(self.schedule_after(delay, payload))
    }

    /// Cancel a pending event; `false` if it already fired or is unknown.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Number of pending events in the scheduler.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the scheduler and tracks the current simulated time.
/// Call `run_until` to execute up to a stop time, `run` to drain the
/// queue, or `step` to advance by exactly one event.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: SimTime,
    events_processed: u64,
}

impl Simulation {
    /// Create a new simulation starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the scheduler directly.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Total events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Number of events still queued.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Schedule an event at an absolute time.
    ///
    /// Fails with `InvalidArgument` if `at` is before the current time.
    pub fn schedule_at(&mut self, at: SimTime, payload: EventType) -> SimResult<EventId> {
        if at < self.current_time {
            return Err(SimError::InvalidArgument(format!(
                "cannot schedule in the past: now={}, at={}",
                self.current_time, at
            )));
        }
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Schedule an event `delay` after the current time.
    pub fn schedule(&mut self, delay: SimDuration, payload: EventType) -> EventId {
        let at = self.current_time.saturating_plus(delay);
        self.scheduler.schedule(at, payload)
    }

    /// Schedule an event `secs` seconds after the current time.
    ///
    /// Fails with `InvalidArgument` for a negative or non-finite delay.
    pub fn schedule_in_secs(&mut self, secs: f64, payload: EventType) -> SimResult<EventId> {
        let delay = SimDuration::from_secs_f64(secs)?;
        Ok(self.schedule(delay, payload))
    }

    /// Cancel a pending event.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Execute a single step: pop one event, advance time, dispatch.
    ///
    /// Returns `Some(event)` if an event was processed, `None` if the
    /// queue is empty.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> Option<Event> {
        let event = self.scheduler.pop_next()?;

        // Causal scheduling guarantees this; a violation is a kernel bug.
        debug_assert!(
            event.scheduled_at >= self.current_time,
            "time went backward: current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = self.current_time.max(event.scheduled_at);
        self.events_processed += 1;

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event);

        Some(event)
    }

    /// Run until the event queue is empty.
    ///
    /// Returns the number of events processed during this call.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        while self.step(handler).is_some() {}
        self.events_processed - start
    }

    /// Run until the queue is empty **or** `max_steps` events have been
    /// dispatched, whichever comes first.
    pub fn run_for(&mut self, max_steps: u64, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        let mut steps = 0u64;
        while steps < max_steps {
            if self.step(handler).is_none() {
                break;
            }
            steps += 1;
        }
        self.events_processed - start
    }

    /// Dispatch every event strictly before `stop`, then set the clock to
    /// `stop`. Events at or after `stop` stay queued.
    ///
    /// A `stop` in the past dispatches nothing and leaves the clock alone.
    pub fn run_until(&mut self, stop: SimTime, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        while matches!(self.scheduler.peek_time(), Some(t) if t < stop) {
            self.step(handler);
        }
        if stop > self.current_time {
            self.current_time = stop;
        }
        self.events_processed - start
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u64) -> SimTime {
        SimTime::from_nanos(n)
    }

    #[test]
    fn test_basic_execution_loop() {
        let mut sim = Simulation::new();

        sim.schedule_at(t(10), EventType::Log("a".into())).unwrap();
        sim.schedule_at(t(20), EventType::Log("b".into())).unwrap();
        sim.schedule_at(t(30), EventType::Log("c".into())).unwrap();

        let mut log: Vec<String> = Vec::new();
        let processed = sim.run(&mut |_ctx: &mut SimulationContext, event: &Event| {
            if let EventType::Log(msg) = &event.payload {
                log.push(msg.clone());
            }
        });

        assert_eq!(processed, 3);
        assert_eq!(log, vec!["a", "b", "c"]);
        assert_eq!(sim.now(), t(30));
    }

    #[test]
    fn test_handler_schedules_followup() {
        let mut sim = Simulation::new();
        sim.schedule_at(t(0), EventType::Log("start".into())).unwrap();

        let mut log: Vec<(u64, String)> = Vec::new();
        sim.run(&mut |ctx: &mut SimulationContext, event: &Event| {
            if let EventType::Log(msg) = &event.payload {
                log.push((ctx.now().as_nanos(), msg.clone()));
                if ctx.now().as_nanos() < 30 {
                    ctx.schedule_after(SimDuration::from_nanos(10), EventType::Log("tick".into()));
                }
            }
        });

        assert_eq!(
            log,
            vec![
                (0, "start".into()),
                (10, "tick".into()),
                (20, "tick".into()),
                (30, "tick".into()),
            ]
        );
    }

    #[test]
    fn test_same_time_followup_runs_after_queued_peers() {
        let mut sim = Simulation::new();
        sim.schedule_at(t(5), EventType::Log("A".into())).unwrap();
        sim.schedule_at(t(5), EventType::Log("B".into())).unwrap();

        let mut log: Vec<String> = Vec::new();
        sim.run(&mut |ctx: &mut SimulationContext, event: &Event| {
            if let EventType::Log(msg) = &event.payload {
                log.push(msg.clone());
                if msg == "A" {
                    ctx.schedule_after(SimDuration::ZERO, EventType::Log("A'".into()));
                }
            }
        });
        assert_eq!(log, vec!["A", "B", "A'"]);
    }

    #[test]
    fn test_run_until_is_exclusive() {
        let mut sim = Simulation::new();
        sim.schedule_at(t(5), EventType::Log("before".into())).unwrap();
        sim.schedule_at(t(10), EventType::Log("at".into())).unwrap();
        sim.schedule_at(t(15), EventType::Log("after".into())).unwrap();

        let mut seen: Vec<String> = Vec::new();
        let processed = sim.run_until(t(10), &mut |_ctx: &mut SimulationContext, e: &Event| {
            if let EventType::Log(msg) = &e.payload {
                seen.push(msg.clone());
            }
        });

        assert_eq!(processed, 1);
        assert_eq!(seen, vec!["before"]);
        assert_eq!(sim.now(), t(10));
        assert_eq!(sim.pending_count(), 2);
    }

    #[test]
    fn test_run_until_advances_idle_clock() {
        let mut sim = Simulation::new();
        let mut noop = |_ctx: &mut SimulationContext, _e: &Event| {};
        assert_eq!(sim.run_until(t(1_000), &mut noop), 0);
        assert_eq!(sim.now(), t(1_000));

        // A stop time in the past leaves the clock alone.
        sim.run_until(t(10), &mut noop);
        assert_eq!(sim.now(), t(1_000));
    }

    #[test]
    fn test_schedule_in_past_rejected() {
        let mut sim = Simulation::new();
        let mut noop = |_ctx: &mut SimulationContext, _e: &Event| {};
        sim.run_until(t(100), &mut noop);

        let err = sim.schedule_at(t(50), EventType::Noop).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument(_)));
        assert!(sim.schedule_in_secs(-1.0, EventType::Noop).is_err());
        assert!(sim.is_finished());
    }

    #[test]
    fn test_context_rejects_past_and_negative() {
        let mut sim = Simulation::new();
        sim.schedule_at(t(100), EventType::Noop).unwrap();

        let mut errors = 0;
        sim.run(&mut |ctx: &mut SimulationContext, _e: &Event| {
            if ctx.schedule_at(t(99), EventType::Noop).is_err() {
                errors += 1;
            }
            if ctx.schedule_in_secs(-0.5, EventType::Noop).is_err() {
                errors += 1;
            }
        });
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_cancel_from_handler() {
        let mut sim = Simulation::new();
        sim.schedule_at(t(1), EventType::Log("first".into())).unwrap();
        let victim = sim.schedule_at(t(2), EventType::Log("victim".into())).unwrap();

        let mut log: Vec<String> = Vec::new();
        sim.run(&mut |ctx: &mut SimulationContext, e: &Event| {
            if let EventType::Log(msg) = &e.payload {
                log.push(msg.clone());
                if msg == "first" {
                    assert!(ctx.cancel(victim));
                }
            }
        });
        assert_eq!(log, vec!["first"]);
        assert!(!sim.cancel(victim));
    }

    #[test]
    fn test_run_for_limits_steps() {
        let mut sim = Simulation::new();
        for i in 0..100 {
            sim.schedule_at(t(i), EventType::Noop).unwrap();
        }

        let mut noop = |_ctx: &mut SimulationContext, _e: &Event| {};
        assert_eq!(sim.run_for(10, &mut noop), 10);
        assert_eq!(sim.events_processed(), 10);
        assert!(!sim.is_finished());
    }

    #[test]
    fn test_deterministic_replay() {
        fn run_trace() -> Vec<(u64, u64, String)> {
            let mut sim = Simulation::new();
            sim.schedule_at(t(5), EventType::Log("alpha".into())).unwrap();
            sim.schedule_at(t(5), EventType::Log("beta".into())).unwrap();
            sim.schedule_at(t(3), EventType::Log("gamma".into())).unwrap();
            sim.schedule_at(t(10), EventType::Log("delta".into())).unwrap();

            let mut trace = Vec::new();
            sim.run(&mut |ctx: &mut SimulationContext, event: &Event| {
                if let EventType::Log(msg) = &event.payload {
                    trace.push((event.id.raw(), ctx.now().as_nanos(), msg.clone()));
                }
            });
            trace
        }

        assert_eq!(run_trace(), run_trace(), "Simulation is not deterministic!");
    }
}
