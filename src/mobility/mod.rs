//! Node movement.
//!
//! Positions are never stepped by events. Each model stores the last
//! point it is sure of (a waypoint, or the instant a velocity was set)
//! and extrapolates from there when asked. Random-waypoint legs are drawn
//! one at a time from the node's own RNG stream, in order, so the path is
//! the same whatever times it is queried at.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`allocator`] | initial placement: grid and random rectangle |

pub mod allocator;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::{SimError, SimResult};
use crate::geometry::{Rect, Vector2};
use crate::time::{SimDuration, SimTime};

pub use allocator::{
    GridLayout, GridPositionAllocator, PositionAllocator, RandomRectanglePositionAllocator,
};

/// Floor for random-waypoint speed draws, in m/s.
pub const MIN_WAYPOINT_SPEED: f64 = 1e-3;

// ── Constant velocity ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantVelocity {
    origin: Vector2,
    since: SimTime,
    velocity: Vector2,
    stopped: bool,
}

impl ConstantVelocity {
    pub fn new(position: Vector2, velocity: Vector2) -> Self {
        ConstantVelocity {
            origin: position,
            since: SimTime::ZERO,
            velocity,
            stopped: false,
        }
    }

    pub fn position(&self, now: SimTime) -> Vector2 {
        let dt = now.saturating_duration_since(self.since).as_secs_f64();
        self.origin + self.velocity * dt
    }

    /// Rebase at `now` and move with `velocity` from then on. A zero
    /// velocity stops the node for good.
    pub fn set_velocity(&mut self, now: SimTime, velocity: Vector2) -> SimResult<()> {
        if self.stopped && !velocity.is_zero() {
            return Err(SimError::InvalidArgument(format!(
                "cannot set velocity {} on a stopped node",
                velocity
            )));
        }
        self.origin = self.position(now);
        self.since = now;
        self.velocity = velocity;
        if velocity.is_zero() {
            self.stopped = true;
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

// ── Random waypoint ───────────────────────────────────────────────────

/// Parameters of the random-waypoint model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointParams {
    pub bounds: Rect,
    pub min_speed: f64,
    pub max_speed: f64,
    pub pause: SimDuration,
}

impl WaypointParams {
    pub fn validate(&self) -> SimResult<()> {
        if !self.min_speed.is_finite() || !self.max_speed.is_finite() {
            return Err(SimError::InvalidArgument(
                "waypoint speeds must be finite".into(),
            ));
        }
        if self.min_speed < 0.0 || self.max_speed < self.min_speed {
            return Err(SimError::InvalidArgument(format!(
                "waypoint speed range [{}, {}] is invalid",
                self.min_speed, self.max_speed
            )));
        }
        Ok(())
    }
}

/// One move followed by a pause.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    from: Vector2,
    to: Vector2,
    depart: SimTime,
    arrive: SimTime,
    resume: SimTime,
}

impl Leg {
    fn position(&self, now: SimTime) -> Vector2 {
        if now >= self.arrive {
            return self.to;
        }
        if now <= self.depart {
            return self.from;
        }
        let total = self.arrive.saturating_duration_since(self.depart).as_secs_f64();
        let done = now.saturating_duration_since(self.depart).as_secs_f64();
        self.from + (self.to - self.from) * (done / total)
    }

    fn velocity(&self, now: SimTime) -> Vector2 {
        if now < self.depart || now >= self.arrive {
            return Vector2::ZERO;
        }
        let total = self.arrive.saturating_duration_since(self.depart).as_secs_f64();
        (self.to - self.from) * (1.0 / total)
    }
}

#[derive(Debug, Clone)]
pub struct RandomWaypoint {
    params: WaypointParams,
    rng: ChaCha8Rng,
    leg: Leg,
    legs_drawn: u64,
}

impl RandomWaypoint {
    /// Start at `position`, pausing first, then walking.
    pub fn new(position: Vector2, params: WaypointParams, rng: ChaCha8Rng) -> SimResult<Self> {
        params.validate()?;
        Ok(RandomWaypoint {
            params,
            rng,
            leg: Leg {
                from: position,
                to: position,
                depart: SimTime::ZERO,
                arrive: SimTime::ZERO,
                resume: SimTime::ZERO.saturating_plus(params.pause),
            },
            legs_drawn: 0,
        })
    }

    fn advance_to(&mut self, now: SimTime) {
        let never = SimTime::from_nanos(u64::MAX);
        while now >= self.leg.resume && self.leg.resume < never {
            let next = self.next_leg();
            // A zero-length leg with no pause would never move time forward,
            // so the node parks at that waypoint for good.
            let stalled = next.resume <= self.leg.resume;
            self.leg = next;
            if stalled {
                self.leg.resume = never;
            }
        }
    }

    fn next_leg(&mut self) -> Leg {
        let b = self.params.bounds;
        let to = Vector2::new(self.uniform(b.min_x, b.max_x), self.uniform(b.min_y, b.max_y));
        let mut speed = self.uniform(self.params.min_speed, self.params.max_speed);
        if speed <= 0.0 {
            speed = self.params.min_speed.max(MIN_WAYPOINT_SPEED);
        }
        let from = self.leg.to;
        let depart = self.leg.resume;
        let travel = SimDuration::from_secs_f64(from.distance(to) / speed)
            .unwrap_or(SimDuration::from_nanos(u64::MAX));
        let arrive = depart.saturating_plus(travel);
        self.legs_drawn += 1;
        Leg {
            from,
            to,
            depart,
            arrive,
            resume: arrive.saturating_plus(self.params.pause),
        }
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }

    /// Position at `now`. Queries before the current leg report its
    /// starting point.
    pub fn position(&mut self, now: SimTime) -> Vector2 {
        self.advance_to(now);
        self.leg.position(now)
    }

    pub fn velocity(&mut self, now: SimTime) -> Vector2 {
        self.advance_to(now);
        self.leg.velocity(now)
    }

    /// The waypoint currently being walked to.
    pub fn destination(&self) -> Vector2 {
        self.leg.to
    }

    pub fn legs_drawn(&self) -> u64 {
        self.legs_drawn
    }
}

// ── Mobility model ────────────────────────────────────────────────────

/// The mobility capability of a node.
#[derive(Debug, Clone)]
pub enum MobilityModel {
    Stationary(Vector2),
    ConstantVelocity(ConstantVelocity),
    RandomWaypoint(RandomWaypoint),
}

impl MobilityModel {
    pub fn stationary(position: Vector2) -> Self {
        MobilityModel::Stationary(position)
    }

    pub fn constant_velocity(position: Vector2, velocity: Vector2) -> Self {
        MobilityModel::ConstantVelocity(ConstantVelocity::new(position, velocity))
    }

    pub fn random_waypoint(
        position: Vector2,
        params: WaypointParams,
        rng: ChaCha8Rng,
    ) -> SimResult<Self> {
        RandomWaypoint::new(position, params, rng).map(MobilityModel::RandomWaypoint)
    }

    pub fn position(&mut self, now: SimTime) -> Vector2 {
        match self {
            MobilityModel::Stationary(p) => *p,
            MobilityModel::ConstantVelocity(m) => m.position(now),
            MobilityModel::RandomWaypoint(m) => m.position(now),
        }
    }

    pub fn velocity(&mut self, now: SimTime) -> Vector2 {
        match self {
            MobilityModel::Stationary(_) => Vector2::ZERO,
            MobilityModel::ConstantVelocity(m) => m.velocity,
            MobilityModel::RandomWaypoint(m) => m.velocity(now),
        }
    }

    /// Change the velocity of a constant-velocity node.
    pub fn set_velocity(&mut self, now: SimTime, velocity: Vector2) -> SimResult<()> {
        match self {
            MobilityModel::ConstantVelocity(m) => m.set_velocity(now, velocity),
            other => Err(SimError::InvalidArgument(format!(
                "{} mobility has no settable velocity",
                other.kind()
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MobilityModel::Stationary(_) => "stationary",
            MobilityModel::ConstantVelocity(_) => "constant-velocity",
            MobilityModel::RandomWaypoint(_) => "random-waypoint",
        }
    }
}
