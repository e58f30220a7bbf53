//! Exit-zone switch reasoning.
//!
//! Zone geometry and routing are built from the role assignment at
//! startup and validated there; the per-frame state machine tracks zone
//! stability, arming, cooldown and trajectory, and emits one HOLD or
//! SWITCH decision per tick. It never advances the timeline.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::clock::FramePlan;
use crate::config::DirectorConfig;
use crate::error::{DirectorError, DirectorResult};
use ballcam_models::{
    CameraId, CameraRole, Decision, HoldReason, RouteTarget, StickyOrigin, StickyOutcome,
    SwitchReason, Zone, ZoneLabel,
};

/// Points of normalized position history kept for velocity estimation.
const VELOCITY_WINDOW: usize = 6;

/// Exit-zone geometry and routing for every camera in the run.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    zones: BTreeMap<CameraId, Vec<(ZoneLabel, Zone)>>,
    routing: BTreeMap<(CameraId, ZoneLabel), RouteTarget>,
}

impl ZoneMap {
    /// Build geometry and routing from the validated role assignment.
    pub fn build(
        cameras: &[(CameraId, CameraRole)],
        middle_opposite: bool,
    ) -> DirectorResult<Self> {
        let find = |role: CameraRole| cameras.iter().find(|(_, r)| *r == role).map(|(id, _)| *id);
        let left = find(CameraRole::Left);
        let right = find(CameraRole::Right);
        let middle = find(CameraRole::Middle);

        let mut zones = BTreeMap::new();
        let mut routing = BTreeMap::new();

        for (id, role) in cameras {
            let (cam_zones, cam_routes) = match role {
                CameraRole::Left => side_camera_layout(*id, false, middle.or(right))?,
                CameraRole::Right => side_camera_layout(*id, true, middle.or(left))?,
                CameraRole::Middle => {
                    let (neg, pos) = if middle_opposite {
                        (right, left)
                    } else {
                        (left, right)
                    };
                    middle_camera_layout(*id, neg, pos)?
                }
            };
            zones.insert(*id, cam_zones);
            for (label, target) in cam_routes {
                if target_is_valid(&target, *id) {
                    routing.insert((*id, label), target);
                }
            }
        }

        Ok(Self { zones, routing })
    }

    /// The zone containing a normalized point, most specific (smallest
    /// area) first so corners beat edges.
    pub fn zone_at(&self, camera: CameraId, nx: f64, ny: f64) -> Option<(ZoneLabel, Zone)> {
        self.zones
            .get(&camera)?
            .iter()
            .filter(|(_, z)| z.contains(nx, ny))
            .min_by(|(_, a), (_, b)| {
                a.area()
                    .partial_cmp(&b.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
    }

    /// The zone rectangle for a specific label on a camera.
    pub fn zone_rect(&self, camera: CameraId, label: ZoneLabel) -> Option<Zone> {
        self.zones
            .get(&camera)?
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, z)| *z)
    }

    /// Routing target of a zone, if one exists in this run.
    pub fn route(&self, camera: CameraId, label: ZoneLabel) -> Option<RouteTarget> {
        self.routing.get(&(camera, label)).copied()
    }

    /// Distance from a normalized point to the nearest exit zone of a
    /// camera.
    pub fn nearest_zone_distance(&self, camera: CameraId, nx: f64, ny: f64) -> Option<f64> {
        self.zones.get(&camera)?.iter().map(|(_, z)| z.distance_to(nx, ny)).fold(
            None,
            |acc, d| match acc {
                Some(best) if best <= d => Some(best),
                _ => Some(d),
            },
        )
    }
}

fn target_is_valid(target: &RouteTarget, source: CameraId) -> bool {
    match target {
        RouteTarget::Fixed(id) => *id != source,
        RouteTarget::ByVelocitySign { neg, pos } => *neg != source && *pos != source,
    }
}

type Layout = (Vec<(ZoneLabel, Zone)>, Vec<(ZoneLabel, RouteTarget)>);

/// Zone layout for LEFT/RIGHT-role cameras. `mirrored` is true for the
/// RIGHT role. All zones route toward the same sibling. The camera's
/// own off-field edge has no exit zone: nothing on that side is seen
/// better by the sibling, so recovery there is left to the miss-streak
/// and fallback paths.
fn side_camera_layout(
    id: CameraId,
    mirrored: bool,
    target: Option<CameraId>,
) -> DirectorResult<Layout> {
    let mirror = |z: Zone| -> Zone {
        if mirrored {
            Zone {
                x1: 1.0 - z.x2,
                y1: z.y1,
                x2: 1.0 - z.x1,
                y2: z.y2,
            }
        } else {
            z
        }
    };
    let flip = |l: ZoneLabel| -> ZoneLabel {
        if !mirrored {
            return l;
        }
        match l {
            ZoneLabel::Right => ZoneLabel::Left,
            ZoneLabel::RightTop => ZoneLabel::LeftTop,
            ZoneLabel::RightBottom => ZoneLabel::LeftBottom,
            other => other,
        }
    };

    let base = [
        (ZoneLabel::Right, zone(0.85, 0.00, 1.00, 1.00)?),
        (ZoneLabel::RightTop, zone(0.78, 0.00, 1.00, 0.30)?),
        (ZoneLabel::RightBottom, zone(0.80, 0.70, 1.00, 1.00)?),
        (ZoneLabel::Top, zone(0.00, 0.00, 1.00, 0.15)?),
        (ZoneLabel::Bottom, zone(0.00, 0.85, 1.00, 1.00)?),
    ];

    let zones: Vec<(ZoneLabel, Zone)> =
        base.iter().map(|(l, z)| (flip(*l), mirror(*z))).collect();

    let routes = match target {
        Some(t) if t != id => zones
            .iter()
            .map(|(l, _)| (*l, RouteTarget::Fixed(t)))
            .collect(),
        _ => Vec::new(),
    };

    Ok((zones, routes))
}

/// Zone layout for the MIDDLE role: explicit left/right targets plus
/// velocity-sign routing for TOP, BOTTOM and the central EQUAL zone.
fn middle_camera_layout(
    id: CameraId,
    neg: Option<CameraId>,
    pos: Option<CameraId>,
) -> DirectorResult<Layout> {
    let zones = vec![
        (ZoneLabel::Left, zone(0.00, 0.00, 0.15, 1.00)?),
        (ZoneLabel::Right, zone(0.85, 0.00, 1.00, 1.00)?),
        (ZoneLabel::Top, zone(0.00, 0.00, 1.00, 0.15)?),
        (ZoneLabel::Bottom, zone(0.00, 0.85, 1.00, 1.00)?),
        (ZoneLabel::Equal, zone(0.40, 0.30, 0.60, 0.70)?),
    ];

    let by_sign = match (neg, pos) {
        (Some(n), Some(p)) => Some(RouteTarget::ByVelocitySign { neg: n, pos: p }),
        (Some(n), None) => Some(RouteTarget::Fixed(n)),
        (None, Some(p)) => Some(RouteTarget::Fixed(p)),
        (None, None) => None,
    };

    let mut routes = Vec::new();
    if let Some(n) = neg {
        routes.push((ZoneLabel::Left, RouteTarget::Fixed(n)));
    }
    if let Some(p) = pos {
        routes.push((ZoneLabel::Right, RouteTarget::Fixed(p)));
    }
    if let Some(route) = by_sign {
        routes.push((ZoneLabel::Top, route));
        routes.push((ZoneLabel::Bottom, route));
        routes.push((ZoneLabel::Equal, route));
    }

    let _ = id;
    Ok((zones, routes))
}

fn zone(x1: f64, y1: f64, x2: f64, y2: f64) -> DirectorResult<Zone> {
    Zone::new(x1, y1, x2, y2).map_err(|e| DirectorError::config(e.to_string()))
}

#[derive(Debug, Clone, Copy)]
struct InZoneMemory {
    label: ZoneLabel,
    velocity: (f64, f64),
    conf: f64,
}

/// Per-frame detection state derived from the sticky outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BallState {
    Found,
    Held,
    Lost,
}

/// The exit-zone state machine. One per run; single-camera attention at
/// a time.
pub struct Switcher {
    zone_map: ZoneMap,
    found_conf: f64,
    away_velocity: f64,
    exit_prob_threshold: f64,

    cooldown: u32,
    min_hold: u32,
    arm: u32,
    stable: u32,
    disarm: u32,
    miss: u32,

    active: CameraId,
    since_last_switch: u32,
    frames_on_active: u32,

    current_zone: Option<ZoneLabel>,
    zone_stable_frames: u32,
    zone_armed_frames: u32,
    disarm_grace_left: u32,

    pos_history: VecDeque<(f64, f64)>,
    conf_history: VecDeque<f64>,
    last_in_zone: Option<InZoneMemory>,
}

impl Switcher {
    /// Create the switcher attending to `active`.
    pub fn new(
        config: &DirectorConfig,
        plan: &FramePlan,
        zone_map: ZoneMap,
        active: CameraId,
    ) -> Self {
        Self {
            zone_map,
            found_conf: config.found_conf,
            away_velocity: config.away_velocity,
            exit_prob_threshold: config.exit_prob_threshold,
            cooldown: plan.cooldown,
            min_hold: plan.min_hold,
            arm: plan.arm,
            stable: plan.stable,
            disarm: plan.disarm,
            miss: plan.miss,
            active,
            // A run may switch as soon as min-hold allows; only applied
            // switches start the cooldown window.
            since_last_switch: plan.cooldown,
            frames_on_active: 0,
            current_zone: None,
            zone_stable_frames: 0,
            zone_armed_frames: 0,
            disarm_grace_left: 0,
            pos_history: VecDeque::with_capacity(VELOCITY_WINDOW),
            conf_history: VecDeque::with_capacity(VELOCITY_WINDOW),
            last_in_zone: None,
        }
    }

    /// Camera currently attended to.
    pub fn active(&self) -> CameraId {
        self.active
    }

    /// Is the cooldown window still running?
    pub fn in_cooldown(&self) -> bool {
        self.since_last_switch < self.cooldown
    }

    /// Zone geometry shared with the orchestrator's fallback proximity
    /// check.
    pub fn zone_map(&self) -> &ZoneMap {
        &self.zone_map
    }

    /// Rebuild frame-domain thresholds after an FPS re-observation.
    pub fn set_plan(&mut self, plan: &FramePlan) {
        self.cooldown = plan.cooldown;
        self.min_hold = plan.min_hold;
        self.arm = plan.arm;
        self.stable = plan.stable;
        self.disarm = plan.disarm;
        self.miss = plan.miss;
    }

    /// One HOLD-vs-SWITCH decision. `normalized_center` is the raw
    /// (unsmoothed) center of the emitted bbox in [0, 1]^2.
    pub fn step(
        &mut self,
        outcome: &StickyOutcome,
        normalized_center: Option<(f64, f64)>,
        timeline_index: u64,
    ) -> Decision {
        self.since_last_switch = self.since_last_switch.saturating_add(1);
        self.frames_on_active = self.frames_on_active.saturating_add(1);

        let state = self.ball_state(outcome);

        if let Some(c) = normalized_center {
            self.pos_history.push_back(c);
            self.conf_history.push_back(outcome.conf);
            while self.pos_history.len() > VELOCITY_WINDOW {
                self.pos_history.pop_front();
                self.conf_history.pop_front();
            }
        }
        let velocity = self.velocity();

        let zone_now = normalized_center
            .and_then(|(nx, ny)| self.zone_map.zone_at(self.active, nx, ny));

        self.update_zone_state(zone_now.map(|(l, _)| l));

        // Only accepted detections refresh the memory; held frames
        // replay a frozen bbox and would wash out the exit velocity.
        if let (Some((label, _)), StickyOrigin::Accepted) = (zone_now, outcome.origin) {
            self.last_in_zone = Some(InZoneMemory {
                label,
                velocity,
                conf: outcome.conf,
            });
        }

        let decision =
            self.evaluate(state, zone_now, normalized_center, velocity, outcome, timeline_index);

        // Arming accumulates after the decision so eligibility begins
        // one full arming window after zone entry.
        if zone_now.is_some() {
            self.zone_stable_frames = self.zone_stable_frames.saturating_add(1);
            if self.zone_stable_frames > self.stable {
                self.zone_armed_frames = self.zone_armed_frames.saturating_add(1);
            }
        }

        decision
    }

    /// Apply the switch the orchestrator committed: load the target's
    /// geometry and clear transient state.
    pub fn apply_switch(&mut self, to: CameraId) {
        debug!(from = %self.active, to = %to, "switcher state reset for new camera");
        self.active = to;
        self.since_last_switch = 0;
        self.frames_on_active = 0;
        self.current_zone = None;
        self.zone_stable_frames = 0;
        self.zone_armed_frames = 0;
        self.disarm_grace_left = 0;
        self.pos_history.clear();
        self.conf_history.clear();
        self.last_in_zone = None;
    }

    fn ball_state(&self, outcome: &StickyOutcome) -> BallState {
        match outcome.origin {
            StickyOrigin::Accepted if outcome.conf >= self.found_conf => BallState::Found,
            _ if outcome.bbox.is_some() => BallState::Held,
            _ => BallState::Lost,
        }
    }

    fn update_zone_state(&mut self, zone_now: Option<ZoneLabel>) {
        match (self.current_zone, zone_now) {
            (Some(current), Some(z)) if current == z => {
                self.disarm_grace_left = self.disarm;
            }
            (Some(_), None) if self.disarm_grace_left > 0 => {
                // Brief exit tolerated; counters neither advance nor reset.
                self.disarm_grace_left -= 1;
            }
            (_, Some(z)) => {
                self.current_zone = Some(z);
                self.zone_stable_frames = 0;
                self.zone_armed_frames = 0;
                self.disarm_grace_left = self.disarm;
            }
            (_, None) => {
                self.current_zone = None;
                self.zone_stable_frames = 0;
                self.zone_armed_frames = 0;
                self.disarm_grace_left = 0;
            }
        }
    }

    fn evaluate(
        &self,
        state: BallState,
        zone_now: Option<(ZoneLabel, Zone)>,
        normalized_center: Option<(f64, f64)>,
        velocity: (f64, f64),
        outcome: &StickyOutcome,
        timeline_index: u64,
    ) -> Decision {
        let hold =
            |reason: HoldReason, p: f64| Decision::hold(self.active, timeline_index, reason, p);

        if self.in_cooldown() {
            return hold(HoldReason::Cooldown, 0.0);
        }
        if self.frames_on_active < self.min_hold {
            return hold(HoldReason::MinHold, 0.0);
        }

        // Trigger: FOUND in an armed, stable zone, or a miss streak with
        // the last in-zone velocity pointing out of frame.
        let (label, reason, trigger_velocity, exit_prob) = match (state, zone_now) {
            (BallState::Found, Some((label, rect))) => {
                if self.zone_stable_frames < self.stable {
                    return hold(HoldReason::UnstableZone, 0.0);
                }
                if self.zone_armed_frames < self.arm {
                    return hold(HoldReason::Unarmed, 0.0);
                }
                let p = self.exit_probability(label, rect, normalized_center, outcome.conf, false);
                (label, SwitchReason::BallInExitZone, velocity, p)
            }
            _ => {
                // The miss path needs only the streak and an outward
                // last-in-zone velocity; a ball still being held past
                // the streak threshold switches too.
                let miss_eligible = outcome.miss_streak >= self.miss;
                let memory = self
                    .last_in_zone
                    .filter(|m| miss_eligible && points_toward(m.label, m.velocity));
                match memory {
                    Some(m) => {
                        let rect = match self.zone_map.zone_rect(self.active, m.label) {
                            Some(r) => r,
                            None => return hold(HoldReason::NoRoute, 0.0),
                        };
                        let p = self.exit_probability(m.label, rect, None, m.conf, true);
                        (m.label, SwitchReason::MissTowardZone, m.velocity, p)
                    }
                    None => {
                        let reason = match zone_now {
                            None => HoldReason::NoZone,
                            // In a zone but only held or lost.
                            Some(_) => HoldReason::UnstableZone,
                        };
                        return hold(reason, 0.0);
                    }
                }
            }
        };

        // Trajectory guard: only strong opposite horizontal motion blocks.
        let side = label.horizontal_side();
        if side != 0 && trigger_velocity.0 * (side as f64) < -self.away_velocity {
            return hold(HoldReason::TrajectoryAway, exit_prob);
        }

        if exit_prob < self.exit_prob_threshold {
            return hold(HoldReason::LowExitProb, exit_prob);
        }

        let Some(route) = self.zone_map.route(self.active, label) else {
            return hold(HoldReason::NoRoute, exit_prob);
        };
        let to = route.resolve(trigger_velocity.0);
        if to == self.active {
            return hold(HoldReason::NoRoute, exit_prob);
        }

        Decision::switch(
            self.active,
            to,
            timeline_index,
            reason,
            Some(label),
            exit_prob,
        )
    }

    /// Scalar in [0, 1] combining depth into the zone, confidence and
    /// arming progress. The miss path saturates depth and arming: the
    /// ball already left through that boundary.
    fn exit_probability(
        &self,
        label: ZoneLabel,
        rect: Zone,
        normalized_center: Option<(f64, f64)>,
        conf: f64,
        miss_path: bool,
    ) -> f64 {
        let depth = if miss_path {
            1.0
        } else {
            match normalized_center {
                Some((nx, ny)) => zone_depth(label, rect, nx, ny),
                None => 0.0,
            }
        };
        let arming = if miss_path || self.arm == 0 {
            1.0
        } else {
            (self.zone_armed_frames as f64 / self.arm as f64).min(1.0)
        };
        (0.4 * depth + 0.3 * conf + 0.3 * arming).clamp(0.0, 1.0)
    }

    /// Mean per-frame velocity over the recent position history, in
    /// normalized units.
    fn velocity(&self) -> (f64, f64) {
        if self.pos_history.len() < 2 {
            return (0.0, 0.0);
        }
        let pts: Vec<(f64, f64)> = self.pos_history.iter().copied().collect();
        let steps = (pts.len() - 1) as f64;
        let first = pts[0];
        let last = pts[pts.len() - 1];
        ((last.0 - first.0) / steps, (last.1 - first.1) / steps)
    }
}

/// Does a velocity vector point toward the exit boundary of a zone?
fn points_toward(label: ZoneLabel, velocity: (f64, f64)) -> bool {
    let side = label.horizontal_side();
    if side != 0 {
        return velocity.0 * side as f64 > 0.0;
    }
    match label {
        ZoneLabel::Top => velocity.1 < 0.0,
        ZoneLabel::Bottom => velocity.1 > 0.0,
        ZoneLabel::Equal => true,
        _ => false,
    }
}

/// Fractional depth of a point into a zone along its exit direction.
fn zone_depth(label: ZoneLabel, rect: Zone, nx: f64, ny: f64) -> f64 {
    let w = (rect.x2 - rect.x1).max(f64::EPSILON);
    let h = (rect.y2 - rect.y1).max(f64::EPSILON);
    let depth = match label.horizontal_side() {
        1 => (nx - rect.x1) / w,
        -1 => (rect.x2 - nx) / w,
        _ => match label {
            ZoneLabel::Top => (rect.y2 - ny) / h,
            ZoneLabel::Bottom => (ny - rect.y1) / h,
            _ => 0.5,
        },
    };
    depth.clamp(0.0, 1.0)
}
