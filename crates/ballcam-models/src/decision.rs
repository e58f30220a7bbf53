//! Switch decisions and the persisted switch-event log.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::camera::CameraId;
use crate::zone::ZoneLabel;

/// Why the switcher (or the orchestrator's pre-flight) held the current
/// camera this frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    Cooldown,
    MinHold,
    NoZone,
    UnstableZone,
    Unarmed,
    TrajectoryAway,
    LowExitProb,
    NoRoute,
    /// Pre-flight read on the target stream failed.
    TargetUnavailable,
    /// Pre-flight ball verification on the target frame failed.
    TargetNoBall,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HoldReason::Cooldown => "cooldown",
            HoldReason::MinHold => "min_hold",
            HoldReason::NoZone => "no_zone",
            HoldReason::UnstableZone => "unstable_zone",
            HoldReason::Unarmed => "unarmed",
            HoldReason::TrajectoryAway => "trajectory_away",
            HoldReason::LowExitProb => "low_exit_prob",
            HoldReason::NoRoute => "no_route",
            HoldReason::TargetUnavailable => "target_unavailable",
            HoldReason::TargetNoBall => "target_no_ball",
        };
        write!(f, "{}", s)
    }
}

/// Why a switch fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// Ball found in an armed exit zone.
    BallInExitZone,
    /// Miss streak crossed the threshold with last-in-zone velocity
    /// pointing out of frame.
    MissTowardZone,
    /// The fallback scanner confirmed the ball on another camera.
    FallbackConfirmed,
    /// The active stream ended or failed; failover switch.
    ActiveStreamEnded,
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchReason::BallInExitZone => "ball_in_exit_zone",
            SwitchReason::MissTowardZone => "miss_toward_zone",
            SwitchReason::FallbackConfirmed => "fallback_confirmed",
            SwitchReason::ActiveStreamEnded => "active_stream_ended",
        };
        write!(f, "{}", s)
    }
}

/// The action half of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DecisionAction {
    Hold {
        reason: HoldReason,
    },
    Switch {
        to: CameraId,
        reason: SwitchReason,
        /// Zone that drove the switch, when one did.
        zone: Option<ZoneLabel>,
    },
}

/// One per-frame HOLD-vs-SWITCH decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: DecisionAction,
    pub from: CameraId,
    /// Timeline index the decision refers to.
    pub ref_index: u64,
    /// Exit probability in [0, 1] at decision time.
    pub exit_prob: f64,
}

impl Decision {
    /// A HOLD decision.
    pub fn hold(from: CameraId, ref_index: u64, reason: HoldReason, exit_prob: f64) -> Self {
        Self {
            action: DecisionAction::Hold { reason },
            from,
            ref_index,
            exit_prob,
        }
    }

    /// A SWITCH decision.
    pub fn switch(
        from: CameraId,
        to: CameraId,
        ref_index: u64,
        reason: SwitchReason,
        zone: Option<ZoneLabel>,
        exit_prob: f64,
    ) -> Self {
        Self {
            action: DecisionAction::Switch { to, reason, zone },
            from,
            ref_index,
            exit_prob,
        }
    }

    /// True for SWITCH decisions.
    pub fn is_switch(&self) -> bool {
        matches!(self.action, DecisionAction::Switch { .. })
    }
}

/// Persisted record of an applied switch, with the true positions of all
/// streams at the moment of switch for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchEvent {
    pub at: DateTime<Utc>,
    pub ref_index: u64,
    pub from: CameraId,
    pub to: CameraId,
    pub reason: SwitchReason,
    pub zone: Option<ZoneLabel>,
    pub exit_prob: f64,
    /// True stream position of every camera when the switch was applied.
    pub stream_positions: BTreeMap<CameraId, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_roundtrip() {
        let d = Decision::switch(
            CameraId(0),
            CameraId(1),
            79,
            SwitchReason::BallInExitZone,
            Some(ZoneLabel::Right),
            0.57,
        );
        let json = serde_json::to_string(&d).unwrap();
        let back: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
        assert!(back.is_switch());
    }

    #[test]
    fn test_hold_reason_display() {
        assert_eq!(HoldReason::LowExitProb.to_string(), "low_exit_prob");
        assert_eq!(
            HoldReason::TargetUnavailable.to_string(),
            "target_unavailable"
        );
    }

    #[test]
    fn test_switch_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SwitchReason::FallbackConfirmed).unwrap();
        assert_eq!(json, "\"fallback_confirmed\"");
    }
}
