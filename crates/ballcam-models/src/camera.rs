//! Camera identity and role assignment.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a camera / input stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

/// Sideline role of a camera. Explicit configuration, never inferred
/// from the stream's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraRole {
    Left,
    Right,
    Middle,
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraRole::Left => write!(f, "LEFT"),
            CameraRole::Right => write!(f, "RIGHT"),
            CameraRole::Middle => write!(f, "MIDDLE"),
        }
    }
}

impl FromStr for CameraRole {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LEFT" | "L" => Ok(CameraRole::Left),
            "RIGHT" | "R" => Ok(CameraRole::Right),
            "MIDDLE" | "MID" | "M" => Ok(CameraRole::Middle),
            other => Err(RoleError::UnknownRole(other.to_string())),
        }
    }
}

/// Errors raised while validating a role assignment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("unknown camera role: {0}")]
    UnknownRole(String),

    #[error("role {0} assigned to more than one camera")]
    DuplicateRole(CameraRole),

    #[error("expected 2 or 3 cameras, got {0}")]
    BadCameraCount(usize),

    #[error("camera id {0} appears more than once")]
    DuplicateCamera(CameraId),
}

/// Validate a role assignment: 2 or 3 cameras, unique ids, each role at
/// most once.
pub fn validate_roles(assignment: &[(CameraId, CameraRole)]) -> Result<(), RoleError> {
    if assignment.len() < 2 || assignment.len() > 3 {
        return Err(RoleError::BadCameraCount(assignment.len()));
    }

    let mut seen_ids = BTreeSet::new();
    let mut seen_roles = BTreeSet::new();
    for (id, role) in assignment {
        if !seen_ids.insert(*id) {
            return Err(RoleError::DuplicateCamera(*id));
        }
        if !seen_roles.insert(*role) {
            return Err(RoleError::DuplicateRole(*role));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("left".parse::<CameraRole>().unwrap(), CameraRole::Left);
        assert_eq!("RIGHT".parse::<CameraRole>().unwrap(), CameraRole::Right);
        assert_eq!("mid".parse::<CameraRole>().unwrap(), CameraRole::Middle);
        assert!("goal".parse::<CameraRole>().is_err());
    }

    #[test]
    fn test_validate_roles_ok() {
        let assignment = vec![
            (CameraId(0), CameraRole::Left),
            (CameraId(1), CameraRole::Right),
        ];
        assert!(validate_roles(&assignment).is_ok());
    }

    #[test]
    fn test_validate_roles_duplicate_role() {
        let assignment = vec![
            (CameraId(0), CameraRole::Left),
            (CameraId(1), CameraRole::Left),
        ];
        assert_eq!(
            validate_roles(&assignment),
            Err(RoleError::DuplicateRole(CameraRole::Left))
        );
    }

    #[test]
    fn test_validate_roles_count() {
        let assignment = vec![(CameraId(0), CameraRole::Left)];
        assert_eq!(
            validate_roles(&assignment),
            Err(RoleError::BadCameraCount(1))
        );
    }
}
