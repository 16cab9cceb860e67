//! Typed factor relationships

use crate::{Distribution, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of relationship a factor expresses between its variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// (x, y, theta) between two planar poses.
    Pose2Pose2,
    /// (x, y, z, a, b, c) between two 3D poses.
    Pose3Pose3,
    Point2Point2,
    Point3Point3,
    PriorPose2,
    PriorPose3,
    PriorPoint2,
    PriorPoint3,
}

impl RelationKind {
    /// Dimension the noise model must have.
    pub fn dimension(self) -> usize {
        match self {
            RelationKind::Point2Point2 | RelationKind::PriorPoint2 => 2,
            RelationKind::Pose2Pose2
            | RelationKind::Point3Point3
            | RelationKind::PriorPose2
            | RelationKind::PriorPoint3 => 3,
            RelationKind::Pose3Pose3 | RelationKind::PriorPose3 => 6,
        }
    }

    /// Number of variables a factor of this kind connects.
    pub fn arity(self) -> usize {
        if self.is_prior() { 1 } else { 2 }
    }

    pub fn is_prior(self) -> bool {
        matches!(
            self,
            RelationKind::PriorPose2
                | RelationKind::PriorPose3
                | RelationKind::PriorPoint2
                | RelationKind::PriorPoint3
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Pose2Pose2 => "Pose2Pose2",
            RelationKind::Pose3Pose3 => "Pose3Pose3",
            RelationKind::Point2Point2 => "Point2Point2",
            RelationKind::Point3Point3 => "Point3Point3",
            RelationKind::PriorPose2 => "PriorPose2",
            RelationKind::PriorPose3 => "PriorPose3",
            RelationKind::PriorPoint2 => "PriorPoint2",
            RelationKind::PriorPoint3 => "PriorPoint3",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relation kind together with its noise model. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PackedRelation")]
pub struct Relation {
    kind: RelationKind,
    #[serde(rename = "Z")]
    distribution: Distribution,
}

#[derive(Deserialize)]
struct PackedRelation {
    kind: RelationKind,
    #[serde(rename = "Z")]
    distribution: Distribution,
}

impl TryFrom<PackedRelation> for Relation {
    type Error = Error;

    fn try_from(packed: PackedRelation) -> Result<Self> {
        Self::new(packed.kind, packed.distribution)
    }
}

impl Relation {
    pub fn new(kind: RelationKind, distribution: Distribution) -> Result<Self> {
        if distribution.dimension() != kind.dimension() {
            return Err(Error::Shape(format!(
                "{} needs a {}-dimensional distribution, got {}",
                kind,
                kind.dimension(),
                distribution.dimension()
            )));
        }
        Ok(Self { kind, distribution })
    }

    /// Relative 6-DOF pose between two 3D poses.
    pub fn pose_to_pose(distribution: Distribution) -> Result<Self> {
        Self::new(RelationKind::Pose3Pose3, distribution)
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }
}
