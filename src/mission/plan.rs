use crate::telemetry::GeoPosition;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum_macros::Display;

/// Mission item command code for return-to-launch.
pub const CMD_RETURN_TO_LAUNCH: u32 = 20;

/// Indices of the coordinate parameters inside a navigation item's
/// `params` array, per the plan file format.
const PARAM_LAT: usize = 4;
const PARAM_LON: usize = 5;
const PARAM_ALT: usize = 6;

#[derive(Debug, Display)]
pub enum PlanDecodeError {
    #[strum(to_string = "could not read plan file: {0}")]
    Read(std::io::Error),
    #[strum(to_string = "malformed plan file: {0}")]
    Parse(serde_json::Error),
    #[strum(to_string = "plan has no planned home position")]
    NoHomePosition,
    #[strum(to_string = "plan has no mission items")]
    NoMissionItems,
    #[strum(to_string = "final mission item carries no coordinate parameters")]
    NoFinalCoordinate,
}

impl std::error::Error for PlanDecodeError {}

impl From<std::io::Error> for PlanDecodeError {
    fn from(value: std::io::Error) -> Self { PlanDecodeError::Read(value) }
}

impl From<serde_json::Error> for PlanDecodeError {
    fn from(value: serde_json::Error) -> Self { PlanDecodeError::Parse(value) }
}

/// One mission item: a command code plus its numeric parameters. Parameters
/// may be null in the file, which decodes to `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionItem {
    pub command: u32,
    #[serde(default)]
    pub params: Vec<Option<f64>>,
}

impl MissionItem {
    /// The geodetic coordinate a navigation item points at, when present.
    pub fn coordinate(&self) -> Option<GeoPosition> {
        let get = |i: usize| self.params.get(i).copied().flatten();
        Some(GeoPosition::new(get(PARAM_LAT)?, get(PARAM_LON)?, get(PARAM_ALT)?))
    }
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    mission: MissionDef,
    #[serde(default, rename = "rallyPoints")]
    rally_points: Option<RallyPointsDef>,
}

#[derive(Debug, Deserialize)]
struct MissionDef {
    #[serde(rename = "plannedHomePosition")]
    planned_home_position: Option<[f64; 3]>,
    #[serde(default)]
    items: Vec<MissionItem>,
}

#[derive(Debug, Deserialize)]
struct RallyPointsDef {
    #[serde(default)]
    points: Vec<[f64; 3]>,
}

/// A decoded mission plan. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct MissionPlan {
    home: GeoPosition,
    items: Vec<MissionItem>,
    rally_points: Vec<GeoPosition>,
    landing_target: GeoPosition,
}

impl MissionPlan {
    /// Reads and decodes a plan file.
    pub async fn load(path: &Path) -> Result<Self, PlanDecodeError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    /// Decodes a plan document and derives the landing target: home if the
    /// final item is a return-to-launch, otherwise the final item's own
    /// coordinate.
    pub fn from_json(raw: &str) -> Result<Self, PlanDecodeError> {
        let file: PlanFile = serde_json::from_str(raw)?;
        let home = file
            .mission
            .planned_home_position
            .map(|[lat, lon, alt]| GeoPosition::new(lat, lon, alt))
            .ok_or(PlanDecodeError::NoHomePosition)?;

        let items = file.mission.items;
        let last = items.last().ok_or(PlanDecodeError::NoMissionItems)?;
        let landing_target = if last.command == CMD_RETURN_TO_LAUNCH {
            home
        } else {
            last.coordinate().ok_or(PlanDecodeError::NoFinalCoordinate)?
        };

        let rally_points = file
            .rally_points
            .map(|def| {
                def.points.into_iter().map(|[lat, lon, alt]| GeoPosition::new(lat, lon, alt)).collect()
            })
            .unwrap_or_default();

        Ok(Self { home, items, rally_points, landing_target })
    }

    pub fn home(&self) -> &GeoPosition { &self.home }

    pub fn items(&self) -> &[MissionItem] { &self.items }

    pub fn rally_points(&self) -> &[GeoPosition] { &self.rally_points }

    pub fn landing_target(&self) -> &GeoPosition { &self.landing_target }
}
