//! Readers and writers for the pipeline's external collaborators
//!
//! Inputs:
//! - points CSV: `id,x,y[,name]`, rows with a name are skipped
//! - statistics CSV: `unit_id,mean_household_size,total_population`
//! - boundaries JSON: `[{"id", "name", "polygons": [[ring, ...], ...]}]`
//! - footprints JSON: `[{"id", "rings": [ring, ...]}]`
//!
//! Ids are kept as text. JSON ids may be strings or integers; integers are
//! converted with their exact decimal digits.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use hamlet_core::{
    AdminBoundary, BuildingId, BuildingPoint, ClusterResult, Footprint, FootprintRecord, Hamlet,
    RunReport, UnitId, UnitStatistics,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

type Ring = Vec<[f64; 2]>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Unsigned(n) => n.to_string(),
            RawId::Signed(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PointRow {
    id: String,
    x: f64,
    y: f64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoundaryRecord {
    id: RawId,
    #[serde(default)]
    name: String,
    polygons: Vec<Vec<Ring>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct FootprintFeature<Id> {
    id: Id,
    rings: Vec<Ring>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    cluster_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    household_size: Option<u32>,
}

/// Building points read from CSV
#[derive(Debug)]
pub struct PointInput {
    pub points: Vec<BuildingPoint>,
    /// Rows skipped because they already carry a place name
    pub named: usize,
}

pub fn read_points(path: &Path) -> Result<PointInput> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open points file: {}", path.display()))?;

    let mut points = Vec::new();
    let mut named = 0;
    for (line, row) in reader.deserialize::<PointRow>().enumerate() {
        let row = row.with_context(|| {
            format!("Invalid point row {} in {}", line + 1, path.display())
        })?;
        if row.name.as_deref().is_some_and(|n| !n.is_empty()) {
            named += 1;
            continue;
        }
        points.push(BuildingPoint::new(row.id, row.x, row.y));
    }

    tracing::info!(points = points.len(), named, "Read building points");
    Ok(PointInput { points, named })
}

pub fn read_statistics(path: &Path) -> Result<Vec<UnitStatistics>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open statistics file: {}", path.display()))?;

    let rows = reader
        .deserialize::<UnitStatistics>()
        .enumerate()
        .map(|(line, row)| {
            row.with_context(|| {
                format!("Invalid statistics row {} in {}", line + 1, path.display())
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(rows = rows.len(), "Read administrative statistics");
    Ok(rows)
}

pub fn read_boundaries(path: &Path) -> Result<Vec<AdminBoundary>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open boundaries file: {}", path.display()))?;
    let records: Vec<BoundaryRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse boundaries JSON: {}", path.display()))?;

    let boundaries = records
        .into_iter()
        .map(|record| {
            let id = record.id.into_string();
            let polygons = record
                .polygons
                .into_iter()
                .map(|rings| polygon_from_rings(rings).with_context(|| format!("Unit {id}")))
                .collect::<Result<Vec<_>>>()?;
            Ok(AdminBoundary {
                id: UnitId(id),
                name: record.name,
                geometry: MultiPolygon(polygons),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(units = boundaries.len(), "Read administrative boundaries");
    Ok(boundaries)
}

pub fn read_footprints(path: &Path) -> Result<Vec<Footprint>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open footprints file: {}", path.display()))?;
    let features: Vec<FootprintFeature<RawId>> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse footprints JSON: {}", path.display()))?;

    features
        .into_iter()
        .map(|f| {
            let id = f.id.into_string();
            let geometry =
                polygon_from_rings(f.rings).with_context(|| format!("Footprint {id}"))?;
            Ok(Footprint {
                id: BuildingId(id),
                geometry,
            })
        })
        .collect()
}

fn polygon_from_rings(rings: Vec<Ring>) -> Result<Polygon<f64>> {
    let mut rings = rings.into_iter().map(|ring| {
        if ring.len() < 3 {
            bail!("Ring needs at least 3 positions, got {}", ring.len());
        }
        Ok(LineString::from(
            ring.into_iter()
                .map(|[x, y]| Coord { x, y })
                .collect::<Vec<_>>(),
        ))
    });
    let exterior = match rings.next() {
        Some(ring) => ring?,
        None => bail!("Polygon has no rings"),
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn rings_of(polygon: &Polygon<f64>) -> Vec<Ring> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}

#[derive(Serialize)]
struct HamletRow<'a> {
    cluster_id: u32,
    x: f64,
    y: f64,
    size: usize,
    unit_id: Option<&'a str>,
    majority_unit: Option<&'a str>,
    population: u64,
    unsized_members: usize,
}

#[derive(Serialize)]
struct BuildingRow<'a> {
    id: &'a str,
    x: f64,
    y: f64,
    unit_id: Option<&'a str>,
    cluster_id: Option<u32>,
    household_size: Option<u32>,
}

#[derive(Serialize)]
struct AssignmentRow<'a> {
    id: &'a str,
    cluster_id: u32,
}

/// Hamlet records; member count is written as `size`
pub fn write_hamlets(path: &Path, hamlets: &[Hamlet]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for h in hamlets {
        writer.serialize(HamletRow {
            cluster_id: h.cluster_id.0,
            x: h.centroid.x,
            y: h.centroid.y,
            size: h.member_count,
            unit_id: h.unit.as_ref().map(|u| u.0.as_str()),
            majority_unit: h.majority_unit.as_ref().map(|u| u.0.as_str()),
            population: h.population_estimate,
            unsized_members: h.unsized_members,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Building records; unset values are written as empty cells
pub fn write_buildings(path: &Path, buildings: &[BuildingPoint]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for b in buildings {
        writer.serialize(BuildingRow {
            id: &b.id.0,
            x: b.coord.x,
            y: b.coord.y,
            unit_id: b.unit.as_ref().map(|u| u.0.as_str()),
            cluster_id: b.cluster.map(|c| c.0),
            household_size: b.household_size,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Cluster assignment per point, for the clustering-only command
pub fn write_assignments(
    path: &Path,
    points: &[BuildingPoint],
    clusters: &ClusterResult,
) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for (p, c) in points.iter().zip(clusters.assignments.iter()) {
        writer.serialize(AssignmentRow {
            id: &p.id.0,
            cluster_id: c.0,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_footprints(path: &Path, records: &[FootprintRecord]) -> Result<()> {
    let features: Vec<FootprintFeature<&str>> = records
        .iter()
        .map(|r| FootprintFeature {
            id: r.id.0.as_str(),
            rings: rings_of(&r.geometry),
            cluster_id: Some(r.cluster.0),
            household_size: r.household_size,
        })
        .collect();
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &features)?;
    writer.flush()?;
    Ok(())
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}
