use serde::Serialize;

use crate::risk::RiskLevel;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Named reporting region. Reference data only; never fed into the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FloodZone {
    pub id: &'static str,
    pub name: &'static str,
    pub polygon: &'static [GeoPoint],
    pub elevation: f64,
    pub population: u32,
    pub infrastructure: &'static [&'static str],
    pub risk_level: RiskLevel,
    pub evacuation_time_minutes: u32,
}

const fn pt(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint { lat, lon }
}

static FLOOD_ZONES: [FloodZone; 4] = [
    FloodZone {
        id: "riverside_district",
        name: "Riverside District",
        polygon: &[pt(30.74, 76.78), pt(30.75, 76.79), pt(30.76, 76.80), pt(30.75, 76.81)],
        elevation: 220.0,
        population: 25_000,
        infrastructure: &["Schools", "Hospitals", "Markets"],
        risk_level: RiskLevel::Critical,
        evacuation_time_minutes: 30,
    },
    FloodZone {
        id: "industrial_zone",
        name: "Industrial Zone",
        polygon: &[pt(30.72, 76.75), pt(30.73, 76.76), pt(30.74, 76.77), pt(30.73, 76.78)],
        elevation: 240.0,
        population: 15_000,
        infrastructure: &["Factories", "Warehouses", "Power Plants"],
        risk_level: RiskLevel::High,
        evacuation_time_minutes: 45,
    },
    FloodZone {
        id: "downtown_area",
        name: "Downtown Area",
        polygon: &[pt(30.76, 76.72), pt(30.77, 76.73), pt(30.78, 76.74), pt(30.77, 76.75)],
        elevation: 260.0,
        population: 40_000,
        infrastructure: &["Government Buildings", "Banks", "Shopping Centers"],
        risk_level: RiskLevel::Moderate,
        evacuation_time_minutes: 60,
    },
    FloodZone {
        id: "residential_blocks",
        name: "Residential Blocks",
        polygon: &[pt(30.70, 76.70), pt(30.71, 76.71), pt(30.72, 76.72), pt(30.71, 76.73)],
        elevation: 250.0,
        population: 35_000,
        infrastructure: &["Housing", "Schools", "Community Centers"],
        risk_level: RiskLevel::Low,
        evacuation_time_minutes: 90,
    },
];

pub fn list_flood_zones() -> &'static [FloodZone] {
    &FLOOD_ZONES
}

pub fn find_flood_zone(id: &str) -> Option<&'static FloodZone> {
    FLOOD_ZONES.iter().find(|z| z.id == id)
}

/// Zones whose baseline risk is `min` or worse.
pub fn zones_at_or_above(min: RiskLevel) -> impl Iterator<Item = &'static FloodZone> {
    FLOOD_ZONES.iter().filter(move |z| z.risk_level >= min)
}

pub fn population_at_risk(min: RiskLevel) -> u64 {
    zones_at_or_above(min).map(|z| z.population as u64).sum()
}
