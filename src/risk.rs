use serde::{Deserialize, Serialize};

/// Depth margins above local elevation for each tier.
pub const CRITICAL_MARGIN: f64 = 2.0;
pub const HIGH_MARGIN: f64 = 1.0;
pub const MODERATE_MARGIN: f64 = 0.5;

/// Per-cell flood risk. Ordered low < moderate < high < critical.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Classify a cell from its water level alone; no memory of earlier steps.
#[inline]
pub fn classify(elevation: f64, water_level: f64) -> RiskLevel {
    if water_level > elevation + CRITICAL_MARGIN {
        RiskLevel::Critical
    } else if water_level > elevation + HIGH_MARGIN {
        RiskLevel::High
    } else if water_level > elevation + MODERATE_MARGIN {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}
