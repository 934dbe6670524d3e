use serde::{Deserialize, Serialize};

use crate::error::ConfigMismatch;
use crate::grid::Grid;

/// Elevation grid in meters, `grid_size × grid_size`.
pub type TerrainGrid = Grid<f64>;

/// Single fixed inflow point. `intensity` is depth units per hour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaterSource {
    pub x: usize,
    pub y: usize,
    pub intensity: f64,
}

/// One simulation run. Times are in minutes.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub time_step: f64,
    pub total_time: f64,
    pub grid_size: usize,
    pub terrain_data: TerrainGrid,
    pub water_source: WaterSource,
}

/// Largest accepted `grid_size`.
pub const MAX_GRID_SIZE: usize = 1 << 14;
/// Largest accepted number of steps per run.
pub const MAX_STEPS: u64 = u32::MAX as u64;
/// Injected depth times this factor must stay finite, leaving room for the
/// per-cell flow sums within a step.
const INJECTION_HEADROOM: f64 = 64.0;

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigMismatch> {
        if self.grid_size == 0 {
            return Err(ConfigMismatch::ZeroGridSize);
        }
        if self.grid_size > MAX_GRID_SIZE {
            return Err(ConfigMismatch::GridTooLarge {
                grid_size: self.grid_size,
                max: MAX_GRID_SIZE,
            });
        }
        let t = &self.terrain_data;
        if t.w != self.grid_size
            || t.h != self.grid_size
            || t.w.checked_mul(t.h) != Some(t.data.len())
        {
            return Err(ConfigMismatch::TerrainDimensions {
                grid_size: self.grid_size,
                w: t.w,
                h: t.h,
            });
        }
        if let Some(i) = t.data.iter().position(|e| !e.is_finite()) {
            return Err(ConfigMismatch::NonFiniteElevation {
                x: i % t.w,
                y: i / t.w,
            });
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigMismatch::TimeStep(self.time_step));
        }
        if !(self.total_time.is_finite() && self.total_time > 0.0) {
            return Err(ConfigMismatch::TotalTime(self.total_time));
        }
        let steps = (self.total_time / self.time_step).floor();
        if !(steps <= MAX_STEPS as f64) {
            return Err(ConfigMismatch::TooManySteps {
                steps,
                max: MAX_STEPS,
            });
        }
        let src = self.water_source;
        if src.x >= self.grid_size || src.y >= self.grid_size {
            return Err(ConfigMismatch::SourceOutOfBounds {
                x: src.x,
                y: src.y,
                grid_size: self.grid_size,
            });
        }
        if !(src.intensity.is_finite() && src.intensity >= 0.0) {
            return Err(ConfigMismatch::SourceIntensity(src.intensity));
        }
        let injected = self.injection_per_step() * steps;
        if !(injected * INJECTION_HEADROOM).is_finite() {
            return Err(ConfigMismatch::InjectionOverflow(injected));
        }
        Ok(())
    }

    /// Number of whole steps that fit in `total_time`.
    pub fn step_count(&self) -> u64 {
        (self.total_time / self.time_step).floor() as u64
    }

    /// Depth added at the source each step.
    pub fn injection_per_step(&self) -> f64 {
        self.water_source.intensity * (self.time_step / 60.0)
    }
}

/// Coefficients of the pairwise flow rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    /// Fraction of (elevation diff + level diff) moved per step.
    pub flow_coefficient: f64,
    /// Max fraction of the donor's level moved to a single neighbor per step.
    pub outflow_cap: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            flow_coefficient: 0.1,
            outflow_cap: 0.3,
        }
    }
}

/// Shape of the synthetic heightmap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub peak_elevation: f64,
    pub relief: f64,
    pub noise_amp: f64,
    /// Rows strictly closer than this to the vertical center are carved.
    pub river_half_width: f64,
    pub river_depth: f64,
    pub floor: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            peak_elevation: 300.0,
            relief: 100.0,
            noise_amp: 10.0,
            river_half_width: 5.0,
            river_depth: 30.0,
            floor: 200.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(grid_size: usize) -> SimulationConfig {
        SimulationConfig {
            time_step: 5.0,
            total_time: 60.0,
            grid_size,
            terrain_data: Grid::square(grid_size),
            water_source: WaterSource { x: 1, y: 1, intensity: 12.0 },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(config(4).validate(), Ok(()));
        assert_eq!(config(4).step_count(), 12);
        approx::assert_relative_eq!(config(4).injection_per_step(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn terrain_dimension_mismatch_is_rejected() {
        let mut c = config(4);
        c.terrain_data = Grid::new(4, 3);
        assert_eq!(
            c.validate(),
            Err(ConfigMismatch::TerrainDimensions { grid_size: 4, w: 4, h: 3 })
        );
    }

    #[test]
    fn non_positive_times_are_rejected() {
        let mut c = config(4);
        c.time_step = 0.0;
        assert_eq!(c.validate(), Err(ConfigMismatch::TimeStep(0.0)));

        let mut c = config(4);
        c.total_time = -10.0;
        assert_eq!(c.validate(), Err(ConfigMismatch::TotalTime(-10.0)));

        let mut c = config(4);
        c.time_step = f64::NAN;
        assert!(matches!(c.validate(), Err(ConfigMismatch::TimeStep(_))));
    }

    #[test]
    fn source_must_be_inside_grid() {
        let mut c = config(4);
        c.water_source.x = 4;
        assert!(matches!(
            c.validate(),
            Err(ConfigMismatch::SourceOutOfBounds { x: 4, .. })
        ));
    }

    #[test]
    fn bad_intensity_is_rejected() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let mut c = config(4);
            c.water_source.intensity = bad;
            assert!(matches!(
                c.validate(),
                Err(ConfigMismatch::SourceIntensity(_))
            ));
        }
        let mut c = config(4);
        c.water_source.intensity = 0.0;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn overflowing_injection_is_rejected() {
        let mut c = config(3);
        c.water_source.intensity = 1e308;
        c.time_step = 60.0;
        c.total_time = 240.0;
        assert!(matches!(
            c.validate(),
            Err(ConfigMismatch::InjectionOverflow(_))
        ));
    }

    #[test]
    fn zero_grid_is_rejected() {
        assert_eq!(config(0).validate(), Err(ConfigMismatch::ZeroGridSize));
    }

    #[test]
    fn oversized_grid_is_rejected_without_allocating() {
        let c = SimulationConfig {
            grid_size: MAX_GRID_SIZE + 1,
            terrain_data: Grid {
                data: Vec::new(),
                w: MAX_GRID_SIZE + 1,
                h: MAX_GRID_SIZE + 1,
            },
            ..config(1)
        };
        assert!(matches!(c.validate(), Err(ConfigMismatch::GridTooLarge { .. })));
    }

    #[test]
    fn overflowing_terrain_dimensions_are_rejected() {
        // w * h wraps to 0 in release builds; the empty buffer must not pass.
        let huge = 1usize << 32;
        let c = SimulationConfig {
            grid_size: huge,
            terrain_data: Grid {
                data: Vec::new(),
                w: huge,
                h: huge,
            },
            ..config(1)
        };
        assert!(c.validate().is_err());

        let c = SimulationConfig {
            grid_size: 4,
            terrain_data: Grid {
                data: Vec::new(),
                w: 4,
                h: 4,
            },
            ..config(1)
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigMismatch::TerrainDimensions { .. })
        ));
    }

    #[test]
    fn non_finite_elevation_is_rejected() {
        let mut c = config(4);
        c.terrain_data.set(2, 3, f64::NAN);
        assert_eq!(
            c.validate(),
            Err(ConfigMismatch::NonFiniteElevation { x: 2, y: 3 })
        );
    }

    #[test]
    fn runaway_step_count_is_rejected() {
        let mut c = config(4);
        c.time_step = 1e-300;
        c.total_time = 1e300;
        assert!(matches!(c.validate(), Err(ConfigMismatch::TooManySteps { .. })));
    }

    #[test]
    fn partial_steps_are_dropped() {
        let mut c = config(2);
        c.total_time = 12.0;
        assert_eq!(c.step_count(), 2);
    }
}
