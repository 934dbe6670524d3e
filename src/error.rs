use thiserror::Error;

/// Reasons a `SimulationConfig` is rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigMismatch {
    #[error("grid size must be positive")]
    ZeroGridSize,
    #[error("grid size {grid_size} exceeds the maximum of {max}")]
    GridTooLarge { grid_size: usize, max: usize },
    #[error("grid size {grid_size} does not match terrain dimensions {w}x{h}")]
    TerrainDimensions { grid_size: usize, w: usize, h: usize },
    #[error("time step must be positive and finite, got {0}")]
    TimeStep(f64),
    #[error("total time must be positive and finite, got {0}")]
    TotalTime(f64),
    #[error("{steps} steps exceed the maximum of {max}")]
    TooManySteps { steps: f64, max: u64 },
    #[error("terrain elevation at ({x}, {y}) is not finite")]
    NonFiniteElevation { x: usize, y: usize },
    #[error("water source ({x}, {y}) lies outside a {grid_size}x{grid_size} grid")]
    SourceOutOfBounds { x: usize, y: usize, grid_size: usize },
    #[error("water source intensity must be non-negative and finite, got {0}")]
    SourceIntensity(f64),
    #[error("total injected depth {0} would overflow")]
    InjectionOverflow(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid simulation config: {0}")]
    ConfigMismatch(#[from] ConfigMismatch),
}
