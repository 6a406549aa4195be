//! Discrete control settings swept by the driver.
//!
//! A [`ParameterGrid`] holds one ordered list of levels per [`Dimension`].
//! The order of each list is the enumeration order, so `[0.85, 0.25]` visits
//! 0.85 first even though it is the larger value.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("{0} has no levels")]
    EmptyDimension(Dimension),
    #[error("{dimension} level {index} is not a finite number ({value})")]
    NonFiniteLevel {
        dimension: Dimension,
        index: usize,
        value: f64,
    },
}

/// One of the three control dimensions of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Gain,
    Tone,
    Volume,
}

impl Dimension {
    /// All dimensions, outermost first.
    pub const ALL: [Dimension; 3] = [Dimension::Gain, Dimension::Tone, Dimension::Volume];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Gain => "gain",
            Dimension::Tone => "tone",
            Dimension::Volume => "volume",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, non-empty levels for gain, tone and volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridLevels", into = "GridLevels")]
pub struct ParameterGrid {
    gain: Vec<f64>,
    tone: Vec<f64>,
    volume: Vec<f64>,
}

/// Unvalidated serialized form of a [`ParameterGrid`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevels {
    pub gain: Vec<f64>,
    pub tone: Vec<f64>,
    pub volume: Vec<f64>,
}

impl ParameterGrid {
    pub fn new(gain: Vec<f64>, tone: Vec<f64>, volume: Vec<f64>) -> Result<Self, GridError> {
        let grid = Self { gain, tone, volume };
        for dimension in Dimension::ALL {
            let levels = grid.levels(dimension);
            if levels.is_empty() {
                return Err(GridError::EmptyDimension(dimension));
            }
            if let Some((index, &value)) = levels.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(GridError::NonFiniteLevel {
                    dimension,
                    index,
                    value,
                });
            }
        }
        Ok(grid)
    }

    /// The same levels on every dimension (the usual pot-position setup).
    pub fn uniform(levels: Vec<f64>) -> Result<Self, GridError> {
        Self::new(levels.clone(), levels.clone(), levels)
    }

    pub fn levels(&self, dimension: Dimension) -> &[f64] {
        match dimension {
            Dimension::Gain => &self.gain,
            Dimension::Tone => &self.tone,
            Dimension::Volume => &self.volume,
        }
    }

    pub fn length_of(&self, dimension: Dimension) -> usize {
        self.levels(dimension).len()
    }

    /// Level at `index` along `dimension`.
    ///
    /// # Panics
    /// If `index` is out of range; positions come from a bounded cursor.
    pub fn value_at(&self, dimension: Dimension, index: usize) -> f64 {
        self.levels(dimension)[index]
    }

    /// Number of distinct (gain, tone, volume) settings.
    pub fn combinations(&self) -> usize {
        self.gain.len() * self.tone.len() * self.volume.len()
    }
}

impl TryFrom<GridLevels> for ParameterGrid {
    type Error = GridError;

    fn try_from(levels: GridLevels) -> Result<Self, Self::Error> {
        Self::new(levels.gain, levels.tone, levels.volume)
    }
}

impl From<ParameterGrid> for GridLevels {
    fn from(grid: ParameterGrid) -> Self {
        Self {
            gain: grid.gain,
            tone: grid.tone,
            volume: grid.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_configured_order() {
        let grid = ParameterGrid::new(vec![0.85, 0.25], vec![0.5], vec![0.1, 0.9, 0.5]).unwrap();
        assert_eq!(grid.value_at(Dimension::Gain, 0), 0.85);
        assert_eq!(grid.value_at(Dimension::Volume, 2), 0.5);
        assert_eq!(grid.length_of(Dimension::Tone), 1);
        assert_eq!(grid.combinations(), 6);
    }

    #[test]
    fn rejects_empty_dimension() {
        let err = ParameterGrid::new(vec![0.5], vec![], vec![0.5]).unwrap_err();
        assert_eq!(err, GridError::EmptyDimension(Dimension::Tone));
    }

    #[test]
    fn rejects_nan_level() {
        let err = ParameterGrid::uniform(vec![0.25, f64::NAN]).unwrap_err();
        assert!(matches!(
            err,
            GridError::NonFiniteLevel { dimension: Dimension::Gain, index: 1, .. }
        ));
    }

    #[test]
    fn yaml_goes_through_validation() {
        let ok: ParameterGrid =
            serde_yaml::from_str("gain: [0.25, 0.5]\ntone: [0.5]\nvolume: [0.85]\n").unwrap();
        assert_eq!(ok.length_of(Dimension::Gain), 2);

        let bad: Result<ParameterGrid, _> =
            serde_yaml::from_str("gain: []\ntone: [0.5]\nvolume: [0.85]\n");
        assert!(bad.is_err());
    }
}
