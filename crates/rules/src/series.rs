use serde::{Deserialize, Serialize};

use crate::labels::Labels;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(labels: Labels, points: Vec<Point>) -> Self {
        Self { labels, points }
    }

    /// Points that can take part in a comparison: non-negative timestamp, finite value.
    pub fn usable_points(&self) -> Vec<Point> {
        self.points
            .iter()
            .filter(|p| p.timestamp >= 0 && p.value.is_finite())
            .copied()
            .collect()
    }
}

/// One alerting (or recovering, or missing-data) result for a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
    pub target: f64,
    pub target_unit: String,
    pub receivers: Vec<String>,
    pub is_missing: bool,
    pub is_recovering: bool,
}

impl Sample {
    pub fn missing(labels: Labels) -> Self {
        Self {
            labels,
            value: 0.0,
            target: 0.0,
            target_unit: String::new(),
            receivers: Vec::new(),
            is_missing: true,
            is_recovering: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_points_drop_bad_values() {
        let s = Series::new(
            Labels::new(),
            vec![
                Point { timestamp: -1, value: 1.0 },
                Point { timestamp: 1, value: f64::NAN },
                Point { timestamp: 2, value: f64::INFINITY },
                Point { timestamp: 3, value: 4.0 },
            ],
        );
        let usable = s.usable_points();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].value, 4.0);
    }
}
