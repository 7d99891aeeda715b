use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Above,
    Below,
    Eq,
    NotEq,
    AboveOrEq,
    BelowOrEq,
    OutsideBounds,
}

impl CompareOp {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Above => "1",
            Self::Below => "2",
            Self::Eq => "3",
            Self::NotEq => "4",
            Self::AboveOrEq => "5",
            Self::BelowOrEq => "6",
            Self::OutsideBounds => "7",
        }
    }

    pub fn compare(&self, value: f64, target: f64) -> bool {
        match self {
            Self::Above => value > target,
            Self::Below => value < target,
            Self::Eq => value == target,
            Self::NotEq => value != target,
            Self::AboveOrEq => value >= target,
            Self::BelowOrEq => value <= target,
            Self::OutsideBounds => value.abs() >= target,
        }
    }

    pub fn is_above_style(&self) -> bool {
        matches!(self, Self::Above | Self::AboveOrEq | Self::OutsideBounds)
    }

    pub fn is_below_style(&self) -> bool {
        matches!(self, Self::Below | Self::BelowOrEq)
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "above" | ">" => Ok(Self::Above),
            "2" | "below" | "<" => Ok(Self::Below),
            "3" | "equal" | "eq" | "=" => Ok(Self::Eq),
            "4" | "not_equal" | "not_eq" | "!=" => Ok(Self::NotEq),
            "5" | "above_or_equal" | "above_or_eq" | ">=" => Ok(Self::AboveOrEq),
            "6" | "below_or_equal" | "below_or_eq" | "<=" => Ok(Self::BelowOrEq),
            "7" | "outside_bounds" => Ok(Self::OutsideBounds),
            other => Err(format!("unknown compare op: {other}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::Eq => "equal",
            Self::NotEq => "not_equal",
            Self::AboveOrEq => "above_or_equal",
            Self::BelowOrEq => "below_or_equal",
            Self::OutsideBounds => "outside_bounds",
        };
        f.write_str(s)
    }
}

impl Serialize for CompareOp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for CompareOp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    AtleastOnce,
    AllTheTimes,
    OnAverage,
    InTotal,
    Last,
}

impl MatchType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AtleastOnce => "1",
            Self::AllTheTimes => "2",
            Self::OnAverage => "3",
            Self::InTotal => "4",
            Self::Last => "5",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "at_least_once" => Ok(Self::AtleastOnce),
            "2" | "all_the_times" => Ok(Self::AllTheTimes),
            "3" | "on_average" | "avg" => Ok(Self::OnAverage),
            "4" | "in_total" | "sum" => Ok(Self::InTotal),
            "5" | "last" => Ok(Self::Last),
            other => Err(format!("unknown match type: {other}")),
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AtleastOnce => "at_least_once",
            Self::AllTheTimes => "all_the_times",
            Self::OnAverage => "on_average",
            Self::InTotal => "in_total",
            Self::Last => "last",
        };
        f.write_str(s)
    }
}

impl Serialize for MatchType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for MatchType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_above_below() {
        assert!(CompareOp::Above.compare(10.0, 5.0));
        assert!(!CompareOp::Above.compare(5.0, 5.0));
        assert!(CompareOp::Below.compare(1.0, 5.0));
        assert!(!CompareOp::Below.compare(5.0, 5.0));
    }

    #[test]
    fn compare_equal() {
        assert!(CompareOp::Eq.compare(5.0, 5.0));
        assert!(!CompareOp::Eq.compare(5.1, 5.0));
        assert!(CompareOp::NotEq.compare(5.1, 5.0));
    }

    #[test]
    fn equality_is_exact_near_zero() {
        assert!(!CompareOp::Eq.compare(1e-17, 0.0));
        assert!(CompareOp::NotEq.compare(1e-17, 0.0));
        assert!(CompareOp::Eq.compare(0.0, -0.0));
    }

    #[test]
    fn compare_boundaries() {
        assert!(CompareOp::AboveOrEq.compare(5.0, 5.0));
        assert!(CompareOp::BelowOrEq.compare(5.0, 5.0));
    }

    #[test]
    fn outside_bounds_uses_magnitude() {
        assert!(CompareOp::OutsideBounds.compare(-7.0, 5.0));
        assert!(CompareOp::OutsideBounds.compare(5.0, 5.0));
        assert!(!CompareOp::OutsideBounds.compare(-4.0, 5.0));
    }

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("1".parse::<CompareOp>().unwrap(), CompareOp::Above);
        assert_eq!("outside_bounds".parse::<CompareOp>().unwrap(), CompareOp::OutsideBounds);
        assert_eq!("2".parse::<MatchType>().unwrap(), MatchType::AllTheTimes);
        assert!("9".parse::<MatchType>().is_err());
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&CompareOp::BelowOrEq).unwrap(), "\"6\"");
        let m: MatchType = serde_json::from_str("\"last\"").unwrap();
        assert_eq!(m, MatchType::Last);
    }
}
