use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::basic::BasicThreshold;
use crate::series::{Sample, Series};

/// Thresholds of one rule, kept in severity order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thresholds(Vec<BasicThreshold>);

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    kind: String,
    spec: serde_json::Value,
}

impl Thresholds {
    pub fn new(thresholds: Vec<BasicThreshold>) -> Self {
        let mut set = Self(thresholds);
        set.sort_by_severity();
        set
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BasicThreshold> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn sort_by_severity(&mut self) {
        let Some(first) = self.0.first() else {
            return;
        };
        let op = first.compare_op;
        if op.is_above_style() {
            self.0.sort_by(|a, b| b.target.total_cmp(&a.target));
        } else if op.is_below_style() {
            self.0.sort_by(|a, b| a.target.total_cmp(&b.target));
        }
    }

    /// Evaluates every threshold independently against `series`, most severe first.
    pub fn eval(&self, series: &Series, rule_unit: &str) -> Vec<Sample> {
        self.0
            .iter()
            .filter_map(|t| t.should_alert(series, rule_unit))
            .collect()
    }
}

impl Serialize for Thresholds {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let envelopes = self
            .0
            .iter()
            .map(|t| {
                serde_json::to_value(t).map(|spec| Envelope {
                    kind: "basic".into(),
                    spec,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(serde::ser::Error::custom)?;
        envelopes.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Thresholds {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let envelopes = Vec::<Envelope>::deserialize(d)?;
        let mut thresholds = Vec::with_capacity(envelopes.len());
        for env in envelopes {
            match env.kind.as_str() {
                "basic" | "" => {
                    let t: BasicThreshold = serde_json::from_value(env.spec).map_err(|e| {
                        serde::de::Error::custom(format!("failed to decode basic threshold: {e}"))
                    })?;
                    thresholds.push(t);
                }
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "unsupported threshold kind: {other}"
                    )))
                }
            }
        }
        Ok(Self::new(thresholds))
    }
}
