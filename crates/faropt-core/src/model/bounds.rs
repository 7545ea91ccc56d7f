use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FarOptError;

/// Inclusive search interval of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub low: f64,
    pub high: f64,
}

impl Dimension {
    pub fn contains(&self, x: f64) -> bool {
        self.low <= x && x <= self.high
    }

    pub(crate) fn to_unit(&self, x: f64) -> f64 {
        (x - self.low) / (self.high - self.low)
    }

    pub(crate) fn from_unit(&self, u: f64) -> f64 {
        (self.low + u * (self.high - self.low)).clamp(self.low, self.high)
    }
}

/// Search space of a model: one `(low, high)` pair per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds(Vec<Dimension>);

impl Bounds {
    pub fn new(pairs: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, FarOptError> {
        let dims = pairs
            .into_iter()
            .enumerate()
            .map(|(i, (low, high))| {
                if !low.is_finite() || !high.is_finite() {
                    Err(FarOptError::InvalidBounds(format!(
                        "dimension {i} is not finite: ({low}, {high})"
                    )))
                } else if low >= high {
                    Err(FarOptError::InvalidBounds(format!(
                        "dimension {i} is empty: low {low} is not below high {high}"
                    )))
                } else {
                    Ok(Dimension { low, high })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if dims.is_empty() {
            return Err(FarOptError::InvalidBounds(
                "at least one dimension is required".to_string(),
            ));
        }
        Ok(Self(dims))
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len() && self.0.iter().zip(x).all(|(d, v)| d.contains(*v))
    }

    pub(crate) fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        self.0.iter().zip(x).map(|(d, v)| d.to_unit(*v)).collect()
    }

    pub(crate) fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        self.0.iter().zip(u).map(|(d, v)| d.from_unit(*v)).collect()
    }
}

impl TryFrom<Vec<(f64, f64)>> for Bounds {
    type Error = FarOptError;

    fn try_from(pairs: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Bounds::new(pairs)
    }
}

impl TryFrom<&[(f64, f64)]> for Bounds {
    type Error = FarOptError;

    fn try_from(pairs: &[(f64, f64)]) -> Result<Self, Self::Error> {
        Bounds::new(pairs.iter().copied())
    }
}

/// Accepts only an array of two-element numeric arrays, e.g. `[[-2, 2], [0, 5]]`.
impl TryFrom<&serde_json::Value> for Bounds {
    type Error = FarOptError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let items = value
            .as_array()
            .ok_or_else(|| FarOptError::InvalidBounds(format!("expected a list, got {value}")))?;

        let pairs = items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([low, high]) => match (low.as_f64(), high.as_f64()) {
                    (Some(low), Some(high)) => Ok((low, high)),
                    _ => Err(FarOptError::InvalidBounds(format!(
                        "bounds must be numbers, got {item}"
                    ))),
                },
                _ => Err(FarOptError::InvalidBounds(format!(
                    "each dimension must be a (low, high) pair, got {item}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Bounds::new(pairs)
    }
}

/// Parses `[[-2, 2], [0, 5]]` as well as the tuple form `[(-2.0, 2.0), (0.0, 5.0)]`.
impl FromStr for Bounds {
    type Err = FarOptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('(', "[").replace(')', "]");
        let value: serde_json::Value = serde_json::from_str(&normalized)
            .map_err(|e| FarOptError::InvalidBounds(format!("cannot parse {s:?}: {e}")))?;
        Bounds::try_from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn tuple_pairs_are_accepted() {
        let bounds = Bounds::try_from(vec![(-2.0, 2.0), (0.0, 5.0)]).unwrap();
        assert_eq!(bounds.len(), 2);
        assert!(bounds.contains(&[0.0, 5.0]));
        assert!(!bounds.contains(&[0.0, 5.1]));
        assert!(!bounds.contains(&[0.0]));
    }

    #[rstest]
    #[case("[(-2.0, 2.0), (0.0, 5.0)]")]
    #[case("[[-2, 2], [0, 5]]")]
    #[case(" [ ( -2 , 2 ) ] ")]
    fn textual_bounds_parse(#[case] input: &str) {
        assert!(input.parse::<Bounds>().is_ok());
    }

    #[rstest]
    #[case("[1, 2]")]
    #[case("[]")]
    #[case("[[1, 2, 3]]")]
    #[case("[[\"a\", 2]]")]
    #[case("[[2, 1]]")]
    #[case("[[1, 1]]")]
    #[case("{\"low\": 1}")]
    #[case("not bounds")]
    fn malformed_bounds_are_rejected(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Bounds>(),
            Err(FarOptError::InvalidBounds(_))
        ));
    }

    #[test]
    fn unit_cube_round_trip() {
        let bounds = Bounds::try_from(vec![(-2.0, 2.0), (10.0, 20.0)]).unwrap();
        let unit = bounds.to_unit(&[0.0, 15.0]);
        assert_eq!(unit, vec![0.5, 0.5]);
        assert_eq!(bounds.from_unit(&unit), vec![0.0, 15.0]);
    }
}
