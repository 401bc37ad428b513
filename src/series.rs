use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(with = "datetime_format")]
    pub datetime: NaiveDateTime,
    pub y: f64,
}

/// One chart's worth of data as stored in the media directory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub xlabel: String,
    #[serde(default)]
    pub ylabel: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn x_extent(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        // points are kept sorted
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some((first.datetime, last.datetime))
    }

    pub fn y_max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.y).reduce(f64::max)
    }
}

pub fn parse_series(text: &str) -> Result<Series> {
    let mut series: Series = serde_json::from_str(text).context("parse series json")?;
    series.points.sort_by_key(|p| p.datetime);
    Ok(series)
}

pub fn load_series(path: &Path) -> Result<Series> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_series(&text).with_context(|| format!("load {}", path.display()))
}

pub fn write_series(path: &Path, series: &Series) -> Result<()> {
    let text = serde_json::to_string(series)?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

pub(crate) mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::DATETIME_FORMAT;

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&dt.format(DATETIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
            .map_err(|e| D::Error::custom(format!("bad datetime {:?}: {}", raw, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_and_sorts_points() {
        let s = parse_series(
            r#"{"title":"Connections","xlabel":"Time","ylabel":"n","points":[
                {"datetime":"2016-05-01 12:05:00","y":9},
                {"datetime":"2016-05-01 12:00:00","y":8.5}
            ]}"#,
        )
        .unwrap();

        assert_eq!(s.title, "Connections");
        assert_eq!(s.points.len(), 2);
        assert_eq!(s.points[0].y, 8.5);
        let first = NaiveDate::from_ymd_opt(2016, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(s.x_extent().unwrap().0, first);
        assert_eq!(s.y_max(), Some(9.0));
    }

    #[test]
    fn labels_are_optional() {
        let s = parse_series(r#"{"points":[]}"#).unwrap();
        assert_eq!(s.xlabel, "");
        assert!(s.x_extent().is_none());
        assert!(s.y_max().is_none());
    }

    #[test]
    fn bad_datetime_names_the_value() {
        let err = parse_series(r#"{"points":[{"datetime":"01/05/2016","y":1}]}"#).unwrap_err();
        assert!(format!("{:#}", err).contains("01/05/2016"));
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_series(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn write_then_load_keeps_datetime_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let dt = NaiveDate::from_ymd_opt(2016, 5, 1)
            .unwrap()
            .and_hms_opt(7, 3, 9)
            .unwrap();
        let s = Series {
            title: "t".into(),
            points: vec![Point { datetime: dt, y: 3.0 }],
            ..Default::default()
        };
        write_series(&path, &s).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"2016-05-01 07:03:09\""));
        assert_eq!(load_series(&path).unwrap(), s);
    }
}
