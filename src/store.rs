use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use duckdb::{Connection, params};
use serde::Deserialize;

use crate::{
    config::{CONNECTIONS, Charts, DATA_RECEIVED, DATA_SENT, DOWNLOAD_SPEED, UPLOAD_SPEED},
    series::{DATETIME_FORMAT, Point, Series, datetime_format, write_series},
};

/// One reading of the node's counters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snapshot {
    #[serde(with = "datetime_format")]
    pub datetime: NaiveDateTime,
    pub connections: i64,
    pub total_bytes_sent: i64,
    pub total_bytes_recv: i64,
}

pub fn open_db(path: &str) -> Result<Connection> {
    Ok(Connection::open(path)?)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
          ts TIMESTAMP,
          connections BIGINT,
          bytes_sent BIGINT,
          bytes_recv BIGINT
        );

        CREATE INDEX IF NOT EXISTS idx_samples_ts ON samples(ts);
        "#,
    )?;
    Ok(())
}

pub fn parse_snapshot(line: &str) -> Result<Snapshot> {
    serde_json::from_str(line).context("parse snapshot")
}

/// Reads JSONL snapshots into `samples`, returning (stored, skipped).
pub fn import_snapshots(conn: &mut Connection, rdr: impl BufRead) -> Result<(u64, u64)> {
    let mut ok: u64 = 0;
    let mut bad: u64 = 0;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO samples VALUES (CAST(? AS TIMESTAMP), ?, ?, ?)",
        )?;
        for (idx, line) in rdr.lines().enumerate() {
            // the unreadable bytes are already consumed, so the next line is intact
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    bad += 1;
                    tracing::warn!(line = idx + 1, error = %e, "skipping unreadable snapshot");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let snap = match parse_snapshot(&line) {
                Ok(s) => s,
                Err(e) => {
                    bad += 1;
                    tracing::warn!(line = idx + 1, error = %format!("{:#}", e), "skipping snapshot");
                    continue;
                }
            };
            stmt.execute(params![
                snap.datetime.format(DATETIME_FORMAT).to_string(),
                snap.connections,
                snap.total_bytes_sent,
                snap.total_bytes_recv
            ])?;
            ok += 1;

            if ok % 10000 == 0 {
                tracing::info!(ok, bad, "import progress");
            }
        }
    }
    tx.commit()?;

    Ok((ok, bad))
}

/// Samples in time order; with `hours`, only those within that many hours
/// of the newest sample.
pub fn load_samples(conn: &Connection, hours: Option<u32>) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT CAST(ts AS VARCHAR), connections, bytes_sent, bytes_recv
        FROM samples
        ORDER BY ts
        "#,
    )?;
    let mut rows = stmt.query(params![])?;

    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let ts: String = r.get(0)?;
        let datetime = NaiveDateTime::parse_from_str(&ts, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S%.f"))
            .with_context(|| format!("stored timestamp {:?}", ts))?;
        out.push(Snapshot {
            datetime,
            connections: r.get(1)?,
            total_bytes_sent: r.get(2)?,
            total_bytes_recv: r.get(3)?,
        });
    }

    if let (Some(h), Some(last)) = (hours, out.last().map(|s| s.datetime)) {
        // a window reaching past the earliest representable time keeps everything
        if let Some(cutoff) = last.checked_sub_signed(Duration::hours(i64::from(h))) {
            out.retain(|s| s.datetime >= cutoff);
        }
    }
    Ok(out)
}

fn series(title: &str, ylabel: &str, points: Vec<Point>) -> Series {
    Series {
        title: title.to_string(),
        xlabel: "Time".to_string(),
        ylabel: ylabel.to_string(),
        points,
    }
}

// kB/s between consecutive samples, dropping pairs across a counter reset
fn speeds(samples: &[Snapshot], counter: impl Fn(&Snapshot) -> i64) -> Vec<Point> {
    samples
        .windows(2)
        .filter_map(|w| {
            let secs = (w[1].datetime - w[0].datetime).num_milliseconds() as f64 / 1000.0;
            let delta = counter(&w[1]) - counter(&w[0]);
            if secs <= 0.0 || delta < 0 {
                return None;
            }
            Some(Point {
                datetime: w[1].datetime,
                y: delta as f64 / secs / 1e3,
            })
        })
        .collect()
}

/// The five chart series derived from ordered samples.
pub fn derive_series(samples: &[Snapshot]) -> Vec<(&'static str, Series)> {
    let points = |f: fn(&Snapshot) -> f64| -> Vec<Point> {
        samples
            .iter()
            .map(|s| Point {
                datetime: s.datetime,
                y: f(s),
            })
            .collect()
    };

    vec![
        (
            CONNECTIONS,
            series("Connections", "Connections", points(|s| s.connections as f64)),
        ),
        (
            DATA_SENT,
            series("Data sent", "MB", points(|s| s.total_bytes_sent as f64 / 1e6)),
        ),
        (
            DATA_RECEIVED,
            series("Data received", "MB", points(|s| s.total_bytes_recv as f64 / 1e6)),
        ),
        (
            UPLOAD_SPEED,
            series("Upload speed", "kB/s", speeds(samples, |s| s.total_bytes_sent)),
        ),
        (
            DOWNLOAD_SPEED,
            series("Download speed", "kB/s", speeds(samples, |s| s.total_bytes_recv)),
        ),
    ]
}

/// Writes the derived series to each chart's file, returning how many were written.
pub fn export(conn: &Connection, charts: &Charts, hours: Option<u32>) -> Result<usize> {
    let samples = load_samples(conn, hours)?;
    std::fs::create_dir_all(&charts.media_dir)
        .with_context(|| format!("create {}", charts.media_dir.display()))?;

    let mut written = 0;
    for (id, s) in derive_series(&samples) {
        let Some(src) = charts.get(id) else {
            continue;
        };
        let path = charts.path_of(src);
        write_series(&path, &s)?;
        tracing::info!(chart = id, points = s.points.len(), path = %path.display(), "exported");
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::load_series;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn snap(t: NaiveDateTime, c: i64, sent: i64, recv: i64) -> Snapshot {
        Snapshot {
            datetime: t,
            connections: c,
            total_bytes_sent: sent,
            total_bytes_recv: recv,
        }
    }

    const JSONL: &str = r#"{"datetime":"2016-05-01 12:00:00","connections":8,"total_bytes_sent":1000000,"total_bytes_recv":3000000}
not a snapshot

{"datetime":"2016-05-01 12:01:00","connections":9,"total_bytes_sent":1600000,"total_bytes_recv":3060000}
{"datetime":"2016-05-01 14:01:00","connections":10,"total_bytes_sent":100,"total_bytes_recv":200}
"#;

    #[test]
    fn speeds_skip_counter_resets() {
        let samples = vec![
            snap(at(12, 0), 8, 1_000_000, 3_000_000),
            snap(at(12, 1), 9, 1_600_000, 3_060_000),
            snap(at(12, 2), 9, 100, 3_120_000),
            snap(at(12, 2), 9, 200, 3_180_000),
        ];
        let derived = derive_series(&samples);
        let ids: Vec<_> = derived.iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            ["connections", "data_sent", "data_received", "upload_speed", "download_speed"]
        );

        let sent = &derived[1].1;
        assert_eq!(sent.ylabel, "MB");
        assert_eq!(sent.points[1].y, 1.6);

        let up = &derived[3].1;
        assert_eq!(up.points.len(), 1);
        assert_eq!(up.points[0].datetime, at(12, 1));
        assert_eq!(up.points[0].y, 10.0);

        let down = &derived[4].1;
        assert_eq!(down.points.len(), 2);
        assert_eq!(down.points[0].y, 1.0);
    }

    #[test]
    fn empty_samples_give_empty_series() {
        for (_, s) in derive_series(&[]) {
            assert!(s.points.is_empty());
            assert_eq!(s.xlabel, "Time");
        }
    }

    fn test_db(dir: &tempfile::TempDir) -> Connection {
        let db = dir.path().join("stats.duckdb");
        let conn = open_db(db.to_str().unwrap()).unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = test_db(&dir);

        let mut input = Vec::new();
        input.extend_from_slice(
            br#"{"datetime":"2016-05-01 12:00:00","connections":8,"total_bytes_sent":1,"total_bytes_recv":2}"#,
        );
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(
            br#"{"datetime":"2016-05-01 12:01:00","connections":9,"total_bytes_sent":3,"total_bytes_recv":4}"#,
        );
        input.push(b'\n');

        let (ok, bad) = import_snapshots(&mut conn, input.as_slice()).unwrap();
        assert_eq!((ok, bad), (2, 1));
        assert_eq!(load_samples(&conn, None).unwrap().len(), 2);
    }

    #[test]
    fn huge_hour_window_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = test_db(&dir);
        import_snapshots(&mut conn, JSONL.as_bytes()).unwrap();

        assert_eq!(load_samples(&conn, Some(u32::MAX)).unwrap().len(), 3);
        assert_eq!(load_samples(&conn, Some(0)).unwrap().len(), 1);
    }

    #[test]
    fn import_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = test_db(&dir);

        let (ok, bad) = import_snapshots(&mut conn, JSONL.as_bytes()).unwrap();
        assert_eq!((ok, bad), (3, 1));

        let all = load_samples(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], snap(at(12, 0), 8, 1_000_000, 3_000_000));

        let recent = load_samples(&conn, Some(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].datetime, at(14, 1));

        let media = dir.path().join("media");
        let charts = Charts::new(&media, vec![]);
        assert_eq!(export(&conn, &charts, None).unwrap(), 5);

        let conns = load_series(&media.join("connections.json")).unwrap();
        assert_eq!(conns.title, "Connections");
        assert_eq!(conns.points.len(), 3);
        let up = load_series(&media.join("upload_speed.json")).unwrap();
        assert_eq!(up.points.len(), 1);
        assert_eq!(up.points[0].y, 10.0);
    }
}
