use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::{
    chart::{escape, render_svg},
    config::Charts,
    series::load_series,
};

pub const PAGE_TITLE: &str = "Node statistics";

/// A chart as it ends up on the page: its SVG, or why it could not be drawn.
pub struct Rendered {
    pub id: String,
    pub svg: Result<String>,
}

pub fn render_all(charts: &Charts) -> Vec<Rendered> {
    charts
        .sources
        .iter()
        .map(|src| {
            let svg = load_series(&charts.path_of(src)).map(|s| render_svg(&src.id, &s));
            if let Err(e) = &svg {
                tracing::warn!(chart = %src.id, error = %format!("{:#}", e), "chart failed to load");
            }
            Rendered {
                id: src.id.clone(),
                svg,
            }
        })
        .collect()
}

pub fn render_page(title: &str, charts: &[Rendered]) -> String {
    let mut body = String::new();
    for c in charts {
        match &c.svg {
            Ok(svg) => body.push_str(svg),
            Err(e) => body.push_str(&format!(
                r#"<div class="chart-error" id="{id}-error"><h2>{id}</h2><p>{err}</p></div>"#,
                id = escape(&c.id),
                err = escape(&format!("{:#}", e))
            )),
        }
        body.push('\n');
    }

    PAGE_HTML
        .replace("{{title}}", &escape(title))
        .replace("{{plots}}", &body)
}

/// Writes `<id>.svg` for every chart plus `index.html` into `out`,
/// returning the number of charts. Any chart that fails to load is an error.
pub fn write_rendered(charts: &Charts, out: &Path) -> Result<usize> {
    std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;

    let rendered = render_all(charts);
    for r in &rendered {
        let svg = r
            .svg
            .as_ref()
            .map_err(|e| anyhow!("chart {}: {:#}", r.id, e))?;
        let path = out.join(format!("{}.svg", r.id));
        std::fs::write(&path, svg).with_context(|| format!("write {}", path.display()))?;
    }

    let index = out.join("index.html");
    std::fs::write(&index, render_page(PAGE_TITLE, &rendered))
        .with_context(|| format!("write {}", index.display()))?;
    Ok(rendered.len())
}

const PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{title}}</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1d2127;
            color: white;
            margin: 0;
            padding: 20px;
        }
        h1 { font-size: 2rem; margin-bottom: 20px; }
        #plot { display: flex; flex-direction: column; align-items: center; gap: 20px; }
        #plot svg { font-size: 12px; }
        .line { fill: none; stroke: steelblue; stroke-width: 2px; }
        .marker { fill: steelblue; }
        .chart-error {
            width: 760px;
            padding: 20px;
            border-left: 4px solid #dc2626;
            background: #2a2f37;
        }
        .chart-error p { color: #fca5a5; font-family: monospace; }
    </style>
</head>
<body>
    <h1>{{title}}</h1>
    <div id="plot">
{{plots}}    </div>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChartSource, Charts};

    #[test]
    fn page_keeps_order_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("connections.json"),
            r#"{"title":"Connections","points":[{"datetime":"2016-05-01 12:00:00","y":8}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("data_sent.json"), "not json").unwrap();

        let charts = Charts::new(dir.path(), vec![]);
        let rendered = render_all(&charts);
        assert_eq!(rendered.len(), 5);
        assert!(rendered[0].svg.is_ok());
        assert!(rendered[1].svg.is_err());

        let html = render_page(PAGE_TITLE, &rendered);
        assert!(html.contains("<title>Node statistics</title>"));
        let conn = html.find(r#"<svg xmlns="http://www.w3.org/2000/svg" id="connections""#).unwrap();
        let sent = html.find(r#"id="data_sent-error""#).unwrap();
        let down = html.find(r#"id="download_speed-error""#).unwrap();
        assert!(conn < sent && sent < down);
        assert!(html.contains("data_received.json"));
    }

    fn write_all_defaults(dir: &Path) {
        for id in ["connections", "data_sent", "data_received", "upload_speed", "download_speed"] {
            std::fs::write(
                dir.join(format!("{}.json", id)),
                r#"{"title":"T","points":[{"datetime":"2016-05-01 12:00:00","y":1}]}"#,
            )
            .unwrap();
        }
    }

    #[test]
    fn writes_every_svg_and_index() {
        let media = tempfile::tempdir().unwrap();
        write_all_defaults(media.path());
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("site");

        let charts = Charts::new(media.path(), vec![]);
        assert_eq!(write_rendered(&charts, &target).unwrap(), 5);

        for src in &charts.sources {
            let svg = std::fs::read_to_string(target.join(format!("{}.svg", src.id))).unwrap();
            assert!(svg.contains(&format!(r#"id="{}""#, src.id)));
        }
        let index = std::fs::read_to_string(target.join("index.html")).unwrap();
        assert_eq!(index.matches("<svg ").count(), 5);
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 6);
    }

    #[test]
    fn missing_file_fails_with_chart_id() {
        let media = tempfile::tempdir().unwrap();
        write_all_defaults(media.path());
        std::fs::remove_file(media.path().join("data_received.json")).unwrap();
        let out = tempfile::tempdir().unwrap();

        let charts = Charts::new(media.path(), vec![]);
        let err = write_rendered(&charts, out.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("chart data_received"));
        assert!(!out.path().join("index.html").exists());
    }

    #[test]
    fn override_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("peers.json"),
            r#"{"title":"Peers","points":[]}"#,
        )
        .unwrap();
        let charts = Charts::new(dir.path(), vec![ChartSource::new("connections", "peers.json")]);
        let rendered = render_all(&charts);
        let svg = rendered[0].svg.as_ref().unwrap();
        assert!(svg.contains(">Peers</text>"));
    }
}
