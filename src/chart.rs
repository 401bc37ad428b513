use std::fmt::{self, Write};

use crate::{
    scale::{LinearScale, TimeScale, time_tick_format},
    series::Series,
};

#[derive(Debug, Clone, Copy)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Outer size of every chart and the margins around its plot area.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub outer_width: f64,
    pub outer_height: f64,
    pub margin: Margin,
    pub x_ticks: usize,
    pub y_ticks: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            outer_width: 800.0,
            outer_height: 350.0,
            margin: Margin {
                top: 60.0,
                right: 20.0,
                bottom: 50.0,
                left: 60.0,
            },
            x_ticks: 10,
            y_ticks: 8,
        }
    }
}

impl Layout {
    pub fn width(&self) -> f64 {
        self.outer_width - self.margin.left - self.margin.right
    }

    pub fn height(&self) -> f64 {
        self.outer_height - self.margin.top - self.margin.bottom
    }
}

pub const TOOLTIP_DATE_FORMAT: &str = "%d %b %H:%M";

const STYLE: &str = "\
.line { fill: none; stroke: steelblue; stroke-width: 2px; }
.marker { fill: steelblue; }
.axis path, .axis line { fill: none; stroke: steelblue; shape-rendering: crispEdges; }
.hover .focus { display: none; }
.hover:hover .focus { display: inline; }";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// two decimals is plenty for pixel coordinates
fn px(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn render_svg(id: &str, series: &Series) -> String {
    render_svg_with(&Layout::default(), id, series)
}

pub fn render_svg_with(layout: &Layout, id: &str, series: &Series) -> String {
    let mut svg = String::new();
    // fmt::Write for String never returns Err
    let _ = write_svg(&mut svg, layout, id, series);
    svg
}

fn write_svg(svg: &mut String, layout: &Layout, id: &str, series: &Series) -> fmt::Result {
    let width = layout.width();
    let height = layout.height();
    let m = layout.margin;

    write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" id="{}" width="{}" height="{}"><style>{}</style><g transform="translate({},{})">"#,
        escape(id),
        layout.outer_width,
        layout.outer_height,
        STYLE,
        m.left,
        m.top
    )?;

    match (series.x_extent(), series.y_max()) {
        (Some((t0, t1)), Some(y_max)) => {
            let x = TimeScale::new(t0, t1, width);
            let y = LinearScale::new(y_max + 1.0, height);
            draw_line(svg, series, &x, &y)?;
            draw_markers(svg, series, &x, &y)?;
            draw_hover_bands(svg, series, &x, &y, width, height)?;
            draw_x_axis(svg, &x, layout.x_ticks, width, height)?;
            draw_y_axis(svg, &y, layout.y_ticks, height)?;
        }
        _ => {
            write!(
                svg,
                r#"<text class="empty" x="{}" y="{}" style="text-anchor: middle; fill: white">no data</text>"#,
                width / 2.0,
                height / 2.0
            )?;
        }
    }

    draw_labels(svg, series, width, height, m.left, m.bottom)?;
    svg.push_str("</g></svg>");
    Ok(())
}

fn draw_line(svg: &mut String, series: &Series, x: &TimeScale, y: &LinearScale) -> fmt::Result {
    svg.push_str(r#"<path class="line" d=""#);
    for (i, p) in series.points.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        write!(svg, "{}{},{}", cmd, px(x.apply(p.datetime)), px(y.apply(p.y)))?;
    }
    svg.push_str(r#""/>"#);
    Ok(())
}

fn draw_markers(svg: &mut String, series: &Series, x: &TimeScale, y: &LinearScale) -> fmt::Result {
    for p in &series.points {
        write!(
            svg,
            r#"<circle class="marker" r="3" cx="{}" cy="{}"/>"#,
            px(x.apply(p.datetime)),
            px(y.apply(p.y))
        )?;
    }
    Ok(())
}

/// Horizontal span of the plot that selects each point, split at the
/// midpoints between neighbours.
pub fn hover_bands(xs: &[f64], width: f64) -> Vec<(f64, f64)> {
    let n = xs.len();
    (0..n)
        .map(|i| {
            let left = if i == 0 { 0.0 } else { (xs[i - 1] + xs[i]) / 2.0 };
            let right = if i + 1 == n { width } else { (xs[i] + xs[i + 1]) / 2.0 };
            (left.clamp(0.0, width), right.clamp(0.0, width))
        })
        .collect()
}

/// Integer shown in a tooltip; halves round up, -2.5 gives -2.
pub fn tooltip_value(y: f64) -> String {
    // + 0.0 folds -0 into 0
    format!("{}", (y + 0.5).floor() + 0.0)
}

fn draw_hover_bands(
    svg: &mut String,
    series: &Series,
    x: &TimeScale,
    y: &LinearScale,
    width: f64,
    height: f64,
) -> fmt::Result {
    let xs: Vec<f64> = series.points.iter().map(|p| x.apply(p.datetime)).collect();
    for ((p, (left, right)), cx) in series.points.iter().zip(hover_bands(&xs, width)).zip(&xs) {
        if right <= left {
            continue;
        }
        let cy = y.apply(p.y);
        let value = tooltip_value(p.y);
        let date = p.datetime.format(TOOLTIP_DATE_FORMAT).to_string();
        let tip = format!("translate({},{})", px(cx + 15.0), px(cy + 30.0));

        write!(
            svg,
            r#"<g class="hover"><rect x="{}" width="{}" height="{}" style="fill: none; pointer-events: all"/>"#,
            px(left),
            px(right - left),
            height
        )?;
        write!(
            svg,
            r#"<g class="focus"><circle class="y" r="6" transform="translate({},{})" style="fill: none; stroke-width: 3; stroke: white"/>"#,
            px(*cx),
            px(cy)
        )?;
        for (class, text, dy) in [("y1", &value, "-.3em"), ("y3", &date, "1em")] {
            write!(
                svg,
                r#"<text class="{}" dx="8" dy="{}" transform="{}" style="stroke: white; stroke-width: 3.5px; opacity: 0.8">{}</text>"#,
                class,
                dy,
                tip,
                escape(text)
            )?;
        }
        for (class, text, dy) in [("y2", &value, "-.3em"), ("y4", &date, "1em")] {
            write!(
                svg,
                r#"<text class="{}" dx="8" dy="{}" transform="{}">{}</text>"#,
                class,
                dy,
                tip,
                escape(text)
            )?;
        }
        svg.push_str("</g></g>");
    }
    Ok(())
}

fn draw_x_axis(svg: &mut String, x: &TimeScale, count: usize, width: f64, height: f64) -> fmt::Result {
    write!(
        svg,
        r#"<g class="x axis" transform="translate(0,{})" style="fill: steelblue">"#,
        height
    )?;
    for t in x.ticks(count) {
        write!(
            svg,
            r#"<g class="tick" transform="translate({},0)"><line y2="6"/><text y="9" dy=".71em" style="text-anchor: middle">{}</text></g>"#,
            px(x.apply(t)),
            escape(&time_tick_format(t))
        )?;
    }
    write!(svg, r#"<path class="domain" d="M0,6V0H{}V6"/></g>"#, width)?;
    Ok(())
}

fn draw_y_axis(svg: &mut String, y: &LinearScale, count: usize, height: f64) -> fmt::Result {
    svg.push_str(r#"<g class="y axis" style="fill: steelblue">"#);
    let label = y.tick_format(count);
    for v in y.ticks(count) {
        write!(
            svg,
            r#"<g class="tick" transform="translate(0,{})"><line x2="-6"/><text x="-9" dy=".32em" style="text-anchor: end">{}</text></g>"#,
            px(y.apply(v)),
            label(v)
        )?;
    }
    write!(svg, r#"<path class="domain" d="M-6,0H0V{}H-6"/></g>"#, height)?;
    Ok(())
}

fn draw_labels(svg: &mut String, series: &Series, width: f64, height: f64, left: f64, bottom: f64) -> fmt::Result {
    write!(
        svg,
        r#"<text class="xlabel" x="{}" y="{}" style="text-anchor: middle; fill: white">{}</text>"#,
        width / 2.0,
        height + bottom,
        escape(&series.xlabel)
    )?;
    write!(
        svg,
        r#"<text class="ylabel" transform="rotate(-90)" x="{}" y="{}" dy="1em" style="text-anchor: middle; fill: white">{}</text>"#,
        -height / 2.0,
        -left,
        escape(&series.ylabel)
    )?;
    write!(
        svg,
        r#"<text class="title" x="{}" y="-1em" style="text-anchor: middle; fill: white; font-size: 1.5em">{}</text>"#,
        width / 2.0,
        escape(&series.title)
    )?;
    Ok(())
}
