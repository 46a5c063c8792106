use std::{fs::File, io::BufWriter, path::Path};

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, LineDashPattern, Mm, PdfDocument,
    PdfLayerReference, Point, Rgb,
};

use crate::{
    chart::{Axis, Chart, ChartRenderer, colour, ticks},
    error::{Error, Result},
};

// 10 x 7.5 inches
const PAGE_WIDTH: f32 = 254.0;
const PAGE_HEIGHT: f32 = 190.5;

const MARGIN_LEFT: f32 = 28.0;
const MARGIN_RIGHT: f32 = 28.0;
const MARGIN_TOP: f32 = 18.0;
const LEGEND_ROW: f32 = 6.0;
const LEGEND_COLUMNS: usize = 4;

const TICK_COUNT: usize = 6;
const FONT_SIZE: f32 = 9.0;

/// Renders charts as single page PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl ChartRenderer for PdfRenderer {
    fn is_available(&self) -> bool {
        true
    }

    fn render(&self, chart: &Chart, path: &Path) -> Result<()> {
        let render_error = |message: String| Error::Render {
            path: path.to_path_buf(),
            message,
        };

        let title = chart.title.as_deref().unwrap_or("chart");
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "chart");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| render_error(format!("{e:?}")))?;
        let layer = doc.get_page(page).get_layer(layer);

        let frame = Frame::new(chart);
        draw_frame(&layer, &font, chart, &frame);

        let mut legend = Vec::new();
        draw_axis(&layer, chart, &frame, &chart.left, frame.left_range);
        legend.extend(legend_entries(&chart.left));
        if let Some(right) = &chart.right {
            let range = right.y_range();
            draw_value_ticks(&layer, &font, &frame, range, Side::Right, &right.label);
            draw_axis(&layer, chart, &frame, right, range);
            // Right-axis lines share colours with the left axis, so only the
            // line style is added to the legend.
            legend.push(LegendEntry {
                label: "objects".to_string(),
                colour: (0, 0, 0),
                dashed: true,
            });
        }
        draw_legend(&layer, &font, &frame, &legend);

        let file = File::create(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        doc.save(&mut BufWriter::new(file))
            .map_err(|e| render_error(format!("{e:?}")))
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

struct LegendEntry {
    label: String,
    colour: (u8, u8, u8),
    dashed: bool,
}

fn legend_entries(axis: &Axis) -> Vec<LegendEntry> {
    axis.series
        .iter()
        .enumerate()
        .map(|(i, s)| LegendEntry {
            label: s.label.clone(),
            colour: colour(i),
            dashed: axis.dashed,
        })
        .collect()
}

/// Plot area in page coordinates, millimetres from the bottom left.
struct Frame {
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    x_range: (f64, f64),
    left_range: (f64, f64),
}

impl Frame {
    fn new(chart: &Chart) -> Self {
        let entries = chart.left.series.len() + usize::from(chart.right.is_some());
        let rows = entries.div_ceil(LEGEND_COLUMNS).max(1);
        Self {
            left: MARGIN_LEFT,
            right: PAGE_WIDTH - MARGIN_RIGHT,
            bottom: 22.0 + rows as f32 * LEGEND_ROW,
            top: PAGE_HEIGHT - MARGIN_TOP,
            x_range: chart.x_range(),
            left_range: chart.left.y_range(),
        }
    }

    fn x(&self, value: f64) -> f32 {
        let (low, high) = self.x_range;
        self.left + ((value - low) / (high - low)) as f32 * (self.right - self.left)
    }

    fn y(&self, value: f64, (low, high): (f64, f64)) -> f32 {
        self.bottom + ((value - low) / (high - low)) as f32 * (self.top - self.bottom)
    }
}

fn point(x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x), Mm(y)), false)
}

fn stroke(layer: &PdfLayerReference, points: Vec<(Point, bool)>) {
    layer.add_line(Line {
        points,
        is_closed: false,
    });
}

fn set_colour(layer: &PdfLayerReference, (r, g, b): (u8, u8, u8)) {
    let c = Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ));
    layer.set_outline_color(c.clone());
    layer.set_fill_color(c);
}

fn set_dashed(layer: &PdfLayerReference, dashed: bool) {
    if dashed {
        layer.set_line_dash_pattern(LineDashPattern {
            dash_1: Some(2),
            gap_1: Some(2),
            ..LineDashPattern::default()
        });
    } else {
        layer.set_line_dash_pattern(LineDashPattern::default());
    }
}

fn draw_frame(layer: &PdfLayerReference, font: &IndirectFontRef, chart: &Chart, frame: &Frame) {
    set_colour(layer, (0, 0, 0));
    set_dashed(layer, false);
    layer.set_outline_thickness(0.6);
    stroke(
        layer,
        vec![
            point(frame.left, frame.top),
            point(frame.left, frame.bottom),
            point(frame.right, frame.bottom),
            point(frame.right, frame.top),
            point(frame.left, frame.top),
        ],
    );

    for tick in ticks(frame.x_range, TICK_COUNT) {
        let x = frame.x(tick);
        stroke(layer, vec![point(x, frame.bottom), point(x, frame.bottom - 1.5)]);
        layer.use_text(format_tick(tick), FONT_SIZE, Mm(x - 3.0), Mm(frame.bottom - 6.0), font);
    }
    layer.use_text(
        chart.x_label.as_str(),
        FONT_SIZE,
        Mm((frame.left + frame.right) / 2.0 - 8.0),
        Mm(frame.bottom - 12.0),
        font,
    );

    draw_value_ticks(layer, font, frame, frame.left_range, Side::Left, &chart.left.label);

    if let Some(title) = &chart.title {
        layer.use_text(
            title.as_str(),
            FONT_SIZE + 3.0,
            Mm(frame.left),
            Mm(frame.top + 6.0),
            font,
        );
    }
}

fn draw_value_ticks(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    frame: &Frame,
    range: (f64, f64),
    side: Side,
    label: &str,
) {
    set_colour(layer, (0, 0, 0));
    set_dashed(layer, false);
    let (edge, outward, text_x, label_x) = match side {
        Side::Left => (frame.left, -1.5, frame.left - 14.0, frame.left - 24.0),
        Side::Right => (frame.right, 1.5, frame.right + 3.0, frame.right + 14.0),
    };
    for tick in ticks(range, TICK_COUNT) {
        let y = frame.y(tick, range);
        stroke(layer, vec![point(edge, y), point(edge + outward, y)]);
        layer.use_text(format_tick(tick), FONT_SIZE, Mm(text_x), Mm(y - 1.0), font);
    }
    layer.use_text(
        label,
        FONT_SIZE,
        Mm(label_x),
        Mm(frame.top + 2.0),
        font,
    );
}

fn draw_axis(
    layer: &PdfLayerReference,
    chart: &Chart,
    frame: &Frame,
    axis: &Axis,
    range: (f64, f64),
) {
    layer.set_outline_thickness(0.8);
    set_dashed(layer, axis.dashed);
    for (i, series) in axis.series.iter().enumerate() {
        let points: Vec<_> = chart
            .times
            .iter()
            .zip(&series.values)
            .map(|(&t, &v)| point(frame.x(t), frame.y(v, range)))
            .collect();
        if points.len() < 2 {
            continue;
        }
        set_colour(layer, colour(i));
        stroke(layer, points);
    }
    set_dashed(layer, false);
}

fn draw_legend(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    frame: &Frame,
    entries: &[LegendEntry],
) {
    let column_width = (frame.right - frame.left) / LEGEND_COLUMNS as f32;
    layer.set_outline_thickness(0.8);
    for (i, entry) in entries.iter().enumerate() {
        let row = (i / LEGEND_COLUMNS) as f32;
        let x = frame.left + (i % LEGEND_COLUMNS) as f32 * column_width;
        let y = frame.bottom - 20.0 - row * LEGEND_ROW;

        set_colour(layer, entry.colour);
        set_dashed(layer, entry.dashed);
        stroke(layer, vec![point(x, y + 1.0), point(x + 8.0, y + 1.0)]);

        set_dashed(layer, false);
        set_colour(layer, (0, 0, 0));
        layer.use_text(entry.label.as_str(), FONT_SIZE, Mm(x + 10.0), Mm(y), font);
    }
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
