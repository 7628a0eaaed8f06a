use std::path::{Path, PathBuf};

use plotters::{
    coord::{Shift, combinators::WithKeyPoints, types::RangedCoordi32},
    prelude::*,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::ChartSettings,
    util::{positive_bounds, series_max, stacked_max},
};

/// Matplotlib's default color cycle
pub const PALETTE: [RGBColor; 10] = [
    RGBColor(0x1f, 0x77, 0xb4),
    RGBColor(0xff, 0x7f, 0x0e),
    RGBColor(0x2c, 0xa0, 0x2c),
    RGBColor(0xd6, 0x27, 0x28),
    RGBColor(0x94, 0x67, 0xbd),
    RGBColor(0x8c, 0x56, 0x4b),
    RGBColor(0xe3, 0x77, 0xc2),
    RGBColor(0x7f, 0x7f, 0x7f),
    RGBColor(0xbc, 0xbd, 0x22),
    RGBColor(0x17, 0xbe, 0xcf),
];

/// X axis units per category slot
const SLOT: i32 = 100;
/// Units of a slot covered by its bars
const BAR_SPAN: i32 = 80;
/// Fraction of the image width given to the plot when the legend is drawn outside
const LEGEND_SPLIT: f64 = 0.6;
const FONT: &str = "sans-serif";

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Invalid chart data: {0}")]
    InvalidData(String),
    #[error("Drawing {}: {}", .0.display(), .1)]
    Drawing(PathBuf, String),
}

type Result<T> = core::result::Result<T, PlotError>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BarLayout {
    #[default]
    Stacked,
    Grouped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum YScale {
    #[default]
    Linear,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
    /// Falls back to [`PALETTE`] by position when unset
    pub color: Option<RGBColor>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            color: None,
        }
    }

    pub fn with_color(mut self, color: RGBColor) -> Self {
        self.color = Some(color);
        self
    }

    fn color_or(&self, idx: usize) -> RGBColor {
        self.color.unwrap_or(PALETTE[idx % PALETTE.len()])
    }
}

/// One bar chart with a category x axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BarChartSpec {
    pub path: PathBuf,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// One label per bar slot, left to right
    pub categories: Vec<String>,
    pub bars: Vec<Series>,
    /// Line with markers drawn over the bar centres
    pub overlay: Option<Series>,
    pub layout: BarLayout,
    pub y_scale: YScale,
}

impl BarChartSpec {
    fn all_series(&self) -> impl Iterator<Item = &Series> {
        self.bars.iter().chain(self.overlay.iter())
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(PlotError::InvalidData("No categories".to_owned()));
        }
        if self.bars.is_empty() {
            return Err(PlotError::InvalidData("No bar series".to_owned()));
        }
        if let Some(series) = self
            .all_series()
            .find(|s| s.values.len() != self.categories.len())
        {
            return Err(PlotError::InvalidData(format!(
                "Series {} has {} values for {} categories",
                series.name,
                series.values.len(),
                self.categories.len()
            )));
        }
        if self.y_scale == YScale::Log
            && positive_bounds(&self.all_series().cloned().collect::<Vec<_>>()).is_none()
        {
            return Err(PlotError::InvalidData(
                "Log scale needs at least one positive value".to_owned(),
            ));
        }
        Ok(())
    }
}

fn drawing<E: ToString>(path: &Path) -> impl Fn(E) -> PlotError + '_ {
    move |e| PlotError::Drawing(path.to_path_buf(), e.to_string())
}

/// Label for the x axis tick at `x`; ticks only sit on the category centres.
fn category_label(categories: &[String], x: i32) -> String {
    if x < 0 || x % SLOT != 0 {
        return String::new();
    }
    categories
        .get((x / SLOT) as usize)
        .cloned()
        .unwrap_or_default()
}

fn bar_value(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

/// Corners of the bar for `series` in `category`. Stacked bars span the whole
/// slot and start at `bottom`, grouped bars split the slot and start at zero.
/// Both ends are clamped to `floor`.
fn bar_corners(
    layout: BarLayout,
    series: usize,
    bars: usize,
    category: usize,
    bottom: f64,
    value: f64,
    floor: f64,
) -> [(i32, f64); 2] {
    let start = category as i32 * SLOT - BAR_SPAN / 2;
    let (left, right, bottom) = match layout {
        BarLayout::Stacked => (start, start + BAR_SPAN, bottom),
        BarLayout::Grouped => {
            let (idx, bars) = (series as i32, bars.max(1) as i32);
            (
                start + idx * BAR_SPAN / bars,
                start + (idx + 1) * BAR_SPAN / bars,
                0.0,
            )
        }
    };
    [(left, bottom.max(floor)), (right, (bottom + value).max(floor))]
}

/// Renders `spec` into a PNG at `spec.path`, overwriting it.
pub fn render_bar_chart(spec: &BarChartSpec, settings: &ChartSettings) -> Result<()> {
    spec.validate()?;
    debug!(
        "Rendering {} ({:?}, {:?}) with {} categories",
        spec.path.display(),
        spec.layout,
        spec.y_scale,
        spec.categories.len()
    );

    let root = BitMapBackend::new(&spec.path, (settings.width, settings.height)).into_drawing_area();
    root.fill(&WHITE).map_err(drawing(&spec.path))?;
    match spec.y_scale {
        YScale::Linear => draw_linear(&root, spec)?,
        YScale::Log => draw_log(&root, spec, settings)?,
    }
    root.present().map_err(drawing(&spec.path))?;
    Ok(())
}

/// Category `i` is centred on `i * SLOT`.
fn x_range(spec: &BarChartSpec) -> WithKeyPoints<RangedCoordi32> {
    let n = spec.categories.len() as i32;
    (-SLOT / 2..n * SLOT - SLOT / 2).with_key_points((0..n).map(|i| i * SLOT).collect())
}

fn draw_linear(root: &DrawingArea<BitMapBackend<'_>, Shift>, spec: &BarChartSpec) -> Result<()> {
    let top = match spec.layout {
        BarLayout::Stacked => stacked_max(&spec.bars),
        BarLayout::Grouped => series_max(&spec.bars),
    };
    let top = spec
        .overlay
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(top, f64::max);
    let top = if top > 0.0 { top * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, (FONT, 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range(spec), 0f64..top)
        .map_err(drawing(&spec.path))?;

    let x_formatter = |x: &i32| category_label(&spec.categories, *x);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(&spec.x_label)
        .y_desc(&spec.y_label)
        .x_label_formatter(&x_formatter)
        .label_style((FONT, 20))
        .axis_desc_style((FONT, 24))
        .draw()
        .map_err(drawing(&spec.path))?;

    draw_bars(&mut chart, spec, 0.0)?;
    draw_overlay(&mut chart, spec, 0.0)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((FONT, 18))
        .draw()
        .map_err(drawing(&spec.path))?;
    Ok(())
}

fn draw_log(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    spec: &BarChartSpec,
    settings: &ChartSettings,
) -> Result<()> {
    let all = spec.all_series().cloned().collect::<Vec<_>>();
    let (lo, hi) = positive_bounds(&all)
        .ok_or_else(|| PlotError::InvalidData("No positive values".to_owned()))?;
    let floor = 10f64.powf(lo.log10().floor());
    let mut ceil = 10f64.powf(hi.log10().ceil());
    if ceil <= floor {
        ceil = floor * 10.0;
    }

    let area = root
        .titled(&spec.title, (FONT, 32))
        .map_err(drawing(&spec.path))?;
    let split = (settings.width as f64 * LEGEND_SPLIT) as i32;
    let (plot_area, legend_area) = area.split_horizontally(split);

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range(spec), (floor..ceil).log_scale())
        .map_err(drawing(&spec.path))?;

    let x_formatter = |x: &i32| category_label(&spec.categories, *x);
    let y_formatter = |y: &f64| format!("{y:.0e}");
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(&spec.x_label)
        .y_desc(&spec.y_label)
        .x_label_formatter(&x_formatter)
        .y_label_formatter(&y_formatter)
        .label_style((FONT, 20))
        .axis_desc_style((FONT, 24))
        .draw()
        .map_err(drawing(&spec.path))?;

    draw_bars(&mut chart, spec, floor)?;
    draw_overlay(&mut chart, spec, floor)?;
    draw_side_legend(&legend_area, spec)?;
    Ok(())
}

/// Bars start at `floor`, which is the bottom of the axis for log charts.
fn draw_bars<X, Y>(
    chart: &mut ChartContext<'_, BitMapBackend<'_>, Cartesian2d<X, Y>>,
    spec: &BarChartSpec,
    floor: f64,
) -> Result<()>
where
    X: Ranged<ValueType = i32>,
    Y: Ranged<ValueType = f64>,
{
    let mut offsets = vec![0.0f64; spec.categories.len()];

    for (idx, series) in spec.bars.iter().enumerate() {
        let color = series.color_or(idx);
        let rects = series
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let corners = bar_corners(
                    spec.layout,
                    idx,
                    spec.bars.len(),
                    i,
                    offsets[i],
                    bar_value(*v),
                    floor,
                );
                Rectangle::new(corners, color.filled())
            })
            .collect::<Vec<_>>();

        chart
            .draw_series(rects)
            .map_err(drawing(&spec.path))?
            .label(&series.name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], color.filled()));

        if spec.layout == BarLayout::Stacked {
            for (offset, v) in offsets.iter_mut().zip(&series.values) {
                *offset += bar_value(*v);
            }
        }
    }
    Ok(())
}

fn draw_overlay<X, Y>(
    chart: &mut ChartContext<'_, BitMapBackend<'_>, Cartesian2d<X, Y>>,
    spec: &BarChartSpec,
    floor: f64,
) -> Result<()>
where
    X: Ranged<ValueType = i32>,
    Y: Ranged<ValueType = f64>,
{
    let Some(overlay) = &spec.overlay else {
        return Ok(());
    };
    let color = overlay.color_or(spec.bars.len());
    let points = overlay
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as i32 * SLOT, bar_value(*v).max(floor)))
        .collect::<Vec<_>>();

    chart
        .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
        .map_err(drawing(&spec.path))?
        .label(&overlay.name)
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 12, y)], color.stroke_width(2)));
    chart
        .draw_series(points.into_iter().map(|p| Circle::new(p, 5, color.filled())))
        .map_err(drawing(&spec.path))?;
    Ok(())
}

/// Legend in its own area, vertically centred, left aligned.
fn draw_side_legend(area: &DrawingArea<BitMapBackend<'_>, Shift>, spec: &BarChartSpec) -> Result<()> {
    const ROW: i32 = 28;
    let entries = spec
        .bars
        .iter()
        .enumerate()
        .map(|(idx, s)| (s, s.color_or(idx)))
        .chain(spec.overlay.iter().map(|s| (s, s.color_or(spec.bars.len()))))
        .collect::<Vec<_>>();

    let (_, height) = area.dim_in_pixel();
    let top = height as i32 / 2 - entries.len() as i32 * ROW / 2;
    for (row, (series, color)) in entries.into_iter().enumerate() {
        let y = top + row as i32 * ROW;
        area.draw(&Rectangle::new([(10, y), (30, y + 20)], color.filled()))
            .map_err(drawing(&spec.path))?;
        area.draw(&Rectangle::new([(10, y), (30, y + 20)], BLACK))
            .map_err(drawing(&spec.path))?;
        area.draw(&Text::new(
            series.name.clone(),
            (40, y + 2),
            (FONT, 18).into_font().color(&BLACK),
        ))
        .map_err(drawing(&spec.path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(y_scale: YScale, layout: BarLayout) -> BarChartSpec {
        BarChartSpec {
            path: PathBuf::from("chart.png"),
            title: "title".to_owned(),
            x_label: "x".to_owned(),
            y_label: "y".to_owned(),
            categories: vec!["1".to_owned(), "4".to_owned(), "8".to_owned()],
            bars: vec![
                Series::new("a", vec![0.1, 0.2, 0.4]),
                Series::new("b", vec![0.01, 0.0, 1.5]).with_color(BLACK),
            ],
            overlay: Some(Series::new("line", vec![0.5, 0.7, 2.0])),
            layout,
            y_scale,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec(YScale::Linear, BarLayout::Stacked).validate().is_ok());
        assert!(spec(YScale::Log, BarLayout::Grouped).validate().is_ok());
    }

    #[test]
    fn mismatched_series_is_rejected() {
        let mut chart = spec(YScale::Linear, BarLayout::Stacked);
        chart.overlay = Some(Series::new("line", vec![1.0]));
        let err = chart.validate().unwrap_err();
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn empty_chart_is_rejected() {
        let mut chart = spec(YScale::Linear, BarLayout::Stacked);
        chart.categories.clear();
        assert!(matches!(chart.validate(), Err(PlotError::InvalidData(_))));

        let mut chart = spec(YScale::Linear, BarLayout::Stacked);
        chart.bars.clear();
        assert!(matches!(chart.validate(), Err(PlotError::InvalidData(_))));
    }

    #[test]
    fn log_scale_needs_positive_values() {
        let mut chart = spec(YScale::Log, BarLayout::Grouped);
        chart.bars = vec![Series::new("zero", vec![0.0, 0.0, 0.0])];
        chart.overlay = None;
        assert!(matches!(chart.validate(), Err(PlotError::InvalidData(_))));
    }

    #[test]
    fn labels_only_on_category_centres() {
        let categories = vec!["2".to_owned(), "16".to_owned()];
        assert_eq!(category_label(&categories, 0), "2");
        assert_eq!(category_label(&categories, SLOT), "16");
        assert_eq!(category_label(&categories, SLOT / 2), "");
        assert_eq!(category_label(&categories, -SLOT), "");
        assert_eq!(category_label(&categories, 2 * SLOT), "");
    }

    #[test]
    fn stacked_bars_sit_on_the_previous_ones() {
        let [low, high] = bar_corners(BarLayout::Stacked, 1, 2, 1, 0.3, 0.2, 0.0);
        assert_eq!(low, (SLOT - BAR_SPAN / 2, 0.3));
        assert_eq!(high.0, SLOT + BAR_SPAN / 2);
        assert!((high.1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn grouped_bars_split_the_slot_and_clamp_to_floor() {
        let first = bar_corners(BarLayout::Grouped, 0, 2, 0, 0.7, 1e-4, 1e-3);
        let second = bar_corners(BarLayout::Grouped, 1, 2, 0, 0.7, 5.0, 1e-3);
        assert_eq!(first, [(-BAR_SPAN / 2, 1e-3), (0, 1e-3)]);
        assert_eq!(second, [(0, 1e-3), (BAR_SPAN / 2, 5.0)]);
    }

    #[test]
    fn palette_fallback_by_position() {
        let chart = spec(YScale::Linear, BarLayout::Stacked);
        assert_eq!(chart.bars[0].color_or(0), PALETTE[0]);
        assert_eq!(chart.bars[1].color_or(1), BLACK);
        assert_eq!(Series::new("s", vec![]).color_or(12), PALETTE[2]);
    }

    #[test]
    #[ignore = "needs a system sans-serif font"]
    fn renders_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ChartSettings::default();
        for (name, scale, layout) in [
            ("stacked.png", YScale::Linear, BarLayout::Stacked),
            ("log.png", YScale::Log, BarLayout::Grouped),
        ] {
            let mut chart = spec(scale, layout);
            chart.path = dir.path().join(name);
            render_bar_chart(&chart, &settings).unwrap();
            assert!(chart.path.metadata().unwrap().len() > 0);
        }
    }
}
