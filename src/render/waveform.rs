//! Time-domain view of one output channel
//!
//! Draws the frame's sound window as a trace and the wavepoint as a
//! horizontal level line across it.

use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

use crate::node::ChannelOutput;

/// Display settings for the waveform view
#[derive(Clone)]
pub struct WaveformSettings {
    pub color: Color32,
    pub level_color: Color32,
    pub background: Color32,
    pub line_width: f32,
    pub zoom: f32,
    pub show_graticule: bool,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            color: Color32::from_rgb(100, 255, 100),
            level_color: Color32::from_rgb(255, 180, 60),
            background: Color32::from_rgb(10, 20, 10),
            line_width: 1.5,
            zoom: 1.0,
            show_graticule: true,
        }
    }
}

pub struct WaveformView {
    pub settings: WaveformSettings,
}

impl Default for WaveformView {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformView {
    pub fn new() -> Self {
        Self {
            settings: WaveformSettings::default(),
        }
    }

    fn value_to_y(&self, value: f32, rect: Rect) -> f32 {
        let norm = (value / self.settings.zoom).clamp(-1.0, 1.0);
        rect.center().y - norm * rect.height() * 0.5
    }

    pub fn show(&self, ui: &mut egui::Ui, output: &ChannelOutput, size: Vec2) -> egui::Response {
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;

        painter.rect_filled(rect, 4.0, self.settings.background);

        if self.settings.show_graticule {
            self.draw_graticule(&painter, rect);
        }

        let samples: Vec<f32> = output.sound.samples().collect();
        self.draw_trace(&painter, rect, &samples);
        self.draw_level(&painter, rect, output.wavepoint);

        response
    }

    fn draw_graticule(&self, painter: &egui::Painter, rect: Rect) {
        let grid_color = Color32::from_rgba_unmultiplied(60, 80, 60, 100);
        let axis_color = Color32::from_rgba_unmultiplied(80, 100, 80, 150);

        let stroke_grid = Stroke::new(0.5, grid_color);
        let stroke_axis = Stroke::new(1.0, axis_color);

        for i in 0..=10 {
            let x = rect.left() + i as f32 / 10.0 * rect.width();
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke_grid);
        }
        for i in 0..=4 {
            let y = rect.top() + i as f32 / 4.0 * rect.height();
            let stroke = if i == 2 { stroke_axis } else { stroke_grid };
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        }
    }

    /// One min/max bar per pixel column, oldest sample on the left
    fn draw_trace(&self, painter: &egui::Painter, rect: Rect, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let stroke = Stroke::new(self.settings.line_width, self.settings.color);
        let columns = (rect.width().max(1.0) as usize).min(samples.len());
        let per_column = samples.len() as f32 / columns as f32;

        for col in 0..columns {
            let from = (col as f32 * per_column) as usize;
            let to = (((col + 1) as f32 * per_column) as usize).clamp(from + 1, samples.len());
            let (lo, hi) = samples[from..to]
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));

            let x = rect.left() + (col as f32 + 0.5) / columns as f32 * rect.width();
            let top = self.value_to_y(hi, rect);
            let bottom = self.value_to_y(lo, rect);
            painter.line_segment([Pos2::new(x, top), Pos2::new(x, bottom.max(top + 0.5))], stroke);
        }
    }

    fn draw_level(&self, painter: &egui::Painter, rect: Rect, level: f32) {
        let y = self.value_to_y(level, rect);
        painter.line_segment(
            [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
            Stroke::new(1.0, self.settings.level_color),
        );
    }
}
