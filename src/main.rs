//! livewave - Live audio input for frame-driven animation
//!
//! Captures audio from an input device and, once per rendered frame, turns
//! the recent history into a timed sound window and a smoothed wavepoint.
//!
//! The window here plays the part of an animation host: it advances a frame
//! counter at a fixed frame rate, executes the live sound node once per
//! repaint, and draws each output channel.

use std::time::Instant;

use eframe::egui;

mod audio;
mod node;
mod render;
mod settings;
mod sound;

use audio::{CpalBackend, DeviceRegistry, StreamManager};
use node::{device_choices, ChannelOutput, LiveSoundNode, NodeConfig, NodeError, SocketKind};
use render::WaveformView;
use settings::AppSettings;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Starting livewave");

    let settings = AppSettings::load();

    let backend = CpalBackend::new();
    let registry = DeviceRegistry::query(&backend)?;
    let mut manager = StreamManager::new(
        Box::new(backend),
        registry,
        settings.sample_rate,
        settings.retention,
    );

    let node = match LiveSoundNode::create(&mut manager, settings.node.clone(), settings.sequence_api) {
        Err(NodeError::InvalidDeviceId(id)) => {
            log::warn!("Saved device '{}' is gone, using the first input device", id);
            let config = NodeConfig {
                device_id: String::new(),
                ..settings.node.clone()
            };
            LiveSoundNode::create(&mut manager, config, settings.sequence_api)?
        }
        result => result?,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 600.0])
            .with_title("livewave"),
        ..Default::default()
    };

    eframe::run_native(
        "livewave",
        options,
        Box::new(move |_cc| Ok(Box::new(LiveWaveApp::new(manager, node, settings)))),
    )?;

    Ok(())
}

struct LiveWaveApp {
    manager: StreamManager,
    /// Taken on shutdown so the stream can be released
    node: Option<LiveSoundNode>,
    settings: AppSettings,
    view: WaveformView,
    started: Instant,
    show_settings: bool,
    /// Last stream configuration seen, see `StreamManager::revision`
    revision: u64,
}

impl LiveWaveApp {
    fn new(manager: StreamManager, node: LiveSoundNode, settings: AppSettings) -> Self {
        let mut view = WaveformView::new();
        view.settings.line_width = settings.line_width;
        view.settings.zoom = settings.zoom;
        view.settings.show_graticule = settings.show_graticule;

        Self {
            manager,
            node: Some(node),
            settings,
            view,
            started: Instant::now(),
            show_settings: true,
            revision: 0,
        }
    }

    /// Host frame number derived from wall-clock time
    fn current_frame(&self) -> f64 {
        (self.started.elapsed().as_secs_f64() * self.settings.fps).floor()
    }

    fn settings_panel(&mut self, ui: &mut egui::Ui) {
        let Some(node) = self.node.as_mut() else {
            return;
        };

        ui.heading("Live sound input");
        ui.separator();

        let choices = device_choices(self.manager.registry());
        let selected = node.config().device_id.clone();
        let selected_name = choices
            .iter()
            .find(|(id, _)| *id == selected)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| "None".to_string());

        ui.label("Audio device:");
        egui::ComboBox::from_id_salt("device")
            .selected_text(selected_name)
            .show_ui(ui, |ui| {
                for (id, name) in &choices {
                    if ui.selectable_label(*id == selected, name).clicked() && *id != selected {
                        if let Err(e) = node.set_device(&mut self.manager, id) {
                            log::error!("Failed to switch device: {}", e);
                        }
                    }
                }
            });

        ui.horizontal(|ui| {
            ui.label("Gain:");
            let mut gain = node.config().gain;
            if ui.add(egui::Slider::new(&mut gain, 0.0..=10.0)).changed() {
                node.set_gain(gain);
            }
        });

        ui.horizontal(|ui| {
            ui.label("Frame offset:");
            let mut offset = node.config().frame_offset;
            if ui.add(egui::DragValue::new(&mut offset)).changed() {
                node.set_frame_offset(offset);
            }
        });

        let mut mono = node.config().mono;
        if ui.checkbox(&mut mono, "Mono").changed() {
            node.set_mono(&self.manager, mono);
        }

        ui.separator();

        ui.collapsing("Display", |ui| {
            ui.horizontal(|ui| {
                ui.label("Zoom:");
                ui.add(egui::Slider::new(&mut self.view.settings.zoom, 0.05..=2.0));
            });
            ui.horizontal(|ui| {
                ui.label("Line width:");
                ui.add(egui::Slider::new(&mut self.view.settings.line_width, 0.5..=5.0));
            });
            ui.checkbox(&mut self.view.settings.show_graticule, "Show grid");
        });
    }

    fn execute_frame(&self, frame: f64) -> Vec<ChannelOutput> {
        let Some(node) = self.node.as_ref() else {
            return Vec::new();
        };
        match node.execute(&self.manager, frame, self.settings.fps) {
            Ok(outputs) => outputs,
            Err(e) => {
                log::error!("Frame {} failed: {}", frame, e);
                Vec::new()
            }
        }
    }
}

impl eframe::App for LiveWaveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("livewave");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_settings, "⚙ Settings");
                });
            });
        });

        if self.show_settings {
            egui::SidePanel::right("settings_panel")
                .min_width(220.0)
                .show(ctx, |ui| self.settings_panel(ui));
        }

        if self.manager.revision() != self.revision {
            self.revision = self.manager.revision();
            log::debug!("Stream configuration changed (revision {})", self.revision);
        }

        let frame = self.current_frame();
        let outputs = self.execute_frame(frame);
        let labels: Vec<String> = self
            .node
            .as_ref()
            .map(|node| {
                node.outputs()
                    .sockets()
                    .iter()
                    .filter(|s| s.kind == SocketKind::Sound)
                    .map(|s| s.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        egui::CentralPanel::default().show(ctx, |ui| {
            let status_height = 24.0;
            let available = ui.available_size();
            let rows = outputs.len().max(1) as f32;
            let row_height = ((available.y - status_height) / rows - 8.0).max(40.0);

            for (output, label) in outputs.iter().zip(&labels) {
                ui.small(format!("{}  wavepoint {:+.4}", label, output.wavepoint));
                self.view
                    .show(ui, output, egui::vec2(available.x, row_height - 16.0));
            }

            ui.with_layout(egui::Layout::bottom_up(egui::Align::LEFT), |ui| {
                ui.horizontal(|ui| {
                    ui.small(format!("Frame: {} @ {:.2} fps", frame, self.settings.fps));
                    if let Some(node) = &self.node {
                        let device = node.device_index();
                        ui.separator();
                        let state = if self.manager.is_streaming(device) {
                            "capturing"
                        } else {
                            "no stream"
                        };
                        ui.small(format!("Device {}: {}", device, state));
                        if let Some(buffer) = self.manager.buffer(device) {
                            ui.separator();
                            ui.small(format!(
                                "Retained: {} | Total: {}",
                                buffer.retained_frames(),
                                buffer.frames_written()
                            ));
                        }
                    }
                });
            });
        });
    }
}

impl Drop for LiveWaveApp {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.settings.node = node.config().clone();
            node.delete(&mut self.manager);
        }
        self.settings.line_width = self.view.settings.line_width;
        self.settings.zoom = self.view.settings.zoom;
        self.settings.show_graticule = self.view.settings.show_graticule;
        self.settings.save();
    }
}
