use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eframe::egui;
use image::{GrayImage, ImageFormat, RgbImage};
use tracing::{debug, error, info};

use crate::{
    cache::ModelCache, collect_sample_images, config::Config, errors::CtSegError,
    errors::Result, run_segmentation, traits::SegmentationModel, Segmentation,
};

pub const WINDOW_TITLE: &str = "COVID-19 segmentation";
const WINDOW_SIZE: [f32; 2] = [700.0, 500.0];
const PANEL_TITLES: [&str; 3] = ["CT slice", "Segmentation mask", "Segmentation overlay"];

enum State {
    Idle,
    /// A worker thread owns the run; the UI only waits for its message.
    Rendering {
        path: PathBuf,
        receiver: Receiver<Result<Segmentation>>,
    },
}

struct Panels {
    original: egui::TextureHandle,
    mask: egui::TextureHandle,
    overlay: egui::TextureHandle,
}

impl Panels {
    fn upload(ctx: &egui::Context, segmentation: &Segmentation) -> Self {
        Self {
            original: load_rgb(ctx, "original", &segmentation.original),
            mask: load_gray(ctx, "mask", &segmentation.mask_image()),
            overlay: load_rgb(ctx, "overlay", &segmentation.overlay),
        }
    }

    fn titled(&self) -> [(&'static str, &egui::TextureHandle); 3] {
        [
            (PANEL_TITLES[0], &self.original),
            (PANEL_TITLES[1], &self.mask),
            (PANEL_TITLES[2], &self.overlay),
        ]
    }
}

/// The segmentation window.
///
/// Owns everything the window needs for its lifetime: configuration, the
/// model cache shared with worker threads, and the rendered panels.
pub struct SegmentationApp<M> {
    config: Config,
    cache: Arc<ModelCache<M>>,
    samples: Vec<PathBuf>,
    state: State,
    panels: Option<Panels>,
    pending: Option<(PathBuf, Segmentation)>,
    status: String,
    error: Option<String>,
}

impl<M: SegmentationModel + 'static> SegmentationApp<M> {
    pub fn new(config: Config, cache: ModelCache<M>) -> Self {
        let samples = collect_sample_images(&config.input_dir);
        debug!(count = samples.len(), "sample images found");
        Self {
            config,
            cache: Arc::new(cache),
            samples,
            state: State::Idle,
            panels: None,
            pending: None,
            status: String::new(),
            error: None,
        }
    }

    /// Shows an already computed result on the first frame.
    pub fn with_segmentation(mut self, path: PathBuf, segmentation: Segmentation) -> Self {
        self.pending = Some((path, segmentation));
        self
    }

    pub const fn is_rendering(&self) -> bool {
        matches!(self.state, State::Rendering { .. })
    }

    pub const fn has_panels(&self) -> bool {
        self.panels.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn samples(&self) -> &[PathBuf] {
        &self.samples
    }

    /// Idle -> Rendering: hands `path` to a worker thread.
    ///
    /// Ignored while a run is in flight.
    pub fn select(&mut self, ctx: &egui::Context, path: PathBuf) {
        if self.is_rendering() {
            return;
        }
        info!(path = %path.display(), "image selected");

        let (sender, receiver) = mpsc::channel();
        let cache = Arc::clone(&self.cache);
        let threshold = self.config.threshold;
        let style = self.config.overlay_style();
        let worker_ctx = ctx.clone();
        let worker_path = path.clone();

        let spawned = thread::Builder::new()
            .name("segmentation".to_string())
            .spawn(move || {
                let result = run_segmentation(&cache, &worker_path, threshold, &style);
                if sender.send(result).is_err() {
                    debug!("window closed before segmentation finished");
                }
                worker_ctx.request_repaint();
            });

        match spawned {
            Ok(_) => {
                self.status = format!("Segmenting {}...", display_name(&path));
                self.state = State::Rendering { path, receiver };
            }
            Err(e) => {
                error!(error = %e, "failed to spawn segmentation worker");
                self.error = Some(format!("Could not start segmentation: {e}"));
            }
        }
    }

    /// Rendering -> Idle once the worker has reported back.
    pub fn poll(&mut self, ctx: &egui::Context) {
        let State::Rendering { receiver, .. } = &self.state else {
            return;
        };
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(CtSegError::inference(
                "segmentation worker",
                "worker stopped without a result",
            )),
        };

        if let State::Rendering { path, .. } = std::mem::replace(&mut self.state, State::Idle) {
            self.finish(ctx, &path, result);
        }
    }

    fn finish(&mut self, ctx: &egui::Context, path: &Path, result: Result<Segmentation>) {
        match result {
            Ok(segmentation) => {
                self.status = format!(
                    "{}: {} positive pixels",
                    display_name(path),
                    segmentation.positive_pixels()
                );
                self.panels = Some(Panels::upload(ctx, &segmentation));
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "segmentation failed");
                self.status = format!("{} failed", display_name(path));
                self.error = Some(e.report());
            }
        }
    }

    fn pick_file(&self) -> Option<PathBuf> {
        let extensions: Vec<&str> = ImageFormat::all()
            .filter(|f| f.reading_enabled())
            .flat_map(|f| f.extensions_str().iter().copied())
            .collect();
        rfd::FileDialog::new()
            .set_title("Choose file")
            .set_directory(&self.config.input_dir)
            .add_filter("Images", extensions.as_slice())
            .pick_file()
    }

    fn show_controls(&self, ctx: &egui::Context) -> Option<PathBuf> {
        let idle = !self.is_rendering();
        let mut selected = None;

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(idle, egui::Button::new("Choose file"))
                    .clicked()
                {
                    selected = self.pick_file();
                }

                ui.add_enabled_ui(idle && !self.samples.is_empty(), |ui| {
                    egui::ComboBox::from_label("Sample")
                        .selected_text("pick a sample")
                        .show_ui(ui, |ui| {
                            for sample in &self.samples {
                                if ui.selectable_label(false, display_name(sample)).clicked() {
                                    selected = Some(sample.clone());
                                }
                            }
                        });
                });

                if !idle {
                    ui.spinner();
                }
                ui.label(self.status.as_str());
            });
            ui.add_space(10.0);
        });

        selected
    }

    fn show_panels(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| match &self.panels {
            Some(panels) => {
                ui.columns(3, |columns| {
                    for (column, (title, texture)) in columns.iter_mut().zip(panels.titled()) {
                        column.vertical_centered(|ui| {
                            ui.label(egui::RichText::new(title).size(12.0));
                            let side = ui.available_width();
                            ui.add(
                                egui::Image::new(texture)
                                    .fit_to_exact_size(egui::vec2(side, side)),
                            );
                        });
                    }
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label("Choose a CT slice to segment");
                });
            }
        });
    }

    fn show_error(&mut self, ctx: &egui::Context) {
        let Some(message) = &self.error else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Segmentation failed")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(message.as_str());
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.error = None;
        }
    }
}

impl<M: SegmentationModel + 'static> eframe::App for SegmentationApp<M> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some((path, segmentation)) = self.pending.take() {
            self.finish(ctx, &path, Ok(segmentation));
        }
        self.poll(ctx);

        if let Some(path) = self.show_controls(ctx) {
            self.select(ctx, path);
        }
        self.show_panels(ctx);
        self.show_error(ctx);

        if self.is_rendering() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

/// Opens the window and blocks until it is closed.
pub fn run<M: SegmentationModel + 'static>(app: SegmentationApp<M>) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(WINDOW_SIZE),
        ..Default::default()
    };
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
}

fn load_rgb(ctx: &egui::Context, name: &str, image: &RgbImage) -> egui::TextureHandle {
    let size = [image.width() as usize, image.height() as usize];
    ctx.load_texture(
        name,
        egui::ColorImage::from_rgb(size, image.as_raw()),
        egui::TextureOptions::NEAREST,
    )
}

fn load_gray(ctx: &egui::Context, name: &str, image: &GrayImage) -> egui::TextureHandle {
    let size = [image.width() as usize, image.height() as usize];
    ctx.load_texture(
        name,
        egui::ColorImage::from_gray(size, image.as_raw()),
        egui::TextureOptions::NEAREST,
    )
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
