//! The three-panel incident chart.
//!
//! Top: acquisition cadence per instrument. Middle: reduction turnaround per
//! node. Bottom: node health, with heartbeats, queue activity, workflow
//! errors, restart marks and the AR5/AR6 failure window on one band. All
//! panels share the time range of the run table.
use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDateTime};
use color_eyre::eyre::{eyre, Result};
use eframe::egui::{self, Color32};
use egui_plot::{GridMark, Legend, Line, Plot, PlotPoint, Points, Text};

use super::pairing::DurationSample;
use super::postproc::{self, Event};
use super::restarts::RestartMap;
use super::runs::RunRecord;
use super::workflow::{ErrorKind, WorkflowError};

/// Instruments with fewer runs than this clutter the legend.
const MIN_RUNS_SHOWN: usize = 5;

/// Queue activity rows drawn above each node's heartbeat row. The STARTED
/// marker keeps its trailing space so the bare queue-listing banner does not
/// match.
const NODE_SERIES: [(&str, f64, Color32); 4] = [
    (postproc::CAT_STARTED, 0.1, Color32::ORANGE),
    (postproc::REDUX_DISABLED, 0.2, Color32::GREEN),
    ("/queue/REDUCTION.STARTED: ", 0.2, Color32::BLUE),
    (postproc::REDUX_CAT_STARTED, 0.3, Color32::ORANGE),
];

/// Vertical placement of each workflow error category on the health panel.
const ERROR_SERIES: [(ErrorKind, f64); 7] = [
    (ErrorKind::Unknown, 3.0),
    (ErrorKind::OncatError, 3.1),
    (ErrorKind::CatalogError, 3.1),
    (ErrorKind::Calvera, 3.1),
    (ErrorKind::ReductionEnv, 3.2),
    (ErrorKind::ReductionError, 3.3),
    (ErrorKind::NoFile, 3.6),
];

// The window where the extra nodes were answering the POSTPROCESSING queue,
// already shifted by the 4 hour time-zone offset.
const EXTRA_NODES_LABEL: &str = "AR5/AR6";
const EXTRA_NODES_START: &str = "2024-07-13 10:22:06";
const EXTRA_NODES_STOP: &str = "2024-07-13 12:45:10";

/// Everything one node contributes to the chart.
pub struct NodeSeries {
    pub number: u32,
    pub events: Vec<Event>,
    pub durations: Vec<DurationSample>,
}

/// Precomputed inputs for the chart window.
pub struct ChartData {
    pub runs: Vec<RunRecord>,
    pub instruments: Vec<String>,
    pub restarts: RestartMap,
    pub workflow: Vec<WorkflowError>,
    pub nodes: Vec<NodeSeries>,
}

/// Plot x-coordinate for a timestamp.
fn xpos(time: NaiveDateTime) -> f64 {
    time.and_utc().timestamp() as f64
}

/// Day-and-time tick label, matching how the logs are usually read.
fn format_tick(seconds: f64) -> String {
    DateTime::from_timestamp(seconds as i64, 0)
        .map(|time| time.format("%dT%H:%M").to_string())
        .unwrap_or_default()
}

pub struct CorrelatorApp {
    data: ChartData,
    x_min: f64,
    x_max: f64,
    extra_window: (f64, f64),
}

impl CorrelatorApp {
    pub fn new(data: ChartData) -> Self {
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        for run in &data.runs {
            let x = xpos(run.endtime);
            x_min = x_min.min(x);
            x_max = x_max.max(x);
        }
        if !x_min.is_finite() || !x_max.is_finite() {
            x_min = 0.0;
            x_max = 1.0;
        }
        let start = NaiveDateTime::parse_from_str(EXTRA_NODES_START, postproc::TIME_FORMAT).unwrap();
        let stop = NaiveDateTime::parse_from_str(EXTRA_NODES_STOP, postproc::TIME_FORMAT).unwrap();
        Self {
            data,
            x_min,
            x_max,
            extra_window: (xpos(start), xpos(stop)),
        }
    }

    fn daq_panel(&self, ui: &mut egui::Ui, height: f32) {
        Plot::new("daq")
            .height(height)
            .include_x(self.x_min)
            .include_x(self.x_max)
            .include_y(0.0)
            .y_axis_label("DAQ duration (in hour)")
            .x_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format_tick(mark.value)
            })
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for instr in &self.data.instruments {
                    let points: Vec<[f64; 2]> = self
                        .data
                        .runs
                        .iter()
                        .filter(|run| &run.instr == instr)
                        .map(|run| [xpos(run.endtime), run.duration])
                        .collect();
                    // only show things with a minimum number of runs
                    if points.len() < MIN_RUNS_SHOWN {
                        continue;
                    }
                    plot_ui.points(Points::new(points).name(instr).radius(2.0));
                }
            });
    }

    fn redux_panel(&self, ui: &mut egui::Ui, height: f32) {
        Plot::new("redux")
            .height(height)
            .include_x(self.x_min)
            .include_x(self.x_max)
            .include_y(0.0)
            .y_axis_label("redux duration (in s)")
            .x_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format_tick(mark.value)
            })
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for node in &self.data.nodes {
                    let points: Vec<[f64; 2]> = node
                        .durations
                        .iter()
                        .map(|sample| [xpos(sample.time), sample.seconds])
                        .collect();
                    plot_ui.points(
                        Points::new(points)
                            .name(format!("AR{}", node.number))
                            .radius(2.0),
                    );
                }
            });
    }

    fn health_panel(&self, ui: &mut egui::Ui, height: f32) {
        Plot::new("health")
            .height(height)
            .include_x(self.x_min)
            .include_x(self.x_max)
            .include_y(0.5)
            .include_y(4.0)
            .x_axis_label("time-of-day")
            .x_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format_tick(mark.value)
            })
            .y_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                if mark.value.fract() == 0.0 && mark.value >= 1.0 {
                    format!("AR{:.0}", mark.value)
                } else {
                    String::new()
                }
            })
            .show(ui, |plot_ui| {
                for node in &self.data.nodes {
                    let base = f64::from(node.number);
                    let beats: Vec<[f64; 2]> = node
                        .events
                        .iter()
                        .filter(|event| event.message == "HEARTBEAT")
                        .map(|event| [xpos(event.time), base])
                        .collect();
                    plot_ui.points(Points::new(beats).color(Color32::RED).radius(2.0));

                    for (marker, offset, color) in NODE_SERIES {
                        let points: Vec<[f64; 2]> = node
                            .events
                            .iter()
                            .filter(|event| event.message.contains(marker))
                            .map(|event| [xpos(event.time), base + offset])
                            .collect();
                        plot_ui.points(Points::new(points).color(color).radius(2.0));
                    }

                    let key = format!("autoreducer{}", node.number);
                    if let Some(stamps) = self.data.restarts.get(&key) {
                        for stamp in stamps {
                            let x = xpos(*stamp);
                            plot_ui.line(
                                Line::new(vec![[x, base - 0.1], [x, base + 0.6]])
                                    .color(Color32::BLACK)
                                    .width(1.5),
                            );
                        }
                    }
                }

                for (kind, offset) in ERROR_SERIES {
                    let points: Vec<[f64; 2]> = self
                        .data
                        .workflow
                        .iter()
                        .filter(|error| error.kind == kind)
                        .map(|error| [xpos(error.time), offset])
                        .collect();
                    plot_ui.points(Points::new(points).radius(2.0));
                }

                let (start, stop) = self.extra_window;
                plot_ui.line(Line::new(vec![[start, 3.5], [stop, 3.5]]).width(4.0));
                plot_ui.text(Text::new(PlotPoint::new(start, 3.6), EXTRA_NODES_LABEL));
            });
    }
}

impl eframe::App for CorrelatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let height = (ui.available_height() - 2.0 * ui.spacing().item_spacing.y) / 3.0;
            self.daq_panel(ui, height);
            self.redux_panel(ui, height);
            self.health_panel(ui, height);
        });
    }
}

/// Open the chart window; blocks until it is closed.
pub fn show_chart(data: ChartData) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "AR outage correlator",
        options,
        Box::new(|_cc| Ok(Box::new(CorrelatorApp::new(data)))),
    )
    .map_err(|error| eyre!("chart window failed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn ticks_render_day_and_time() {
        let time = NaiveDate::from_ymd_opt(2024, 7, 12)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(format_tick(xpos(time)), "12T08:30");
    }

    #[test]
    fn extra_node_window_is_inside_the_incident() {
        let start = NaiveDateTime::parse_from_str(EXTRA_NODES_START, postproc::TIME_FORMAT).unwrap();
        let stop = NaiveDateTime::parse_from_str(EXTRA_NODES_STOP, postproc::TIME_FORMAT).unwrap();
        assert!(start < stop);
        assert!(start.to_string().starts_with("2024-07-13"));
    }
}
