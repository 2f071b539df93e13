//! Geometry for the render handoff.
//!
//! Converts a [`VisualFrame`] into pixel-space primitives. Shapes are first
//! built in a normalized `(u, v)` space per channel, `u` along the axis and
//! `v` the value height in `[0, 1]`, then projected either onto stacked
//! horizontal bands or onto a ring for radial layouts.

use std::f32::consts::{FRAC_PI_2, TAU};

use super::settings::{DisplayMode, RenderMode, Settings};
use super::{FrameKind, VisualFrame};

/// A drawable shape in pixel coordinates (origin top-left).
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Connected points
    LineStrip { channel: usize, points: Vec<[f32; 2]> },
    /// Independent quads, corners in drawing order
    Quads {
        channel: usize,
        quads: Vec<[[f32; 2]; 4]>,
    },
}

impl Primitive {
    pub fn channel(&self) -> usize {
        match self {
            Primitive::LineStrip { channel, .. } | Primitive::Quads { channel, .. } => *channel,
        }
    }
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub render_mode: RenderMode,
    pub primitives: Vec<Primitive>,
}

/// Projects normalized channel coordinates to pixels.
struct Projection {
    width: f32,
    height: f32,
    band: f32,
    spacing: f32,
    invert: bool,
    radial: Option<Radial>,
}

struct Radial {
    center: [f32; 2],
    radius: f32,
    deadzone: f32,
    arc: f32,
    rotation: f32,
}

impl Projection {
    fn new(settings: &Settings, channels: usize) -> Self {
        let width = settings.width.max(1) as f32;
        let height = settings.height.max(1) as f32;
        let channels = channels.max(1) as f32;
        let spacing = settings.channel_spacing as f32;
        let band = ((height - spacing * (channels - 1.0)) / channels).max(1.0);
        let radial = settings.radial.then(|| Radial {
            center: [width / 2.0, height / 2.0],
            radius: width.min(height) / 2.0,
            deadzone: settings.deadzone.clamp(0.0, 1.0),
            arc: settings.radial_arc.clamp(0.0, 1.0),
            rotation: settings.radial_rotation,
        });
        Self {
            width,
            height,
            band,
            spacing,
            invert: settings.invert,
            radial,
        }
    }

    fn point(&self, channel: usize, u: f32, v: f32) -> [f32; 2] {
        let v = v.clamp(0.0, 1.0);
        match &self.radial {
            Some(r) => {
                let reach = r.radius * (1.0 - r.deadzone);
                let dist = if self.invert {
                    r.radius - reach * v
                } else {
                    r.radius * r.deadzone + reach * v
                };
                let angle = (r.rotation + u * r.arc) * TAU - FRAC_PI_2;
                [r.center[0] + dist * angle.cos(), r.center[1] + dist * angle.sin()]
            }
            None => {
                let top = channel as f32 * (self.band + self.spacing);
                let y = if self.invert {
                    top + self.band * v
                } else {
                    top + self.band * (1.0 - v)
                };
                [u * self.width, y]
            }
        }
    }

    fn quad(&self, channel: usize, u0: f32, u1: f32, v0: f32, v1: f32) -> [[f32; 2]; 4] {
        [
            self.point(channel, u0, v1),
            self.point(channel, u1, v1),
            self.point(channel, u1, v0),
            self.point(channel, u0, v0),
        ]
    }

    /// Pixel length along the value axis.
    fn value_extent(&self) -> f32 {
        match &self.radial {
            Some(r) => r.radius * (1.0 - r.deadzone),
            None => self.band,
        }
    }
}

/// Lay out a frame according to the display settings.
pub fn build(settings: &Settings, frame: &VisualFrame) -> Geometry {
    let proj = Projection::new(settings, frame.channels.len());
    let mut primitives = Vec::new();

    for (channel, values) in frame.channels.iter().enumerate() {
        match frame.kind {
            FrameKind::Waveform => {
                let v: Vec<f32> = values.iter().map(|s| (s + 1.0) / 2.0).collect();
                primitives.push(curve(&proj, channel, &v));
            }
            FrameKind::Meter => {
                let level = values.first().map_or(0.0, |&db| frame.normalized(db));
                primitives.push(meter(&proj, settings, channel, level));
            }
            FrameKind::Spectrum => {
                let v: Vec<f32> = values.iter().map(|&db| frame.normalized(db)).collect();
                match settings.display_mode {
                    DisplayMode::Bar => primitives.push(bars(&proj, settings, channel, &v)),
                    DisplayMode::SteppedBar => {
                        primitives.push(stepped_bars(&proj, settings, channel, &v))
                    }
                    _ => {
                        if settings.render_mode != RenderMode::Line {
                            primitives.push(filled_curve(&proj, channel, &v));
                        }
                        primitives.push(curve(&proj, channel, &v));
                    }
                }
            }
        }
    }

    Geometry {
        width: proj.width,
        height: proj.height,
        render_mode: settings.render_mode,
        primitives,
    }
}

fn u_at(i: usize, n: usize) -> f32 {
    if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 }
}

fn curve(proj: &Projection, channel: usize, v: &[f32]) -> Primitive {
    let n = v.len();
    Primitive::LineStrip {
        channel,
        points: v
            .iter()
            .enumerate()
            .map(|(i, &v)| proj.point(channel, u_at(i, n), v))
            .collect(),
    }
}

fn filled_curve(proj: &Projection, channel: usize, v: &[f32]) -> Primitive {
    let n = v.len();
    let quads = v
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let (u0, u1) = (u_at(i, n), u_at(i + 1, n));
            [
                proj.point(channel, u0, w[0]),
                proj.point(channel, u1, w[1]),
                proj.point(channel, u1, 0.0),
                proj.point(channel, u0, 0.0),
            ]
        })
        .collect();
    Primitive::Quads { channel, quads }
}

/// Horizontal span of bar `i` in normalized units.
fn bar_span(settings: &Settings, proj: &Projection, i: usize) -> (f32, f32) {
    let slot = (settings.bar_width.max(1) + settings.bar_gap) as f32;
    let x0 = i as f32 * slot;
    (x0 / proj.width, (x0 + settings.bar_width.max(1) as f32) / proj.width)
}

fn bar_height(proj: &Projection, settings: &Settings, v: f32) -> f32 {
    let min = settings.min_bar_height as f32 / proj.value_extent();
    v.max(min).min(1.0)
}

fn bars(proj: &Projection, settings: &Settings, channel: usize, v: &[f32]) -> Primitive {
    let quads = v
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let (u0, u1) = bar_span(settings, proj, i);
            proj.quad(channel, u0, u1, 0.0, bar_height(proj, settings, v))
        })
        .collect();
    Primitive::Quads { channel, quads }
}

/// Vertical steps of `step_width` pixels separated by `step_gap`.
fn steps(proj: &Projection, settings: &Settings, v: f32) -> Vec<(f32, f32)> {
    let extent = proj.value_extent();
    let step = settings.step_width.max(1) as f32;
    let pitch = step + settings.step_gap as f32;
    let count = ((v * extent + settings.step_gap as f32) / pitch).floor() as usize;
    (0..count)
        .map(|k| {
            let lo = k as f32 * pitch;
            (lo / extent, ((lo + step) / extent).min(1.0))
        })
        .collect()
}

fn stepped_bars(proj: &Projection, settings: &Settings, channel: usize, v: &[f32]) -> Primitive {
    let mut quads = Vec::new();
    for (i, &v) in v.iter().enumerate() {
        let (u0, u1) = bar_span(settings, proj, i);
        for (v0, v1) in steps(proj, settings, bar_height(proj, settings, v)) {
            quads.push(proj.quad(channel, u0, u1, v0, v1));
        }
    }
    Primitive::Quads { channel, quads }
}

/// Meters fill along the axis: the level sets how far across the band goes.
fn meter(proj: &Projection, settings: &Settings, channel: usize, level: f32) -> Primitive {
    let level = level.clamp(0.0, 1.0);
    let quads = if settings.display_mode == DisplayMode::SteppedMeter {
        let step = settings.step_width.max(1) as f32 / proj.width;
        let pitch = step + settings.step_gap as f32 / proj.width;
        let count = ((level + settings.step_gap as f32 / proj.width) / pitch).floor() as usize;
        (0..count)
            .map(|k| {
                let u0 = k as f32 * pitch;
                proj.quad(channel, u0, (u0 + step).min(1.0), 0.0, 1.0)
            })
            .collect()
    } else if level > 0.0 {
        vec![proj.quad(channel, 0.0, level, 0.0, 1.0)]
    } else {
        Vec::new()
    };
    Primitive::Quads { channel, quads }
}
