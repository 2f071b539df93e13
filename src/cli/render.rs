//! Terminal renderer: rasterizes frame geometry into a character grid.

use crate::viz::{FrameKind, Geometry, Primitive, RenderTarget, VisualFrame};

/// Characters used to draw a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyphs {
    pub fill: char,
    pub line: char,
    pub empty: char,
}

impl Glyphs {
    pub const BLOCKS: Glyphs = Glyphs {
        fill: '█',
        line: '•',
        empty: ' ',
    };

    pub const ASCII: Glyphs = Glyphs {
        fill: '#',
        line: '*',
        empty: '.',
    };
}

/// Character-grid [`RenderTarget`]. The last drawn frame is kept as text.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    columns: usize,
    rows: usize,
    grid: Vec<Vec<char>>,
    status: String,
}

impl TextRenderer {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
            grid: Vec::new(),
            status: String::new(),
        }
    }

    /// The last drawn frame, one line per row, followed by a status line.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity((self.columns + 1) * (self.rows + 1));
        for row in &self.grid {
            out.extend(row.iter());
            out.push('\n');
        }
        out.push_str(&self.status);
        out
    }

    /// Number of cells holding `glyph`.
    pub fn count(&self, glyph: char) -> usize {
        self.grid.iter().flatten().filter(|&&c| c == glyph).count()
    }

    fn cell(&self, geometry: &Geometry, [x, y]: [f32; 2]) -> (usize, usize) {
        let col = (x / geometry.width.max(1.0) * self.columns as f32).floor();
        let row = (y / geometry.height.max(1.0) * self.rows as f32).floor();
        (
            (col.max(0.0) as usize).min(self.columns - 1),
            (row.max(0.0) as usize).min(self.rows - 1),
        )
    }

    /// Fill the cells covered by the quad's bounding box: columns it
    /// overlaps, rows whose center it contains.
    fn fill_quad(&mut self, geometry: &Geometry, quad: &[[f32; 2]; 4], glyph: char) {
        let (mut x0, mut y0, mut x1, mut y1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for &[x, y] in quad {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        let cw = geometry.width.max(1.0) / self.columns as f32;
        let ch = geometry.height.max(1.0) / self.rows as f32;
        let first = ((x0 / cw).floor().max(0.0) as usize).min(self.columns);
        let last = ((x1 / cw).ceil().max(0.0) as usize).min(self.columns);
        for (r, row) in self.grid.iter_mut().enumerate() {
            let cy = (r as f32 + 0.5) * ch;
            if cy < y0 || cy > y1 {
                continue;
            }
            for cell in &mut row[first..last] {
                *cell = glyph;
            }
        }
    }
}

impl RenderTarget for TextRenderer {
    type Effect = Glyphs;

    fn draw(&mut self, glyphs: &Glyphs, frame: &VisualFrame, geometry: &Geometry) {
        self.grid = vec![vec![glyphs.empty; self.columns]; self.rows];

        for primitive in &geometry.primitives {
            match primitive {
                Primitive::Quads { quads, .. } => {
                    for quad in quads {
                        self.fill_quad(geometry, quad, glyphs.fill);
                    }
                }
                Primitive::LineStrip { points, .. } => {
                    for &p in points {
                        let (c, r) = self.cell(geometry, p);
                        self.grid[r][c] = glyphs.line;
                    }
                }
            }
        }

        let kind = match frame.kind {
            FrameKind::Spectrum => "spectrum",
            FrameKind::Meter => "meter",
            FrameKind::Waveform => "waveform",
        };
        self.status = format!(
            "{} | {:?} | gain {:+.1} dB | {:.0}..{:.0} dBFS",
            kind, frame.link, frame.gain_db, frame.floor, frame.ceiling
        );
        if frame.kind == FrameKind::Meter {
            for (ch, values) in frame.channels.iter().enumerate() {
                if let Some(level) = values.first() {
                    self.status.push_str(&format!(" | ch{} {:.1} dBFS", ch, level));
                }
            }
        }
    }
}
