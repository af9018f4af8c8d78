//! Поверхность рисования. Ядро вызывает только `begin_path`, `line_to`,
//! `stroke` и `clear`; растеризация остаётся на стороне реализации.

use crate::error::PadError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Размер холста в пикселях
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: f64,
    height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Result<Self, PadError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(width) && valid(height) {
            Ok(Self { width, height })
        } else {
            Err(PadError::InvalidViewport { width, height })
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

impl LineCap {
    fn as_svg(&self) -> &'static str {
        match self {
            LineCap::Butt => "butt",
            LineCap::Round => "round",
            LineCap::Square => "square",
        }
    }
}

/// Стиль пера: цвет, толщина, форма концов линии
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenStyle {
    pub color: String,
    pub width: f64,
    pub line_cap: LineCap,
}

impl Default for PenStyle {
    fn default() -> Self {
        Self {
            color: "#000000".into(),
            width: 2.0,
            line_cap: LineCap::Round,
        }
    }
}

pub trait DrawingSurface {
    fn begin_path(&mut self, x: f64, y: f64);

    fn line_to(&mut self, x: f64, y: f64);

    /// Отрисовать текущий путь
    fn stroke(&mut self);

    fn clear(&mut self);

    fn size(&self) -> Viewport;

    /// SVG-снимок, если поверхность умеет его делать
    fn export_svg(&self) -> Option<String> {
        None
    }
}

/// Один путь пера
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct PathData {
    pub points: Vec<(f64, f64)>,
    pub color: String,
    pub stroke_width: f64,
}

#[derive(Debug, Clone)]
struct CanvasPath {
    data: PathData,
    /// Сколько точек уже отрисовано вызовом stroke()
    rendered: usize,
}

/// Векторный холст в памяти с экспортом в SVG
#[derive(Debug, Clone)]
pub struct Canvas {
    viewport: Viewport,
    pen: PenStyle,
    paths: Vec<CanvasPath>,
}

impl Canvas {
    pub fn new(viewport: Viewport, pen: PenStyle) -> Self {
        Self {
            viewport,
            pen,
            paths: Vec::new(),
        }
    }

    pub fn pen(&self) -> &PenStyle {
        &self.pen
    }

    /// Новый стиль действует со следующего пути
    pub fn set_pen(&mut self, pen: PenStyle) {
        self.pen = pen;
    }

    /// Отрисованные части путей
    pub fn paths(&self) -> impl Iterator<Item = PathData> + '_ {
        self.paths.iter().map(|p| PathData {
            points: p.data.points[..p.rendered].to_vec(),
            color: p.data.color.clone(),
            stroke_width: p.data.stroke_width,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.paths.iter().all(|p| p.rendered < 2)
    }

    pub fn to_svg(&self) -> String {
        let (w, h) = (self.viewport.width(), self.viewport.height());
        let mut out = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
        );
        for path in self.paths() {
            if path.points.len() < 2 {
                continue;
            }
            let mut d = String::new();
            for (i, (x, y)) in path.points.iter().enumerate() {
                let cmd = if i == 0 { 'M' } else { 'L' };
                if i > 0 {
                    d.push(' ');
                }
                let _ = write!(d, "{cmd}{x} {y}");
            }
            let _ = writeln!(
                out,
                "  <path d=\"{d}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\" stroke-linecap=\"{}\" stroke-linejoin=\"round\"/>",
                escape_attr(&path.color),
                path.stroke_width,
                self.pen.line_cap.as_svg(),
            );
        }
        out.push_str("</svg>\n");
        out
    }

    fn start(&mut self, x: f64, y: f64) {
        self.paths.push(CanvasPath {
            data: PathData {
                points: vec![(x, y)],
                color: self.pen.color.clone(),
                stroke_width: self.pen.width,
            },
            rendered: 0,
        });
    }
}

impl DrawingSurface for Canvas {
    fn begin_path(&mut self, x: f64, y: f64) {
        self.start(x, y);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        match self.paths.last_mut() {
            Some(path) => path.data.points.push((x, y)),
            None => self.start(x, y),
        }
    }

    fn stroke(&mut self) {
        if let Some(path) = self.paths.last_mut() {
            path.rendered = path.data.points.len();
        }
    }

    fn clear(&mut self) {
        self.paths.clear();
    }

    fn size(&self) -> Viewport {
        self.viewport
    }

    fn export_svg(&self) -> Option<String> {
        Some(self.to_svg())
    }
}

fn escape_attr(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
