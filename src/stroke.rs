//! Stroke Relay: локальные жесты -> сообщения штриха и обратно.
//!
//! По сети координаты идут в единичном квадрате `[0, 1]²`, отправитель
//! нормализует по своему холсту, получатель масштабирует по своему.

use crate::error::PadError;
use crate::surface::{DrawingSurface, Viewport};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Одна точка штриха. `isStarting` отмечает первую точку нового штриха.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StrokeMessage {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "isStarting")]
    pub is_starting: bool,
}

impl StrokeMessage {
    pub fn encode(&self) -> Result<Bytes, PadError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, PadError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Точка в пикселях локального холста
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Куда уходят исходящие сообщения (обычно Session Manager)
pub trait StrokeSink {
    fn send_stroke(&mut self, msg: &StrokeMessage) -> Result<(), PadError>;
}

impl Viewport {
    /// Пиксели -> единичный квадрат, с обрезкой выхода за границы
    pub fn normalize(&self, p: Point) -> (f64, f64) {
        (
            (p.x / self.width()).clamp(0.0, 1.0),
            (p.y / self.height()).clamp(0.0, 1.0),
        )
    }

    /// Единичный квадрат -> пиксели, с привязкой к сетке `1 / GRID_STEPS_PER_PX`,
    /// чтобы точка на холсте того же размера вернулась без ошибки округления
    pub fn denormalize(&self, x: f64, y: f64) -> Point {
        Point::new(
            snap(x.clamp(0.0, 1.0) * self.width()),
            snap(y.clamp(0.0, 1.0) * self.height()),
        )
    }
}

/// Делений сетки на пиксель для принятых координат
pub const GRID_STEPS_PER_PX: f64 = 1e6;

fn snap(v: f64) -> f64 {
    (v * GRID_STEPS_PER_PX).round() / GRID_STEPS_PER_PX
}

#[derive(Debug, Default)]
pub struct StrokeRelay {
    /// Идёт локальный жест
    drawing: bool,
    /// У принятого штриха уже есть начало
    remote_open: bool,
}

impl StrokeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Есть начатый путь от собеседника
    pub fn has_remote_path(&self) -> bool {
        self.remote_open
    }

    /// Сессия закончилась: следующий принятый штрих начнёт новый путь
    pub fn reset_remote(&mut self) {
        self.remote_open = false;
    }

    /// Начинает локальный путь; при переданном `sink` отправляет точку с `isStarting`.
    pub fn on_gesture_start(
        &mut self,
        point: Point,
        surface: &mut dyn DrawingSurface,
        sink: Option<&mut dyn StrokeSink>,
    ) {
        self.drawing = true;
        surface.begin_path(point.x, point.y);
        if let Some(sink) = sink {
            forward(sink, surface.size(), point, true);
        }
    }

    /// Продолжает путь. Без начатого жеста ничего не делает.
    pub fn on_gesture_move(
        &mut self,
        point: Point,
        surface: &mut dyn DrawingSurface,
        sink: Option<&mut dyn StrokeSink>,
    ) {
        if !self.drawing {
            return;
        }
        surface.line_to(point.x, point.y);
        surface.stroke();
        if let Some(sink) = sink {
            forward(sink, surface.size(), point, false);
        }
    }

    /// Конец жеста собеседнику не передаётся
    pub fn on_gesture_end(&mut self) {
        self.drawing = false;
    }

    /// Применяет принятое сообщение к холсту и сразу рисует сегмент
    pub fn on_message_received(&mut self, msg: &StrokeMessage, surface: &mut dyn DrawingSurface) {
        if !msg.x.is_finite() || !msg.y.is_finite() {
            tracing::warn!(?msg, "non-finite stroke point dropped");
            return;
        }
        let point = surface.size().denormalize(msg.x, msg.y);
        if msg.is_starting || !self.remote_open {
            // потерянное начало: продолжение начинает новый путь
            surface.begin_path(point.x, point.y);
            self.remote_open = true;
        } else {
            surface.line_to(point.x, point.y);
            surface.stroke();
        }
    }
}

fn forward(sink: &mut dyn StrokeSink, viewport: Viewport, point: Point, is_starting: bool) {
    let (x, y) = viewport.normalize(point);
    let msg = StrokeMessage { x, y, is_starting };
    if let Err(e) = sink.send_stroke(&msg) {
        tracing::warn!(error = %e, "stroke not sent");
    }
}
