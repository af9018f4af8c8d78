//! QR-код для кода подключения: текст для терминала и SVG.

use crate::error::PadError;
use qrcode::{Color, QrCode};
use std::fmt::Write as _;

/// Ширина светлой рамки вокруг кода, в модулях
const QUIET_ZONE: usize = 2;

/// QR из полублоков Unicode: один символ на две строки модулей
pub fn render_unicode(data: &str) -> Result<String, PadError> {
    let code = QrCode::new(data.as_bytes())?;
    let modules = code.to_colors();
    let width = code.width();
    let dark = |x: usize, y: usize| y < width && modules[y * width + x] == Color::Dark;

    let mut out = String::new();
    for y in (0..width).step_by(2) {
        out.push_str("  ");
        for x in 0..width {
            let ch = match (dark(x, y), dark(x, y + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            };
            out.push(ch);
        }
        out.push('\n');
    }
    Ok(out)
}

/// SVG с квадратными модулями размера `module_size`
pub fn render_svg(data: &str, module_size: u32) -> Result<String, PadError> {
    let code = QrCode::new(data.as_bytes())?;
    let modules = code.to_colors();
    let width = code.width();
    let scale = module_size.max(1) as usize;
    let side = (width + QUIET_ZONE * 2) * scale;

    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{side}\" height=\"{side}\" viewBox=\"0 0 {side} {side}\" shape-rendering=\"crispEdges\">\n  <rect width=\"{side}\" height=\"{side}\" fill=\"#ffffff\"/>\n  <path fill=\"#000000\" d=\""
    );
    for (i, color) in modules.iter().enumerate() {
        if *color == Color::Dark {
            let x = (i % width + QUIET_ZONE) * scale;
            let y = (i / width + QUIET_ZONE) * scale;
            let _ = write!(out, "M{x} {y}h{scale}v{scale}h-{scale}z");
        }
    }
    out.push_str("\"/>\n</svg>\n");
    Ok(out)
}
