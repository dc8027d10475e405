//! Text measurement backed by `cosmic-text`.

use std::{cell::RefCell, collections::HashMap, fmt};

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping};
use log::info;

use crate::geometry::Size;

/// Font size used when a `<text>` node does not declare one.
pub const DEFAULT_FONT_SIZE: f64 = 14.0;

/// Font family used when a `<text>` node does not declare one.
pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";

/// Line height as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f64 = 1.15;

/// Fallback glyph advance as a multiple of the font size, used when no
/// font could shape the text.
const FALLBACK_ADVANCE: f64 = 0.55;

/// Measures text with real font metrics.
///
/// The `FontSystem` is created on first use, since loading the system font
/// database is expensive and many scenes never measure text. Results are
/// cached per (content, family, size).
#[derive(Default)]
pub struct TextMeasurer {
    font_system: RefCell<Option<FontSystem>>,
    cache: RefCell<HashMap<(String, String, u64), Size>>,
}

impl fmt::Debug for TextMeasurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextMeasurer")
            .field("loaded", &self.font_system.borrow().is_some())
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

impl TextMeasurer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the (possibly multi-line) text in pixels.
    pub fn measure(&self, text: &str, family: &str, font_size: f64) -> Size {
        if text.is_empty() {
            return Size::default();
        }
        let key = (text.to_string(), family.to_string(), font_size.to_bits());
        if let Some(size) = self.cache.borrow().get(&key) {
            return *size;
        }
        let size = self.shape(text, family, font_size);
        self.cache.borrow_mut().insert(key, size);
        size
    }

    fn shape(&self, text: &str, family: &str, font_size: f64) -> Size {
        let mut slot = self.font_system.borrow_mut();
        let font_system = slot.get_or_insert_with(|| {
            info!("Initializing FontSystem");
            FontSystem::new()
        });

        let font_size_px = font_size as f32;
        let metrics = Metrics::new(font_size_px, font_size_px * LINE_HEIGHT_FACTOR as f32);
        let mut buffer = Buffer::new(font_system, metrics);
        let mut buffer = buffer.borrow_with(font_system);
        let attrs = Attrs::new().family(Family::Name(family));
        buffer.set_size(None, None);
        buffer.set_text(text, &attrs, Shaping::Advanced, None);
        buffer.shape_until_scroll(true);

        let mut max_width: f32 = 0.0;
        let mut total_height: f32 = 0.0;
        for run in buffer.layout_runs() {
            if let Some(last) = run.glyphs.last() {
                max_width = max_width.max(last.x + last.w);
            }
            total_height += metrics.line_height;
        }

        let lines = text.split('\n').collect::<Vec<_>>();
        if max_width <= 0.0 {
            // No usable font: estimate from character count
            let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            max_width = longest as f32 * font_size_px * FALLBACK_ADVANCE as f32;
        }
        if total_height <= 0.0 {
            total_height = lines.len() as f32 * metrics.line_height;
        }
        Size::new(max_width as f64, total_height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_size() {
        let measurer = TextMeasurer::new();
        assert!(measurer.measure("", DEFAULT_FONT_FAMILY, 12.0).is_zero());
    }

    #[test]
    fn test_multiline_is_taller() {
        let measurer = TextMeasurer::new();
        let one = measurer.measure("Label", DEFAULT_FONT_FAMILY, 12.0);
        let two = measurer.measure("Label\nLabel", DEFAULT_FONT_FAMILY, 12.0);
        assert!(one.width() > 0.0);
        assert!(two.height() > one.height());
    }
}
