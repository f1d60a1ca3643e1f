//! Stroke capture surface.
//!
//! Pointer and touch input is turned into ink on a fixed-size RGBA buffer.
//! Strokes are rasterized as soon as they arrive, the buffer is the only
//! state that outlives a gesture.

use serde::{Deserialize, Serialize};
use tiny_skia::{LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::error::SignError;
use crate::geometry::{Point, ScaleCorrection};

/// Size of the signature pad when nothing else is configured.
pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (330, 200);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    pub width: f32,
    /// Straight (not premultiplied) RGBA.
    pub color: [u8; 4],
}

impl Default for StrokeStyle {
    fn default() -> Self {
        StrokeStyle {
            width: 1.0,
            color: [0, 0, 0, 255],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceState {
    Idle,
    Drawing,
}

/// The surface's bounding box as displayed by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Layout {
    fn relative(&self, client_x: f32, client_y: f32) -> Point {
        Point::new(client_x - self.left, client_y - self.top)
    }
}

/// Raw input as delivered by the front end.
///
/// Pointer coordinates are already relative to the surface's bounding box,
/// touch coordinates are client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    #[serde(rename_all = "camelCase")]
    TouchStart { client_x: f32, client_y: f32 },
    #[serde(rename_all = "camelCase")]
    TouchMove { client_x: f32, client_y: f32 },
    TouchEnd,
    TouchCancel,
}

/// An encoded snapshot of the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRaster {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct Surface {
    pixmap: Pixmap,
    style: StrokeStyle,
    state: SurfaceState,
    anchor: Point,
    layout: Layout,
    scale: ScaleCorrection,
}

impl Surface {
    /// Creates a transparent surface. Returns `None` if either dimension is zero.
    pub fn new(width: u32, height: u32, style: StrokeStyle) -> Option<Surface> {
        let pixmap = Pixmap::new(width, height)?;
        Some(Surface {
            pixmap,
            style,
            state: SurfaceState::Idle,
            anchor: Point::default(),
            layout: Layout {
                left: 0.0,
                top: 0.0,
                width: width as f32,
                height: height as f32,
            },
            scale: ScaleCorrection::IDENTITY,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn scale(&self) -> ScaleCorrection {
        self.scale
    }

    /// Records where the surface is displayed and recomputes the scale correction.
    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.scale = ScaleCorrection::measure(
            (self.pixmap.width(), self.pixmap.height()),
            (layout.width, layout.height),
        );
        log::debug!(
            "surface laid out at {}x{}, scale factor {}",
            layout.width,
            layout.height,
            self.scale.factor()
        );
    }

    /// While drawing, the surface owns touch input and the platform's
    /// scroll/zoom gestures must be suppressed.
    pub fn captures_touch(&self) -> bool {
        self.state == SurfaceState::Drawing
    }

    pub fn handle(&mut self, event: InputEvent) -> SurfaceState {
        match event {
            InputEvent::PointerDown { x, y } => self.begin(Point::new(x, y)),
            InputEvent::TouchStart { client_x, client_y } => {
                self.begin(self.layout.relative(client_x, client_y))
            }
            InputEvent::PointerMove { x, y } => self.extend(Point::new(x, y)),
            InputEvent::TouchMove { client_x, client_y } => {
                self.extend(self.layout.relative(client_x, client_y))
            }
            InputEvent::PointerUp | InputEvent::TouchEnd | InputEvent::TouchCancel => {
                self.state = SurfaceState::Idle;
            }
        }
        self.state
    }

    fn begin(&mut self, raw: Point) {
        self.anchor = self.scale.to_surface(raw);
        self.state = SurfaceState::Drawing;
    }

    fn extend(&mut self, raw: Point) {
        if self.state != SurfaceState::Drawing {
            return;
        }
        let to = self.scale.to_surface(raw);
        self.draw_segment(self.anchor, to);
        self.anchor = to;
    }

    fn draw_segment(&mut self, from: Point, to: Point) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);
        // Zero-length segments produce no path.
        let Some(path) = pb.finish() else {
            return;
        };

        let [r, g, b, a] = self.style.color;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;

        let stroke = Stroke {
            width: self.style.width,
            line_cap: LineCap::Butt,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// Erases all ink. The drawing state is left as it is.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    pub fn is_blank(&self) -> bool {
        self.ink_coverage() == 0
    }

    /// Number of pixels that are not fully transparent.
    pub fn ink_coverage(&self) -> usize {
        self.pixmap.pixels().iter().filter(|p| p.alpha() != 0).count()
    }

    /// Encodes the current buffer as PNG, keeping the alpha channel.
    pub fn export_png(&self) -> Result<SignatureRaster, SignError> {
        let png = self
            .pixmap
            .encode_png()
            .map_err(|e| SignError::Serialize(e.to_string()))?;
        Ok(SignatureRaster {
            png,
            width: self.pixmap.width(),
            height: self.pixmap.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad() -> Surface {
        let (w, h) = DEFAULT_SURFACE_SIZE;
        Surface::new(w, h, StrokeStyle::default()).unwrap()
    }

    fn scribble(surface: &mut Surface, points: &[(f32, f32)]) {
        let (x, y) = points[0];
        surface.handle(InputEvent::PointerDown { x, y });
        for &(x, y) in &points[1..] {
            surface.handle(InputEvent::PointerMove { x, y });
        }
        surface.handle(InputEvent::PointerUp);
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(Surface::new(0, 200, StrokeStyle::default()).is_none());
    }

    #[test]
    fn transitions() {
        let mut s = pad();
        assert_eq!(s.state(), SurfaceState::Idle);
        assert_eq!(s.handle(InputEvent::PointerMove { x: 5.0, y: 5.0 }), SurfaceState::Idle);
        assert!(s.is_blank(), "moves while idle must not draw");

        assert_eq!(s.handle(InputEvent::PointerDown { x: 10.0, y: 10.0 }), SurfaceState::Drawing);
        assert!(s.captures_touch());
        assert_eq!(s.handle(InputEvent::PointerMove { x: 100.0, y: 80.0 }), SurfaceState::Drawing);
        assert!(!s.is_blank());
        assert_eq!(s.handle(InputEvent::PointerUp), SurfaceState::Idle);
        assert!(!s.captures_touch());

        s.handle(InputEvent::TouchStart { client_x: 1.0, client_y: 1.0 });
        assert_eq!(s.handle(InputEvent::TouchCancel), SurfaceState::Idle);
    }

    #[test]
    fn clear_keeps_state_and_erases_ink() {
        let mut s = pad();
        s.handle(InputEvent::PointerDown { x: 10.0, y: 10.0 });
        s.handle(InputEvent::PointerMove { x: 200.0, y: 150.0 });
        s.clear();
        assert_eq!(s.state(), SurfaceState::Drawing);
        assert_eq!(s.ink_coverage(), 0);

        let raster = s.export_png().unwrap();
        let img = image::load_from_memory(&raster.png).unwrap().to_rgba8();
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn export_is_stable() {
        let mut s = pad();
        scribble(&mut s, &[(20.0, 20.0), (120.0, 90.0), (300.0, 40.0)]);
        let a = s.export_png().unwrap();
        let b = s.export_png().unwrap();
        assert_eq!(a, b);
        assert_eq!((a.width, a.height), DEFAULT_SURFACE_SIZE);
    }

    #[test]
    fn export_keeps_transparency() {
        let mut s = pad();
        scribble(&mut s, &[(20.0, 100.0), (300.0, 100.0)]);
        let img = image::load_from_memory(&s.export_png().unwrap().png)
            .unwrap()
            .to_rgba8();
        assert_eq!(img.dimensions(), DEFAULT_SURFACE_SIZE);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        let inked = img.pixels().filter(|p| p[3] > 0).count();
        assert!(inked > 0);
        assert!(img.pixels().filter(|p| p[3] > 0).all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0));
    }

    #[test]
    fn scaled_gestures_match_unscaled() {
        let mut plain = pad();
        scribble(&mut plain, &[(10.0, 10.0), (100.0, 50.0), (160.0, 120.0)]);

        // Backing buffer is twice the displayed box: factor 2.
        let mut scaled = pad();
        scaled.set_layout(Layout {
            left: 0.0,
            top: 0.0,
            width: 165.0,
            height: 100.0,
        });
        assert_eq!(scaled.scale().factor(), 2.0);
        scribble(&mut scaled, &[(20.0, 20.0), (200.0, 100.0), (320.0, 240.0)]);

        assert_eq!(plain.export_png().unwrap(), scaled.export_png().unwrap());
    }

    #[test]
    fn touch_coordinates_are_made_relative() {
        let mut by_touch = pad();
        by_touch.set_layout(Layout {
            left: 40.0,
            top: 300.0,
            width: 330.0,
            height: 200.0,
        });
        by_touch.handle(InputEvent::TouchStart { client_x: 50.0, client_y: 310.0 });
        by_touch.handle(InputEvent::TouchMove { client_x: 200.0, client_y: 400.0 });
        by_touch.handle(InputEvent::TouchEnd);

        let mut by_pointer = pad();
        scribble(&mut by_pointer, &[(10.0, 10.0), (160.0, 100.0)]);

        assert_eq!(by_touch.export_png().unwrap(), by_pointer.export_png().unwrap());
    }

    #[test]
    fn events_deserialize_from_front_end_json() {
        let ev: InputEvent = serde_json::from_str(r#"{"type":"touchMove","clientX":3.5,"clientY":4}"#).unwrap();
        assert_eq!(ev, InputEvent::TouchMove { client_x: 3.5, client_y: 4.0 });
        let ev: InputEvent = serde_json::from_str(r#"{"type":"pointerUp"}"#).unwrap();
        assert_eq!(ev, InputEvent::PointerUp);
    }
}
