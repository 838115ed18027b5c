use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont, point};
use anyhow::{Result, anyhow};
use audrex_cache::Atom;
use audrex_core::strip_markup;
use bytemuck::{cast_slice, cast_slice_mut};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::{Color, Paint, Pixmap, PremultipliedColorU8, Rect, Transform};
use tracing::{debug, trace};

const PROMPT_PX: f32 = 30.0;
const LABEL_PX: f32 = 26.0;
const BUTTON_HEIGHT: f32 = 56.0;
const BUTTON_PAD_X: f32 = 24.0;
const MIN_BUTTON_WIDTH: f32 = 96.0;
const PROMPT_GAP: f32 = 48.0;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const BUTTON_FILL: [u8; 4] = [72, 72, 80, 255];
const BUTTON_FILL_DISABLED: [u8; 4] = [36, 36, 40, 255];
const TEXT: [u8; 4] = [255, 255, 255, 255];
const TEXT_DISABLED: [u8; 4] = [120, 120, 120, 255];

/// What the panel shows for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct PanelView<'a> {
    pub prompt: &'a str,
    /// Per-choice markup; only the visible text is drawn.
    pub buttons: &'a [String],
    pub enabled: bool,
    pub margin_vertical: f32,
    pub margin_horizontal: f32,
    /// False once the trial is over; the panel is blanked.
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TextStyle {
    Prompt,
    Label,
    LabelDisabled,
}

impl TextStyle {
    fn size_px(self) -> f32 {
        match self {
            TextStyle::Prompt => PROMPT_PX,
            TextStyle::Label | TextStyle::LabelDisabled => LABEL_PX,
        }
    }

    fn color(self) -> Color {
        let c = match self {
            TextStyle::Prompt | TextStyle::Label => TEXT,
            TextStyle::LabelDisabled => TEXT_DISABLED,
        };
        Color::from_rgba8(c[0], c[1], c[2], c[3])
    }
}

struct TextCache {
    font: Option<FontArc>,
    map: HashMap<(Atom, TextStyle), Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: Option<FontArc>) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, text: &str, style: TextStyle) -> Option<Arc<Pixmap>> {
        let font = self.font.as_ref()?;
        let key = (Atom::from(text), style);
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, style.size_px(), font, style.color())?);
        trace!(text, ?style, width = pm.width(), height = pm.height(), "text rasterized");
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }
}

/// Rasterizes one line of text into a tightly cropped, premultiplied pixmap.
/// Returns `None` when nothing in `text` has an outline.
fn render_text_pixmap(
    text: &str,
    font_size: f32,
    font: &FontArc,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // 1) Layout with baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    // 2) Union pixel bounds from outlined glyphs
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }

    if min_x == f32::INFINITY {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;

    // 3) Transparent pixmap, then coverage blended in premultiplied space
    let mut pm = Pixmap::new(w, h)?;
    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();

    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            out.draw(|x, y, cov| {
                if cov <= f32::EPSILON {
                    return;
                }
                let ix = (x as f32 + b.min.x - min_x).floor() as i32;
                let iy = (y as f32 + b.min.y - min_y).floor() as i32;
                if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                    return;
                }
                let i = iy as usize * stride + ix as usize;
                let Some(bg) = dst.get(i).copied() else {
                    return;
                };

                let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
                let sa = (a_lin * 255.0) as u8;
                let inv = 1.0 - (sa as f32 / 255.0);

                // Porter-Duff over: out = src + bg * (1 - src.a)
                let r = ((cu[0] as f32 * a_lin) as u8).saturating_add((bg.red() as f32 * inv) as u8);
                let gr = ((cu[1] as f32 * a_lin) as u8).saturating_add((bg.green() as f32 * inv) as u8);
                let bl = ((cu[2] as f32 * a_lin) as u8).saturating_add((bg.blue() as f32 * inv) as u8);
                let a = sa.saturating_add((bg.alpha() as f32 * inv) as u8);

                if let Some(px) = PremultipliedColorU8::from_rgba(r, gr, bl, a) {
                    dst[i] = px;
                }
            });
        }
    }

    Some(pm)
}

pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub buttons: usize,
}

/// Draws the prompt and one row of choice buttons, and maps pointer
/// positions back to choice indices.
pub struct ButtonPanelRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    canvas: Pixmap,
    text_cache: TextCache,
    buttons: Vec<Rect>,
}

impl ButtonPanelRenderer {
    /// Without a font the buttons are still drawn and clickable, just
    /// unlabeled.
    pub fn new(width: u32, height: u32, font: Option<FontArc>) -> Result<Self> {
        let mut canvas = Pixmap::new(width.max(1), height.max(1))
            .ok_or_else(|| anyhow!("canvas of {width}x{height} could not be allocated"))?;
        canvas.fill(rgba(BACKGROUND));

        Ok(Self {
            width: canvas.width(),
            height: canvas.height(),
            center: (canvas.width() as f32 / 2.0, canvas.height() as f32 / 2.0),
            canvas,
            text_cache: TextCache::new(font),
            buttons: Vec::new(),
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        let mut canvas = Pixmap::new(new_width.max(1), new_height.max(1))
            .ok_or_else(|| anyhow!("canvas of {new_width}x{new_height} could not be allocated"))?;
        canvas.fill(rgba(BACKGROUND));
        self.width = canvas.width();
        self.height = canvas.height();
        self.center = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        self.canvas = canvas;
        self.buttons.clear();
        debug!(width = self.width, height = self.height, "canvas resized");
        Ok(())
    }

    /// Choice under the pointer, if any. Uses the layout of the last frame.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<usize> {
        self.buttons
            .iter()
            .position(|r| x >= r.left() && x < r.right() && y >= r.top() && y < r.bottom())
    }

    #[cfg(test)]
    fn button_rects(&self) -> &[Rect] {
        &self.buttons
    }

    /// Lays buttons out in one centered row, `margin_horizontal` on either
    /// side of each and `margin_vertical` above the row.
    fn layout(&mut self, labels: &[String], margin_v: f32, margin_h: f32) {
        let widths: Vec<f32> = labels
            .iter()
            .map(|label| {
                let text_w = self
                    .text_cache
                    .get_or_render(label, TextStyle::Label)
                    .map_or(0.0, |pm| pm.width() as f32);
                (text_w + 2.0 * BUTTON_PAD_X).max(MIN_BUTTON_WIDTH)
            })
            .collect();

        let total: f32 = widths.iter().map(|w| w + 2.0 * margin_h).sum();
        let mut x = self.center.0 - total / 2.0;
        let y = self.center.1 - BUTTON_HEIGHT / 2.0 + margin_v;

        self.buttons = widths
            .iter()
            .filter_map(|w| {
                x += margin_h;
                let rect = Rect::from_xywh(x, y, *w, BUTTON_HEIGHT);
                x += w + margin_h;
                rect
            })
            .collect();
    }

    pub fn render_frame(&mut self, view: &PanelView<'_>, frame_buffer: &mut [u8]) -> Result<FrameStats> {
        let t_draw = Instant::now();
        self.canvas.fill(rgba(BACKGROUND));

        if view.visible {
            let labels: Vec<String> = view.buttons.iter().map(|b| strip_markup(b)).collect();
            self.layout(&labels, view.margin_vertical, view.margin_horizontal);

            let prompt = strip_markup(view.prompt);
            if !prompt.is_empty() {
                if let Some(pm) = self.text_cache.get_or_render(&prompt, TextStyle::Prompt) {
                    let pos = (self.center.0, self.center.1 - BUTTON_HEIGHT / 2.0 - PROMPT_GAP);
                    self.blit_pixmap(&pm, pos);
                }
            }

            let (fill, style) = if view.enabled {
                (BUTTON_FILL, TextStyle::Label)
            } else {
                (BUTTON_FILL_DISABLED, TextStyle::LabelDisabled)
            };
            let mut paint = Paint::default();
            paint.anti_alias = false;
            paint.set_color(rgba(fill));

            let rects = self.buttons.clone();
            for (rect, label) in rects.iter().zip(&labels) {
                self.canvas.fill_rect(*rect, &paint, Transform::identity(), None);
                if let Some(pm) = self.text_cache.get_or_render(label, style) {
                    let pos = (rect.x() + rect.width() / 2.0, rect.y() + rect.height() / 2.0);
                    self.blit_pixmap(&pm, pos);
                }
            }
        } else {
            self.buttons.clear();
        }
        let draw = t_draw.elapsed();

        let t_copy = Instant::now();
        let canvas_data = self.canvas.data();
        if frame_buffer.len() != canvas_data.len() {
            return Err(anyhow!(
                "frame buffer holds {} bytes, canvas {}x{} needs {}",
                frame_buffer.len(),
                self.width,
                self.height,
                canvas_data.len()
            ));
        }
        frame_buffer.copy_from_slice(canvas_data);

        Ok(FrameStats {
            draw,
            copy: t_copy.elapsed(),
            buttons: self.buttons.len(),
        })
    }

    /// Blends `pm` centered on `pos`, clipped to the canvas.
    fn blit_pixmap(&mut self, pm: &Pixmap, pos: (f32, f32)) {
        let (w, h) = (pm.width(), pm.height());
        let (cw, ch) = (self.width as usize, self.height as usize);

        let x = (pos.0 - w as f32 * 0.5) as i32;
        let y = (pos.1 - h as f32 * 0.5) as i32;

        // Cull fully off-screen
        if x + w as i32 <= 0 || y + h as i32 <= 0 || x >= cw as i32 || y >= ch as i32 {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x_offset = (-x).max(0) as usize;
        let src_y_offset = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x_offset).min(cw - dst_x);
        let copy_h = (h as usize - src_y_offset).min(ch - dst_y);

        let src_u32: &[u32] = cast_slice(pm.data());
        let dst_u32: &mut [u32] = cast_slice_mut(self.canvas.data_mut());

        for row in 0..copy_h {
            let src_row_start = (src_y_offset + row) * w as usize + src_x_offset;
            let dst_row_start = (dst_y + row) * cw + dst_x;

            for i in 0..copy_w {
                let s = src_u32[src_row_start + i];
                let d = dst_u32[dst_row_start + i];

                let sa = (s >> 24) & 0xFF;
                let inv = 255 - sa;

                let sr = s & 0xFF;
                let sg = (s >> 8) & 0xFF;
                let sb = (s >> 16) & 0xFF;

                let dr = d & 0xFF;
                let dg = (d >> 8) & 0xFF;
                let db = (d >> 16) & 0xFF;
                let da = (d >> 24) & 0xFF;

                let r = (sr + (dr * inv + 127) / 255).min(255);
                let g = (sg + (dg * inv + 127) / 255).min(255);
                let b = (sb + (db * inv + 127) / 255).min(255);
                let a = (sa + (da * inv + 127) / 255).min(255);

                dst_u32[dst_row_start + i] = (a << 24) | (b << 16) | (g << 8) | r;
            }
        }
    }
}

fn rgba(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| format!("<button>{s}</button>")).collect()
    }

    fn view<'a>(buttons: &'a [String], enabled: bool) -> PanelView<'a> {
        PanelView {
            prompt: "<p>Which ear?</p>",
            buttons,
            enabled,
            margin_vertical: 0.0,
            margin_horizontal: 8.0,
            visible: true,
        }
    }

    fn pixel(frame: &[u8], width: u32, x: f32, y: f32) -> [u8; 4] {
        let i = (y as usize * width as usize + x as usize) * 4;
        [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]
    }

    #[test]
    fn buttons_are_laid_out_in_a_centered_row() {
        let mut renderer = ButtonPanelRenderer::new(800, 600, None).unwrap();
        let buttons = labels(&["left", "right", "both"]);
        let mut frame = vec![0u8; 800 * 600 * 4];
        let stats = renderer.render_frame(&view(&buttons, true), &mut frame).unwrap();
        assert_eq!(stats.buttons, 3);

        let rects = renderer.button_rects();
        assert!(rects.windows(2).all(|w| w[0].right() + 16.0 <= w[1].left() + 0.01));
        let mid = (rects[0].left() + rects[2].right()) / 2.0;
        assert!((mid - 400.0).abs() < 1.0);
    }

    #[test]
    fn hit_test_maps_points_to_choices() {
        let mut renderer = ButtonPanelRenderer::new(640, 480, None).unwrap();
        let buttons = labels(&["a", "b"]);
        let mut frame = vec![0u8; 640 * 480 * 4];
        renderer.render_frame(&view(&buttons, true), &mut frame).unwrap();

        let second = renderer.button_rects()[1];
        let cx = second.x() + second.width() / 2.0;
        let cy = second.y() + second.height() / 2.0;
        assert_eq!(renderer.hit_test(cx, cy), Some(1));
        assert_eq!(renderer.hit_test(1.0, 1.0), None);
    }

    #[test]
    fn disabled_buttons_are_drawn_dimmer() {
        let mut renderer = ButtonPanelRenderer::new(320, 240, None).unwrap();
        let buttons = labels(&["x"]);
        let mut frame = vec![0u8; 320 * 240 * 4];

        renderer.render_frame(&view(&buttons, true), &mut frame).unwrap();
        let r = renderer.button_rects()[0];
        let enabled = pixel(&frame, 320, r.x() + 2.0, r.y() + 2.0);

        renderer.render_frame(&view(&buttons, false), &mut frame).unwrap();
        let disabled = pixel(&frame, 320, r.x() + 2.0, r.y() + 2.0);

        assert_eq!(enabled, BUTTON_FILL);
        assert_eq!(disabled, BUTTON_FILL_DISABLED);
    }

    #[test]
    fn finished_trial_blanks_the_panel() {
        let mut renderer = ButtonPanelRenderer::new(64, 64, None).unwrap();
        let buttons = labels(&["x"]);
        let mut frame = vec![7u8; 64 * 64 * 4];
        let mut hidden = view(&buttons, true);
        hidden.visible = false;
        let stats = renderer.render_frame(&hidden, &mut frame).unwrap();
        assert_eq!(stats.buttons, 0);
        assert_eq!(renderer.hit_test(32.0, 32.0), None);
        assert!(frame.chunks(4).all(|px| px == BACKGROUND));
    }

    #[test]
    fn mismatched_frame_buffer_is_an_error() {
        let mut renderer = ButtonPanelRenderer::new(10, 10, None).unwrap();
        let mut frame = vec![0u8; 12];
        assert!(renderer.render_frame(&view(&[], true), &mut frame).is_err());
    }

    #[test]
    fn resize_changes_canvas_and_clears_layout() {
        let mut renderer = ButtonPanelRenderer::new(100, 100, None).unwrap();
        let buttons = labels(&["x"]);
        let mut frame = vec![0u8; 100 * 100 * 4];
        renderer.render_frame(&view(&buttons, true), &mut frame).unwrap();
        renderer.resize(200, 50).unwrap();
        assert!(renderer.button_rects().is_empty());
        let mut bigger = vec![0u8; 200 * 50 * 4];
        renderer.render_frame(&view(&buttons, true), &mut bigger).unwrap();
    }
}
