// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 实时显示 (macroquad)
///
/// 当前帧 + 最新检测框与跟踪ID; Q / Esc 退出, 已收集的裁剪照常保存。
use std::time::Instant;

use image::RgbImage;
use macroquad::prelude::*;

use crate::detection::tracker::id_to_color;
use crate::detection::types::{DetectionBatch, Frame};
use crate::input::FrameSource;
use crate::pipeline::capture::{CaptureLoop, CaptureOutcome, CaptureStats, FramePacer, Step};

/// RGB → RGBA (macroquad 纹理格式)
pub fn rgb_to_rgba(image: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize * 4);
    for p in image.pixels() {
        out.extend_from_slice(&[p[0], p[1], p[2], 255]);
    }
    out
}

/// 等比缩放居中: 返回 (左上x, 左上y, 缩放比例)
pub fn fit_to_screen(tex_w: f32, tex_h: f32, screen_w: f32, screen_h: f32) -> (f32, f32, f32) {
    if tex_w <= 0.0 || tex_h <= 0.0 {
        return (0.0, 0.0, 1.0);
    }
    let scale = (screen_w / tex_w).min(screen_h / tex_h);
    let x = (screen_w - tex_w * scale) / 2.0;
    let y = (screen_h - tex_h * scale) / 2.0;
    (x, y, scale)
}

/// 本帧是否请求退出
pub fn quit_requested() -> bool {
    is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) || is_quit_requested()
}

pub struct OverlayRenderer {
    texture: Option<Texture2D>,
    render_count: u64,
    render_last: Instant,
    render_fps: f64,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            texture: None,
            render_count: 0,
            render_last: Instant::now(),
            render_fps: 0.0,
        }
    }

    /// 上传当前帧; 分辨率不变时只更新像素
    pub fn update(&mut self, frame: &Frame) {
        let (w, h) = (frame.width() as u16, frame.height() as u16);
        let bytes = rgb_to_rgba(&frame.image);

        match &self.texture {
            Some(tex) if tex.width() == w as f32 && tex.height() == h as f32 => {
                tex.update(&Image {
                    bytes,
                    width: w,
                    height: h,
                });
            }
            _ => {
                let texture = Texture2D::from_rgba8(w, h, &bytes);
                texture.set_filter(FilterMode::Linear);
                self.texture = Some(texture);
            }
        }
    }

    pub fn draw(&mut self, batch: Option<&DetectionBatch>, stats: &CaptureStats) {
        clear_background(BLACK);

        if let Some(texture) = &self.texture {
            let (ox, oy, scale) =
                fit_to_screen(texture.width(), texture.height(), screen_width(), screen_height());

            draw_texture_ex(
                texture,
                ox,
                oy,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(texture.width() * scale, texture.height() * scale)),
                    ..Default::default()
                },
            );

            if let Some(batch) = batch {
                for (track_id, bbox) in batch.tracked() {
                    let (r, g, b) = id_to_color(track_id);
                    let color = Color::from_rgba(r, g, b, 255);
                    let x1 = bbox.x1 * scale + ox;
                    let y1 = bbox.y1 * scale + oy;
                    let x2 = bbox.x2 * scale + ox;
                    let y2 = bbox.y2 * scale + oy;

                    draw_rectangle_lines(x1, y1, x2 - x1, y2 - y1, 3.0, color);
                    let label = format!("ID:{} {:.2}", track_id, bbox.confidence);
                    draw_text(&label, x1, y1 - 5.0, 20.0, color);
                }
            }
        }

        // FPS统计
        self.render_count += 1;
        let elapsed = self.render_last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.render_fps = self.render_count as f64 / elapsed;
            self.render_count = 0;
            self.render_last = Instant::now();
        }

        let hud = format!(
            "frames {} | dropped {} | crops {} | {:.0} fps | Q/Esc quit",
            stats.frames_read, stats.frames_dropped, stats.crops_collected, self.render_fps
        );
        draw_text(&hud, 10.0, 24.0, 22.0, WHITE);
    }
}

/// 带窗口的采集循环, 每次迭代渲染一帧
pub async fn display_loop<S: FrameSource>(
    mut capture: CaptureLoop<S>,
    mut pacer: FramePacer,
) -> CaptureOutcome {
    prevent_quit();
    let mut renderer = OverlayRenderer::new();

    loop {
        if quit_requested() {
            capture.request_quit();
        }
        pacer.wait();
        if let Step::Finished(_) = capture.step() {
            break;
        }

        if let Some(frame) = capture.current_frame() {
            renderer.update(frame);
        }
        renderer.draw(capture.latest_batch(), capture.stats());
        next_frame().await;
    }

    capture.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_rgba() {
        let image = RgbImage::from_pixel(2, 1, ::image::Rgb([1, 2, 3]));
        assert_eq!(rgb_to_rgba(&image), vec![1, 2, 3, 255, 1, 2, 3, 255]);
    }

    #[test]
    fn test_fit_keeps_aspect_ratio() {
        let (x, y, scale) = fit_to_screen(1920.0, 1080.0, 960.0, 720.0);
        assert!((scale - 0.5).abs() < 1e-6);
        assert!(x.abs() < 1e-3);
        assert!((y - 90.0).abs() < 1e-3);

        assert_eq!(fit_to_screen(0.0, 10.0, 100.0, 100.0), (0.0, 0.0, 1.0));
    }
}
