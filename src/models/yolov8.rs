// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、letterbox 预处理、推理、后处理 (解码 + NMS)

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, ArrayView2, Axis};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::Model;
use crate::config::DetectorConfig;
use crate::detection::types::BBox;
use crate::non_max_suppression;

/// letterbox 填充灰度值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(i32),
    Trt(i32),
}

impl FromStr for Device {
    type Err = anyhow::Error;

    /// `cpu`, `cuda`, `cuda:1`, `trt`, `trt:0`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => (
                kind.to_string(),
                id.parse::<i32>()
                    .with_context(|| format!("invalid device id in '{}'", s))?,
            ),
            None => (s.clone(), 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(id)),
            "trt" | "tensorrt" => Ok(Device::Trt(id)),
            _ => bail!("unknown device '{}', expected cpu | cuda[:N] | trt[:N]", s),
        }
    }
}

/// 等比缩放: 返回 (缩放比例, 新宽, 新高)
pub fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// YOLOv8 模型结构
pub struct YOLOv8 {
    session: Session,
    model_path: PathBuf,
    device: Device,
    width: u32,
    height: u32,
    conf: f32,
    iou: f32,
    class_id: Option<u32>,
    resizer: fr::Resizer,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let device: Device = config.device.parse()?;
        if !config.model_path.exists() {
            bail!("model file not found: {}", config.model_path.display());
        }

        let mut builder = Session::builder().context("failed to create ORT session builder")?;
        builder = match device {
            Device::Cpu => builder,
            Device::Cuda(id) => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(id)
                    .build()])
                .context("failed to register CUDA execution provider")?,
            Device::Trt(id) => builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(id)
                        .build(),
                    CUDAExecutionProvider::default().with_device_id(id).build(),
                ])
                .context("failed to register TensorRT execution provider")?,
        };
        let session = builder
            .commit_from_file(&config.model_path)
            .with_context(|| format!("failed to load {}", config.model_path.display()))?;

        Ok(Self {
            session,
            model_path: config.model_path.clone(),
            device,
            width: config.input_size,
            height: config.input_size,
            conf: config.conf_threshold,
            iou: config.iou_threshold,
            class_id: Some(config.class_id),
            resizer: fr::Resizer::new(),
        })
    }

    /// letterbox 预处理: 等比缩放贴左上角, 其余填充灰色
    ///
    /// 返回 NCHW 张量数据与缩放比例
    pub fn preprocess(&mut self, image: &RgbImage) -> Result<(Vec<f32>, f32)> {
        let (w0, h0) = image.dimensions();
        if w0 == 0 || h0 == 0 {
            bail!("empty frame {}x{}", w0, h0);
        }
        let (ratio, w_new, h_new) =
            scale_wh(w0 as f32, h0 as f32, self.width as f32, self.height as f32);
        let w_new = (w_new as u32).clamp(1, self.width);
        let h_new = (h_new as u32).clamp(1, self.height);

        let src = fr::images::ImageRef::new(w0, h0, image.as_raw(), fr::PixelType::U8x3)
            .context("failed to create fast_image_resize source")?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("fast_image_resize letterbox scale failed")?;

        let mut ys = Array::from_elem(
            (1, 3, self.height as usize, self.width as usize),
            PAD_VALUE,
        );
        let raw = dst.buffer();
        let row = w_new as usize * 3;
        for y in 0..h_new as usize {
            for x in 0..w_new as usize {
                let idx = y * row + x * 3;
                ys[[0, 0, y, x]] = raw[idx] as f32 / 255.0;
                ys[[0, 1, y, x]] = raw[idx + 1] as f32 / 255.0;
                ys[[0, 2, y, x]] = raw[idx + 2] as f32 / 255.0;
            }
        }

        Ok((ys.into_raw_vec_and_offset().0, ratio))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Model for YOLOv8 {
    fn forward(&mut self, image: &RgbImage) -> Result<Vec<BBox>> {
        let (input, ratio) = self.preprocess(image)?;
        let shape = [1usize, 3, self.height as usize, self.width as usize];
        let tensor = Tensor::from_array((shape, input.into_boxed_slice()))
            .context("failed to create YOLO input tensor")?
            .into_dyn();

        let outputs = self
            .session
            .run(ort::inputs!["images" => tensor])
            .context("YOLOv8 inference failed")?;

        // YOLOv8 output: [1, 4 + nc, anchors]
        let (out_shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .context("failed to extract YOLOv8 output tensor")?;
        if out_shape.len() != 3 {
            bail!("unexpected output rank {:?}", out_shape);
        }
        let attrs = out_shape[1] as usize;
        let anchors = out_shape[2] as usize;

        decode_predictions(
            data,
            (attrs, anchors),
            ratio,
            (image.width() as f32, image.height() as f32),
            self.conf,
            self.iou,
            self.class_id,
        )
    }

    fn summary(&self) {
        info!(
            "📦 YOLOv8: {} | 输入 {}x{} | 设备 {:?} | conf {:.2} | iou {:.2}",
            self.model_path.display(),
            self.width,
            self.height,
            self.device,
            self.conf,
            self.iou
        );
    }
}

/// 解码 YOLOv8 输出并做 NMS
///
/// `data` 按 `[attrs, anchors]` 行主序排列, 每列为 `[cx, cy, w, h, cls0, cls1, ...]`。
/// `class_id` 非空时只保留最高分类别等于该类别的候选框。
pub fn decode_predictions(
    data: &[f32],
    (attrs, anchors): (usize, usize),
    ratio: f32,
    (width_original, height_original): (f32, f32),
    conf: f32,
    iou: f32,
    class_id: Option<u32>,
) -> Result<Vec<BBox>> {
    const CXYWH_OFFSET: usize = 4;
    if attrs <= CXYWH_OFFSET {
        bail!("output has {} attributes, expected > 4", attrs);
    }
    let preds = ArrayView2::from_shape((attrs, anchors), data)
        .map_err(|e| anyhow!("output shape mismatch: {}", e))?;

    let mut boxes = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let (id, confidence) = pred
            .iter()
            .skip(CXYWH_OFFSET)
            .enumerate()
            .fold((0usize, f32::MIN), |max, (i, &s)| {
                if s > max.1 {
                    (i, s)
                } else {
                    max
                }
            });

        if confidence < conf {
            continue;
        }
        if matches!(class_id, Some(c) if c as usize != id) {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        boxes.push(BBox::new(
            (cx - w / 2.0).clamp(0.0, width_original),
            (cy - h / 2.0).clamp(0.0, height_original),
            (cx + w / 2.0).clamp(0.0, width_original),
            (cy + h / 2.0).clamp(0.0, height_original),
            confidence,
            id as u32,
        ));
    }

    non_max_suppression(&mut boxes, iou);
    Ok(boxes)
}
