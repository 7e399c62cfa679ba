//! Spatial resizing of map stacks.

use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use fastcam_core::SaliencyError;

/// Interpolation used when resizing maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Bilinear with half-pixel centres, corners not aligned.
    #[default]
    Bilinear,
    /// Nearest neighbour, source index `floor(dst * in / out)`.
    Nearest,
}

impl FromStr for ResizeMode {
    type Err = SaliencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            _ => Err(SaliencyError::InvalidConfig(format!(
                "unknown resize mode '{s}'"
            ))),
        }
    }
}

/// Resize the two spatial axes of `x` to `size`.
///
/// The interpolation is separable and applied as two batched matrix
/// products, so it runs on every backend and stays differentiable.
///
/// # Arguments
///
/// * `x` - Tensor of shape (batch, channels, height, width)
/// * `size` - Target `[height, width]`
/// * `mode` - Interpolation mode
pub fn resize<B: Backend>(x: Tensor<B, 4>, size: [usize; 2], mode: ResizeMode) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let [out_h, out_w] = size;
    if height == out_h && width == out_w {
        return x;
    }

    let device = x.device();
    if height == 0 || width == 0 {
        return Tensor::zeros([batch, channels, out_h, out_w], &device);
    }

    let planes = batch * channels;

    // (planes, out_h, height)
    let rows = interpolation_matrix::<B>(height, out_h, mode, &device)
        .unsqueeze::<3>()
        .repeat_dim(0, planes);
    // (planes, width, out_w)
    let cols = interpolation_matrix::<B>(width, out_w, mode, &device)
        .transpose()
        .unsqueeze::<3>()
        .repeat_dim(0, planes);

    rows.matmul(x.reshape([planes, height, width]))
        .matmul(cols)
        .reshape([batch, channels, out_h, out_w])
}

/// Row-stochastic `(out_len, in_len)` matrix mapping input samples to output samples.
fn interpolation_matrix<B: Backend>(
    in_len: usize,
    out_len: usize,
    mode: ResizeMode,
    device: &B::Device,
) -> Tensor<B, 2> {
    if in_len == 0 || out_len == 0 {
        return Tensor::zeros([out_len, in_len], device);
    }

    let mut weights = vec![0.0f32; out_len * in_len];
    let scale = in_len as f32 / out_len as f32;
    let last = in_len - 1;

    for (dst, row) in weights.chunks_mut(in_len).enumerate() {
        match mode {
            ResizeMode::Nearest => {
                let src = ((dst as f32 * scale).floor() as usize).min(last);
                row[src] = 1.0;
            }
            ResizeMode::Bilinear => {
                let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
                let i0 = (src.floor() as usize).min(last);
                let i1 = (i0 + 1).min(last);
                let frac = src - i0 as f32;
                row[i0] += 1.0 - frac;
                row[i1] += frac;
            }
        }
    }

    Tensor::from_data(TensorData::new(weights, [out_len, in_len]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn input(data: &[f32], shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(data, &device).reshape(shape)
    }

    #[test]
    fn test_same_size_is_identity() {
        let x = input(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let out = resize(x.clone(), [2, 2], ResizeMode::Bilinear);
        let diff: f32 = (out - x).abs().max().into_scalar().elem();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_bilinear_upsample_matches_half_pixel_rule() {
        // 1x2 -> 1x4: [a, b] becomes [a, 0.75a + 0.25b, 0.25a + 0.75b, b]
        let x = input(&[0.0, 4.0], [1, 1, 1, 2]);
        let out = resize(x, [1, 4], ResizeMode::Bilinear);
        let values = out.into_data().to_vec::<f32>().unwrap();

        let expected = [0.0, 1.0, 3.0, 4.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-5, "{values:?}");
        }
    }

    #[test]
    fn test_nearest_upsample_repeats() {
        let x = input(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let out = resize(x, [4, 4], ResizeMode::Nearest);
        let values = out.into_data().to_vec::<f32>().unwrap();

        assert_eq!(&values[0..4], &[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(&values[12..16], &[3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_resize_preserves_constant_and_shape() {
        let x = input(&[0.5; 2 * 3 * 7 * 5], [2, 3, 7, 5]);
        let out = resize(x, [16, 9], ResizeMode::Bilinear);

        assert_eq!(out.dims(), [2, 3, 16, 9]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_empty_input_gives_zeros() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 0, 3], &device);
        let out = resize(x, [2, 2], ResizeMode::Bilinear);

        assert_eq!(out.dims(), [1, 1, 2, 2]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| *v == 0.0));

        let matrix = interpolation_matrix::<TestBackend>(0, 3, ResizeMode::Nearest, &device);
        assert_eq!(matrix.dims(), [3, 0]);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("bilinear".parse::<ResizeMode>().unwrap(), ResizeMode::Bilinear);
        assert_eq!("Nearest".parse::<ResizeMode>().unwrap(), ResizeMode::Nearest);
        assert!("bicubic".parse::<ResizeMode>().is_err());
    }

    #[test]
    fn test_downsample() {
        let x = input(&[1.0, 3.0, 5.0, 7.0], [1, 1, 1, 4]);
        let out = resize(x, [1, 2], ResizeMode::Bilinear);
        let values = out.into_data().to_vec::<f32>().unwrap();

        // Half-pixel centres fall between source pairs.
        assert!((values[0] - 2.0).abs() < 1e-5);
        assert!((values[1] - 6.0).abs() < 1e-5);
    }
}
