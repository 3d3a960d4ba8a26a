use std::path::Path;

use image::imageops::FilterType;
use ndarray::{Array1, ArrayView1};

use crate::error::DecodeError;

const SIDE: u32 = 28;

/// Loads an arbitrary image file as a 28x28 grayscale digit with values in [0, 1], the layout the
/// sprite uses.
pub fn load_digit(path: &Path) -> Result<Array1<f32>, DecodeError> {
    let img = image::open(path).map_err(|source| DecodeError::Image {
        source_id: path.display().to_string(),
        source,
    })?;
    let gray = img
        .resize_exact(SIDE, SIDE, FilterType::Triangle)
        .to_luma8();
    Ok(gray
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / 255.0)
        .collect())
}

/// Renders a 784-value image as ASCII shading, one line per pixel row.
pub fn visualize(image: ArrayView1<f32>) -> String {
    let mut out = String::with_capacity(image.len() * 4);
    for (index, activation) in image.iter().enumerate() {
        if index > 0 && index % SIDE as usize == 0 {
            out.push('\n');
        }
        out.push(match *activation {
            a if a < 0.2 => ' ',
            a if a < 0.4 => '░',
            a if a < 0.6 => '▒',
            a if a < 0.8 => '▓',
            _ => '█',
        });
    }
    out
}
