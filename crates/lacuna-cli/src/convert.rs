use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;

use lacuna_core::RgbImage;

/// Load any supported image file as 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .to_rgb8();
    let (w, h) = (img.width() as usize, img.height() as usize);

    let mut data = Array2::from_elem((h, w), [0u8; 3]);
    for (x, y, pixel) in img.enumerate_pixels() {
        data[[y as usize, x as usize]] = pixel.0;
    }
    Ok(RgbImage::new(data))
}

/// Load a mask file as 8-bit grayscale intensities.
pub fn load_gray(path: &Path) -> Result<Array2<u8>> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .to_luma8();
    let (w, h) = (img.width() as usize, img.height() as usize);

    let mut data = Array2::zeros((h, w));
    for (x, y, pixel) in img.enumerate_pixels() {
        data[[y as usize, x as usize]] = pixel.0[0];
    }
    Ok(data)
}

/// Save an 8-bit RGB image, format chosen from the file extension.
pub fn save_rgb(image: &RgbImage, path: &Path) -> Result<()> {
    let (h, w) = image.data.dim();
    let mut out = image::RgbImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            out.put_pixel(x as u32, y as u32, image::Rgb(image.data[[y, x]]));
        }
    }
    out.save(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}
