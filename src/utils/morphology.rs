//! Grayscale morphology: dilate, erode, close, open
//!
//! Structuring elements are anchored at their center (`size / 2`). Samples
//! outside the image never contribute, so borders neither grow nor shrink
//! a region artificially.

use image::GrayImage;
use rayon::prelude::*;

/// Shape of the neighbourhood visited by a morphological operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Filled `width x height` rectangle
    Rect { width: u32, height: u32 },
    /// Ellipse inscribed in a `size x size` square
    Ellipse { size: u32 },
}

impl StructuringElement {
    #[must_use]
    pub fn square(size: u32) -> Self {
        Self::Rect {
            width: size,
            height: size,
        }
    }

    #[must_use]
    pub fn ellipse(size: u32) -> Self {
        Self::Ellipse { size }
    }

    /// `(dx, dy)` offsets relative to the anchor
    #[must_use]
    pub fn offsets(&self) -> Vec<(i64, i64)> {
        match *self {
            Self::Rect { width, height } => {
                let (ax, ay) = (i64::from(width / 2), i64::from(height / 2));
                (0..i64::from(height))
                    .flat_map(|y| (0..i64::from(width)).map(move |x| (x - ax, y - ay)))
                    .collect()
            },
            Self::Ellipse { size } => {
                let radius = i64::from(size / 2);
                let mut offsets = Vec::new();
                if radius == 0 {
                    offsets.push((0, 0));
                    return offsets;
                }
                let r2 = (radius * radius) as f64;
                for dy in -radius..=radius {
                    // Row half-width of the inscribed ellipse
                    let half = (radius as f64 * ((r2 - (dy * dy) as f64) / r2).sqrt()).round() as i64;
                    for dx in -half..=half {
                        offsets.push((dx, dy));
                    }
                }
                offsets
            },
        }
    }
}

/// Maximum over the structuring element
#[must_use]
pub fn dilate(image: &GrayImage, element: StructuringElement) -> GrayImage {
    apply(image, element, true)
}

/// Minimum over the structuring element
#[must_use]
pub fn erode(image: &GrayImage, element: StructuringElement) -> GrayImage {
    apply(image, element, false)
}

/// Dilate then erode: fills small holes
#[must_use]
pub fn close(image: &GrayImage, element: StructuringElement) -> GrayImage {
    erode(&dilate(image, element), element)
}

/// Erode then dilate: removes small specks
#[must_use]
pub fn open(image: &GrayImage, element: StructuringElement) -> GrayImage {
    dilate(&erode(image, element), element)
}

fn apply(image: &GrayImage, element: StructuringElement, take_max: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));
    let offsets = element.offsets();
    let src = image.as_raw();
    let mut out = vec![0u8; src.len()];

    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for (x, dst) in row.iter_mut().enumerate() {
                let x = x as i64;
                let mut acc = if take_max { u8::MIN } else { u8::MAX };
                for &(dx, dy) in &offsets {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx < 0 || sy < 0 || sx >= w || sy >= h {
                        continue;
                    }
                    let value = src[(sy * w + sx) as usize];
                    acc = if take_max { acc.max(value) } else { acc.min(value) };
                }
                *dst = acc;
            }
        });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_ellipse_shapes() {
        // 3x3 ellipse is a cross
        let cross = StructuringElement::ellipse(3).offsets();
        assert_eq!(cross.len(), 5);
        assert!(!cross.contains(&(1, 1)));

        // 5x5 ellipse keeps only the center of its top and bottom rows
        let ellipse = StructuringElement::ellipse(5).offsets();
        assert_eq!(ellipse.len(), 17);
        assert!(ellipse.contains(&(0, -2)));
        assert!(!ellipse.contains(&(1, -2)));
        assert!(ellipse.contains(&(-2, -1)));
    }

    #[test]
    fn test_even_rect_anchor() {
        let offsets = StructuringElement::square(2).offsets();
        assert_eq!(offsets, vec![(-1, -1), (0, -1), (-1, 0), (0, 0)]);
    }

    #[test]
    fn test_open_removes_isolated_speck() {
        let mut image = GrayImage::new(9, 9);
        image.put_pixel(4, 4, Luma([255]));
        let opened = open(&image, StructuringElement::ellipse(3));
        assert!(opened.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_close_fills_small_hole() {
        let mut image = GrayImage::from_pixel(9, 9, Luma([255]));
        image.put_pixel(4, 4, Luma([0]));
        let closed = close(&image, StructuringElement::ellipse(3));
        assert_eq!(closed.get_pixel(4, 4).0[0], 255);
        assert!(closed.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_dilate_grows_region() {
        let mut image = GrayImage::new(5, 5);
        image.put_pixel(2, 2, Luma([200]));
        let dilated = dilate(&image, StructuringElement::square(3));
        assert_eq!(dilated.pixels().filter(|p| p.0[0] == 200).count(), 9);
        let eroded = erode(&dilated, StructuringElement::square(3));
        assert_eq!(eroded.get_pixel(2, 2).0[0], 200);
        assert_eq!(eroded.get_pixel(1, 1).0[0], 0);
    }
}
