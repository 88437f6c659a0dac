//! Pixel-level building blocks shared by the analysis, quality and
//! segmentation stages

pub mod color;
pub mod filters;
pub mod morphology;

pub use color::{grayscale, rgb_to_hsv, rgb_to_ycrcb};
pub use filters::{
    adaptive_threshold_gaussian, adjust_contrast, bilateral_filter, canny, gaussian_blur,
    laplacian, unsharp_mask,
};
pub use morphology::{close, dilate, erode, open, StructuringElement};
