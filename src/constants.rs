//! Default thresholds and kernel sizes for chart analysis
//!
//! Every value here that a vendor layout may need to tune is also a profile
//! field (see [`crate::config::Profile`]); the constants are the documented
//! defaults used when a profile does not override them.

/// Circle search parameters
pub mod circles {
    /// Smallest radius considered by the Hough search (pixels)
    pub const MIN_RADIUS: i32 = 10;

    /// Minimum center distance as a fraction of the smallest image side
    pub const MIN_DISTANCE_FACTOR: f64 = 0.1;

    /// Canny high threshold passed to the Hough gradient search
    pub const HOUGH_CANNY_THRESHOLD: f64 = 50.0;

    /// Circle "perfectness" required by `HOUGH_GRADIENT_ALT`
    pub const HOUGH_PERFECTNESS: f64 = 0.95;

    /// Gamma applied to the grayscale image before the search
    pub const SEARCH_GAMMA: f64 = 0.5;

    /// Gaussian kernel size used to smooth the grayscale image
    pub const BLUR_KERNEL_SIZE: i32 = 5;

    /// Sobel aperture for the gradient used by the donut vote
    pub const SOBEL_APERTURE: i32 = 5;

    /// Number of angles sampled along the circumference for the donut vote
    pub const DONUT_SAMPLES: usize = 100;

    /// Pixels trimmed from the detected edge before deriving the ring
    pub const EDGE_INSET: f32 = 4.0;

    /// Inner/outer radius ratio of a typical donut chart
    pub const INNER_TO_OUTER_RATIO: f32 = 2.0 / 3.0;

    /// Secondary circles smaller than this fraction of the primary are noise
    pub const MIN_RELATIVE_RADIUS: f32 = 0.3;

    /// Number of charts processed per image (overview + components breakdown)
    pub const MAX_CHARTS: usize = 2;
}

/// Masking parameters for the de-charted and de-texted images
pub mod masking {
    /// Width of the white frame painted over the image border
    pub const BORDER_WIDTH: i32 = 5;

    /// Margin added around the box covering all circles
    pub const BOX_MARGIN: i32 = 4;

    /// Extra radius painted over each large circle
    pub const CIRCLE_ERASE_MARGIN: i32 = 10;

    /// Secondary circles below this radius do not extend the erased box
    pub const MIN_BOX_RADIUS: f32 = 50.0;

    /// Circles larger than this fraction of the smallest side get erased as discs
    pub const DISC_ERASE_FACTOR: f32 = 0.25;

    /// Pixels whose brightest channel is below this are treated as text
    pub const TEXT_DARKNESS_THRESHOLD: f64 = 70.0;

    /// Elliptic kernel used to grow the text mask before inpainting
    pub const TEXT_DILATE_SIZE: i32 = 5;

    /// Inpainting neighbourhood radius
    pub const INPAINT_RADIUS: f64 = 20.0;
}

/// Legend reconstruction parameters
pub mod legend {
    /// Gray level under which a de-charted pixel belongs to a glyph or swatch
    pub const GLYPH_THRESHOLD: f64 = 200.0;

    /// Elliptic kernel that survives only on blobs thicker than a glyph stroke
    pub const BLOB_KERNEL_SIZE: i32 = 6;

    /// Extra growth of the blob mask before it is subtracted
    pub const BLOB_GROW_SIZE: i32 = 5;

    /// Horizontal dilation that merges characters into one line block
    pub const HORIZONTAL_DILATION: i32 = 18;

    /// Vertical dilation used when a profile does not set one
    pub const VERTICAL_DILATION: i32 = 5;

    /// Blocks narrower than this cannot hold a label
    pub const MIN_BLOCK_WIDTH: i32 = 20;

    /// Pixels trimmed on each side of a block before OCR
    pub const BLOCK_SHRINK: i32 = 3;

    /// Gamma that pushes every non-white swatch pixel towards black
    pub const SWATCH_GAMMA: f64 = 0.1;
}

/// Color reconciliation thresholds
pub mod color {
    /// Per-channel distance under which a color is folded into a legend color
    pub const DISTANCE_THRESHOLD: u8 = 20;

    /// Fraction of ring pixels that must match the legend to accept the result
    pub const MIN_ATTRIBUTED_FRACTION: f64 = 0.5;

    /// Unmatched colors above this ring fraction count as unattributed mass
    pub const UNATTRIBUTED_NOISE_FRACTION: f64 = 0.05;

    /// Upper bound of the per-label correction, as a fraction of ring pixels
    pub const CORRECTION_CAP: f64 = 0.01;

    /// Optional labels covering less than this ring fraction are dropped
    pub const OPTIONAL_NOISE_FRACTION: f64 = 0.0015;

    /// Pixels with every channel at or above this level are page background
    pub const BACKGROUND_THRESHOLD: u8 = 250;
}

/// Direct-percentage OCR parameters
pub mod ocr {
    /// Horizontal extent of the search window, in outer radii from the center
    pub const WINDOW_HALF_WIDTH: f32 = 1.9;

    /// Vertical extent of the search window, in outer radii from the center
    pub const WINDOW_HALF_HEIGHT: f32 = 1.5;

    /// Brightest-channel level under which a pixel belongs to text
    pub const TEXT_THRESHOLD: f64 = 70.0;

    /// Rectangular dilation used when a profile does not size it
    pub const DEFAULT_DILATE_WIDTH: i32 = 20;
    pub const DEFAULT_DILATE_HEIGHT: i32 = 30;

    /// Fraction of the dilation width trimmed on each side of a block
    pub const BLOCK_SHRINK_FACTOR: f64 = 0.15;

    /// Gamma applied to text crops when a profile does not set one
    pub const DEFAULT_GAMMA: f64 = 1.8;

    /// Crops shorter than this are upscaled by a power of two
    pub const MIN_CROP_HEIGHT: i32 = 50;

    /// Blocks narrower than this cannot hold a label and a value
    pub const MIN_BLOCK_WIDTH: i32 = 20;

    /// Percentages above this are OCR misreads
    pub const MAX_PERCENT: f64 = 100.0;
}

/// Confidence bookkeeping
pub mod confidence {
    /// Penalty for a heuristic digit substitution ("S" read for "5")
    pub const DIGIT_SUBSTITUTION_MALUS: f64 = 0.1;

    /// Penalty for duplicate labels or several labels in one block
    pub const AMBIGUITY_MALUS: f64 = 0.2;

    /// Direct-OCR results under this confidence are flagged for review
    pub const MIN_OCR_CONFIDENCE: f64 = 0.9;

    /// End-of-life share assumed when too many core labels are missing
    pub const EOL_PLACEHOLDER_PERCENT: f64 = 0.5;

    /// Allowed deviation of the core shares from 100
    pub const CORE_SUM_TOLERANCE: f64 = 0.5;

    /// Allowed relative deviation of the sub-components from manufacturing
    pub const DETAILS_SUM_TOLERANCE: f64 = 0.01;
}
