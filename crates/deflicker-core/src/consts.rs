/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Largest representable 8-bit sample value.
pub const MAX_SAMPLE: f64 = 255.0;

/// Number of distinct 8-bit sample values (size of a per-channel lookup table).
pub const SAMPLE_LEVELS: usize = 256;

/// Correction factor used for a channel whose ratio is undefined.
pub const IDENTITY_FACTOR: f64 = 1.0;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Frames buffered per input stream when decode prefetching is enabled
/// and the configuration does not name a depth.
pub const DEFAULT_PREFETCH_DEPTH: usize = 2;

/// Default constant rate factor handed to the ffmpeg encoder.
pub const DEFAULT_CRF: u32 = 18;

/// Default x264/x265 preset handed to the ffmpeg encoder.
pub const DEFAULT_PRESET: &str = "medium";

/// Default output codec handed to the ffmpeg encoder.
pub const DEFAULT_CODEC: &str = "libx264";

/// Planar pixel format the ffmpeg encoder converts packed input into.
pub const DEFAULT_OUTPUT_PIX_FMT: &str = "yuv420p";

/// Output frame rate used when neither the configuration nor the target
/// stream provides one.
pub const FALLBACK_FRAME_RATE: (u32, u32) = (30, 1);

/// Delay between resubmissions while the encoder reports backpressure.
pub const BACKPRESSURE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);
