// src/ranker.rs
//
// Turns the resolver's raw format list into the candidates offered to a user:
// drop what cannot be played as a video file, fill in missing sizes, and order
// best-first.

use crate::models::{FormatDescriptor, RankedFormat};

const MB: f64 = 1024.0 * 1024.0;

/// Containers that can carry an audio track merged in during the transfer.
const MERGEABLE_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mkv"];

const ACCEPTED_EXTENSIONS: [&str; 9] = [
    "mp4", "webm", "mkv", "m4a", "flv", "avi", "mov", "wmv", "3gp",
];

/// Estimated megabytes per minute of footage, keyed by minimum pixel count.
const RATE_BUCKETS: [(u64, f64); 4] = [
    (1920 * 1080, 2.0),
    (1280 * 720, 1.2),
    (854 * 480, 0.8),
    (640 * 360, 0.5),
];
const LOWEST_RATE: f64 = 0.3;

/// Filters and orders `formats` for a video lasting `duration_secs`.
///
/// The result is sorted by pixel count, then bitrate, then quality, all
/// descending. Entries equal on all three keep their input order.
pub fn rank(formats: &[FormatDescriptor], duration_secs: f64) -> Vec<RankedFormat> {
    let mut ranked: Vec<RankedFormat> = formats
        .iter()
        .filter(|f| is_offerable(f))
        .filter_map(|f| to_ranked(f, duration_secs))
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| {
        pixel_count(&b.resolution)
            .cmp(&pixel_count(&a.resolution))
            .then_with(|| b.tbr.total_cmp(&a.tbr))
            .then_with(|| b.quality.total_cmp(&a.quality))
    });
    ranked
}

fn is_offerable(format: &FormatDescriptor) -> bool {
    if format.vcodec.as_deref() == Some("none") {
        return false;
    }
    let ext = format.ext.as_str();
    if format.acodec.as_deref() == Some("none") && !MERGEABLE_EXTENSIONS.contains(&ext) {
        return false;
    }
    ACCEPTED_EXTENSIONS.contains(&ext)
}

fn to_ranked(format: &FormatDescriptor, duration_secs: f64) -> Option<RankedFormat> {
    let filesize = match format.filesize {
        Some(size) if size > 0 => size,
        _ => {
            let (width, height) = parse_resolution(format.resolution.as_deref());
            estimate_size(duration_secs, width, height)
        }
    };

    let resolution = format.resolution.clone().unwrap_or_else(|| "Unknown".to_string());

    if format.format_id.is_empty()
        || format.ext.is_empty()
        || resolution.is_empty()
        || resolution == "Unknown"
        || filesize == 0
    {
        return None;
    }

    Some(RankedFormat {
        format_id: format.format_id.clone(),
        ext: format.ext.clone(),
        resolution,
        filesize,
        fps: format.fps.filter(|fps| *fps > 0.0),
        vcodec: format.vcodec.clone().unwrap_or_else(|| "Unknown".to_string()),
        acodec: format.acodec.clone().unwrap_or_else(|| "Unknown".to_string()),
        quality: format.quality.filter(|q| !q.is_nan()).unwrap_or(0.0),
        format_note: format.format_note.clone().unwrap_or_default(),
        tbr: format.tbr.filter(|t| !t.is_nan()).unwrap_or(0.0),
    })
}

/// Estimated byte size of `duration_secs` of footage at `width`x`height`.
pub fn estimate_size(duration_secs: f64, width: u64, height: u64) -> u64 {
    let pixels = width.saturating_mul(height);
    let rate_per_minute = RATE_BUCKETS
        .iter()
        .find(|(min_pixels, _)| pixels >= *min_pixels)
        .map(|(_, rate)| *rate)
        .unwrap_or(LOWEST_RATE);

    let bytes = duration_secs * rate_per_minute * MB / 60.0;
    if bytes.is_finite() && bytes > 0.0 {
        bytes as u64
    } else {
        0
    }
}

/// Parses `"WxH"`. Anything else, `"audio only"` included, is `(0, 0)`.
pub fn parse_resolution(resolution: Option<&str>) -> (u64, u64) {
    resolution
        .filter(|r| *r != "audio only")
        .and_then(|r| r.split_once('x'))
        .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
        .unwrap_or((0, 0))
}

fn pixel_count(resolution: &str) -> u64 {
    let (width, height) = parse_resolution(Some(resolution));
    width.saturating_mul(height)
}
