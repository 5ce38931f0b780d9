// Catalog parsing - normalizes the fetcher's `formats` array
//
// Parsing is total: a missing or empty `formats` array yields an empty
// catalog, and missing fields fall back to their documented defaults.
// Eligibility filtering happens in the selector, not here.

use serde_json::Value;

use super::models::{Catalog, FormatDescriptor};

/// Codec value yt-dlp uses to say "this track is absent"
const NO_CODEC: &str = "none";

/// Build a catalog from the JSON document returned by the info call
pub fn parse_catalog(doc: &Value) -> Catalog {
    let formats = match doc["formats"].as_array() {
        Some(f) => f,
        None => return Catalog::default(),
    };

    Catalog::new(formats.iter().map(parse_format).collect())
}

fn parse_format(f: &Value) -> FormatDescriptor {
    let id = f["format_id"]
        .as_str()
        .or_else(|| f["id"].as_str())
        .unwrap_or("")
        .to_string();

    FormatDescriptor {
        id,
        container: f["ext"].as_str().unwrap_or("").to_lowercase(),
        has_video: has_track(&f["vcodec"]),
        has_audio: has_track(&f["acodec"]),
        size_bytes: as_size(&f["filesize"]),
        size_approx_bytes: as_size(&f["filesize_approx"]),
        preference: f["preference"].as_f64().unwrap_or(0.0),
    }
}

/// Only the literal sentinel marks a track as absent
fn has_track(codec: &Value) -> bool {
    codec.as_str().map_or(true, |c| c != NO_CODEC)
}

/// Sizes are sometimes reported as floats (approximations)
fn as_size(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| {
        v.as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| s.round() as u64)
    })
}
