//! Best-effort width/height resolution for candidates.
//!
//! Order: sizes declared by the service, a thumbnail-width marker in the URL
//! (height assumed from a 3:2 ratio), an imageinfo lookup keyed by file name,
//! then a fixed landscape fallback. Callers always get concrete numbers.

use log::debug;

use crate::image_url::{file_name_from_url, host_of, path_without_query};
use crate::sources::DimensionLookup;
use crate::ttl_cache::TtlCache;

/// Landscape size just above the minimum, so unknown-size candidates are
/// still judged by the blocklist and aspect rules.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (1200, 800);
const THUMB_PATH_MARKER: &str = "/thumb/";
const UPLOAD_HOST_MARKER: &str = "upload.wikimedia.org";

/// Memo of imageinfo results keyed by file name.
pub type DimensionCache = TtlCache<String, (u32, u32)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionBasis {
    Declared,
    UrlMarker,
    Metadata,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDimensions {
    pub width: u32,
    pub height: u32,
    pub basis: DimensionBasis,
}

impl ResolvedDimensions {
    fn new((width, height): (u32, u32), basis: DimensionBasis) -> Self {
        Self {
            width,
            height,
            basis,
        }
    }
}

/// Rendered width from a `/{N}px-` thumbnail marker in the last path segment.
pub fn thumbnail_width_marker(url: &str) -> Option<u32> {
    let segment = path_without_query(url).rsplit('/').next()?;
    segment.match_indices("px-").find_map(|(index, _)| {
        let prefix = &segment.as_bytes()[..index];
        let digit_count = prefix
            .iter()
            .rev()
            .take_while(|byte| byte.is_ascii_digit())
            .count();
        std::str::from_utf8(&prefix[index - digit_count..])
            .ok()?
            .parse::<u32>()
            .ok()
            .filter(|width| *width > 0)
    })
}

/// Width from the URL marker with a provisional 3:2 height.
pub fn estimate_from_url(url: &str) -> Option<(u32, u32)> {
    let width = thumbnail_width_marker(url)?;
    let height = ((u64::from(width) * 2 + 1) / 3) as u32;
    Some((width, height.max(1)))
}

/// File name the metadata endpoint knows the image by: the original's name
/// for `/thumb/` URLs, or the last segment of an original on the upload host.
pub fn metadata_file_name(url: &str) -> Option<String> {
    let path = path_without_query(url);
    if let Some(index) = path.find(THUMB_PATH_MARKER) {
        let after = &path[index + THUMB_PATH_MARKER.len()..];
        let segments: Vec<&str> = after.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() >= 2 {
            let original = segments[segments.len() - 2];
            return urlencoding::decode(original)
                .map(|value| value.into_owned())
                .ok()
                .or_else(|| Some(original.to_string()));
        }
        return None;
    }
    if host_of(url).is_some_and(|host| host == UPLOAD_HOST_MARKER) {
        return file_name_from_url(url);
    }
    None
}

/// Resolves dimensions for one candidate; never fails.
pub fn resolve_dimensions(
    url: &str,
    declared_size: Option<(u32, u32)>,
    lookup: &dyn DimensionLookup,
    cache: &mut DimensionCache,
) -> ResolvedDimensions {
    if let Some(size) = declared_size.filter(|(width, height)| *width > 0 && *height > 0) {
        return ResolvedDimensions::new(size, DimensionBasis::Declared);
    }
    if let Some(size) = estimate_from_url(url) {
        return ResolvedDimensions::new(size, DimensionBasis::UrlMarker);
    }
    if let Some(file_name) = metadata_file_name(url) {
        if let Some(size) = cache.get(&file_name) {
            return ResolvedDimensions::new(size, DimensionBasis::Metadata);
        }
        match lookup.lookup_dimensions(&file_name) {
            Ok(size) if size.0 > 0 && size.1 > 0 => {
                cache.set(file_name, size);
                return ResolvedDimensions::new(size, DimensionBasis::Metadata);
            }
            Ok(size) => debug!(
                "Dimensions['{}']: metadata returned unusable size {:?}",
                file_name, size
            ),
            Err(error) => debug!(
                "Dimensions['{}']: metadata lookup failed: {}",
                file_name, error
            ),
        }
    }
    ResolvedDimensions::new(FALLBACK_DIMENSIONS, DimensionBasis::Fallback)
}
