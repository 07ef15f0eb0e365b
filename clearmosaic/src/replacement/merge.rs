//! Pixel-wise merge of a candidate into a cloudy tile.

use crate::cloud::{is_cloud, ClassMask, Segmentation};
use crate::raster::TileBuffer;

/// Band of the reflectance companion that flags valid pixels.
pub const ALPHA_BAND: u32 = 3;

/// Running best version of one cloudy tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementState {
    pixels: TileBuffer,
    mask: ClassMask,
    similar_count: u32,
    cloud_fraction: f64,
}

impl ReplacementState {
    /// Starts from the assembled tile pixels and their dilated segmentation.
    pub fn new(pixels: TileBuffer, segmentation: Segmentation) -> Self {
        Self {
            pixels,
            mask: segmentation.mask,
            similar_count: 0,
            cloud_fraction: segmentation.cloud_fraction,
        }
    }

    pub fn pixels(&self) -> &TileBuffer {
        &self.pixels
    }

    pub fn mask(&self) -> &ClassMask {
        &self.mask
    }

    /// Candidates so far whose mask matched the running mask.
    pub fn similar_count(&self) -> u32 {
        self.similar_count
    }

    pub fn cloud_fraction(&self) -> f64 {
        self.cloud_fraction
    }

    pub fn into_parts(self) -> (TileBuffer, ClassMask) {
        (self.pixels, self.mask)
    }
}

/// Pixels and classification of the same tile from an older mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pixels: TileBuffer,
    pub mask: ClassMask,
    pub cloud_fraction: f64,
    /// Row-major validity of each pixel.
    pub valid: Vec<bool>,
}

impl Candidate {
    /// Builds a candidate whose validity comes from the companion's alpha
    /// band. A companion without an alpha band is valid wherever it holds
    /// any data.
    pub fn new(pixels: TileBuffer, companion: &TileBuffer, segmentation: Segmentation) -> Self {
        let valid = if companion.bands() > ALPHA_BAND {
            companion.band(ALPHA_BAND).iter().map(|&a| a != 0).collect()
        } else {
            (0..companion.pixel_count())
                .map(|p| (0..companion.bands()).any(|b| companion.band(b)[p] != 0))
                .collect()
        };

        Self {
            pixels,
            mask: segmentation.mask,
            cloud_fraction: segmentation.cloud_fraction,
            valid,
        }
    }

    /// True when no pixel carries data.
    pub fn is_empty(&self) -> bool {
        !self.valid.iter().any(|&v| v)
    }

    /// Whether the candidate has the shape of `state`'s tile.
    pub fn fits(&self, state: &ReplacementState) -> bool {
        self.pixels.width() == state.pixels.width()
            && self.pixels.height() == state.pixels.height()
            && self.pixels.bands() == state.pixels.bands()
            && self.mask.len() == state.mask.len()
            && self.valid.len() == state.mask.len()
    }
}

/// Which merge rule was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Candidate below the cloud limit: every valid pixel adopted.
    MostlyClear,
    /// Candidate still cloudy: only cloudy running pixels replaced.
    StillCloudy,
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeStats {
    pub rule: MergeRule,
    /// Pixels whose class and values were taken from the candidate.
    pub adopted: usize,
    /// Pixels whose running class equalled the candidate class. Only
    /// counted by [`MergeRule::StillCloudy`].
    pub similar: usize,
    /// Cloudy pixels after the merge.
    pub cloud_pixels: usize,
    /// Whether the candidate counted towards the similar-mask limit.
    pub counted_similar: bool,
}

/// Merges `candidate` into `state`.
///
/// A candidate whose cloud fraction is below `cloud_limit` replaces every
/// valid pixel, and the running fraction is recomputed from the merged
/// mask. Otherwise each cloudy running pixel with valid candidate data is
/// replaced when the candidate is clear there, or when the running class is
/// 4 and the candidate class is 2 or 3 (the pixel stays cloudy). The running
/// fraction becomes the share of pixels still cloudy. If more than
/// `correlation_limit` of all pixels had equal classes, the similar-mask
/// counter is incremented.
///
/// The candidate must [fit](Candidate::fits) the state.
pub fn merge_candidate(
    state: &mut ReplacementState,
    candidate: &Candidate,
    cloud_limit: f64,
    correlation_limit: f64,
) -> MergeStats {
    debug_assert!(candidate.fits(state));
    let total = state.mask.len();
    let mut adopted = 0;

    if candidate.cloud_fraction < cloud_limit {
        for p in 0..total {
            if candidate.valid[p] {
                state.mask.set_at(p, candidate.mask.at(p));
                state.pixels.copy_pixel_from(&candidate.pixels, p);
                adopted += 1;
            }
        }
        let cloud_pixels = state.mask.cloud_count();
        state.cloud_fraction = state.mask.cloud_fraction();

        return MergeStats {
            rule: MergeRule::MostlyClear,
            adopted,
            similar: 0,
            cloud_pixels,
            counted_similar: false,
        };
    }

    let mut similar = 0;
    let mut cloud_pixels = 0;
    for p in 0..total {
        let running = state.mask.at(p);
        let offered = candidate.mask.at(p);
        if running == offered {
            similar += 1;
        }
        if !is_cloud(running) {
            continue;
        }

        if !candidate.valid[p] {
            cloud_pixels += 1;
        } else if !is_cloud(offered) {
            state.mask.set_at(p, offered);
            state.pixels.copy_pixel_from(&candidate.pixels, p);
            adopted += 1;
        } else if running == 4 && (offered == 2 || offered == 3) {
            state.mask.set_at(p, offered);
            state.pixels.copy_pixel_from(&candidate.pixels, p);
            adopted += 1;
            cloud_pixels += 1;
        } else {
            cloud_pixels += 1;
        }
    }

    let counted_similar = total > 0 && similar as f64 / total as f64 > correlation_limit;
    if counted_similar {
        state.similar_count += 1;
    }
    state.cloud_fraction = if total > 0 {
        cloud_pixels as f64 / total as f64
    } else {
        0.0
    };

    MergeStats {
        rule: MergeRule::StillCloudy,
        adopted,
        similar,
        cloud_pixels,
        counted_similar,
    }
}
