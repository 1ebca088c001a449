// THEORY:
// The `placement` module decides *where* and *how large* a piece of jewelry is drawn.
// It is a pure, stateless function of three inputs: the product category, the
// face's `AnchorBundle`, and the overlay image's size.
//
// Key architectural principles:
// 1.  **Policy as Data**: Every category is one row in a `PlacementPolicy` table
//     (anchor, width ratio, vertical offset, mirroring). Adding a category is a
//     table edit. The compositor never sees a category name.
// 2.  **Total Lookup**: `lookup` always returns a spec. Categories that match no
//     rule get the default row; an unknown category is not an error.
// 3.  **Face-Relative Units**: Widths are ratios of `face_width`. Vertical offsets
//     are ratios of either `face_width` or the resampled overlay height, chosen per
//     row by `OffsetBasis`.
// 4.  **Integer Pixels Last**: All math stays in `f64` until the final placement
//     rectangle, which is truncated toward zero.

use serde::{Deserialize, Serialize};

use crate::core_modules::anchor::AnchorBundle;
use crate::core_modules::geometry::Point2D;

/// Which anchor of the face an overlay is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Chin,
    Forehead,
    LeftEar,
    RightEar,
    /// One instance on each ear lobe.
    EarPair,
}

/// The length a `vertical_offset_ratio` is multiplied with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetBasis {
    FaceWidth,
    #[default]
    OverlayHeight,
}

/// How one category of jewelry is scaled and positioned relative to the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementSpec {
    /// The anchor the overlay is horizontally centered on.
    pub anchor: AnchorKind,
    /// Overlay width as a fraction of `face_width`.
    pub width_ratio: f64,
    /// Vertical offset of the overlay's top edge from the anchor. Positive is downward.
    pub vertical_offset_ratio: f64,
    /// What `vertical_offset_ratio` is measured in.
    #[serde(default)]
    pub offset_basis: OffsetBasis,
    /// Flip the second instance horizontally (only meaningful for `EarPair`).
    #[serde(default)]
    pub mirror_second: bool,
}

/// A placement rule: any of `keywords` occurring in a category selects `spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRule {
    pub keywords: Vec<String>,
    pub spec: PlacementSpec,
}

impl PlacementRule {
    fn matches(&self, category: &str) -> bool {
        self.keywords
            .iter()
            .filter(|keyword| !keyword.is_empty())
            .any(|keyword| category.contains(&keyword.to_lowercase()))
    }
}

/// The resolved rectangle for one overlay instance, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayPlacement {
    /// The anchor point this instance is centered on.
    pub anchor_point: Point2D,
    /// Left edge. May be negative or beyond the frame; the compositor clips.
    pub x: i64,
    /// Top edge. May be negative or beyond the frame; the compositor clips.
    pub y: i64,
    pub width: u32,
    pub height: u32,
    /// Draw the overlay flipped horizontally.
    pub mirror: bool,
}

/// The category → placement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    /// Rules tried in order; the first matching rule wins.
    pub rules: Vec<PlacementRule>,
    /// Used when no rule matches.
    pub default: PlacementSpec,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        let rule = |keywords: &[&str], spec: PlacementSpec| PlacementRule {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            spec,
        };
        Self {
            rules: vec![
                rule(
                    &["necklace"],
                    PlacementSpec {
                        anchor: AnchorKind::Chin,
                        width_ratio: 1.0,
                        vertical_offset_ratio: 0.15,
                        offset_basis: OffsetBasis::FaceWidth,
                        mirror_second: false,
                    },
                ),
                rule(
                    &["earring", "ear"],
                    PlacementSpec {
                        anchor: AnchorKind::EarPair,
                        width_ratio: 0.475,
                        vertical_offset_ratio: -0.2,
                        offset_basis: OffsetBasis::OverlayHeight,
                        mirror_second: true,
                    },
                ),
                rule(
                    &["crown", "tiara"],
                    PlacementSpec {
                        anchor: AnchorKind::Forehead,
                        width_ratio: 1.4,
                        vertical_offset_ratio: -1.1,
                        offset_basis: OffsetBasis::OverlayHeight,
                        mirror_second: false,
                    },
                ),
            ],
            default: PlacementSpec {
                anchor: AnchorKind::Forehead,
                width_ratio: 1.0,
                vertical_offset_ratio: -0.5,
                offset_basis: OffsetBasis::OverlayHeight,
                mirror_second: false,
            },
        }
    }
}

impl PlacementPolicy {
    /// Returns the spec for `category`. Matching is a case-insensitive substring test.
    pub fn lookup(&self, category: &str) -> &PlacementSpec {
        let category = category.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&category))
            .map(|rule| &rule.spec)
            .unwrap_or(&self.default)
    }
}

impl PlacementSpec {
    /// Computes the overlay rectangles for a face, given the overlay's native
    /// (width, height). Returns nothing if the overlay would be less than a pixel wide.
    pub fn place(&self, anchors: &AnchorBundle, asset_size: (u32, u32)) -> Vec<OverlayPlacement> {
        let target_width = to_pixels(anchors.face_width * self.width_ratio);
        if target_width < 1 || asset_size.0 == 0 {
            return Vec::new();
        }
        let width = u32::try_from(target_width).unwrap_or(u32::MAX);
        let height = scaled_height(asset_size, width);

        let instances: Vec<(Point2D, bool)> = match self.anchor {
            AnchorKind::Chin => vec![(anchors.chin, false)],
            AnchorKind::Forehead => vec![(anchors.forehead, false)],
            AnchorKind::LeftEar => anchors.left_ear.map(|p| (p, false)).into_iter().collect(),
            AnchorKind::RightEar => anchors.right_ear.map(|p| (p, false)).into_iter().collect(),
            AnchorKind::EarPair => anchors
                .left_ear
                .map(|p| (p, false))
                .into_iter()
                .chain(anchors.right_ear.map(|p| (p, self.mirror_second)))
                .collect(),
        };

        instances
            .into_iter()
            .map(|(anchor_point, mirror)| OverlayPlacement {
                anchor_point,
                x: left_edge(anchor_point.x, width, mirror),
                y: self.top_edge(anchor_point, anchors.face_width, height),
                width,
                height,
                mirror,
            })
            .collect()
    }

    fn top_edge(&self, anchor_point: Point2D, face_width: f64, height: u32) -> i64 {
        match self.offset_basis {
            OffsetBasis::FaceWidth => {
                let offset = to_pixels(face_width * self.vertical_offset_ratio);
                to_pixels(anchor_point.y + offset as f64)
            }
            OffsetBasis::OverlayHeight => {
                to_pixels(anchor_point.y + height as f64 * self.vertical_offset_ratio)
            }
        }
    }
}

/// Height of an image of `size` scaled to `width`, preserving aspect ratio. Never zero.
pub fn scaled_height(size: (u32, u32), width: u32) -> u32 {
    let (native_width, native_height) = size;
    if native_width == 0 {
        return 1;
    }
    let scale = width as f64 / native_width as f64;
    let height = to_pixels(native_height as f64 * scale);
    u32::try_from(height.max(1)).unwrap_or(u32::MAX)
}

/// Left edge of an overlay centered on `center_x`. A mirrored instance rounds up
/// instead of truncating, so it is the exact reflection of its unmirrored partner
/// even when `width` is odd.
fn left_edge(center_x: f64, width: u32, mirror: bool) -> i64 {
    let edge = center_x - width as f64 / 2.0;
    if mirror && edge.is_finite() {
        edge.ceil() as i64
    } else {
        to_pixels(edge)
    }
}

/// Truncates toward zero.
fn to_pixels(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    value as i64
}
