use crate::capture::Size;

/// Pointer location in preview pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewPoint {
    pub x: i32,
    pub y: i32,
}

/// Location in source video pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalPoint {
    pub x: i64,
    pub y: i64,
}

impl PreviewPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl OriginalPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Per-axis linear scale from preview space to original space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    preview: Size,
    original: Size,
}

impl CoordinateMapper {
    pub fn new(preview: Size, original: Size) -> Self {
        Self { preview, original }
    }

    /// `floor(p * original / preview)` on each axis. Points outside the
    /// preview (letterbox bars of a resized window) are clamped to its edge.
    pub fn to_original(&self, point: PreviewPoint) -> OriginalPoint {
        OriginalPoint {
            x: scale(point.x, self.original.width, self.preview.width),
            y: scale(point.y, self.original.height, self.preview.height),
        }
    }

    pub fn map(&self, point: Option<PreviewPoint>) -> Option<OriginalPoint> {
        point.map(|p| self.to_original(p))
    }
}

fn scale(value: i32, to: u32, from: u32) -> i64 {
    let last = i64::from(from).saturating_sub(1).max(0);
    let value = i64::from(value).clamp(0, last);
    (value as f64 * to as f64 / from as f64).floor() as i64
}
