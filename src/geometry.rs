//! Page geometry: boxes, rotation and crop area placement

use std::str::FromStr;

use crate::error::{Error, Result};

/// Axis-aligned rectangle in PDF user space (points, origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rectangle {
    /// Create a rectangle from its corners, normalising their order
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    /// Create a rectangle from its lower-left corner and size
    pub fn from_origin(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// US Letter media box (612 × 792 pt)
    pub fn letter() -> Self {
        Self::new(0.0, 0.0, 612.0, 792.0)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left + dx, self.bottom + dy, self.right + dx, self.top + dy)
    }

    /// `[left bottom right top]`
    pub fn to_array(&self) -> [f32; 4] {
        [self.left, self.bottom, self.right, self.top]
    }
}

/// Parses `left,bottom,right,top`
impl FromStr for Rectangle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f32> = s
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::InvalidRectangle(s.to_string()))?;

        match values.as_slice() {
            &[left, bottom, right, top] => {
                let rect = Rectangle::new(left, bottom, right, top);
                if rect.is_empty() {
                    return Err(Error::InvalidRectangle(format!("{} has no area", s)));
                }
                Ok(rect)
            }
            _ => Err(Error::InvalidRectangle(format!(
                "expected left,bottom,right,top but got '{}'",
                s
            ))),
        }
    }
}

/// Page rotation, clockwise, in multiples of 90 degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// Normalise any multiple of 90 (negative values included)
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Quarter),
            180 => Some(Rotation::Half),
            270 => Some(Rotation::ThreeQuarters),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }

    pub fn add(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees()).unwrap_or_default()
    }
}

/// Boxes and rotation of a page, with inherited attributes resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub media_box: Rectangle,
    pub crop_box: Rectangle,
    pub trim_box: Option<Rectangle>,
    pub rotation: Rotation,
}

impl PageGeometry {
    /// Page whose crop box equals its media box
    pub fn new(media_box: Rectangle) -> Self {
        Self {
            media_box,
            crop_box: media_box,
            trim_box: None,
            rotation: Rotation::None,
        }
    }

    /// Maps an area given in the displayed (rotated) page space back to the
    /// unrotated page space the boxes are expressed in.
    pub fn unrotate(&self, area: &Rectangle) -> Rectangle {
        let width = self.crop_box.width();
        let height = self.crop_box.height();
        match self.rotation {
            Rotation::None => *area,
            Rotation::Quarter => {
                Rectangle::from_origin(width - area.top, area.left, area.height(), area.width())
            }
            Rotation::Half => Rectangle::from_origin(
                width - area.right,
                height - area.top,
                area.width(),
                area.height(),
            ),
            Rotation::ThreeQuarters => {
                Rectangle::from_origin(area.bottom, height - area.right, area.height(), area.width())
            }
        }
    }

    /// Shifts an area by the offset of the trim box (or media box) origin
    pub fn adjust_for_trim(&self, area: &Rectangle) -> Rectangle {
        let bounding = self.trim_box.unwrap_or(self.media_box);
        area.translate(
            bounding.left - self.media_box.left,
            bounding.bottom - self.media_box.bottom,
        )
    }

    /// Crop box to set on a replica for a user supplied area
    pub fn crop_area(&self, area: &Rectangle) -> Rectangle {
        self.adjust_for_trim(&self.unrotate(area))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_normalises_corners() {
        let rect = Rectangle::new(100.0, 200.0, 0.0, 0.0);
        assert_eq!(rect.left, 0.0);
        assert_eq!(rect.top, 200.0);
        assert_eq!(rect.width(), 100.0);
        assert_eq!(rect.height(), 200.0);
    }

    #[test]
    fn test_rectangle_parse() {
        let rect: Rectangle = "0, 0, 306, 792".parse().unwrap();
        assert_eq!(rect, Rectangle::new(0.0, 0.0, 306.0, 792.0));

        assert!("0,0,306".parse::<Rectangle>().is_err());
        assert!("a,b,c,d".parse::<Rectangle>().is_err());
        assert!("10,10,10,50".parse::<Rectangle>().is_err());
    }

    #[test]
    fn test_rotation_normalisation() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::ThreeQuarters));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Quarter));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Half.add(Rotation::ThreeQuarters), Rotation::Quarter);
    }

    #[test]
    fn test_unrotate_quarter() {
        let mut page = PageGeometry::new(Rectangle::new(0.0, 0.0, 600.0, 800.0));
        page.rotation = Rotation::Quarter;
        let area = Rectangle::new(10.0, 20.0, 110.0, 70.0);

        let unrotated = page.unrotate(&area);
        assert_eq!(unrotated, Rectangle::from_origin(530.0, 10.0, 50.0, 100.0));
    }

    #[test]
    fn test_unrotate_half_and_three_quarters() {
        let mut page = PageGeometry::new(Rectangle::new(0.0, 0.0, 600.0, 800.0));
        let area = Rectangle::new(10.0, 20.0, 110.0, 70.0);

        page.rotation = Rotation::Half;
        assert_eq!(page.unrotate(&area), Rectangle::from_origin(490.0, 730.0, 100.0, 50.0));

        page.rotation = Rotation::ThreeQuarters;
        assert_eq!(page.unrotate(&area), Rectangle::from_origin(20.0, 690.0, 50.0, 100.0));
    }

    #[test]
    fn test_adjust_for_trim() {
        let mut page = PageGeometry::new(Rectangle::new(0.0, 0.0, 600.0, 800.0));
        let area = Rectangle::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(page.adjust_for_trim(&area), area);

        page.trim_box = Some(Rectangle::new(20.0, 30.0, 580.0, 770.0));
        assert_eq!(page.adjust_for_trim(&area), Rectangle::new(20.0, 30.0, 120.0, 130.0));
    }
}
