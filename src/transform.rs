//! Page-level operations
//!
//! A [`PageTransform`] decides, for every source page, how many destination
//! pages derive from it and how each one is altered. Returning no edit drops
//! the page, several edits replicate it.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Rectangle, Rotation};

/// Changes applied to one imported page
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PageEdit {
    pub crop_box: Option<Rectangle>,
    pub rotation: Option<Rotation>,
}

impl PageEdit {
    /// Import the page as it is
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn crop(crop_box: Rectangle) -> Self {
        Self {
            crop_box: Some(crop_box),
            rotation: None,
        }
    }

    pub fn rotate(rotation: Rotation) -> Self {
        Self {
            crop_box: None,
            rotation: Some(rotation),
        }
    }
}

/// Plans the destination pages of each source page
pub trait PageTransform: Send + Sync {
    /// `page_number` is 1-based, `page_count` the number of source pages
    fn plan(&self, page_number: usize, page_count: usize, geometry: &PageGeometry)
        -> Result<Vec<PageEdit>>;
}

/// Set of 1-based page numbers, e.g. `1-3, 5, 8-`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSelection {
    /// Closed ranges, single pages included as `(n, n)`
    ranges: Vec<(usize, usize)>,
    /// Open-ended tail (`8-`)
    from: Option<usize>,
}

impl PageSelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            ranges: Vec::new(),
            from: Some(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.from.is_none()
    }

    pub fn contains(&self, page: usize) -> bool {
        self.ranges.iter().any(|(start, end)| (*start..=*end).contains(&page))
            || self.from.map(|from| page >= from).unwrap_or(false)
    }
}

impl FromStr for PageSelection {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPageSelection(reason);
        let number = |text: &str| -> Result<usize> {
            let page: usize = text
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a page number", text.trim())))?;
            if page == 0 {
                return Err(invalid("page numbers start at 1".to_string()));
            }
            Ok(page)
        };

        let mut selection = PageSelection::none();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            match part.split_once('-') {
                Some((start, end)) if end.trim().is_empty() => {
                    let start = number(start)?;
                    selection.from = Some(selection.from.map_or(start, |f| f.min(start)));
                }
                Some((start, end)) => {
                    let (start, end) = (number(start)?, number(end)?);
                    if start > end {
                        return Err(invalid(format!("start {} > end {}", start, end)));
                    }
                    selection.ranges.push((start, end));
                }
                None => {
                    let page = number(part)?;
                    selection.ranges.push((page, page));
                }
            }
        }
        Ok(selection)
    }
}

/// What happens to pages excluded from cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExcludedPages {
    /// Left out of the output
    #[default]
    Drop,
    /// Copied once, boxes untouched
    KeepUncropped,
}

/// Sets one crop box per area, producing one destination page per area
#[derive(Debug, Clone)]
pub struct CropTransform {
    areas: Vec<Rectangle>,
    excluded: PageSelection,
    excluded_pages: ExcludedPages,
}

impl CropTransform {
    pub fn new(areas: Vec<Rectangle>) -> Result<Self> {
        if areas.is_empty() {
            return Err(Error::InvalidParameters("no crop area given".to_string()));
        }
        if let Some(area) = areas.iter().find(|a| a.is_empty()) {
            return Err(Error::InvalidRectangle(format!("{:?} has no area", area)));
        }
        Ok(Self {
            areas,
            excluded: PageSelection::none(),
            excluded_pages: ExcludedPages::Drop,
        })
    }

    pub fn excluding(mut self, excluded: PageSelection, policy: ExcludedPages) -> Self {
        self.excluded = excluded;
        self.excluded_pages = policy;
        self
    }

    pub fn areas(&self) -> &[Rectangle] {
        &self.areas
    }
}

impl PageTransform for CropTransform {
    fn plan(&self, page_number: usize, _page_count: usize, geometry: &PageGeometry) -> Result<Vec<PageEdit>> {
        if self.excluded.contains(page_number) {
            return Ok(match self.excluded_pages {
                ExcludedPages::Drop => {
                    log::debug!("Dropping excluded page {}", page_number);
                    Vec::new()
                }
                ExcludedPages::KeepUncropped => {
                    log::debug!("Not cropping excluded page {}", page_number);
                    vec![PageEdit::unchanged()]
                }
            });
        }
        Ok(self
            .areas
            .iter()
            .map(|area| PageEdit::crop(geometry.crop_area(area)))
            .collect())
    }
}

/// Rotates selected pages, one destination page per source page
#[derive(Debug, Clone)]
pub struct RotateTransform {
    rotation: Rotation,
    pages: PageSelection,
}

impl RotateTransform {
    pub fn new(rotation: Rotation, pages: PageSelection) -> Self {
        Self { rotation, pages }
    }
}

impl PageTransform for RotateTransform {
    fn plan(&self, page_number: usize, _page_count: usize, geometry: &PageGeometry) -> Result<Vec<PageEdit>> {
        if !self.pages.contains(page_number) {
            return Ok(vec![PageEdit::unchanged()]);
        }
        Ok(vec![PageEdit::rotate(geometry.rotation.add(self.rotation))])
    }
}
