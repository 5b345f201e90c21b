//! The region of interest: the roads and rectangles whose vehicles are simulated locally.

use crate::error::ConfigError;
use crate::math::{Point2d, Point3d};
use crate::util::Interval;

/// An axis aligned rectangle in server coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: Interval<f64>,
    pub y: Interval<f64>,
}

impl Rect {
    /// Creates the rectangle spanned by two opposite corners.
    pub fn new(first: Point2d, second: Point2d) -> Self {
        Self {
            x: Interval::new(first.x, second.x),
            y: Interval::new(first.y, second.y),
        }
    }

    /// Whether the point is inside the rectangle or on its boundary.
    pub fn contains(&self, point: Point2d) -> bool {
        self.x.contains(point.x) && self.y.contains(point.y)
    }

    /// The corners, in drawing order, starting at the first corner.
    pub fn corners(&self) -> [Point3d; 4] {
        [
            Point3d::new(self.x.min, self.y.min, 0.0),
            Point3d::new(self.x.min, self.y.max, 0.0),
            Point3d::new(self.x.max, self.y.max, 0.0),
            Point3d::new(self.x.max, self.y.min, 0.0),
        ]
    }

    /// Parses a rectangle written as `x1,y1-x2,y2`. Any single character may
    /// separate the numbers.
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRect(token.to_string());
        let mut rest = token;
        let mut values = [0.0; 4];
        for (i, value) in values.iter_mut().enumerate() {
            let (number, tail) = split_number(rest).ok_or_else(invalid)?;
            *value = number;
            rest = tail;
            if i < 3 {
                let mut chars = rest.chars();
                chars.next().ok_or_else(invalid)?;
                rest = chars.as_str();
            }
        }
        if !rest.is_empty() {
            return Err(invalid());
        }
        let [x1, y1, x2, y2] = values;
        Ok(Self::new(Point2d::new(x1, y1), Point2d::new(x2, y2)))
    }
}

/// Splits the longest leading decimal number off `s`.
fn split_number(s: &str) -> Option<(f64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let mut seen_exp = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' | b'.' => end += 1,
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                end += 1;
                if matches!(bytes.get(end), Some(b'+' | b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
    }
    let number = s[..end].parse().ok()?;
    Some((number, &s[end..]))
}

/// Decides whether a vehicle is simulated locally.
///
/// With neither roads nor rectangles configured every vehicle qualifies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionOfInterest {
    roads: Vec<String>,
    rects: Vec<Rect>,
}

impl RegionOfInterest {
    pub fn new(roads: Vec<String>, rects: Vec<Rect>) -> Self {
        Self { roads, rects }
    }

    /// Parses the space separated road and rectangle lists.
    pub fn parse(roads: &str, rects: &str) -> Result<Self, ConfigError> {
        let roads = roads.split_whitespace().map(str::to_string).collect();
        let rects = rects
            .split_whitespace()
            .map(Rect::parse)
            .collect::<Result<_, _>>()?;
        Ok(Self { roads, rects })
    }

    /// Whether no restriction has been configured.
    pub fn is_unrestricted(&self) -> bool {
        self.roads.is_empty() && self.rects.is_empty()
    }

    /// Whether a vehicle at `position` (server coordinates) on `road_id` qualifies.
    pub fn contains(&self, position: Point2d, road_id: &str) -> bool {
        self.is_unrestricted()
            || self.roads.iter().any(|road| road == road_id)
            || self.rects.iter().any(|rect| rect.contains(position))
    }

    pub fn roads(&self) -> &[String] {
        &self.roads
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }
}
