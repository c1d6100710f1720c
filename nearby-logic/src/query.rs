use std::{collections::BTreeSet, fmt::Write};

use serde::{Deserialize, Serialize};

use crate::{error::LocateError, location::Coordinate};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// A tag filter selecting one kind of map element
pub enum CategoryTag {
    /// Elements tagged `amenity=<value>`
    Amenity(String),
    /// Elements with a `shop` tag, restricted to `shop=<value>` when given
    Shop(Option<String>),
}

impl CategoryTag {
    pub fn amenity(value: impl Into<String>) -> Self {
        Self::Amenity(value.into())
    }

    fn filter(&self) -> String {
        match self {
            Self::Amenity(value) => format!("[\"amenity\"=\"{}\"]", escape(value)),
            Self::Shop(None) => "[\"shop\"]".to_string(),
            Self::Shop(Some(value)) => format!("[\"shop\"=\"{}\"]", escape(value)),
        }
    }
}

/// Restaurants, any shop, hospitals and colleges
pub fn default_categories() -> BTreeSet<CategoryTag> {
    BTreeSet::from_iter([
        CategoryTag::amenity("restaurant"),
        CategoryTag::Shop(None),
        CategoryTag::amenity("hospital"),
        CategoryTag::amenity("college"),
    ])
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Places of the given categories within `radius_meters` of `center`
pub struct PlaceQuery {
    center: Coordinate,
    radius_meters: u32,
    categories: BTreeSet<CategoryTag>,
}

impl PlaceQuery {
    /// Validate and build a query, the radius is signed so callers can't wrap a negative
    /// value into a huge one before it gets here.
    pub fn build(
        center: Coordinate,
        radius_meters: i64,
        categories: BTreeSet<CategoryTag>,
    ) -> Result<Self, LocateError> {
        if radius_meters <= 0 {
            return Err(LocateError::invalid(format!(
                "Radius must be positive, got {radius_meters}"
            )));
        }
        let radius_meters = u32::try_from(radius_meters)
            .map_err(|_| LocateError::invalid(format!("Radius {radius_meters} is too large")))?;
        if categories.is_empty() {
            return Err(LocateError::invalid("No categories selected"));
        }
        if !center.is_valid() {
            return Err(LocateError::invalid(format!(
                "Center ({}, {}) is not a valid coordinate",
                center.latitude, center.longitude
            )));
        }
        Ok(Self {
            center,
            radius_meters,
            categories,
        })
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_meters(&self) -> u32 {
        self.radius_meters
    }

    pub fn categories(&self) -> &BTreeSet<CategoryTag> {
        &self.categories
    }

    /// Render as an Overpass QL program, one `node` statement per category
    pub fn to_overpass_ql(&self) -> String {
        let around = format!(
            "around:{},{},{}",
            self.radius_meters, self.center.latitude, self.center.longitude
        );
        let mut ql = String::from("[out:json];(");
        for category in self.categories.iter() {
            let _ = write!(ql, "node({around}){};", category.filter());
        }
        ql.push_str(");out body;");
        ql
    }
}
