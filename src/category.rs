//! Accumulation categories and filename classification.

use std::collections::HashMap;
use std::fmt;

/// One of the three fixed precipitation accumulation windows published
/// upstream. Each category maps to a filename suffix token, a canonical
/// load name, and a window length; the target dataset and feed name are
/// deployment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulationCategory {
    OneDay,
    ThreeDay,
    SevenDay,
}

impl AccumulationCategory {
    /// Fixed processing order. Classification and the per-category pipeline
    /// loop both follow this order, which makes multi-token matches (should
    /// the upstream naming scheme ever produce one) resolve deterministically.
    pub const ALL: [AccumulationCategory; 3] = [
        AccumulationCategory::OneDay,
        AccumulationCategory::ThreeDay,
        AccumulationCategory::SevenDay,
    ];

    /// The suffix token that marks a remote filename as belonging to this
    /// category.
    pub fn token(&self) -> &'static str {
        match self {
            AccumulationCategory::OneDay => ".1day.tif",
            AccumulationCategory::ThreeDay => ".3day.tif",
            AccumulationCategory::SevenDay => ".7day.tif",
        }
    }

    /// The fixed filename under which this category's raster is always
    /// committed, so each load overwrites the previous one.
    pub fn load_name(&self) -> &'static str {
        match self {
            AccumulationCategory::OneDay => "IMERG1Day.tif",
            AccumulationCategory::ThreeDay => "IMERG3Day.tif",
            AccumulationCategory::SevenDay => "IMERG7Day.tif",
        }
    }

    /// Length of the accumulation window in days.
    pub fn window_days(&self) -> i64 {
        match self {
            AccumulationCategory::OneDay => 1,
            AccumulationCategory::ThreeDay => 3,
            AccumulationCategory::SevenDay => 7,
        }
    }
}

impl fmt::Display for AccumulationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationCategory::OneDay => write!(f, "1-day"),
            AccumulationCategory::ThreeDay => write!(f, "3-day"),
            AccumulationCategory::SevenDay => write!(f, "7-day"),
        }
    }
}

/// Partitions a remote name listing into per-category buckets. A name lands
/// in the first category (in `ALL` order) whose token it contains; names
/// matching no token are dropped.
pub fn classify<'a, I>(names: I) -> HashMap<AccumulationCategory, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut buckets: HashMap<AccumulationCategory, Vec<String>> = HashMap::new();

    for name in names {
        if let Some(category) = AccumulationCategory::ALL
            .iter()
            .find(|c| name.contains(c.token()))
        {
            buckets.entry(*category).or_default().push(name.to_string());
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_into_three_buckets_and_drop_the_rest() {
        let names = ["a.1day.tif", "b.3day.tif", "c.7day.tif", "d.other.tif"];
        let buckets = classify(names.iter().copied());

        assert_eq!(buckets.len(), 3);
        assert_eq!(
            buckets[&AccumulationCategory::OneDay],
            vec!["a.1day.tif".to_string()]
        );
        assert_eq!(
            buckets[&AccumulationCategory::ThreeDay],
            vec!["b.3day.tif".to_string()]
        );
        assert_eq!(
            buckets[&AccumulationCategory::SevenDay],
            vec!["c.7day.tif".to_string()]
        );
    }

    #[test]
    fn should_preserve_listing_order_within_a_bucket() {
        let names = ["z.1day.tif", "a.1day.tif", "m.1day.tif"];
        let buckets = classify(names.iter().copied());

        assert_eq!(
            buckets[&AccumulationCategory::OneDay],
            vec!["z.1day.tif", "a.1day.tif", "m.1day.tif"]
        );
    }

    #[test]
    fn should_return_empty_map_when_nothing_matches() {
        let buckets = classify(["readme.txt", "x.30min.tif"].iter().copied());
        assert!(buckets.is_empty());
    }

    #[test]
    fn should_map_category_constants() {
        assert_eq!(AccumulationCategory::OneDay.window_days(), 1);
        assert_eq!(AccumulationCategory::ThreeDay.window_days(), 3);
        assert_eq!(AccumulationCategory::SevenDay.window_days(), 7);
        assert_eq!(AccumulationCategory::OneDay.load_name(), "IMERG1Day.tif");
        assert_eq!(AccumulationCategory::SevenDay.token(), ".7day.tif");
    }
}
