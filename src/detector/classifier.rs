use crate::types::{ChangeDirection, ChangeMagnitude};

/// Global noise floor, independent of any subscriber threshold. Inclusive.
pub fn is_significant(percent_change: f64, min_significant_percent: f64) -> bool {
    percent_change.abs() >= min_significant_percent
}

/// Headline shown above a rendered alert.
pub fn headline(direction: ChangeDirection, magnitude: ChangeMagnitude) -> &'static str {
    match (direction, magnitude) {
        (ChangeDirection::Drop, ChangeMagnitude::Extreme) => "🔥 Huge price drop",
        (ChangeDirection::Drop, ChangeMagnitude::Major) => "📉 Big price drop",
        (ChangeDirection::Drop, _) => "📉 Price drop",
        (ChangeDirection::Rise, _) => "📈 Price rise",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeEvent, Marketplace, ScrapedItem, WatchTarget};

    fn change(old: i64, new: i64) -> ChangeEvent {
        let item = ScrapedItem {
            id: "1".to_string(),
            name: "Item".to_string(),
            brand: None,
            price: new,
            rating: None,
            review_count: None,
            image: None,
        };
        ChangeEvent::new(item, WatchTarget::product(Marketplace::new("wb"), "1"), old)
    }

    #[test]
    fn small_drop_is_minor() {
        let c = change(1000, 970);
        assert_eq!(c.direction(), ChangeDirection::Drop);
        assert_eq!(c.magnitude(), ChangeMagnitude::Minor);
        assert_eq!(headline(c.direction(), c.magnitude()), "📉 Price drop");
    }

    #[test]
    fn large_rise_is_extreme() {
        let c = change(1000, 1500);
        assert_eq!(c.direction(), ChangeDirection::Rise);
        assert_eq!(c.magnitude(), ChangeMagnitude::Extreme);
    }

    #[test]
    fn significance_is_symmetric_and_inclusive() {
        assert!(is_significant(-1.0, 1.0));
        assert!(is_significant(1.0, 1.0));
        assert!(!is_significant(0.99, 1.0));
        assert!(!is_significant(-0.5, 1.0));
    }

    #[test]
    fn headline_escalates_with_magnitude() {
        assert_eq!(headline(ChangeDirection::Drop, ChangeMagnitude::Moderate), "📉 Price drop");
        assert_eq!(headline(ChangeDirection::Drop, ChangeMagnitude::Extreme), "🔥 Huge price drop");
        assert_eq!(headline(ChangeDirection::Rise, ChangeMagnitude::Extreme), "📈 Price rise");
    }
}
