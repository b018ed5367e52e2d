use chrono::NaiveDate;

use crate::model::Slot;
use crate::time::{ParseError, TimeOfDay};

/// Strict half-open overlap on the same date. Back-to-back slots
/// (`a.end == b.start`) do not overlap.
pub fn overlaps(a: &Slot, b: &Slot) -> bool {
    a.date == b.date && a.start < b.end && a.end > b.start
}

/// Same test on caller-format times. Every accepted format is normalized
/// before comparison, so `09:00`, `09:00:00` and `09.00` are interchangeable.
pub fn overlaps_text(
    date_a: NaiveDate,
    start_a: &str,
    end_a: &str,
    date_b: NaiveDate,
    start_b: &str,
    end_b: &str,
) -> Result<bool, ParseError> {
    if date_a != date_b {
        return Ok(false);
    }
    let (sa, ea) = (TimeOfDay::parse(start_a)?, TimeOfDay::parse(end_a)?);
    let (sb, eb) = (TimeOfDay::parse(start_b)?, TimeOfDay::parse(end_b)?);
    Ok(sa < eb && ea > sb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn slot(day: u32, start: &str, end: &str) -> Slot {
        Slot::new(d(day), TimeOfDay::parse(start).unwrap(), TimeOfDay::parse(end).unwrap())
    }

    #[test]
    fn different_dates_never_overlap() {
        assert!(!overlaps(&slot(2, "08:00", "12:00"), &slot(3, "08:00", "12:00")));
        assert!(!overlaps_text(d(2), "08:00", "12:00", d(3), "09:00", "10:00").unwrap());
    }

    #[test]
    fn adjacent_slots_do_not_overlap() {
        let a = slot(2, "09:00", "10:40");
        let b = slot(2, "10:40", "12:00");
        assert!(!overlaps(&a, &b));
        assert!(!overlaps(&b, &a));
    }

    #[test]
    fn partial_overlap_detected_both_ways() {
        let a = slot(2, "09:00", "10:40");
        let b = slot(2, "10:30", "12:00");
        assert!(overlaps(&a, &b));
        assert!(overlaps(&b, &a));
    }

    #[test]
    fn containment_and_identity_overlap() {
        let outer = slot(2, "08:00", "12:00");
        let inner = slot(2, "09:00", "10:00");
        assert!(overlaps(&outer, &inner));
        assert!(overlaps(&inner, &outer));
        assert!(overlaps(&inner, &inner));
    }

    #[test]
    fn one_minute_overlap_counts() {
        assert!(overlaps(&slot(2, "09:00", "10:01"), &slot(2, "10:00", "11:00")));
    }

    #[test]
    fn result_is_format_invariant() {
        let formats = [("09:00", "10:40"), ("09:00:00", "10:40:00"), ("09.00", "10.40")];
        for (sa, ea) in formats {
            for (sb, eb) in [("10:40", "12:00"), ("10.40", "12.00"), ("10:40:00", "12:00:00")] {
                assert!(!overlaps_text(d(2), sa, ea, d(2), sb, eb).unwrap());
            }
            for (sb, eb) in [("10:30", "12:00"), ("10.30", "12.00"), ("10:30:00", "12:00:00")] {
                assert!(overlaps_text(d(2), sa, ea, d(2), sb, eb).unwrap());
            }
        }
    }

    #[test]
    fn matches_formula_on_a_grid() {
        let points = ["07:00", "08:00", "09:00", "10:00", "11:00"];
        for (i, sa) in points.iter().enumerate() {
            for ea in &points[i + 1..] {
                for (j, sb) in points.iter().enumerate() {
                    for eb in &points[j + 1..] {
                        let a = slot(2, sa, ea);
                        let b = slot(2, sb, eb);
                        assert_eq!(overlaps(&a, &b), a.start < b.end && a.end > b.start);
                    }
                }
            }
        }
    }
}
