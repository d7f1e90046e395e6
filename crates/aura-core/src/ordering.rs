//! Fractional ordering keys for drag-reordering.
//!
//! Keys are float-parseable strings. Inserting between two rows assigns the
//! arithmetic midpoint, so a reorder touches exactly one row instead of
//! renumbering the list.

use tracing::warn;

/// Starting key for the first item of an empty list.
pub const FIRST_KEY: &str = "1.0";

/// Generate an ordering key between `prev` and `next`.
///
/// Unparseable inputs are treated as absent. Never panics; the degenerate
/// `prev >= next` input falls back to `prev + 1`, which can produce
/// duplicate keys over time (see [`is_exhausted`] and the renormalization
/// sweep in the task store).
pub fn generate_index(prev: Option<&str>, next: Option<&str>) -> String {
    let prev = prev.and_then(|s| s.parse::<f64>().ok());
    let next = next.and_then(|s| s.parse::<f64>().ok());

    let value = match (prev, next) {
        (None, None) => return FIRST_KEY.to_string(),
        (None, Some(n)) => {
            if n > 0.0 {
                n / 2.0
            } else {
                n - 1.0
            }
        }
        (Some(p), None) => p + 1.0,
        (Some(p), Some(n)) => {
            if p < n {
                (p + n) / 2.0
            } else {
                warn!("ordering: inconsistent neighbors (prev {p} >= next {n}), using prev + 1");
                p + 1.0
            }
        }
    };

    format_key(value)
}

/// Whether float precision between `prev` and `next` is exhausted: the
/// midpoint collides with an endpoint and no distinct key fits between.
pub fn is_exhausted(prev: &str, next: &str) -> bool {
    let (Ok(p), Ok(n)) = (prev.parse::<f64>(), next.parse::<f64>()) else {
        return false;
    };
    if p >= n {
        return true;
    }
    let mid = (p + n) / 2.0;
    mid <= p || mid >= n
}

/// Integer-spaced replacement keys for a list of `len` rows, in display
/// order: "1.0", "2.0", ... Used by the renormalization sweep.
pub fn renormalized_keys(len: usize) -> Vec<String> {
    (1..=len).map(|i| format_key(i as f64)).collect()
}

fn format_key(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        assert_eq!(generate_index(None, None), "1.0");
    }

    #[test]
    fn test_tail_insert() {
        assert_eq!(generate_index(Some("1.0"), None), "2.0");
        assert_eq!(generate_index(Some("2.5"), None), "3.5");
    }

    #[test]
    fn test_head_insert() {
        assert_eq!(generate_index(None, Some("0.002")), "0.001");
        assert_eq!(generate_index(None, Some("2.0")), "1.0");
        // Non-positive head: step below instead of halving toward zero.
        assert_eq!(generate_index(None, Some("0.0")), "-1.0");
        assert_eq!(generate_index(None, Some("-2.0")), "-3.0");
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(generate_index(Some("1.0"), Some("2.0")), "1.5");
        assert_eq!(generate_index(Some("1.5"), Some("2.0")), "1.75");
    }

    #[test]
    fn test_midpoint_strictly_between() {
        let cases = [("0.1", "0.2"), ("1.0", "1.5"), ("-3.0", "-1.0"), ("5.0", "100.0")];
        for (prev, next) in cases {
            let key: f64 = generate_index(Some(prev), Some(next)).parse().unwrap();
            let (p, n): (f64, f64) = (prev.parse().unwrap(), next.parse().unwrap());
            assert!(key > p && key < n, "{key} not between {p} and {n}");
        }
    }

    #[test]
    fn test_degenerate_falls_back() {
        assert_eq!(generate_index(Some("3.0"), Some("2.0")), "4.0");
        assert_eq!(generate_index(Some("2.0"), Some("2.0")), "3.0");
    }

    #[test]
    fn test_unparseable_treated_as_absent() {
        assert_eq!(generate_index(Some("not-a-number"), None), "1.0");
        assert_eq!(generate_index(Some("junk"), Some("2.0")), "1.0");
    }

    #[test]
    fn test_always_float_parseable() {
        for (prev, next) in [
            (None, None),
            (Some("1.0"), None),
            (None, Some("1.0")),
            (Some("1.0"), Some("3.0")),
            (Some("9.0"), Some("2.0")),
        ] {
            assert!(generate_index(prev, next).parse::<f64>().is_ok());
        }
    }

    #[test]
    fn test_exhaustion() {
        assert!(!is_exhausted("1.0", "2.0"));
        assert!(is_exhausted("2.0", "2.0"));
        assert!(is_exhausted("3.0", "2.0"));
        // Adjacent floats leave no midpoint.
        let a = 1.0f64;
        let b = f64::from_bits(a.to_bits() + 1);
        assert!(is_exhausted(&format!("{a}"), &format!("{b}")));
    }

    #[test]
    fn test_renormalized_keys() {
        assert_eq!(renormalized_keys(3), vec!["1.0", "2.0", "3.0"]);
        assert!(renormalized_keys(0).is_empty());
    }

    #[test]
    fn test_repeated_head_inserts_stay_ordered() {
        // Insert at head repeatedly; keys must keep strictly decreasing.
        let mut head = generate_index(None, None);
        for _ in 0..20 {
            let next = generate_index(None, Some(&head));
            assert!(next.parse::<f64>().unwrap() < head.parse::<f64>().unwrap());
            head = next;
        }
    }
}
