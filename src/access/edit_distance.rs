// src/access/edit_distance.rs

/// Levenshtein distance: unit-cost single-character insertions, deletions and
/// substitutions. Works on chars, two rolling rows.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_zero() {
        for s in ["", "A", "POX4G21", "ABC1D23"] {
            assert_eq!(edit_distance(s, s), 0);
        }
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("POX4G21", "P0X4G21"),
            ("ABC1D23", "ABD1C2"),
            ("", "XYZ"),
            ("KITTEN", "SITTING"),
        ];
        for (a, b) in pairs {
            assert_eq!(edit_distance(a, b), edit_distance(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_same_length_counts_differing_positions() {
        assert_eq!(edit_distance("POX4G21", "POX4G22"), 1);
        assert_eq!(edit_distance("POX4G21", "QOX4G22"), 2);
        assert_eq!(edit_distance("POX4G21", "QOY4G22"), 3);
        assert_eq!(edit_distance("ABC1D23", "XYZ9Q99"), 7);
    }

    #[test]
    fn test_insert_and_delete() {
        assert_eq!(edit_distance("ABC1D23", "ABC1D234"), 1);
        assert_eq!(edit_distance("ABC1D23", "BC1D23"), 1);
        assert_eq!(edit_distance("", "ABC"), 3);
        assert_eq!(edit_distance("KITTEN", "SITTING"), 3);
    }
}
