//! Tuple-to-record comparison with match depth reporting.

use std::cmp::Ordering;

use super::{Field, Record, Tuple};

/// How far a tuple and a record agree: whole fields plus bytes of the
/// first differing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct MatchDepth {
    /// Number of leading fields that compared equal
    pub fields: usize,
    /// Number of leading bytes that compared equal in the next field
    pub bytes: usize,
}

impl MatchDepth {
    /// Create a match depth
    #[inline]
    pub const fn new(fields: usize, bytes: usize) -> Self {
        Self { fields, bytes }
    }
}

/// Compare two fields. NULL sorts before every non-NULL value.
///
/// Returns the ordering of `a` relative to `b` and the number of leading
/// bytes they share.
pub fn compare_fields(a: &Field, b: &Field) -> (Ordering, usize) {
    match (a.data(), b.data()) {
        (None, None) => (Ordering::Equal, 0),
        (None, Some(_)) => (Ordering::Less, 0),
        (Some(_), None) => (Ordering::Greater, 0),
        (Some(x), Some(y)) => {
            let common = x.iter().zip(y).take_while(|(l, r)| l == r).count();
            let ord = match (x.get(common), y.get(common)) {
                (Some(l), Some(r)) => l.cmp(r),
                _ => x.len().cmp(&y.len()),
            };
            (ord, common)
        }
    }
}

/// Compare `tuple` with the leading fields of `rec`.
///
/// The ordering is that of the tuple relative to the record. Only as many
/// fields as the shorter side carries take part, so a tuple that is a
/// prefix of the record compares equal.
pub fn compare_with_match(tuple: &Tuple, rec: &Record) -> (Ordering, MatchDepth) {
    for (i, (tf, rf)) in tuple.fields().iter().zip(rec.fields()).enumerate() {
        let (ord, common) = compare_fields(tf, rf);
        if ord != Ordering::Equal {
            return (ord, MatchDepth::new(i, common));
        }
    }
    let n = tuple.n_fields().min(rec.n_fields());
    (Ordering::Equal, MatchDepth::new(n, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_fields_bytes() {
        let (ord, common) = compare_fields(&Field::from("abcd"), &Field::from("abxy"));
        assert_eq!(ord, Ordering::Less);
        assert_eq!(common, 2);

        let (ord, common) = compare_fields(&Field::from("ab"), &Field::from("abc"));
        assert_eq!(ord, Ordering::Less);
        assert_eq!(common, 2);

        let (ord, common) = compare_fields(&Field::from("abc"), &Field::from("abc"));
        assert_eq!(ord, Ordering::Equal);
        assert_eq!(common, 3);
    }

    #[test]
    fn test_compare_fields_null() {
        assert_eq!(
            compare_fields(&Field::null(), &Field::from("a")).0,
            Ordering::Less
        );
        assert_eq!(
            compare_fields(&Field::from("a"), &Field::null()).0,
            Ordering::Greater
        );
        assert_eq!(
            compare_fields(&Field::null(), &Field::null()).0,
            Ordering::Equal
        );
    }

    #[test]
    fn test_compare_with_match_depth() {
        let rec = Record::new(vec![Field::from("k1"), Field::from("abcd"), Field::from("z")]);

        let (ord, depth) = compare_with_match(&Tuple::new(vec![Field::from("k1")]), &rec);
        assert_eq!(ord, Ordering::Equal);
        assert_eq!(depth, MatchDepth::new(1, 0));

        let tuple = Tuple::new(vec![Field::from("k1"), Field::from("abzz")]);
        let (ord, depth) = compare_with_match(&tuple, &rec);
        assert_eq!(ord, Ordering::Greater);
        assert_eq!(depth, MatchDepth::new(1, 2));

        let tuple = Tuple::new(vec![Field::from("a")]);
        let (ord, depth) = compare_with_match(&tuple, &rec);
        assert_eq!(ord, Ordering::Less);
        assert_eq!(depth, MatchDepth::new(0, 0));
    }

    #[test]
    fn test_match_depth_orders_as_pair() {
        assert!(MatchDepth::new(1, 5) < MatchDepth::new(2, 0));
        assert!(MatchDepth::new(2, 1) > MatchDepth::new(2, 0));
    }
}
