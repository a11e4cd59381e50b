/// Smallest ballot of peer `me` strictly greater than `above`.
///
/// Peer `me` owns the residue class `me (mod stride)`, so ballots of distinct
/// peers never collide.
pub(crate) fn next_ballot(me: usize, stride: i64, above: i64) -> i64 {
    let me = me as i64;
    debug_assert!(me < stride);
    if above < me {
        return me;
    }
    me + ((above - me) / stride + 1) * stride
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_ballot() {
        assert_eq!(next_ballot(0, 10, -1), 0);
        assert_eq!(next_ballot(3, 10, -1), 3);
        assert_eq!(next_ballot(3, 10, 2), 3);
        assert_eq!(next_ballot(3, 10, 3), 13);
        assert_eq!(next_ballot(3, 10, 12), 13);
        assert_eq!(next_ballot(3, 10, 13), 23);
        assert_eq!(next_ballot(0, 10, 0), 10);
        assert_eq!(next_ballot(9, 10, 100), 109);
    }

    #[test]
    fn test_ballots_are_disjoint() {
        let stride = 5;
        let mut seen = std::collections::HashSet::new();
        for me in 0..5 {
            let mut b = -1;
            for _ in 0..20 {
                b = next_ballot(me, stride, b);
                assert_eq!(b % stride, me as i64);
                assert!(seen.insert(b), "ballot {} issued twice", b);
            }
        }
    }
}
