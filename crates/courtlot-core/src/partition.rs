/// Split `items` into at most `lanes` groups by index modulo `lanes`.
///
/// Item `i` lands in group `i % lanes`; order within a group follows input
/// order. Groups that would be empty are not returned, and `lanes == 0` is
/// treated as one lane.
pub fn partition<T>(items: impl IntoIterator<Item = T>, lanes: usize) -> Vec<Vec<T>> {
    let lanes = lanes.max(1);
    let mut groups: Vec<Vec<T>> = (0..lanes).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        groups[i % lanes].push(item);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

#[cfg(test)]
mod tests {
    use super::partition;

    #[test]
    fn index_modulo() {
        let groups = partition(1..=7, 3);
        assert_eq!(groups, vec![vec![1, 4, 7], vec![2, 5], vec![3, 6]]);
    }

    #[test]
    fn more_lanes_than_items() {
        let groups = partition(["a", "b"], 10);
        assert_eq!(groups, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn zero_lanes_is_one() {
        let groups = partition(0..3, 0);
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn empty_input() {
        assert!(partition(Vec::<u8>::new(), 4).is_empty());
    }
}
