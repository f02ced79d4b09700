use std::ops::Range;

/// Splits consecutive items into batches whose summed size stays within `ceiling`.
///
/// An item larger than the ceiling on its own gets a batch to itself.
pub fn partition(sizes: &[u64], ceiling: u64) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut total: u64 = 0;
    for (index, size) in sizes.iter().enumerate() {
        if index > start && total.saturating_add(*size) > ceiling {
            batches.push(start..index);
            start = index;
            total = 0;
        }
        total = total.saturating_add(*size);
    }
    if start < sizes.len() {
        batches.push(start..sizes.len());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_300_structures_of_one_mib() {
        let sizes = vec![MIB; 300];
        assert_eq!(partition(&sizes, 256 * MIB), vec![0..256, 256..300]);
    }

    #[test]
    fn test_batches_respect_ceiling() {
        let sizes = [3, 4, 2, 6, 1, 1, 5];
        let batches = partition(&sizes, 7);
        assert_eq!(batches, vec![0..2, 2..3, 3..5, 5..7]);
        for batch in batches {
            assert!(sizes[batch].iter().sum::<u64>() <= 7);
        }
    }

    #[test]
    fn test_oversized_item_stands_alone() {
        let batches = partition(&[2, 50, 2, 2], 10);
        assert_eq!(batches, vec![0..1, 1..2, 2..4]);
    }

    #[test]
    fn test_covers_every_item_once() {
        let sizes: Vec<u64> = (1..=40).collect();
        let batches = partition(&sizes, 64);
        let mut next = 0;
        for batch in &batches {
            assert_eq!(batch.start, next);
            assert!(!batch.is_empty());
            next = batch.end;
        }
        assert_eq!(next, sizes.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(&[], 10).is_empty());
    }
}
