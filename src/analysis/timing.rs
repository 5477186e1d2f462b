//! Response time estimation from call timestamps.

use std::collections::HashMap;

use crate::models::ParsedBlock;

/// Seconds elapsed between each timed call and the timed call before it,
/// keyed by step.
///
/// Calls are ordered by start time (ties keep log order); the earliest call
/// gets no entry. Fewer than two timed calls yields an empty map.
pub fn response_times(blocks: &[ParsedBlock]) -> HashMap<usize, f64> {
    let mut timed: Vec<_> = blocks
        .iter()
        .filter_map(|b| b.start_time.map(|ts| (b.step, ts)))
        .collect();
    timed.sort_by_key(|(_, ts)| *ts);

    timed
        .windows(2)
        .map(|pair| {
            let (_, prev) = pair[0];
            let (step, current) = pair[1];
            let secs = (current - prev).num_milliseconds() as f64 / 1000.0;
            (step, secs)
        })
        .collect()
}

/// Response times in step order, for display.
pub fn ordered_response_times(blocks: &[ParsedBlock]) -> Vec<(usize, f64)> {
    let mut times: Vec<_> = response_times(blocks).into_iter().collect();
    times.sort_by_key(|(step, _)| *step);
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn block_at(step: usize, ts: Option<&str>) -> ParsedBlock {
        let mut block = ParsedBlock::new(step);
        block.start_time =
            ts.map(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S").unwrap());
        block
    }

    #[test]
    fn test_response_times_consecutive() {
        let blocks = vec![
            block_at(1, Some("2025-04-02 10:15:01")),
            block_at(2, Some("2025-04-02 10:15:21")),
            block_at(3, Some("2025-04-02 10:15:51")),
        ];
        let times = response_times(&blocks);
        assert_eq!(times.len(), 2);
        assert_eq!(times.get(&2), Some(&20.0));
        assert_eq!(times.get(&3), Some(&30.0));
        assert!(!times.contains_key(&1));
    }

    #[test]
    fn test_response_times_skip_untimed_and_sort() {
        let blocks = vec![
            block_at(1, Some("2025-04-02 10:00:30")),
            block_at(2, None),
            block_at(3, Some("2025-04-02 10:00:00")),
        ];
        let times = response_times(&blocks);
        // Step 3 is earliest, so step 1 is measured from it.
        assert_eq!(times.get(&1), Some(&30.0));
        assert_eq!(times.len(), 1);
    }

    #[test]
    fn test_response_times_need_two_timestamps() {
        let blocks = vec![block_at(1, Some("2025-04-02 10:00:00")), block_at(2, None)];
        assert!(response_times(&blocks).is_empty());
        assert!(response_times(&[]).is_empty());
    }

    #[test]
    fn test_ordered_response_times() {
        let blocks = vec![
            block_at(1, Some("2025-04-02 10:00:00")),
            block_at(2, Some("2025-04-02 10:00:05")),
            block_at(3, Some("2025-04-02 10:00:07")),
        ];
        assert_eq!(ordered_response_times(&blocks), vec![(2, 5.0), (3, 2.0)]);
    }
}
