//! Next-window resolution from persisted high-water marks.

use crate::error::{Result, TwinError};
use crate::types::BatchWindow;

/// Compute the next unprocessed window.
///
/// Processing resumes one second after the newest stored result; on an empty
/// results store it starts at the oldest available sensor reading.
pub fn resolve_window(
    last_result_timestamp: Option<i64>,
    earliest_sensor_timestamp: Option<i64>,
    calculations_batch_size: i64,
) -> Result<BatchWindow> {
    let start = match (last_result_timestamp, earliest_sensor_timestamp) {
        (Some(last), _) => last + 1,
        (None, Some(earliest)) => earliest,
        (None, None) => return Err(TwinError::InsufficientData { start: 0 }),
    };
    Ok(BatchWindow::new(start, start + calculations_batch_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_after_last_result() {
        let w = resolve_window(Some(99), Some(0), 60).unwrap();
        assert_eq!(w, BatchWindow::new(100, 160));
    }

    #[test]
    fn starts_at_earliest_sensor_when_results_empty() {
        let w = resolve_window(None, Some(1_704_067_201), 3600).unwrap();
        assert_eq!(w, BatchWindow::new(1_704_067_201, 1_704_070_801));
    }

    #[test]
    fn results_take_priority_over_sensors() {
        let w = resolve_window(Some(10), Some(500), 5).unwrap();
        assert_eq!(w.start, 11);
    }

    #[test]
    fn no_data_anywhere_is_insufficient() {
        assert!(matches!(
            resolve_window(None, None, 60),
            Err(TwinError::InsufficientData { .. })
        ));
    }
}
