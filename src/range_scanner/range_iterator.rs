use std::{num::NonZeroU64, ops::RangeInclusive};

use alloy::primitives::BlockNumber;

/// Splits an inclusive block range into consecutive query windows, oldest first.
///
/// With a `step` every window spans at most `step` blocks, i.e. `[i, min(i + step - 1, end)]`.
/// Without one the whole range is a single window. At most `max_windows` windows are yielded,
/// the rest of the range is left for the next scan.
#[derive(Debug, Clone)]
pub struct ChunkWindows {
    next: Option<BlockNumber>,
    end: BlockNumber,
    step: Option<NonZeroU64>,
    remaining: usize,
}

impl ChunkWindows {
    #[must_use]
    pub fn new(
        start: BlockNumber,
        end: BlockNumber,
        step: Option<NonZeroU64>,
        max_windows: usize,
    ) -> Self {
        let next = (start <= end).then_some(start);
        Self { next, end, step, remaining: max_windows }
    }

    /// Total number of windows needed to cover the range, ignoring the window cap.
    #[must_use]
    pub fn windows_needed(start: BlockNumber, end: BlockNumber, step: Option<NonZeroU64>) -> u64 {
        match (start <= end, step) {
            (false, _) => 0,
            (true, None) => 1,
            (true, Some(step)) => (end - start) / step.get() + 1,
        }
    }
}

impl Iterator for ChunkWindows {
    type Item = RangeInclusive<BlockNumber>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let window_start = self.next?;

        let window_end = match self.step {
            Some(step) => window_start.saturating_add(step.get() - 1).min(self.end),
            None => self.end,
        };

        self.remaining -= 1;
        self.next = window_end.checked_add(1).filter(|next| *next <= self.end);

        if self.remaining == 0 && self.next.is_some() {
            debug!(
                window_end = window_end,
                range_end = self.end,
                "Window cap reached, leaving the rest of the range for the next scan"
            );
        }

        Some(window_start..=window_end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let Some(next) = self.next else {
            return (0, Some(0));
        };
        let needed = usize::try_from(Self::windows_needed(next, self.end, self.step))
            .unwrap_or(usize::MAX);
        let remaining = needed.min(self.remaining);
        (remaining, Some(remaining))
    }
}
