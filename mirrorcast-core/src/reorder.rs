//! Latency-first reorder buffer for decoded frames.
//!
//! The `ReorderBuffer` holds frames that arrived but have not been shown
//! yet, keyed by sequence number, and decides after every admission which
//! frame (if any) to display next.
//!
//! # Policy
//!
//! - **Admit**: insert `sequence → frame`, overwriting an existing entry
//!   with the same sequence (duplicates collapse to the latest write).
//! - **Evict stale**: drop every entry whose sequence is `<=` the display
//!   cursor. Such frames arrived after something newer was already shown
//!   and can never be displayed.
//! - **Select**: take the smallest remaining sequence, even if it is not
//!   `cursor + 1`. Missing frames are never waited for.
//! - **Advance**: the cursor becomes the selected sequence.
//!
//! A dropped frame is preferred over added delay. The pending set has no
//! capacity bound: eviction on every admission keeps it to the frames that
//! are newer than the cursor and not yet selected, normally zero or one.
//!
//! # Invariants
//!
//! - the cursor never decreases
//! - nothing with `sequence <= cursor` is ever returned by [`select`](ReorderBuffer::select)
//! - every pending entry has `sequence > cursor` after [`admit`](ReorderBuffer::admit)
//!
//! # Example
//!
//! ```
//! use mirrorcast_core::reorder::ReorderBuffer;
//!
//! let mut buffer = ReorderBuffer::new();
//! for seq in [0u32, 1, 3] {
//!     let shown = buffer.admit_and_select(seq, 0, seq).map(|f| f.sequence);
//!     assert_eq!(shown, Some(seq));
//! }
//! assert_eq!(buffer.cursor(), Some(3));
//! ```

use std::collections::BTreeMap;

/// A decoded frame waiting to be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame<F> {
    pub sequence: u32,
    /// Sender wall clock at capture start, ms since the Unix epoch.
    pub capture_timestamp_ms: i64,
    pub frame: F,
}

/// What [`ReorderBuffer::admit`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Admission {
    /// The sequence was already pending and its frame was replaced.
    pub replaced: bool,
    /// Entries (possibly including the admitted one) removed as stale.
    pub evicted: usize,
}

/// Pending frame set plus display cursor for one stream of sequence
/// numbers.
#[derive(Debug)]
pub struct ReorderBuffer<F> {
    pending: BTreeMap<u32, PendingFrame<F>>,
    /// Last displayed sequence; `None` until the first display.
    cursor: Option<u32>,
    stale_evictions: u64,
    duplicates: u64,
    displayed: u64,
}

impl<F> ReorderBuffer<F> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            cursor: None,
            stale_evictions: 0,
            duplicates: 0,
            displayed: 0,
        }
    }

    /// Last displayed sequence number.
    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    /// Number of frames pending display.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Smallest pending sequence, i.e. what [`select`](Self::select)
    /// would return next.
    pub fn next_sequence(&self) -> Option<u32> {
        self.pending.keys().next().copied()
    }

    /// Total entries removed as stale since construction.
    pub fn stale_evictions(&self) -> u64 {
        self.stale_evictions
    }

    /// Total admissions that replaced a pending entry.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Total frames handed out by [`select`](Self::select).
    pub fn displayed(&self) -> u64 {
        self.displayed
    }

    /// Insert a frame, then purge everything at or below the cursor.
    pub fn admit(&mut self, sequence: u32, capture_timestamp_ms: i64, frame: F) -> Admission {
        let entry = PendingFrame {
            sequence,
            capture_timestamp_ms,
            frame,
        };
        let replaced = self.pending.insert(sequence, entry).is_some();
        if replaced {
            self.duplicates += 1;
        }
        let evicted = self.evict_stale();
        Admission { replaced, evicted }
    }

    /// Remove and return the smallest pending frame, advancing the cursor
    /// to its sequence.
    pub fn select(&mut self) -> Option<PendingFrame<F>> {
        let (sequence, frame) = self.pending.pop_first()?;
        debug_assert!(self.cursor.is_none_or(|c| sequence > c));
        self.cursor = Some(sequence);
        self.displayed += 1;
        Some(frame)
    }

    /// [`admit`](Self::admit) followed by [`select`](Self::select).
    pub fn admit_and_select(
        &mut self,
        sequence: u32,
        capture_timestamp_ms: i64,
        frame: F,
    ) -> Option<PendingFrame<F>> {
        self.admit(sequence, capture_timestamp_ms, frame);
        self.select()
    }

    fn evict_stale(&mut self) -> usize {
        let Some(cursor) = self.cursor else {
            return 0;
        };
        let mut evicted = 0;
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > cursor {
                break;
            }
            entry.remove();
            evicted += 1;
        }
        self.stale_evictions += evicted as u64;
        evicted
    }
}

impl<F> Default for ReorderBuffer<F> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Admit each `(sequence, payload)` followed by a selection step and
    /// return the sequences that were displayed.
    fn drive(buffer: &mut ReorderBuffer<&'static str>, arrivals: &[(u32, &'static str)]) -> Vec<u32> {
        arrivals
            .iter()
            .filter_map(|&(seq, payload)| buffer.admit_and_select(seq, 0, payload))
            .map(|f| f.sequence)
            .collect()
    }

    #[test]
    fn in_order_stream_displays_everything() {
        let mut buffer = ReorderBuffer::new();
        let shown = drive(&mut buffer, &[(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(shown, vec![0, 1, 2]);
        assert_eq!(buffer.cursor(), Some(2));
        assert!(buffer.is_empty());
    }

    #[test]
    fn first_frame_zero_is_displayable() {
        let mut buffer = ReorderBuffer::new();
        let shown = buffer.admit_and_select(0, 10, "zero").unwrap();
        assert_eq!(shown.sequence, 0);
        assert_eq!(shown.capture_timestamp_ms, 10);
        assert_eq!(buffer.cursor(), Some(0));
    }

    #[test]
    fn gaps_are_skipped_not_awaited() {
        let mut buffer = ReorderBuffer::new();
        let shown = drive(&mut buffer, &[(0, "a"), (1, "b"), (3, "d")]);
        assert_eq!(shown, vec![0, 1, 3]);
    }

    #[test]
    fn late_frame_is_evicted_never_displayed() {
        let mut buffer = ReorderBuffer::new();
        let shown = drive(&mut buffer, &[(0, "a"), (3, "d"), (2, "late")]);
        assert_eq!(shown, vec![0, 3]);
        assert_eq!(buffer.stale_evictions(), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.cursor(), Some(3));
    }

    #[test]
    fn duplicate_collapses_to_latest_payload() {
        let mut buffer = ReorderBuffer::new();
        let first = buffer.admit(5, 1, "old");
        assert!(!first.replaced);
        let second = buffer.admit(5, 2, "new");
        assert!(second.replaced);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.duplicates(), 1);

        let shown = buffer.select().unwrap();
        assert_eq!(shown.frame, "new");
        assert_eq!(shown.capture_timestamp_ms, 2);
        assert!(buffer.select().is_none());
    }

    #[test]
    fn duplicate_of_displayed_frame_is_evicted() {
        let mut buffer = ReorderBuffer::new();
        buffer.admit_and_select(4, 0, "shown");
        let admission = buffer.admit(4, 0, "again");
        assert_eq!(admission.evicted, 1);
        assert!(buffer.select().is_none());
        assert_eq!(buffer.cursor(), Some(4));
    }

    #[test]
    fn selects_lowest_of_several_pending() {
        let mut buffer = ReorderBuffer::new();
        buffer.admit(9, 0, "nine");
        buffer.admit(7, 0, "seven");
        buffer.admit(8, 0, "eight");
        assert_eq!(buffer.next_sequence(), Some(7));
        assert_eq!(buffer.select().unwrap().sequence, 7);
        assert_eq!(buffer.select().unwrap().sequence, 8);
        // Admitting something older than the cursor purges it at once.
        let admission = buffer.admit(6, 0, "six");
        assert_eq!(admission.evicted, 1);
        assert_eq!(buffer.select().unwrap().sequence, 9);
    }

    #[test]
    fn cursor_is_monotonic_and_never_shows_stale() {
        // Deterministic pseudo-random arrival order with duplicates.
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut buffer = ReorderBuffer::new();
        let mut last_cursor: Option<u32> = None;

        for _ in 0..5_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let seq = (state % 400) as u32;

            let cursor_before = buffer.cursor();
            buffer.admit(seq, 0, ());
            for (&pending_seq, _) in buffer.pending.iter() {
                assert!(cursor_before.is_none_or(|c| pending_seq > c));
            }

            if let Some(shown) = buffer.select() {
                assert!(cursor_before.is_none_or(|c| shown.sequence > c));
            }

            let cursor_after = buffer.cursor();
            assert!(cursor_after >= last_cursor, "cursor went backwards");
            last_cursor = cursor_after;
        }
    }
}
