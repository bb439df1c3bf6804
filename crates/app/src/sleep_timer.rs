//! Sleep timer values and their one-second tick.

/// User-configured automatic pause: after a countdown, or at the next
/// chapter boundary. Absent is modeled as `Option::None` at the call sites;
/// setting a new value always replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTimer {
    /// Remaining whole seconds; decremented only while speaking.
    Countdown(u32),
    /// Pause when the current chapter's last chunk finishes.
    EndOfChapter,
}

/// Advance a countdown by one second. Returns `true` when the timer fires,
/// in which case it has been reset to absent and the caller pauses playback.
pub fn tick(timer: &mut Option<SleepTimer>) -> bool {
    match timer {
        Some(SleepTimer::Countdown(secs)) => {
            *secs = secs.saturating_sub(1);
            if *secs == 0 {
                *timer = None;
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_decrements_once_per_tick() {
        let mut timer = Some(SleepTimer::Countdown(3));
        assert!(!tick(&mut timer));
        assert_eq!(timer, Some(SleepTimer::Countdown(2)));
    }

    #[test]
    fn countdown_fires_at_zero_and_resets_to_absent() {
        let mut timer = Some(SleepTimer::Countdown(1));
        assert!(tick(&mut timer));
        assert_eq!(timer, None);
    }

    #[test]
    fn thirty_ticks_consume_a_thirty_second_timer() {
        let mut timer = Some(SleepTimer::Countdown(30));
        let mut fired = 0;
        for _ in 0..30 {
            if tick(&mut timer) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(timer, None);
    }

    #[test]
    fn end_of_chapter_never_ticks() {
        let mut timer = Some(SleepTimer::EndOfChapter);
        assert!(!tick(&mut timer));
        assert_eq!(timer, Some(SleepTimer::EndOfChapter));
    }

    #[test]
    fn absent_timer_is_inert() {
        let mut timer = None;
        assert!(!tick(&mut timer));
        assert_eq!(timer, None);
    }
}
