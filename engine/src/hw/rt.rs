use nix::libc;
use std::{io, ops::RangeInclusive};

#[derive(Debug, thiserror::Error)]
pub enum RtError {
    #[error("cannot query the SCHED_FIFO priority range: {0}")]
    Range(io::Error),

    #[error("sched_setscheduler(SCHED_FIFO, {priority}): {source}")]
    Apply { priority: i32, source: io::Error },

    #[error("scheduler reports policy {policy} at priority {priority}")]
    NotApplied { policy: i32, priority: i32 },
}

fn fifo_range() -> Result<RangeInclusive<i32>, RtError> {
    let min = unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) };
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if min < 0 || max < 0 {
        return Err(RtError::Range(io::Error::last_os_error()));
    }
    Ok(min..=max)
}

fn clamp_priority(requested: i32, range: &RangeInclusive<i32>) -> i32 {
    requested.clamp(*range.start(), *range.end())
}

/// Puts the calling thread under SCHED_FIFO. `priority` is clamped to what the
/// system allows; the priority actually in effect is returned.
pub fn promote_current_thread(priority: i32) -> Result<i32, RtError> {
    let priority = clamp_priority(priority, &fifo_range()?);
    let mut param = unsafe { std::mem::zeroed::<libc::sched_param>() };
    param.sched_priority = priority;

    // pid 0 is the calling thread.
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
        return Err(RtError::Apply {
            priority,
            source: io::Error::last_os_error(),
        });
    }

    let policy = unsafe { libc::sched_getscheduler(0) };
    let mut applied = unsafe { std::mem::zeroed::<libc::sched_param>() };
    let queried = unsafe { libc::sched_getparam(0, &mut applied) };
    if policy != libc::SCHED_FIFO || queried != 0 || applied.sched_priority != priority {
        return Err(RtError::NotApplied {
            policy,
            priority: applied.sched_priority,
        });
    }
    Ok(priority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_clamped_into_range() {
        let range = 1..=99;
        assert_eq!(clamp_priority(0, &range), 1);
        assert_eq!(clamp_priority(10, &range), 10);
        assert_eq!(clamp_priority(120, &range), 99);
    }

    #[test]
    fn fifo_range_is_available() {
        let range = fifo_range().unwrap();
        assert!(range.start() <= range.end());
        assert!(*range.start() >= 0);
    }
}
