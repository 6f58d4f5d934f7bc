//! Deadline/round clock
//!
//! The round is supplied by the ledger and read at execution time. The
//! engine never advances or caches it; every comparison takes the value
//! read for that comparison.

use custody_types::numeric::Round;

use crate::errors::EngineError;

/// Source of the current ledger round
pub trait Clock {
    fn current_round(&self) -> Round;
}

/// `now < deadline`, else `DeadlinePassed`.
pub fn ensure_before(now: Round, deadline: Round) -> Result<(), EngineError> {
    if now < deadline {
        Ok(())
    } else {
        Err(EngineError::DeadlinePassed { deadline, now })
    }
}

/// `now <= deadline`, else `DeadlinePassed`.
pub fn ensure_not_after(now: Round, deadline: Round) -> Result<(), EngineError> {
    if now <= deadline {
        Ok(())
    } else {
        Err(EngineError::DeadlinePassed { deadline, now })
    }
}

/// `now >= deadline`, else `DeadlineNotReached`.
pub fn ensure_reached(now: Round, deadline: Round) -> Result<(), EngineError> {
    if now >= deadline {
        Ok(())
    } else {
        Err(EngineError::DeadlineNotReached { deadline, now })
    }
}

/// `now > deadline`, else `DeadlineNotReached`.
pub fn ensure_passed(now: Round, deadline: Round) -> Result<(), EngineError> {
    if now > deadline {
        Ok(())
    } else {
        Err(EngineError::DeadlineNotReached { deadline, now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: u64) -> Round {
        Round::new(n)
    }

    #[test]
    fn test_boundaries() {
        assert!(ensure_before(r(9), r(10)).is_ok());
        assert!(ensure_before(r(10), r(10)).is_err());

        assert!(ensure_not_after(r(10), r(10)).is_ok());
        assert!(ensure_not_after(r(11), r(10)).is_err());

        assert!(ensure_reached(r(10), r(10)).is_ok());
        assert!(ensure_reached(r(9), r(10)).is_err());

        assert!(ensure_passed(r(11), r(10)).is_ok());
        assert!(ensure_passed(r(10), r(10)).is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            ensure_reached(r(1), r(5)),
            Err(EngineError::DeadlineNotReached { .. })
        ));
        assert!(matches!(
            ensure_not_after(r(6), r(5)),
            Err(EngineError::DeadlinePassed { .. })
        ));
    }
}
