//! Symmetric stop-loss / target around a live rating.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub stop_loss: i64,
    pub target: i64,
}

/// `rating - range` and `rating + range`.
///
/// # Errors
/// `range` must be positive, and the stop-loss must stay above zero since a
/// zero threshold reads as "disabled".
pub fn bracket(rating: i64, range: i64) -> Result<Bracket, ValidationError> {
    if range <= 0 {
        return Err(ValidationError::InvalidValue {
            field: "range".into(),
            message: format!("must be positive, got {range}"),
        });
    }
    let stop_loss = rating.saturating_sub(range);
    if stop_loss <= 0 {
        return Err(ValidationError::InvalidValue {
            field: "range".into(),
            message: format!("{range} puts the stop-loss at or below zero for rating {rating}"),
        });
    }
    Ok(Bracket {
        stop_loss,
        target: rating.saturating_add(range),
    })
}
