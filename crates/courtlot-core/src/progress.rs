use serde::{Deserialize, Serialize};

/// A progress event for front ends: `current` of `total` items, plus a line for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (current.min(total) * 100 / total) as u8
        };
        Self {
            current,
            total,
            percent,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Progress;

    #[test]
    fn percent_is_floored() {
        assert_eq!(Progress::new(1, 3, "").percent, 33);
        assert_eq!(Progress::new(3, 3, "").percent, 100);
        assert_eq!(Progress::new(0, 0, "").percent, 100);
    }
}
