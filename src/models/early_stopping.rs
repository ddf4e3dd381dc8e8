//! Patience-based early stopping on a held-out loss.

/// Tracks the best (lowest) held-out loss seen so far.
///
/// Training stops once `patience` consecutive rounds fail to improve on it.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_value: None,
            best_round: 0,
            current_round: 0,
        }
    }

    /// Record this round's loss; returns `true` when training should stop.
    pub fn should_stop(&mut self, value: f64) -> bool {
        let improved = match self.best_value {
            None => true,
            Some(best) => value < best,
        };
        if improved {
            self.best_value = Some(value);
            self.best_round = self.current_round;
        }
        self.current_round += 1;

        self.current_round - self.best_round > self.patience
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// Number of rounds up to and including the best one (1-based).
    pub fn best_iteration(&self) -> usize {
        if self.best_value.is_some() { self.best_round + 1 } else { 0 }
    }
}
