use common::Direction;

use crate::DirectionPolicy;

/// Strict Up, Down, Up, Down alternation from a fixed starting polarity.
#[derive(Debug, Clone)]
pub struct Alternating {
    initial: Direction,
    next: Direction,
}

impl Alternating {
    pub fn new(initial: Direction) -> Self {
        Self {
            initial,
            next: initial,
        }
    }
}

impl DirectionPolicy for Alternating {
    fn name(&self) -> &str {
        "alternating"
    }

    fn peek(&self) -> Direction {
        self.next
    }

    fn advance(&mut self) -> Direction {
        let current = self.next;
        self.next = current.opposite();
        current
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}
