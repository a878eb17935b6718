pub mod alternator;
pub mod cadence;
pub mod generator;

pub use alternator::Alternating;
pub use cadence::CadencePolicy;
pub use generator::{DecisionEngine, Generated};

use common::Direction;

/// Chooses the polarity of each generated decision.
///
/// Policies never look at the price feed; direction is a function of how
/// many decisions have been requested so far.
pub trait DirectionPolicy: Send + Sync {
    /// Human-readable name shown in logs.
    fn name(&self) -> &str;

    /// Direction the next call to `advance` will return.
    fn peek(&self) -> Direction;

    /// Consume one step and return its direction.
    fn advance(&mut self) -> Direction;

    /// Return to the initial polarity.
    fn reset(&mut self);
}
