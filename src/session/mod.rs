pub mod accumulator;
pub mod flow;
pub mod result;
pub mod round;

pub use accumulator::ScoreAccumulator;
pub use flow::{FlowSequencer, FlowState};
pub use round::{SortingRound, Term};
