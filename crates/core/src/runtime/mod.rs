mod stage;
mod state;
mod turn;

pub use stage::{Flags, Stage, next_stage};
pub use state::TurnState;
pub use turn::{PipelineError, TurnPipeline};
