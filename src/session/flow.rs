use crate::error::FlowError;

/// Type used when a module declares no sequence at all.
pub const DEFAULT_TYPE: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    InProgress(u32),
    AwaitingContinue(u32),
    Complete,
}

/// Walks a learner through a module's ordered game types.
#[derive(Clone, Debug)]
pub struct FlowSequencer {
    sequence: Vec<u32>,
    requires_continue: bool,
    state: FlowState,
    /// Completion flag of the type currently shown.
    current_completed: bool,
    completed: Vec<u32>,
}

impl FlowSequencer {
    pub fn new(sequence: Vec<u32>, requires_continue: bool) -> Self {
        let sequence = if sequence.is_empty() {
            vec![DEFAULT_TYPE]
        } else {
            sequence
        };
        let first = sequence[0];
        Self {
            sequence,
            requires_continue,
            state: FlowState::InProgress(first),
            current_completed: false,
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn sequence(&self) -> &[u32] {
        &self.sequence
    }

    pub fn current_type(&self) -> Option<u32> {
        match self.state {
            FlowState::InProgress(t) | FlowState::AwaitingContinue(t) => Some(t),
            FlowState::Complete => None,
        }
    }

    pub fn is_current_completed(&self) -> bool {
        self.current_completed
    }

    pub fn is_type_completed(&self, game_type: u32) -> bool {
        self.completed.contains(&game_type)
    }

    pub fn is_complete(&self) -> bool {
        self.state == FlowState::Complete
    }

    fn successor(&self, game_type: u32) -> Option<u32> {
        let idx = self.sequence.iter().position(|&t| t == game_type)?;
        self.sequence.get(idx + 1).copied()
    }

    /// Mark `game_type` done. The last type always finishes the flow; any
    /// other type either waits at the continue gate or moves straight on.
    pub fn complete(&mut self, game_type: u32) -> Result<FlowState, FlowError> {
        if !self.sequence.contains(&game_type) {
            return Err(FlowError::UnknownType(game_type));
        }
        let current = match self.state {
            FlowState::Complete => return Err(FlowError::AlreadyComplete),
            // Repeated completion while waiting at the gate is a no-op.
            FlowState::AwaitingContinue(t) if t == game_type => return Ok(self.state),
            FlowState::InProgress(t) | FlowState::AwaitingContinue(t) => t,
        };
        if current != game_type {
            return Err(FlowError::NotCurrent {
                current,
                got: game_type,
            });
        }

        self.current_completed = true;
        if !self.completed.contains(&game_type) {
            self.completed.push(game_type);
        }
        self.state = match self.successor(game_type) {
            None => FlowState::Complete,
            Some(_) if self.requires_continue => FlowState::AwaitingContinue(game_type),
            Some(next) => {
                self.current_completed = false;
                FlowState::InProgress(next)
            }
        };
        Ok(self.state)
    }

    /// Leave the continue gate for the next type.
    pub fn advance(&mut self) -> Result<FlowState, FlowError> {
        let FlowState::AwaitingContinue(current) = self.state else {
            return Err(FlowError::NoContinueGate);
        };
        let next = self
            .successor(current)
            .ok_or(FlowError::UnknownType(current))?;
        self.state = FlowState::InProgress(next);
        self.current_completed = false;
        Ok(self.state)
    }

    pub fn reset(&mut self) {
        self.state = FlowState::InProgress(self.sequence[0]);
        self.current_completed = false;
        self.completed.clear();
    }
}
