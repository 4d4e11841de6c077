use serde::Serialize;

/// What happened to one connection during a fleet command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConnectionOutcome {
    Applied,
    /// The connection was already in the target state.
    Unchanged,
    Skipped { reason: String },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionResult {
    pub connection_id: String,
    #[serde(flatten)]
    pub outcome: ConnectionOutcome,
}

/// Fan-in of a fleet command: per-connection results plus counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub command: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ConnectionResult>,
}

impl BatchReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, connection_id: impl Into<String>, outcome: ConnectionOutcome) {
        match &outcome {
            ConnectionOutcome::Applied | ConnectionOutcome::Unchanged => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            ConnectionOutcome::Skipped { .. } => self.skipped += 1,
            ConnectionOutcome::Failed { .. } => {
                self.attempted += 1;
                self.failed += 1;
            }
        }
        self.results.push(ConnectionResult {
            connection_id: connection_id.into(),
            outcome,
        });
    }

    pub fn outcome_for(&self, connection_id: &str) -> Option<&ConnectionOutcome> {
        self.results
            .iter()
            .find(|r| r.connection_id == connection_id)
            .map(|r| &r.outcome)
    }

    /// Results sorted by connection id, so output is stable regardless of completion order.
    pub fn sorted(mut self) -> Self {
        self.results.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        self
    }
}
