use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid parameter configuration:\n{}", violations.join("\n"))]
    Configuration { violations: Vec<String> },

    #[error(transparent)]
    Provider(#[from] anyhow::Error),

    #[error("{resource} reached failure status {status}")]
    ResourceFailed { resource: String, status: String },

    #[error("{resource} never reached {target} after {attempts} attempts")]
    Timeout {
        resource: String,
        target: String,
        attempts: u32,
    },
}

/// Collects every parameter violation before failing, so a misconfigured
/// task reports all of its problems in one message.
#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, present: bool, message: &str) {
        if !present {
            self.messages.push(format!("missing parameter: {}", message));
        }
    }

    pub fn forbid(&mut self, condition: bool, message: &str) {
        if condition {
            self.messages
                .push(format!("error in parameter configuration: {}", message));
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_result(self) -> Result<(), TaskError> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(TaskError::Configuration {
                violations: self.messages,
            })
        }
    }
}
