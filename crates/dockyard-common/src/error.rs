use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockyardError {
    #[error("Required binary not found: {0}")]
    BinaryMissing(String),

    #[error("Invalid SMILES descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("3D embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Ligand preparation failed: {0}")]
    PreparationFailure(String),

    #[error("Invalid receptor: {0}")]
    InvalidReceptor(String),

    #[error("Invalid search box: {0}")]
    InvalidSearchBox(String),

    #[error("Incomplete form: {0}")]
    IncompleteForm(String),

    /// Vina exited with a nonzero status. `stdout` is kept verbatim for diagnosis.
    #[error("AutoDock Vina failed with exit code {code:?}")]
    DockingFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("AutoDock Vina did not finish within {0} seconds")]
    DockingTimedOut(u64),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DockyardError {
    /// Errors caused by what the user typed or uploaded. These end the current
    /// request with a prompt to correct the form.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DockyardError::IncompleteForm(_)
                | DockyardError::InvalidSearchBox(_)
                | DockyardError::InvalidReceptor(_)
        )
    }

    /// Errors raised while turning the SMILES string into a docking-ready ligand.
    pub fn is_ligand_error(&self) -> bool {
        matches!(
            self,
            DockyardError::InvalidDescriptor(_)
                | DockyardError::EmbeddingFailure(_)
                | DockyardError::PreparationFailure(_)
        )
    }
}

impl From<toml::de::Error> for DockyardError {
    fn from(e: toml::de::Error) -> Self {
        DockyardError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DockyardError>;
