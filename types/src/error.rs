use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown law choice: {0:?} (expected \"oui\" or \"non\")")]
    UnknownChoice(String),

    #[error("unknown vote status: {0:?}")]
    UnknownStatus(String),
}
