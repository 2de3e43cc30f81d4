use crate::errors::TaskError;

/// Outcome of one task in a batch: fulfilled with a value or rejected.
///
/// Batch processing never short-circuits, so every submitted task maps to
/// exactly one `Settled` value at the same index.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(TaskError),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, TaskError> {
        self.into()
    }
}

impl<T> From<Result<T, TaskError>> for Settled<T> {
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(error) => Self::Rejected(error),
        }
    }
}

impl<T> From<Settled<T>> for Result<T, TaskError> {
    fn from(settled: Settled<T>) -> Self {
        match settled {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(error) => Err(error),
        }
    }
}
