//! Per-instrument pipeline errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::data::DataError;
use crate::indicators::IndicatorError;
use crate::normalize::NormalizationError;
use crate::store::{ProvisioningError, WriteError};

/// Stable classification used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DataSource,
    InsufficientHistory,
    Normalization,
    StoreProvisioning,
    Write,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataSource => "data_source",
            Self::InsufficientHistory => "insufficient_history",
            Self::Normalization => "normalization",
            Self::StoreProvisioning => "store_provisioning",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can fail one instrument's fetch → compute → write.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data source: {0}")]
    Data(#[from] DataError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("normalization: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("store provisioning: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("write: {0}")]
    Write(WriteError),
}

impl From<WriteError> for PipelineError {
    /// Provisioning and normalization failures keep their own kind even when
    /// they surface through the writer.
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Provisioning(e) => Self::Provisioning(e),
            WriteError::Normalization(e) => Self::Normalization(e),
            other => Self::Write(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Data(_) => ErrorKind::DataSource,
            Self::Indicator(IndicatorError::InsufficientHistory { .. }) => {
                ErrorKind::InsufficientHistory
            }
            // An undefined value at the latest bar is a history problem too.
            Self::Indicator(IndicatorError::Undefined { .. }) => ErrorKind::InsufficientHistory,
            Self::Normalization(_) => ErrorKind::Normalization,
            Self::Provisioning(_) => ErrorKind::StoreProvisioning,
            Self::Write(_) => ErrorKind::Write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, TableStatus};

    #[test]
    fn writer_errors_are_reclassified() {
        let not_ready = WriteError::Provisioning(ProvisioningError::NotReady {
            table: "fx-trading-EUR_USD".into(),
            attempts: 3,
        });
        assert_eq!(PipelineError::from(not_ready).kind(), ErrorKind::StoreProvisioning);

        let put = WriteError::Put {
            table: "fx-trading-EUR_USD".into(),
            source: StoreError::Rejected("throttled".into()),
        };
        assert_eq!(PipelineError::from(put).kind(), ErrorKind::Write);

        let stale = WriteError::StoreNotActive {
            table: "fx-trading-EUR_USD".into(),
            status: TableStatus::Creating,
        };
        assert_eq!(PipelineError::from(stale).kind(), ErrorKind::Write);
    }

    #[test]
    fn insufficient_history_kind() {
        let err = PipelineError::from(IndicatorError::InsufficientHistory {
            required: 50,
            available: 10,
        });
        assert_eq!(err.kind(), ErrorKind::InsufficientHistory);
        assert_eq!(err.kind().to_string(), "insufficient_history");
        assert!(err.to_string().contains("10 bars available"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::StoreProvisioning).unwrap(),
            "\"store_provisioning\""
        );
    }
}
