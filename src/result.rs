use std::{fmt::Debug, path::PathBuf};

use camelpaste::paste;
use thiserror::Error;

use crate::sys::NodeID;

pub type RDResult<T> = Result<T, RDError>;

/// Structural rules a report must satisfy beyond what the type layer
/// already enforces. A violated record is rejected, never coerced.
#[derive(Debug)]
pub enum RdSchemaErr {
    EmptyNodeId,
    EmptyViewName,
    InvalidNodeManagerPort {
        node_id: String,
    },
    BucketLenMismatch {
        tags: String,
        boundaries: usize,
        counts: usize,
    },
}

/// A field held a value of the wrong semantic type (wrong JSON type,
/// negative where unsigned is expected, missing required field). The
/// decode layer reports the detail.
#[derive(Debug)]
pub enum RdTypeErr {
    JsonDecode {
        err: serde_json::Error,
        context: String,
    },
}

#[derive(Debug)]
pub enum RdNetErr {
    ReportSend(reqwest::Error),
    ReportRejected { status: u16, msg: String },
}

#[derive(Debug)]
pub enum RdConfigErr {
    ReadConfigFailed {
        path: PathBuf,
        err: std::io::Error,
    },
    ParseConfigFailed(serde_yaml::Error),
    NodeNotFound {
        id: NodeID,
    },
}

#[derive(Error, Debug)]
pub enum RDError {
    #[error("SchemaViolation: {0:?}")]
    RdSchemaErr(RdSchemaErr),

    #[error("TypeMismatch: {0:?}")]
    RdTypeErr(RdTypeErr),

    #[error("Network error: {0:?}")]
    RdNetErr(RdNetErr),

    #[error("Config error: {0:?}")]
    RdConfigErr(RdConfigErr),
}

impl From<RdSchemaErr> for RDError {
    fn from(e: RdSchemaErr) -> Self {
        RDError::RdSchemaErr(e)
    }
}

impl From<RdTypeErr> for RDError {
    fn from(e: RdTypeErr) -> Self {
        RDError::RdTypeErr(e)
    }
}

impl From<RdNetErr> for RDError {
    fn from(e: RdNetErr) -> Self {
        RDError::RdNetErr(e)
    }
}

impl From<RdConfigErr> for RDError {
    fn from(e: RdConfigErr) -> Self {
        RDError::RdConfigErr(e)
    }
}

pub struct ErrCvt<T>(pub T);

macro_rules! impl_err_convertor {
    ($t:ty,$sub_t:ty,$sub_tt:ty) => {
        paste! {
            impl ErrCvt<$t> {
                pub fn [<to_ $sub_t:snake>](self) -> RDError {
                    RDError::$sub_t($sub_t::$sub_tt(self.0))
                }
            }
        }
    };
}

impl_err_convertor!(reqwest::Error, RdNetErr, ReportSend);
impl_err_convertor!(serde_yaml::Error, RdConfigErr, ParseConfigFailed);

pub trait RDResultExt {
    fn todo_handle(&self);
}

impl<T: Debug> RDResultExt for RDResult<T> {
    #[inline]
    fn todo_handle(&self) {
        match self {
            Ok(_ok) => {}
            Err(err) => {
                tracing::warn!("result err: {:?}", err);
            }
        }
    }
}
