//! Messages exchanged with the parser host worker.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::parser::FileAnalysis;
use crate::parser::signatures::{InterfaceMember, Signature, SignatureDiff};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    AnalyzeFile { path: PathBuf, text: String },
    ExtractSignatures { path: PathBuf, text: String },
    ExtractInterfaceMembers { path: PathBuf, text: String },
    CompareSignatures { old: Vec<Signature>, new: Vec<Signature> },
    /// Drop the worker's parsers.
    Reset,
}

impl Request {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::AnalyzeFile { .. } => "analyze_file",
            Request::ExtractSignatures { .. } => "extract_signatures",
            Request::ExtractInterfaceMembers { .. } => "extract_interface_members",
            Request::CompareSignatures { .. } => "compare_signatures",
            Request::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Analysis(FileAnalysis),
    Signatures(Vec<Signature>),
    InterfaceMembers(Vec<InterfaceMember>),
    SignatureDiffs(Vec<SignatureDiff>),
    /// Number of files parsed since the previous reset.
    Reset { parsed_since_reset: usize },
}

/// A failure reported by the worker while handling a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub message: String,
    pub detail: Option<String>,
}

impl RemoteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<RemoteFailure> for HostError {
    fn from(failure: RemoteFailure) -> Self {
        HostError::Remote {
            message: failure.message,
            detail: failure.detail,
        }
    }
}

#[derive(Debug)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

#[derive(Debug)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub result: Result<Response, RemoteFailure>,
}
