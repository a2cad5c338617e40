use std::sync::mpsc;

use tokio::sync::mpsc::UnboundedSender;

use super::protocol::{RemoteFailure, Request, RequestEnvelope, Response, ResponseEnvelope};
use crate::language::LanguageKind;
use crate::parser::signatures::{
    diff_signature_sets, extract_interface_members, extract_signatures,
};
use crate::parser::{AnalyzerRegistry, parse_tree, reset_parsers};

/// What actually handles requests on the worker thread.
///
/// A panic inside `handle` takes the worker down; the host rejects everything that was
/// pending and starts a fresh worker on the next request.
pub trait HostBackend: Send {
    fn handle(&mut self, request: Request) -> Result<Response, RemoteFailure>;
}

/// Default backend: the tree-sitter analyzers, with parsers living in the worker's
/// thread-local storage.
#[derive(Debug, Default)]
pub struct TreeSitterBackend {
    registry: AnalyzerRegistry,
}

impl TreeSitterBackend {
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self { registry }
    }
}

fn language_of(path: &std::path::Path) -> Result<LanguageKind, RemoteFailure> {
    LanguageKind::from_path(path).ok_or_else(|| {
        RemoteFailure::new("unsupported file type").with_detail(path.display().to_string())
    })
}

impl HostBackend for TreeSitterBackend {
    fn handle(&mut self, request: Request) -> Result<Response, RemoteFailure> {
        match request {
            Request::AnalyzeFile { path, text } => {
                let analyzer = self.registry.for_path(&path).ok_or_else(|| {
                    RemoteFailure::new("unsupported file type")
                        .with_detail(path.display().to_string())
                })?;
                analyzer
                    .analyze(&path, &text)
                    .map(Response::Analysis)
                    .map_err(|e| RemoteFailure::new(e.to_string()).with_detail(e.kind()))
            }
            Request::ExtractSignatures { path, text } => {
                let kind = language_of(&path)?;
                let tree = parse_tree(kind, &path, text.as_bytes())
                    .map_err(|e| RemoteFailure::new(e.to_string()).with_detail(e.kind()))?;
                Ok(Response::Signatures(extract_signatures(
                    &tree,
                    text.as_bytes(),
                    kind,
                )))
            }
            Request::ExtractInterfaceMembers { path, text } => {
                let kind = language_of(&path)?;
                let tree = parse_tree(kind, &path, text.as_bytes())
                    .map_err(|e| RemoteFailure::new(e.to_string()).with_detail(e.kind()))?;
                Ok(Response::InterfaceMembers(extract_interface_members(
                    &tree,
                    text.as_bytes(),
                    kind,
                )))
            }
            Request::CompareSignatures { old, new } => {
                Ok(Response::SignatureDiffs(diff_signature_sets(&old, &new)))
            }
            Request::Reset => Ok(Response::Reset {
                parsed_since_reset: reset_parsers(),
            }),
        }
    }
}

/// Worker loop: handle requests in arrival order until the request channel closes or
/// the response side goes away.
pub(crate) fn run(
    mut backend: Box<dyn HostBackend>,
    requests: mpsc::Receiver<RequestEnvelope>,
    responses: UnboundedSender<ResponseEnvelope>,
) {
    while let Ok(RequestEnvelope { id, request }) = requests.recv() {
        let name = request.name();
        let result = backend.handle(request);
        if let Err(failure) = &result {
            tracing::debug!(id, request = name, "host request failed: {}", failure.message);
        }
        if responses.send(ResponseEnvelope { id, result }).is_err() {
            break;
        }
    }
    tracing::debug!("parser host worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_tree_sitter_backend_analyzes() {
        let mut backend = TreeSitterBackend::default();
        let response = backend
            .handle(Request::AnalyzeFile {
                path: PathBuf::from("/p/a.ts"),
                text: "import { b } from './b';\nexport function f() { b(); }\n".to_owned(),
            })
            .unwrap();
        let Response::Analysis(analysis) = response else {
            panic!("expected analysis response");
        };
        assert_eq!(analysis.imports.len(), 1);
        assert_eq!(analysis.symbols.len(), 1);
    }

    #[test]
    fn test_unsupported_file_is_remote_failure() {
        let mut backend = TreeSitterBackend::default();
        let err = backend
            .handle(Request::ExtractSignatures {
                path: PathBuf::from("/p/readme.md"),
                text: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.message, "unsupported file type");
        assert_eq!(err.detail.as_deref(), Some("/p/readme.md"));
    }

    #[test]
    fn test_reset_reports_parse_count() {
        let mut backend = TreeSitterBackend::default();
        reset_parsers();
        for _ in 0..2 {
            backend
                .handle(Request::ExtractSignatures {
                    path: PathBuf::from("/p/a.py"),
                    text: "def f(x): pass\n".to_owned(),
                })
                .unwrap();
        }
        let Ok(Response::Reset { parsed_since_reset }) = backend.handle(Request::Reset) else {
            panic!("expected reset response");
        };
        assert_eq!(parsed_since_reset, 2);
    }
}
