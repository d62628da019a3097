//! Thread-backed pool of tree-sitter parsers
//!
//! `tree_sitter::Parser` is not `Sync`, so each parser lives on a dedicated
//! worker thread and requests reach it over a channel. Analyzers hold a
//! cloneable handle and parse synchronously.

use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};

use thiserror::Error;
use tree_sitter::{Language, Parser, Tree};

/// Grammar used for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    /// TypeScript with JSX.
    Tsx,
}

impl Dialect {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx" | "jsx") => Dialect::Tsx,
            _ => Dialect::TypeScript,
        }
    }

    pub fn language(self) -> Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load the {dialect:?} grammar: {reason}")]
    Language { dialect: Dialect, reason: String },

    #[error("parser returned no tree")]
    NoTree,

    #[error("parser pool is shut down")]
    ShutDown,
}

struct WorkerRequest {
    dialect: Dialect,
    source: String,
    reply: mpsc::Sender<Result<Tree, ParseError>>,
}

/// Cloneable handle to the parser threads. Workers exit once every handle
/// is dropped.
#[derive(Clone)]
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || Self::worker_thread(worker_id, receiver));
        }

        Self { sender }
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!("Parser worker {} started", worker_id);

        let mut parser = Parser::new();
        let mut loaded: Option<Dialect> = None;

        loop {
            let next = match receiver.lock() {
                Ok(guard) => guard.recv(),
                Err(poisoned) => poisoned.into_inner().recv(),
            };
            let Ok(WorkerRequest { dialect, source, reply }) = next else {
                tracing::debug!("Parser worker {} shutting down", worker_id);
                break;
            };

            let result = Self::load(&mut parser, &mut loaded, dialect)
                .and_then(|()| parser.parse(&source, None).ok_or(ParseError::NoTree));

            if reply.send(result).is_err() {
                tracing::warn!("Failed to send parse result back to caller");
            }
        }
    }

    fn load(parser: &mut Parser, loaded: &mut Option<Dialect>, dialect: Dialect) -> Result<(), ParseError> {
        if *loaded == Some(dialect) {
            return Ok(());
        }
        parser
            .set_language(&dialect.language())
            .map_err(|e| ParseError::Language {
                dialect,
                reason: e.to_string(),
            })?;
        *loaded = Some(dialect);
        Ok(())
    }

    /// Parse `source`, blocking the current thread until a worker answers.
    pub fn parse_blocking(&self, dialect: Dialect, source: String) -> Result<Tree, ParseError> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(WorkerRequest {
                dialect,
                source,
                reply,
            })
            .map_err(|_| ParseError::ShutDown)?;
        response.recv().map_err(|_| ParseError::ShutDown)?
    }
}

/// Pool sized to the machine, between two and four workers.
pub fn create_parser_pool() -> ParserPool {
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().clamp(2, 4))
        .unwrap_or(2);
    ParserPool::new(num_workers)
}
