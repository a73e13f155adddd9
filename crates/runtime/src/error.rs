//! Bridge error taxonomy
//!
//! Errors are values inside the bridge: helpers return `Result<_, BridgeError>`
//! and the public calling conventions turn failures into a logged `0`
//! sentinel at the boundary. The one exception is a broken reentrancy
//! invariant, which aborts (see `lunabridge_core::reentrancy_violation`).

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum BridgeError {
    /// Malformed source text or chunk bytes
    Compile(String),
    /// Error raised while a chunk or function was running
    Runtime(String),
    /// A global name or stack slot does not hold a callable
    NotCallable(String),
    /// A function or object handle does not resolve
    HandleInvalid(i32),
    /// Archive missing, unreadable, or could not be staged
    ArchiveUnavailable { path: PathBuf, reason: String },
    /// The engine instance already has a bridge attached
    AlreadyAttached,
    /// A native binding ran on an engine with no live bridge
    Detached,
    /// The attached engine instance was dropped by its owner
    EngineClosed,
    /// Every handle id has been handed out
    HandlesExhausted,
    /// Configuration could not be loaded or parsed
    Config(String),
    /// Filesystem error from the file utilities
    Io(std::io::Error),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Compile(msg) => write!(f, "compile error: {}", msg),
            BridgeError::Runtime(msg) => write!(f, "runtime error: {}", msg),
            BridgeError::NotCallable(what) => write!(f, "{} is not a function", what),
            BridgeError::HandleInvalid(handle) => {
                write!(f, "handle {} does not reference a live value", handle)
            }
            BridgeError::ArchiveUnavailable { path, reason } => {
                write!(f, "archive {} unavailable: {}", path.display(), reason)
            }
            BridgeError::AlreadyAttached => {
                write!(f, "engine instance already has a bridge attached")
            }
            BridgeError::Detached => write!(f, "no bridge is attached to this engine"),
            BridgeError::EngineClosed => write!(f, "engine instance has been closed"),
            BridgeError::HandlesExhausted => write!(f, "no handle ids left"),
            BridgeError::Config(msg) => write!(f, "config error: {}", msg),
            BridgeError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<mlua::Error> for BridgeError {
    fn from(e: mlua::Error) -> Self {
        match e {
            mlua::Error::SyntaxError { message, .. } => BridgeError::Compile(message),
            other => BridgeError::Runtime(other.to_string()),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e)
    }
}

impl From<BridgeError> for mlua::Error {
    fn from(e: BridgeError) -> Self {
        mlua::Error::external(e)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
