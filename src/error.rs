use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single format string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: format!($msg),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the categories laid out below. Addin-originated failures are wrapped
/// with the addin's identity by the dispatch engine before they reach a logger, so callers can
/// pinpoint which rewriting pass failed.
///
/// # Error Categories
///
/// ## Load / Container Errors
/// - [`Error::NotFound`] - Assembly path does not exist
/// - [`Error::NotManaged`] - File is not a recognized managed module container
/// - [`Error::Malformed`] - Corrupted or structurally invalid container data
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Resolution Errors
/// - [`Error::UnresolvedReference`] - Referenced assembly not found in any search path
/// - [`Error::TypeNotFound`] - Token does not resolve to a type
/// - [`Error::MemberNotFound`] - Name + signature lookup failed on a type
///
/// ## Rewriting Errors
/// - [`Error::DanglingBranchTarget`] - Removal would orphan a branch target
/// - [`Error::Addin`] - A visit callback failed, wrapped with the addin's name
///
/// ## Configuration Errors
/// - [`Error::InvalidAddin`] - Addin registration rejected before any I/O
#[derive(Error, Debug)]
pub enum Error {
    /// The assembly file does not exist at the given path.
    ///
    /// Surfaced by the cache/resolver before any parsing is attempted. A batch
    /// weave reports this per path; other inputs in the batch are untouched.
    #[error("Assembly file not found - {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not a recognized managed module container.
    ///
    /// The container magic did not match, so the bytes were never parsed
    /// further. Native binaries and foreign formats land here.
    #[error("Not a managed module container - {}", .0.display())]
    NotManaged(PathBuf),

    /// The container is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the container.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during load or atomic
    /// write-back, such as permission issues or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A referenced assembly could not be located in any known search path.
    ///
    /// Search paths are seeded from the directories of already-loaded
    /// assemblies plus the session's configured directories.
    #[error("Failed to resolve assembly reference - {0}")]
    UnresolvedReference(String),

    /// Failed to find a type for the given token.
    #[error("Failed to find type for token - {0}")]
    TypeNotFound(Token),

    /// A member lookup by name and parameter types found no match.
    #[error("Member not found on '{type_name}' - {member}")]
    MemberNotFound {
        /// Full name of the type that was searched
        type_name: String,
        /// Name (and signature summary) of the member that was requested
        member: String,
    },

    /// An instruction that is the target of a branch would be removed.
    ///
    /// The body editor rejects the edit; removing a branch target is a
    /// programming error in the calling addin, never silently tolerated.
    #[error("Instruction {0} is a branch target and cannot be removed")]
    DanglingBranchTarget(u32),

    /// An addin could not be registered with the weave session.
    ///
    /// Raised before any I/O happens: an empty addin set, a duplicate addin
    /// name, or an addin declaring an empty member-kind mask.
    #[error("Invalid addin registration - {0}")]
    InvalidAddin(String),

    /// A visit callback failed inside an addin.
    ///
    /// The dispatch engine wraps the originating error with the addin's
    /// identity before logging it. Non-fatal by default; the weave continues
    /// with the next member/addin unless configured otherwise.
    #[error("Addin '{addin}' failed: {source}")]
    Addin {
        /// Name of the addin whose visit callback failed
        addin: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Failed to lock target.
    ///
    /// A shared assembly handle was poisoned by an earlier panic.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Wraps this error with the identity of the addin that produced it.
    #[must_use]
    pub fn in_addin(self, addin: &str) -> Self {
        Error::Addin {
            addin: addin.to_string(),
            source: Box::new(self),
        }
    }
}
