use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Which phase of package loading produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageErrorKind {
    List,
    Type,
    Parse,
    Unknown,
}

/// Error types for the library
#[derive(Debug)]
pub enum Error {
    /// A traverser was handed an AST node it does not handle. Always recoverable.
    InvalidNodeType,
    /// A signature index was out of range when extracting argument/return types.
    InvalidIndex,
    /// The callee resolved to a Go builtin; unresolvable, not a failure.
    BuiltInFunction,
    /// The emitter was invoked on a service without a config.
    ConfigNotFound,
    /// The package loader failed for the given import path.
    PackageLoad {
        kind: PackageErrorKind,
        package: String,
        message: String,
    },
    /// The loader produced zero packages for the requested path.
    PackageNotFound(String),
    /// Go source failed to parse.
    Syntax {
        file: PathBuf,
        line: usize,
        message: String,
    },
    IoError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidNodeType => write!(f, "invalid node type"),
            Error::InvalidIndex => write!(f, "signature index out of range"),
            Error::BuiltInFunction => write!(f, "callee is a builtin function"),
            Error::ConfigNotFound => write!(f, "no config found on service"),
            Error::PackageLoad {
                kind,
                package,
                message,
            } => {
                let kind = match kind {
                    PackageErrorKind::List => "list",
                    PackageErrorKind::Type => "type",
                    PackageErrorKind::Parse => "parse",
                    PackageErrorKind::Unknown => "unknown",
                };
                write!(f, "package {} has {} errors: {}", package, kind, message)
            }
            Error::PackageNotFound(package) => write!(f, "package {} not found", package),
            Error::Syntax {
                file,
                line,
                message,
            } => write!(f, "syntax error {}:{}: {}", file.display(), line, message),
            Error::IoError(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}
