//! Crate-wide error type.

#[derive(thiserror::Error, Debug)]
/// Error type covering every fallible operation in the planner and rewriter pipelines
pub enum Error {
    /// An I/O error occurred
    #[error("an I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse an object file
    #[error("failed to parse object file {path}: {source}")]
    ObjectParse {
        /// The path of the object file that failed to parse
        path: std::path::PathBuf,
        /// The underlying parse error
        #[source]
        source: object::Error,
    },
    /// Failed to (de)serialize the indirection size store
    #[error("failed to (de)serialize the indirection size store: {0}")]
    Store(#[from] serde_json::Error),
    /// At least two unikernels are required
    #[error("at least two unikernels are required, found {found}")]
    TooFewUnikernels {
        /// The number of unikernels actually found
        found: usize,
    },
    /// The ASLR mode value is not one of the valid values
    #[error("aslr must be 0, 1 or 2, found {value}")]
    InvalidAslrMode {
        /// The invalid value that was supplied
        value: i32,
    },
    /// The unikernel workspace directory does not exist
    #[error("unikernel workspace directory does not exist: {0}")]
    MissingWorkspace(std::path::PathBuf),
    /// A section has no paired indirection section
    #[error("section {section} in {lib} has no paired indirection section {ind}")]
    MissingIndirectionSection {
        /// The library containing the section
        lib: String,
        /// The section missing its pair
        section: String,
        /// The expected paired indirection section name
        ind: String,
    },
    /// The relink subprocess failed
    #[error("relink of {unikernel} failed with exit code {code:?}")]
    RelinkFailed {
        /// The unikernel being relinked
        unikernel: String,
        /// The subprocess exit code, if any
        code: Option<i32>,
    },
    /// A displacement value does not fit in a signed 32-bit immediate
    #[error("displacement {value} does not fit in a signed 32-bit immediate")]
    DisplacementOverflow {
        /// The out-of-range displacement value
        value: i64,
    },
    /// Could not locate the little-endian displacement bytes within the instruction encoding
    #[error(
        "could not locate the little-endian displacement bytes within the instruction encoding"
    )]
    DisplacementNotFound,
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
