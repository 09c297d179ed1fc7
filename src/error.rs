use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
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

macro_rules! config_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Config(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Parsing Errors
/// - [`Error::Malformed`] - Corrupted class file, annotation or Kotlin metadata block
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::Protobuf`] - The Kotlin string table could not be decoded
/// - [`Error::InstructionMismatch`] - A recorded instruction location no longer holds
///   the expected instruction while a constructor is being rewritten
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Archive`] - Errors reported by the zip reader or writer
///
/// ## Configuration Errors
/// - [`Error::Config`] - Invalid or contradictory filter configuration
///
/// # Examples
///
/// ```rust,no_run
/// use jarfilter::{Error, FilterConfig, JarFilter};
/// use std::path::Path;
///
/// let filter = JarFilter::new(FilterConfig::default())?;
/// match filter.filter_file(Path::new("in.jar"), Path::new("out.jar")) {
///     Ok(report) => println!("{} passes", report.passes),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed input: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok::<(), jarfilter::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// Raised for class files, annotation payloads and Kotlin metadata blocks
    /// that do not follow their format. The source location where the
    /// malformation was detected is carried along for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A constructor rewrite found an unexpected instruction at a location that was
    /// recorded as a field access.
    ///
    /// The rewrite of constructors is strictly length preserving, so any disagreement
    /// between the scan and the rewrite means the class file cannot be trusted.
    #[error("Unexpected opcode 0x{opcode:02x} at offset {offset} in {class}.{method}")]
    InstructionMismatch {
        /// Internal name of the class being rewritten
        class: String,
        /// Name and descriptor of the method being rewritten
        method: String,
        /// Byte offset of the instruction within the code array
        offset: usize,
        /// The opcode found at `offset`
        opcode: u8,
    },

    /// The filter configuration is invalid.
    ///
    /// Produced when an annotation is assigned to more than one role, or when
    /// an annotation name cannot be turned into a type descriptor.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error reported by the zip reader or writer.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The protobuf payload of a Kotlin metadata block could not be decoded.
    #[error("Protobuf error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
