use thiserror::Error;

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidConfig($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidConfig(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which covers every error this library can return.
///
/// Registration, lookup and dispatch are infallible by contract; errors only arise
/// at the edges of the crate, when a configuration is validated, when the global
/// registry is initialized, or when an observer record arrives through the C ABI.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::InvalidConfig`] - A [`RegistryConfig`](crate::hook::RegistryConfig) failed validation
/// - [`Error::AlreadyInitialized`] - The global registry was configured after first use
///
/// ## Foreign Observer Errors
/// - [`Error::NullPointer`] - A required pointer in a C observer record was null
/// - [`Error::InvalidUtf8`] - A name in a C observer record is not valid UTF-8
/// - [`Error::InvalidParamCount`] - A C observer record carries a negative parameter count
///
/// # Examples
///
/// ```rust
/// use hybridscope::{hook::RegistryConfig, Error};
///
/// match RegistryConfig::default().with_shard_amount(3).validate() {
///     Err(Error::InvalidConfig(message)) => println!("rejected: {message}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(()) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A registry configuration value is out of range.
    ///
    /// Raised by [`RegistryConfig::validate`](crate::hook::RegistryConfig::validate)
    /// before a registry is built from it.
    #[error("Invalid registry configuration - {0}")]
    InvalidConfig(String),

    /// The process-wide registry already exists.
    ///
    /// A custom configuration can only be installed before the first call to
    /// [`Registry::global`](crate::hook::Registry::global).
    #[error("The global registry has already been initialized")]
    AlreadyInitialized,

    /// A required pointer was null.
    ///
    /// The associated value names the offending field of the foreign record.
    #[error("Null pointer passed for `{0}`")]
    NullPointer(&'static str),

    /// A foreign string is not valid UTF-8.
    ///
    /// Method tables of managed runtimes store names as UTF-8; anything else
    /// cannot match a call site.
    #[error("Field `{field}` is not valid UTF-8")]
    InvalidUtf8 {
        /// The field of the foreign record that failed to decode
        field: &'static str,
        /// The underlying decoding error
        #[source]
        source: std::str::Utf8Error,
    },

    /// A foreign observer declared a negative parameter count.
    #[error("Invalid parameter count - {0}")]
    InvalidParamCount(i32),
}

impl Error {
    /// Returns the status code reported for this error through the C ABI.
    ///
    /// Success is `0`; every error maps to a distinct negative value.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_) => -1,
            Error::AlreadyInitialized => -2,
            Error::NullPointer(_) => -3,
            Error::InvalidUtf8 { .. } => -4,
            Error::InvalidParamCount(_) => -5,
        }
    }
}
