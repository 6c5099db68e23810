//! Connection traits for reaching a project container through SQL.
//!
//! The container's driver is an external collaborator. Implementations of
//! these traits wrap whatever handshake the driver needs and hand query
//! results back as Arrow record batches.

use anyhow::Result;
use arrow_array::RecordBatch;

/// Text encoding mode used by the driver's query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Single-byte ANSI text.
    #[default]
    Ansi,
    /// Wide-character Unicode text.
    Unicode,
}

/// Options recognised when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionOptions {
    /// Text encoding of the query layer (default: ANSI)
    pub encoding: TextEncoding,
    /// Whether the driver escapes quote characters in query text (default: false).
    ///
    /// Queries that embed double-quoted literals need this disabled.
    pub escape_quotes: bool,
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text encoding mode
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set whether the driver escapes quote characters
    #[must_use]
    pub fn with_escape_quotes(mut self, escape_quotes: bool) -> Self {
        self.escape_quotes = escape_quotes;
        self
    }

    /// Returns `true` if query text with embedded double quotes reaches the
    /// container unchanged.
    #[must_use]
    pub fn preserves_literal_quotes(&self) -> bool {
        !self.escape_quotes
    }
}

/// An open connection to a project container.
///
/// A connection is used by one extraction at a time and is never shared.
pub trait Connection {
    /// Executes `sql` verbatim and returns the full result as one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is malformed or fails in the driver.
    fn execute(&mut self, sql: &str) -> Result<RecordBatch>;

    /// Lists the column names of `table` in their declared order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or cannot be described.
    fn column_names(&mut self, table: &str) -> Result<Vec<String>>;
}

/// Opens and closes connections to project containers.
pub trait ConnectionProvider {
    /// The connection type handed out by this provider.
    type Connection: Connection;

    /// Opens a connection to the container at `locator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source cannot be opened.
    fn open(&self, locator: &str, options: &ConnectionOptions) -> Result<Self::Connection>;

    /// Releases a connection previously returned by [`ConnectionProvider::open`].
    fn close(&self, connection: Self::Connection);
}
