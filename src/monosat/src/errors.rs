//! Structured errors for the embedding surface.
//!
//! Construction-time failures are reported through this type; solve-time soft
//! failures (budget exhaustion, interrupts) are reported through the ternary
//! result instead and never produce an `Error`.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An argument referenced something that does not exist or is malformed:
    /// unknown option value, invalid name, missing bitvector/graph/node id,
    /// edge literal owned by the wrong graph, bit index out of range.
    #[error("{0}")]
    Domain(String),

    /// The solver is not in a state where the operation is meaningful.
    #[error("{0}")]
    State(String),

    /// Transcript or input file failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn domain(msg: impl Into<String>) -> Self {
        Error::Domain(msg.into())
    }
    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }
}

/// Check a user-supplied symbol: non-empty names must be printable,
/// non-whitespace, 7-bit ASCII.
pub fn check_name(name: &str) -> Result<()> {
    for c in name.chars() {
        if !c.is_ascii() || !c.is_ascii_graphic() {
            return Err(Error::domain(format!(
                "names must consist only of printable, non-whitespace ASCII; invalid character in name: {}",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name("x0").is_ok());
        assert!(check_name("a_b-c.d").is_ok());
        assert!(check_name("has space").is_err());
        assert!(check_name("tab\there").is_err());
        assert!(check_name("caf\u{e9}").is_err());
    }
}
