use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use rand_distr::uniform::Error as UniformError;

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, ParamErr>;

/// The parameter storage error type.
#[derive(Debug)]
pub enum ParamErr {
    /// A buffer, a layer or a peer tree doesn't hold the expected amount of parameters.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The peer of a binary operation has the same size but a different layout.
    StructureMismatch { name: String, detail: String },
    /// There is no child registered under this index and name.
    UnknownParam { index: usize, name: String },
    /// The child registered under this index and name is a leaf, not a tree.
    NotATree { index: usize, name: String },
    /// The index or the name is already taken by another child.
    DuplicateParam { index: usize, name: String },
    /// An `ndarray` array was given whose memory isn't in standard layout.
    NonContiguous { name: String },
    /// A random fill was requested with an unusable limit.
    InvalidRange(String),
    /// The persisted data doesn't describe a valid parameter tree.
    Format(String),
    Io(io::Error),
}

impl ParamErr {
    pub(crate) fn format(detail: impl Into<String>) -> Self {
        Self::Format(detail.into())
    }
}

impl Display for ParamErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch in {what}, got {got} parameters and expected {expected}"
            ),
            ParamErr::StructureMismatch { name, detail } => {
                write!(f, "structure mismatch at '{name}': {detail}")
            }
            ParamErr::UnknownParam { index, name } => {
                write!(f, "there is no parameter '{name}' registered at index {index}")
            }
            ParamErr::NotATree { index, name } => {
                write!(f, "the parameter '{name}' at index {index} is not a tree")
            }
            ParamErr::DuplicateParam { index, name } => write!(
                f,
                "a parameter is already registered with index {index} or name '{name}'"
            ),
            ParamErr::NonContiguous { name } => {
                write!(f, "the array for '{name}' is not in standard layout")
            }
            ParamErr::InvalidRange(e) => write!(f, "invalid random fill range: {e}"),
            ParamErr::Format(e) => write!(f, "invalid persisted parameters: {e}"),
            ParamErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ParamErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParamErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParamErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<UniformError> for ParamErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidRange(value.to_string())
    }
}

/// Checks that `got` is exactly `expected`.
///
/// # Arguments
/// * `what` - What is being measured, used in the error message.
/// * `got` - The available amount of parameters.
/// * `expected` - The required amount of parameters.
///
/// # Returns
/// A `SizeMismatch` error if the amounts differ in any direction.
pub(crate) fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(ParamErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_len_rejects_both_directions() {
        assert!(check_len("buffer", 3, 3).is_ok());
        assert!(matches!(
            check_len("buffer", 2, 3),
            Err(ParamErr::SizeMismatch {
                got: 2,
                expected: 3,
                ..
            })
        ));
        assert!(matches!(
            check_len("buffer", 4, 3),
            Err(ParamErr::SizeMismatch {
                got: 4,
                expected: 3,
                ..
            })
        ));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = ParamErr::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("io error"));
    }
}
