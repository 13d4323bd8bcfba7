//! Error types for signature walking, input validation and generation.

use thiserror::Error;

/// The signature walker found structurally invalid input.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignatureError {
    #[error("unknown type code '{0}'")]
    UnknownCode(char),
    #[error("unexpected end of signature")]
    UnexpectedEnd,
    #[error("unexpected '{0}'")]
    Unexpected(char),
    #[error("dict entry outside of an array")]
    DictEntryOutsideArray,
    #[error("dict entry key must be a basic type")]
    DictKeyNotBasic,
    #[error("struct with no member types")]
    EmptyStruct,
    #[error("unterminated container")]
    Unterminated,
    #[error("container nesting deeper than 32 levels")]
    NestingTooDeep,
    #[error("signature longer than 255 bytes")]
    TooLong,
    #[error("trailing characters after complete type")]
    Trailing,
    #[error("empty signature")]
    Empty,
}

/// A problem with the interface description itself.
///
/// These abort generation of the whole document; the surrounding
/// [`GenError::Input`] carries the source position.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("<{element}> is missing the required attribute \"{attribute}\"")]
    MissingAttribute { element: &'static str, attribute: &'static str },
    #[error("\"{0}\" is not a valid D-Bus interface name")]
    BadInterfaceName(String),
    #[error("\"{0}\" is not a valid D-Bus member name")]
    BadMemberName(String),
    #[error("\"{0}\" is not a valid argument name")]
    BadArgumentName(String),
    #[error("\"{0}\" is not a valid symbol")]
    BadSymbol(String),
    #[error("\"{sig}\" is not a valid D-Bus type signature: {source}")]
    BadSignature { sig: String, source: SignatureError },
    #[error("\"{0}\" is not a valid access value (expected read, write or readwrite)")]
    BadAccess(String),
    #[error("\"{0}\" is not a valid direction (expected in or out)")]
    BadDirection(String),
    #[error("signal arguments may not have direction \"in\"")]
    SignalArgDirection,
    #[error("\"{0}\" is not a valid deprecated value (expected true or false)")]
    BadDeprecated(String),
    #[error("unknown annotation \"{0}\"")]
    UnknownAnnotation(String),
    #[error("annotation \"{annotation}\" cannot be applied to <{element}>")]
    AnnotationNotAllowed { annotation: String, element: &'static str },
    #[error("duplicate argument name \"{0}\"")]
    DuplicateArgumentName(String),
    #[error("symbol \"{symbol}\" is shared by \"{first}\" and \"{second}\"")]
    DuplicateSymbol { symbol: String, first: String, second: String },
    #[error("unterminated <{0}>")]
    Unterminated(&'static str),
}

/// Top-level error of a generation run.
///
/// Each input document either generates successfully or fails with one
/// root-cause diagnostic.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("{file}:{line}:{column}: {kind}")]
    Input {
        file: String,
        line: u64,
        column: u64,
        #[source]
        kind: ValidationError,
    },
    #[error("{file}: {source}")]
    Xml {
        file: String,
        #[source]
        source: xml::reader::Error,
    },
    #[error("{file}: signature no longer walkable during generation: {source}")]
    Signature {
        file: String,
        #[source]
        source: SignatureError,
    },
}

impl GenError {
    /// The validation failure inside this error, if it is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            GenError::Input { kind, .. } => Some(kind),
            GenError::Xml { .. } => None,
            GenError::Signature { .. } => None,
        }
    }
}
