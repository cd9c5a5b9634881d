//! ETP error codes and the fault type raised by protocol handlers.
//!
//! Every failure that must travel back to the counterpart is expressed as a
//! [`ProtocolFault`], which the session turns into a `ProtocolException`
//! message correlated to the offending request.

use std::fmt;

use thiserror::Error;

use crate::messages::core::ProtocolException;

/// Numeric error codes carried in `ProtocolException` bodies.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoRole = 1,
    NoSupportedProtocols = 2,
    InvalidMessageType = 3,
    UnsupportedProtocol = 4,
    InvalidArgument = 5,
    PermissionDenied = 6,
    NotSupported = 7,
    InvalidState = 8,
    InvalidUri = 9,
    ExpiredToken = 10,
    NotFound = 11,
    LimitExceeded = 12,
    CompressionNotSupported = 13,
    InvalidObject = 14,
    MaxTransactionsExceeded = 15,
    DataObjectTypeNotSupported = 16,
    MaxSizeExceeded = 17,
    MultipartCancelled = 18,
    InvalidMessage = 19,
    InvalidIndexKind = 20,
    NoSupportedFormats = 21,
    RequestUuidRejected = 22,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let value = match code {
            1 => ErrorCode::NoRole,
            2 => ErrorCode::NoSupportedProtocols,
            3 => ErrorCode::InvalidMessageType,
            4 => ErrorCode::UnsupportedProtocol,
            5 => ErrorCode::InvalidArgument,
            6 => ErrorCode::PermissionDenied,
            7 => ErrorCode::NotSupported,
            8 => ErrorCode::InvalidState,
            9 => ErrorCode::InvalidUri,
            10 => ErrorCode::ExpiredToken,
            11 => ErrorCode::NotFound,
            12 => ErrorCode::LimitExceeded,
            13 => ErrorCode::CompressionNotSupported,
            14 => ErrorCode::InvalidObject,
            15 => ErrorCode::MaxTransactionsExceeded,
            16 => ErrorCode::DataObjectTypeNotSupported,
            17 => ErrorCode::MaxSizeExceeded,
            18 => ErrorCode::MultipartCancelled,
            19 => ErrorCode::InvalidMessage,
            20 => ErrorCode::InvalidIndexKind,
            21 => ErrorCode::NoSupportedFormats,
            22 => ErrorCode::RequestUuidRejected,
            _ => return None,
        };
        Some(value)
    }

    /// Symbolic name used in logs and exception messages.
    pub const fn name(self) -> &'static str {
        match self {
            ErrorCode::NoRole => "ENOROLE",
            ErrorCode::NoSupportedProtocols => "ENOSUPPORTEDPROTOCOLS",
            ErrorCode::InvalidMessageType => "EINVALID_MESSAGETYPE",
            ErrorCode::UnsupportedProtocol => "EUNSUPPORTED_PROTOCOL",
            ErrorCode::InvalidArgument => "EINVALID_ARGUMENT",
            ErrorCode::PermissionDenied => "EPERMISSION_DENIED",
            ErrorCode::NotSupported => "ENOTSUPPORTED",
            ErrorCode::InvalidState => "EINVALID_STATE",
            ErrorCode::InvalidUri => "EINVALID_URI",
            ErrorCode::ExpiredToken => "EEXPIRED_TOKEN",
            ErrorCode::NotFound => "ENOT_FOUND",
            ErrorCode::LimitExceeded => "ELIMIT_EXCEEDED",
            ErrorCode::CompressionNotSupported => "ECOMPRESSION_NOTSUPPORTED",
            ErrorCode::InvalidObject => "EINVALID_OBJECT",
            ErrorCode::MaxTransactionsExceeded => "EMAX_TRANSACTIONS_EXCEEDED",
            ErrorCode::DataObjectTypeNotSupported => "EDATAOBJECTTYPE_NOTSUPPORTED",
            ErrorCode::MaxSizeExceeded => "EMAXSIZE_EXCEEDED",
            ErrorCode::MultipartCancelled => "EMULTIPART_CANCELLED",
            ErrorCode::InvalidMessage => "EINVALID_MESSAGE",
            ErrorCode::InvalidIndexKind => "EINVALID_INDEXKIND",
            ErrorCode::NoSupportedFormats => "ENOSUPPORTEDFORMATS",
            ErrorCode::RequestUuidRejected => "EREQUESTUUID_REJECTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A failure to be reported to the counterpart as a `ProtocolException`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProtocolFault {
    pub code: ErrorCode,
    pub message: String,
}

impl ProtocolFault {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn to_exception(&self) -> ProtocolException {
        ProtocolException {
            error_code: self.code.code(),
            error_message: self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_numbers() {
        for code in 1..=22 {
            let parsed = ErrorCode::from_code(code).unwrap();
            assert_eq!(parsed.code(), code);
        }
        assert!(ErrorCode::from_code(0).is_none());
        assert!(ErrorCode::from_code(23).is_none());
    }

    #[test]
    fn fault_becomes_exception() {
        let fault = ProtocolFault::not_found("eml:///well(1)");
        let exception = fault.to_exception();
        assert_eq!(exception.error_code, 11);
        assert_eq!(exception.error_message, "eml:///well(1)");
        assert_eq!(fault.to_string(), "ENOT_FOUND (11): eml:///well(1)");
    }
}
