//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the companion protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short for its declared code.
    #[error("malformed frame (code 0x{code:02X}): expected at least {need} bytes, got {got}")]
    Malformed {
        /// Code byte of the offending frame.
        code: u8,
        /// Actual length received.
        got: usize,
        /// Minimum length required by the code.
        need: usize,
    },

    /// Frame exceeds the protocol maximum.
    #[error("frame too large: maximum {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// A frame must carry at least its code byte.
    #[error("empty frame")]
    EmptyFrame,

    /// Invalid data in a field (wrong size key, bad value, etc.).
    #[error("invalid frame data: {0}")]
    InvalidData(String),

    /// Firmware returned an error.
    #[error("device error: {0}")]
    Device(FirmwareError),
}

/// Error sub-codes returned by the firmware in an ERR response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// Command not supported by this firmware.
    UnsupportedCommand,
    /// Contact, channel, or item not found.
    NotFound,
    /// Table (contacts, packets, etc.) is full.
    TableFull,
    /// Bad state for this operation.
    BadState,
    /// File I/O error on the device.
    FileIoError,
    /// Illegal argument.
    IllegalArg,
    /// Sub-code this crate does not know about.
    Unknown(u8),
}

impl std::fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FirmwareError::UnsupportedCommand => write!(f, "unsupported command"),
            FirmwareError::NotFound => write!(f, "not found"),
            FirmwareError::TableFull => write!(f, "table full"),
            FirmwareError::BadState => write!(f, "bad state"),
            FirmwareError::FileIoError => write!(f, "file I/O error"),
            FirmwareError::IllegalArg => write!(f, "illegal argument"),
            FirmwareError::Unknown(code) => write!(f, "unknown error (0x{:02X})", code),
        }
    }
}

impl From<u8> for FirmwareError {
    fn from(code: u8) -> Self {
        use crate::constants::*;
        match code {
            ERR_CODE_UNSUPPORTED_CMD => FirmwareError::UnsupportedCommand,
            ERR_CODE_NOT_FOUND => FirmwareError::NotFound,
            ERR_CODE_TABLE_FULL => FirmwareError::TableFull,
            ERR_CODE_BAD_STATE => FirmwareError::BadState,
            ERR_CODE_FILE_IO_ERROR => FirmwareError::FileIoError,
            ERR_CODE_ILLEGAL_ARG => FirmwareError::IllegalArg,
            _ => FirmwareError::Unknown(code),
        }
    }
}

impl From<FirmwareError> for u8 {
    fn from(err: FirmwareError) -> Self {
        use crate::constants::*;
        match err {
            FirmwareError::UnsupportedCommand => ERR_CODE_UNSUPPORTED_CMD,
            FirmwareError::NotFound => ERR_CODE_NOT_FOUND,
            FirmwareError::TableFull => ERR_CODE_TABLE_FULL,
            FirmwareError::BadState => ERR_CODE_BAD_STATE,
            FirmwareError::FileIoError => ERR_CODE_FILE_IO_ERROR,
            FirmwareError::IllegalArg => ERR_CODE_ILLEGAL_ARG,
            FirmwareError::Unknown(code) => code,
        }
    }
}

/// Shorthand for the minimum-length check every decoder performs before
/// dereferencing payload bytes.
pub(crate) fn check_len(code: u8, frame: &[u8], need: usize) -> Result<(), ProtocolError> {
    if frame.len() < need {
        Err(ProtocolError::Malformed {
            code,
            got: frame.len(),
            need,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn firmware_error_round_trips_through_u8() {
        for code in 1..=6u8 {
            let err = FirmwareError::from(code);
            assert_eq!(u8::from(err), code);
        }
        assert_eq!(FirmwareError::from(0x7F), FirmwareError::Unknown(0x7F));
    }

    #[test]
    fn check_len_reports_code_and_sizes() {
        let frame = [RESP_CODE_CONTACT, 0, 0];
        let err = check_len(RESP_CODE_CONTACT, &frame, 148).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Malformed {
                code: RESP_CODE_CONTACT,
                got: 3,
                need: 148
            }
        );
    }
}
