// Licensed under the Apache-2.0 license

use crate::msgbuf::MsgBufError;

#[derive(Debug, Clone, PartialEq)]
pub enum PldmError {
    InvalidData,
    InvalidLength,
    InvalidMsgType,
    InvalidProtocolVersion,
    UnsupportedCmd,
    UnsupportedPldmType,
    InvalidCompletionCode,
    InvalidTransferOpFlag,
    InvalidTransferRespFlag,

    InvalidVersionStringType,
    InvalidVersionStringLength,
    InvalidFdState,
    InvalidDescriptorType,
    InvalidDescriptorLength,
    InvalidDescriptorCount,
    InvalidComponentClassification,
    InvalidComponentResponseCode,
    InvalidComponentCompatibilityResponse,
    InvalidComponentCompatibilityResponseCode,
    InvalidTransferResult,
    InvalidVerifyResult,
    InvalidApplyResult,
    InvalidGetStatusReasonCode,
    InvalidAuxStateStatus,

    /// Not ready to handle the request right now (transient).
    NotReady,
    /// Argument shape is invalid independent of buffer length.
    InvalidArgument,
    /// A requested record/sensor/effecter/handle was not found.
    NotFound,
    /// `record_handle` already present in the repository.
    AlreadyExists,
    /// A PDR body was too short to contain its declared embedded field.
    MalformedPdr,
    /// A response arrived that does not correlate to the outstanding
    /// outbound request (wrong source, instance ID, or command).
    Unsolicited,
    /// The responder already has an update in progress.
    AlreadyInUpdateMode,
}

impl From<MsgBufError> for PldmError {
    fn from(e: MsgBufError) -> Self {
        match e {
            MsgBufError::InvalidArgument => PldmError::InvalidArgument,
            MsgBufError::Overflow => PldmError::InvalidLength,
        }
    }
}

impl core::fmt::Display for PldmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PldmError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    InvalidMctpPayloadLength,
    InvalidMctpMsgType,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

/// Maps an internal error to the completion code carried in a reply,
/// per the §4.2 mapping table. Errors with no direct mapping fall back
/// to the generic `ERROR` completion code.
pub fn completion_code_for(err: &PldmError) -> u8 {
    use crate::protocol::base::PldmBaseCompletionCode;
    match err {
        PldmError::InvalidData | PldmError::MalformedPdr => {
            PldmBaseCompletionCode::InvalidData as u8
        }
        PldmError::InvalidLength => PldmBaseCompletionCode::InvalidLength as u8,
        PldmError::NotReady => PldmBaseCompletionCode::NotReady as u8,
        PldmError::UnsupportedCmd => PldmBaseCompletionCode::UnsupportedPldmCmd as u8,
        PldmError::UnsupportedPldmType => PldmBaseCompletionCode::InvalidPldmType as u8,
        _ => PldmBaseCompletionCode::Error as u8,
    }
}
