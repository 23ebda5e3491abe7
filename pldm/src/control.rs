// Licensed under the Apache-2.0 license

//! PLDM Control & Discovery responder.
//!
//! Stateless apart from a fixed table of `(type, versions, commands)`
//! registrations populated at startup. The wire codecs themselves live
//! in [`crate::message::control`]; this module supplies the table and
//! the business logic a driver loop calls once a request has been
//! decoded.

use alloc::vec::Vec;

use crate::error::PldmError;
use crate::message::control::{
    GetPldmCommandsResponse, GetPldmTypeResponse, GetPldmVersionResponse, GetTidResponse,
    PLDM_CMDS_BITMAP_LEN, PLDM_TYPES_BITMAP_LEN,
};
use crate::protocol::base::{InstanceId, PldmBaseCompletionCode, TransferRespFlag};
use crate::protocol::version::ProtocolVersionStr;

/// TID value returned by GetTID before a UA has assigned one via
/// SetTID.
pub const TID_UNASSIGNED: u8 = 0;

pub struct TypeRegistration {
    pub pldm_type: u8,
    pub versions: Vec<ProtocolVersionStr>,
    pub commands: Vec<u8>,
}

/// Fixed table of supported PLDM types, built once at startup.
#[derive(Default)]
pub struct ControlResponder {
    registrations: Vec<TypeRegistration>,
    tid: u8,
}

impl ControlResponder {
    pub fn new() -> Self {
        ControlResponder {
            registrations: Vec::new(),
            tid: TID_UNASSIGNED,
        }
    }

    /// Registers a PLDM type. A type may be registered at most once.
    pub fn register(&mut self, registration: TypeRegistration) -> Result<(), PldmError> {
        if self
            .registrations
            .iter()
            .any(|r| r.pldm_type == registration.pldm_type)
        {
            return Err(PldmError::AlreadyExists);
        }
        self.registrations.push(registration);
        Ok(())
    }

    fn find(&self, pldm_type: u8) -> Option<&TypeRegistration> {
        self.registrations.iter().find(|r| r.pldm_type == pldm_type)
    }

    pub fn get_tid(&self, instance_id: InstanceId) -> GetTidResponse {
        GetTidResponse::new(instance_id, self.tid, PldmBaseCompletionCode::Success as u8)
    }

    pub fn set_tid(&mut self, tid: u8) {
        self.tid = tid;
    }

    pub fn get_pldm_types(&self, instance_id: InstanceId) -> GetPldmTypeResponse {
        let types: Vec<u8> = self.registrations.iter().map(|r| r.pldm_type).collect();
        GetPldmTypeResponse::new(instance_id, PldmBaseCompletionCode::Success as u8, &types)
    }

    pub fn get_pldm_commands(
        &self,
        instance_id: InstanceId,
        pldm_type: u8,
    ) -> Result<GetPldmCommandsResponse, PldmError> {
        let registration = self.find(pldm_type).ok_or(PldmError::UnsupportedPldmType)?;
        Ok(GetPldmCommandsResponse::new(
            instance_id,
            PldmBaseCompletionCode::Success as u8,
            &registration.commands,
        ))
    }

    /// `transfer_op_flag` must request `GET_FIRSTPART`; this responder
    /// only supports single-transfer version replies.
    pub fn get_pldm_version(
        &self,
        instance_id: InstanceId,
        pldm_type: u8,
        transfer_op_flag: u8,
    ) -> Result<GetPldmVersionResponse, PldmError> {
        use crate::protocol::base::TransferOperationFlag;
        if TransferOperationFlag::try_from(transfer_op_flag)? != TransferOperationFlag::GetFirstPart {
            return Err(PldmError::InvalidTransferOpFlag);
        }
        let registration = self.find(pldm_type).ok_or(PldmError::UnsupportedPldmType)?;
        let version = registration
            .versions
            .first()
            .copied()
            .ok_or(PldmError::UnsupportedPldmType)?;
        GetPldmVersionResponse::new(
            instance_id,
            PldmBaseCompletionCode::Success as u8,
            0,
            TransferRespFlag::StartAndEnd,
            version,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::base::PldmSupportedType;

    fn responder_with_base_and_fwup() -> ControlResponder {
        let mut r = ControlResponder::new();
        r.register(TypeRegistration {
            pldm_type: PldmSupportedType::Base as u8,
            versions: Vec::from(["1.0.0"]),
            commands: Vec::from([1u8, 2, 3]),
        })
        .unwrap();
        r.register(TypeRegistration {
            pldm_type: PldmSupportedType::FwUpdate as u8,
            versions: Vec::from(["1.0.0"]),
            commands: Vec::from([1u8, 2]),
        })
        .unwrap();
        r
    }

    #[test]
    fn get_tid_returns_unassigned_before_set() {
        let r = responder_with_base_and_fwup();
        let resp = r.get_tid(1);
        assert_eq!(resp.tid, TID_UNASSIGNED);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut r = responder_with_base_and_fwup();
        let result = r.register(TypeRegistration {
            pldm_type: PldmSupportedType::Base as u8,
            versions: Vec::from(["1.0.0"]),
            commands: Vec::new(),
        });
        assert_eq!(result, Err(PldmError::AlreadyExists));
    }

    #[test]
    fn get_pldm_types_bitmap_has_base_and_fwup_bits() {
        let r = responder_with_base_and_fwup();
        let resp = r.get_pldm_types(1);
        // PLDM_BASE=0x00 -> bit 0 of byte 0; PLDM_FWUP=0x05 -> bit 5 of byte 0.
        assert_eq!(resp.pldm_types[0], 0b0010_0001);
        for byte in &resp.pldm_types[1..] {
            assert_eq!(*byte, 0);
        }
    }

    #[test]
    fn get_pldm_version_rejects_non_firstpart() {
        let r = responder_with_base_and_fwup();
        let result = r.get_pldm_version(1, PldmSupportedType::Base as u8, 0 /* GetNextPart */);
        assert_eq!(result, Err(PldmError::InvalidTransferOpFlag));
    }

    #[test]
    fn get_pldm_commands_unknown_type_rejected() {
        let r = responder_with_base_and_fwup();
        let result = r.get_pldm_commands(1, 0x3f);
        assert_eq!(result, Err(PldmError::UnsupportedPldmType));
    }
}
