// Licensed under the Apache-2.0 license

//! Firmware Device (FD) responder state machine for PLDM Firmware Update.
//!
//! [`FdResponder`] drives the seven-state machine (Idle, LearnComponents,
//! ReadyXfer, Download, Verify, Apply, Activate) from §10.2 of the DMTF
//! PLDM Firmware Update spec. It is synchronous: handling a request or
//! calling [`FdResponder::progress`] never blocks or awaits, matching the
//! no-suspension-point requirement of an interrupt/poll-driven responder.
//! Only one outbound FD-initiated request (RequestFirmwareData,
//! TransferComplete, VerifyComplete, ApplyComplete) is ever outstanding at
//! a time.

use core::cmp::min;

use crate::error::PldmError;
use crate::message::firmware_update::activate_fw::{
    ActivateFirmwareRequest, ActivateFirmwareResponse,
};
use crate::message::firmware_update::apply_complete::{ApplyCompleteRequest, ApplyResult};
use crate::message::firmware_update::get_fw_params::{
    FirmwareParameters, GetFirmwareParametersRequest, GetFirmwareParametersResponse,
};
use crate::message::firmware_update::get_status::{
    AuxState, AuxStateStatus, GetStatusReasonCode, GetStatusRequest, GetStatusResponse,
    ProgressPercent, UpdateOptionResp, PROGRESS_PERCENT_NOT_SUPPORTED,
};
use crate::message::firmware_update::pass_component::{
    PassComponentTableRequest, PassComponentTableResponse,
};
use crate::message::firmware_update::query_devid::{
    QueryDeviceIdentifiersRequest, QueryDeviceIdentifiersResponse,
};
use crate::message::firmware_update::request_cancel::{
    CancelUpdateComponentRequest, CancelUpdateComponentResponse, CancelUpdateRequest,
    CancelUpdateResponse, NonFunctioningComponentBitmap, NonFunctioningComponentIndication,
};
use crate::message::firmware_update::request_fw_data::RequestFirmwareDataRequest;
use crate::message::firmware_update::request_update::{
    RequestUpdateRequest, RequestUpdateResponse,
};
use crate::message::firmware_update::transfer_complete::{
    TransferCompleteRequest, TransferResult,
};
use crate::message::firmware_update::update_component::{
    UpdateComponentRequest, UpdateComponentResponse,
};
use crate::message::firmware_update::verify_complete::{VerifyCompleteRequest, VerifyResult};
use crate::protocol::base::{InstanceId, PldmBaseCompletionCode, PldmMsgType, TransferRespFlag};
use crate::protocol::firmware_update::{
    ComponentCompatibilityResponse, ComponentCompatibilityResponseCode, ComponentResponse,
    ComponentResponseCode, Descriptor, FirmwareDeviceState, FwUpdateCmd, FwUpdateCompletionCode,
    UpdateOptionFlags, PLDM_FWUP_BASELINE_TRANSFER_SIZE,
};
use crate::util::fw_component::FirmwareComponent;

/// Instance IDs are 5 bits; a single outstanding FD-initiated request
/// cycles through the full range.
const INSTANCE_ID_COUNT: u8 = 32;

pub const DEFAULT_FD_T1_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_FD_T2_RETRY_MS: u64 = 1_000;

/// Result of polling a long-running verify/apply callback.
pub enum PhaseOutcome<T> {
    Pending,
    Complete(T),
}

/// Platform hooks an [`FdResponder`] calls out to. Implementors own the
/// actual image storage, flashing, and activation; the responder only
/// tracks protocol state.
pub trait FdPlatform {
    fn device_identifiers(&self) -> &[Descriptor];
    fn firmware_parameters(&self) -> &FirmwareParameters;

    /// Clamp the UA-proposed transfer size to whatever this device can
    /// sustain. The responder enforces the `PLDM_FWUP_BASELINE_TRANSFER_SIZE`
    /// floor regardless of what this returns.
    fn negotiate_transfer_size(&mut self, ua_max_transfer_size: u32) -> u32 {
        ua_max_transfer_size
    }

    /// Deliver one chunk of firmware image data at `offset`.
    fn firmware_data(&mut self, offset: u32, data: &[u8], comp: &FirmwareComponent)
        -> TransferResult;

    /// Poll image verification. May return `Pending` repeatedly before
    /// `Complete`.
    fn verify(&mut self, comp: &FirmwareComponent) -> PhaseOutcome<VerifyResult>;

    /// Poll image application. May return `Pending` repeatedly before
    /// `Complete`.
    fn apply(&mut self, comp: &FirmwareComponent) -> PhaseOutcome<ApplyResult>;

    /// Activate the applied image. Returns an estimated activation time
    /// in seconds, or `0` if activation completes immediately.
    fn activate(&mut self, self_contained: bool) -> Result<u16, FwUpdateCompletionCode>;

    /// Called when an in-progress component update is abandoned (cancel
    /// or T1 timeout) so the platform can release any resources.
    fn cancel_update_component(&mut self, comp: &FirmwareComponent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqState {
    Unused,
    Ready,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct FdReq {
    state: ReqState,
    complete: bool,
    result: u8,
    instance_id: InstanceId,
    /// Command of the currently outstanding (or most recently sent)
    /// outbound request; only meaningful once `state != Unused`.
    command: FwUpdateCmd,
    sent_time_ms: u64,
}

impl FdReq {
    fn new() -> Self {
        FdReq {
            state: ReqState::Unused,
            complete: false,
            result: 0,
            instance_id: 0,
            command: FwUpdateCmd::RequestFirmwareData,
            sent_time_ms: 0,
        }
    }

    fn next_instance_id(&mut self) -> InstanceId {
        self.instance_id = (self.instance_id + 1) % INSTANCE_ID_COUNT;
        self.instance_id
    }

    /// Mirrors libpldm's `pldm_fd_req_should_send`: ready to send
    /// immediately, or sent long enough ago that T2 has elapsed.
    fn should_send(&self, now_ms: u64, t2_retry_ms: u64) -> bool {
        match self.state {
            ReqState::Unused => false,
            ReqState::Ready => true,
            ReqState::Failed => false,
            ReqState::Sent => now_ms.saturating_sub(self.sent_time_ms) >= t2_retry_ms,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DownloadProgress {
    offset: u32,
}

/// A message the responder wants sent to the UA, produced by
/// [`FdResponder::progress`].
pub enum FdOutbound {
    RequestFirmwareData(RequestFirmwareDataRequest),
    TransferComplete(TransferCompleteRequest),
    VerifyComplete(VerifyCompleteRequest),
    ApplyComplete(ApplyCompleteRequest),
}

/// Firmware Device responder. `P` supplies the platform-specific parts of
/// image transfer, verification, and activation. `A` is an opaque
/// transport address the driver loop uses to route the responder's
/// outbound requests and to recognize which peer a reply came from; the
/// responder only ever remembers the single UA that sent RequestUpdate.
pub struct FdResponder<P: FdPlatform, A: Copy + PartialEq> {
    platform: P,
    state: FirmwareDeviceState,
    prev_state: FirmwareDeviceState,
    reason: GetStatusReasonCode,
    update_flags: UpdateOptionFlags,
    max_transfer_size: u32,
    ua_address: Option<A>,
    update_comp: Option<FirmwareComponent>,
    download: DownloadProgress,
    req: FdReq,
    t1_timeout_ms: u64,
    t2_retry_ms: u64,
    last_ua_activity_ms: u64,
}

impl<P: FdPlatform, A: Copy + PartialEq> FdResponder<P, A> {
    pub fn new(platform: P) -> Self {
        FdResponder {
            platform,
            state: FirmwareDeviceState::Idle,
            prev_state: FirmwareDeviceState::Idle,
            reason: GetStatusReasonCode::Initialization,
            update_flags: UpdateOptionFlags(0),
            max_transfer_size: PLDM_FWUP_BASELINE_TRANSFER_SIZE as u32,
            ua_address: None,
            update_comp: None,
            download: DownloadProgress { offset: 0 },
            req: FdReq::new(),
            t1_timeout_ms: DEFAULT_FD_T1_TIMEOUT_MS,
            t2_retry_ms: DEFAULT_FD_T2_RETRY_MS,
            last_ua_activity_ms: 0,
        }
    }

    pub fn with_timeouts(platform: P, t1_timeout_ms: u64, t2_retry_ms: u64) -> Self {
        let mut fd = Self::new(platform);
        fd.t1_timeout_ms = t1_timeout_ms;
        fd.t2_retry_ms = t2_retry_ms;
        fd
    }

    pub fn state(&self) -> FirmwareDeviceState {
        self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn set_state(&mut self, state: FirmwareDeviceState) {
        self.prev_state = self.state;
        self.state = state;
    }

    /// Abandons whatever update is in progress and returns to Idle,
    /// recording `reason` for a later GetStatus.
    fn set_idle(&mut self, reason: GetStatusReasonCode) {
        self.set_state(FirmwareDeviceState::Idle);
        self.reason = reason;
        self.update_comp = None;
        self.req = FdReq::new();
        self.ua_address = None;
    }

    fn is_update_mode(&self) -> bool {
        self.state != FirmwareDeviceState::Idle
    }

    /// Forwards cancellation to the platform unless the component has
    /// already finished applying (mirrors libpldm's race-avoidance for a
    /// cancel received while an ApplyComplete reply is outstanding).
    fn maybe_cancel_component(&mut self) {
        let cancel = match self.state {
            FirmwareDeviceState::Download | FirmwareDeviceState::Verify => true,
            FirmwareDeviceState::Apply => {
                !(self.req.complete && self.req.result == ApplyResult::ApplySuccess as u8)
            }
            _ => false,
        };
        if cancel {
            if let Some(comp) = self.update_comp.clone() {
                self.platform.cancel_update_component(&comp);
            }
        }
    }

    /// §4.7 reply correlation: accepted iff the reply came from the
    /// remembered UA address and carries the outstanding request's
    /// instance ID and command; anything else is a stray or stale
    /// reply and is ignored.
    fn check_reply(
        &self,
        from: A,
        instance_id: InstanceId,
        expected_cmd: FwUpdateCmd,
    ) -> Result<(), PldmError> {
        if self.ua_address != Some(from) {
            return Err(PldmError::Unsolicited);
        }
        if self.req.instance_id != instance_id || self.req.command != expected_cmd {
            return Err(PldmError::Unsolicited);
        }
        Ok(())
    }

    fn fwdata_size(&self) -> u32 {
        let comp = match &self.update_comp {
            Some(c) => c,
            None => return 0,
        };
        let image_size = comp.comp_image_size.unwrap_or(0);
        if self.download.offset >= image_size {
            return 0;
        }
        min(image_size - self.download.offset, self.max_transfer_size)
    }

    // ---- request handlers -------------------------------------------

    pub fn handle_request_update(
        &mut self,
        now_ms: u64,
        from: A,
        req: &RequestUpdateRequest,
    ) -> Result<RequestUpdateResponse, FwUpdateCompletionCode> {
        if self.is_update_mode() {
            return Err(FwUpdateCompletionCode::AlreadyInUpdateMode);
        }
        if req.fixed.max_transfer_size < PLDM_FWUP_BASELINE_TRANSFER_SIZE as u32 {
            return Err(FwUpdateCompletionCode::InvalidTransferLength);
        }

        let negotiated = self
            .platform
            .negotiate_transfer_size(req.fixed.max_transfer_size);
        self.max_transfer_size = min(negotiated, req.fixed.max_transfer_size)
            .max(PLDM_FWUP_BASELINE_TRANSFER_SIZE as u32);

        self.ua_address = Some(from);
        self.last_ua_activity_ms = now_ms;
        self.set_state(FirmwareDeviceState::LearnComponents);

        Ok(RequestUpdateResponse::new(
            req.fixed.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            0,
            0,
            None,
        ))
    }

    pub fn handle_pass_component_table(
        &mut self,
        now_ms: u64,
        req: &PassComponentTableRequest,
    ) -> Result<PassComponentTableResponse, FwUpdateCompletionCode> {
        if self.state != FirmwareDeviceState::LearnComponents {
            return Err(FwUpdateCompletionCode::InvalidStateForCommand);
        }
        self.last_ua_activity_ms = now_ms;

        let transfer_flag = TransferRespFlag::try_from(req.fixed.transfer_flag)
            .map_err(|_| FwUpdateCompletionCode::InvalidTransferLength)?;

        let comp = FirmwareComponent::new(
            req.fixed.comp_classification,
            req.fixed.comp_identifier,
            req.fixed.comp_classification_index,
            req.fixed.comp_comparison_stamp,
            req.get_comp_ver_str(),
            None,
            None,
        );
        let resp_code = comp.evaluate_update_eligibility(self.platform.firmware_parameters());
        let comp_resp = if matches!(resp_code, ComponentResponseCode::CompCanBeUpdated) {
            ComponentResponse::CompCanBeUpdated
        } else {
            ComponentResponse::CompCannotBeUpdated
        };

        if matches!(transfer_flag, TransferRespFlag::End | TransferRespFlag::StartAndEnd) {
            self.set_state(FirmwareDeviceState::ReadyXfer);
        }

        Ok(PassComponentTableResponse::new(
            req.fixed.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            comp_resp,
            resp_code,
        ))
    }

    pub fn handle_update_component(
        &mut self,
        now_ms: u64,
        req: &UpdateComponentRequest,
    ) -> Result<UpdateComponentResponse, FwUpdateCompletionCode> {
        if self.state != FirmwareDeviceState::ReadyXfer {
            return Err(FwUpdateCompletionCode::InvalidStateForCommand);
        }
        self.last_ua_activity_ms = now_ms;

        let update_option_flags = UpdateOptionFlags(req.fixed.update_option_flags);
        let comp = FirmwareComponent::new(
            req.fixed.comp_classification,
            req.fixed.comp_identifier,
            req.fixed.comp_classification_index,
            req.fixed.comp_comparison_stamp,
            req.get_comp_ver_str(),
            Some(req.fixed.comp_image_size),
            Some(update_option_flags),
        );
        let resp_code = comp.evaluate_update_eligibility(self.platform.firmware_parameters());

        let (compat_resp, compat_code) = if matches!(resp_code, ComponentResponseCode::CompCanBeUpdated) {
            (
                ComponentCompatibilityResponse::CompCanBeUpdated,
                ComponentCompatibilityResponseCode::NoResponseCode,
            )
        } else {
            (
                ComponentCompatibilityResponse::CompCannotBeUpdated,
                component_response_to_compatibility_code(resp_code),
            )
        };

        if matches!(compat_resp, ComponentCompatibilityResponse::CompCanBeUpdated) {
            self.update_flags = update_option_flags;
            self.update_comp = Some(comp);
            self.download = DownloadProgress { offset: 0 };
            self.req = FdReq::new();
            self.req.state = ReqState::Ready;
            self.set_state(FirmwareDeviceState::Download);
        }

        Ok(UpdateComponentResponse::new(
            req.fixed.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            compat_resp,
            compat_code,
            self.update_flags,
            0,
            None,
        ))
    }

    /// Processes the UA's reply to an outstanding RequestFirmwareData.
    /// There is no response to send; the next outbound message (if any)
    /// comes from the next [`FdResponder::progress`] call.
    pub fn handle_request_firmware_data_reply(
        &mut self,
        now_ms: u64,
        from: A,
        instance_id: InstanceId,
        completion_code: u8,
        data: &[u8],
    ) -> Result<(), PldmError> {
        if self.state != FirmwareDeviceState::Download || self.req.state != ReqState::Sent {
            return Err(PldmError::Unsolicited);
        }
        self.check_reply(from, instance_id, FwUpdateCmd::RequestFirmwareData)?;
        if self.req.complete {
            return Err(PldmError::Unsolicited);
        }
        self.last_ua_activity_ms = now_ms;

        if completion_code == FwUpdateCompletionCode::RetryRequestFwData as u8 {
            // Leave state untouched; the retry timer will resend.
            return Ok(());
        }
        if completion_code != PldmBaseCompletionCode::Success as u8 {
            self.req.state = ReqState::Ready;
            self.req.complete = true;
            self.req.result = TransferResult::FdAbortedTransfer as u8;
            return Ok(());
        }

        let comp = self.update_comp.clone().ok_or(PldmError::Unsolicited)?;
        let result = self.platform.firmware_data(self.download.offset, data, &comp);
        self.req.state = ReqState::Ready;
        if result == TransferResult::TransferSuccess {
            self.download.offset += data.len() as u32;
            if self.download.offset >= comp.comp_image_size.unwrap_or(0) {
                self.req.complete = true;
                self.req.result = TransferResult::TransferSuccess as u8;
            }
        } else {
            self.req.complete = true;
            self.req.result = result as u8;
        }
        Ok(())
    }

    pub fn handle_transfer_complete_reply(
        &mut self,
        now_ms: u64,
        from: A,
        instance_id: InstanceId,
    ) -> Result<(), PldmError> {
        if self.state != FirmwareDeviceState::Download || self.req.state != ReqState::Sent {
            return Err(PldmError::Unsolicited);
        }
        self.check_reply(from, instance_id, FwUpdateCmd::TransferComplete)?;
        if !self.req.complete {
            return Err(PldmError::Unsolicited);
        }
        self.last_ua_activity_ms = now_ms;

        if self.req.result == TransferResult::TransferSuccess as u8 {
            self.req = FdReq::new();
            self.req.state = ReqState::Ready;
            self.set_state(FirmwareDeviceState::Verify);
        } else {
            self.req.state = ReqState::Failed;
        }
        Ok(())
    }

    pub fn handle_verify_complete_reply(
        &mut self,
        now_ms: u64,
        from: A,
        instance_id: InstanceId,
    ) -> Result<(), PldmError> {
        if self.state != FirmwareDeviceState::Verify || self.req.state != ReqState::Sent {
            return Err(PldmError::Unsolicited);
        }
        self.check_reply(from, instance_id, FwUpdateCmd::VerifyComplete)?;
        if !self.req.complete {
            return Err(PldmError::Unsolicited);
        }
        self.last_ua_activity_ms = now_ms;

        if self.req.result == VerifyResult::VerifySuccess as u8 {
            self.req = FdReq::new();
            self.req.state = ReqState::Ready;
            self.set_state(FirmwareDeviceState::Apply);
        } else {
            self.req.state = ReqState::Failed;
        }
        Ok(())
    }

    pub fn handle_apply_complete_reply(
        &mut self,
        now_ms: u64,
        from: A,
        instance_id: InstanceId,
    ) -> Result<(), PldmError> {
        if self.state != FirmwareDeviceState::Apply || self.req.state != ReqState::Sent {
            return Err(PldmError::Unsolicited);
        }
        self.check_reply(from, instance_id, FwUpdateCmd::ApplyComplete)?;
        if !self.req.complete {
            return Err(PldmError::Unsolicited);
        }
        self.last_ua_activity_ms = now_ms;

        if self.req.result == ApplyResult::ApplySuccess as u8 {
            self.req = FdReq::new();
            self.set_state(FirmwareDeviceState::ReadyXfer);
        } else {
            self.req.state = ReqState::Failed;
        }
        Ok(())
    }

    pub fn handle_cancel_update_component(
        &mut self,
        now_ms: u64,
        req: &CancelUpdateComponentRequest,
    ) -> Result<CancelUpdateComponentResponse, FwUpdateCompletionCode> {
        if !matches!(
            self.state,
            FirmwareDeviceState::Download | FirmwareDeviceState::Verify | FirmwareDeviceState::Apply
        ) {
            return Err(FwUpdateCompletionCode::NotInUpdateMode);
        }
        self.last_ua_activity_ms = now_ms;
        self.maybe_cancel_component();
        self.update_comp = None;
        self.req = FdReq::new();
        self.req.state = ReqState::Ready;
        self.set_state(FirmwareDeviceState::ReadyXfer);
        Ok(CancelUpdateComponentResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
        ))
    }

    pub fn handle_cancel_update(
        &mut self,
        now_ms: u64,
        req: &CancelUpdateRequest,
    ) -> Result<CancelUpdateResponse, FwUpdateCompletionCode> {
        if self.state == FirmwareDeviceState::Idle {
            return Err(FwUpdateCompletionCode::NotInUpdateMode);
        }
        self.last_ua_activity_ms = now_ms;
        self.maybe_cancel_component();
        self.set_idle(GetStatusReasonCode::CancelUpdate);
        Ok(CancelUpdateResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            NonFunctioningComponentIndication::ComponentsFunctioning,
            NonFunctioningComponentBitmap::new(0),
        ))
    }

    pub fn handle_activate_firmware(
        &mut self,
        now_ms: u64,
        req: &ActivateFirmwareRequest,
    ) -> Result<ActivateFirmwareResponse, FwUpdateCompletionCode> {
        if self.state != FirmwareDeviceState::ReadyXfer {
            return Err(FwUpdateCompletionCode::InvalidStateForCommand);
        }
        self.last_ua_activity_ms = now_ms;

        let self_contained = req.self_contained_activation_req != 0;
        let estimated_time = self
            .platform
            .activate(self_contained)
            .map_err(|_| FwUpdateCompletionCode::ActivationNotRequired)?;

        self.set_state(FirmwareDeviceState::Activate);
        self.set_idle(GetStatusReasonCode::ActivateFw);

        Ok(ActivateFirmwareResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            estimated_time,
        ))
    }

    pub fn handle_get_status(&self, req: &GetStatusRequest) -> GetStatusResponse {
        let (progress_percent, update_option_flags_enabled) = match self.state {
            FirmwareDeviceState::Download => {
                let percent = self
                    .update_comp
                    .as_ref()
                    .and_then(|c| c.comp_image_size)
                    .filter(|size| *size > 0)
                    .map(|size| {
                        let one_percent = size.div_ceil(100).max(1);
                        (self.download.offset / one_percent).min(100) as u8
                    })
                    .unwrap_or(PROGRESS_PERCENT_NOT_SUPPORTED);
                (percent, self.update_flags.0)
            }
            FirmwareDeviceState::Verify | FirmwareDeviceState::Apply => {
                (PROGRESS_PERCENT_NOT_SUPPORTED, self.update_flags.0)
            }
            _ => (PROGRESS_PERCENT_NOT_SUPPORTED, 0),
        };
        let reason = if self.state == FirmwareDeviceState::Idle {
            self.reason
        } else {
            GetStatusReasonCode::Initialization
        };
        let aux_state = match self.req.state {
            ReqState::Sent if !self.req.complete => AuxState::OperationInProgress,
            ReqState::Failed => AuxState::OperationFailed,
            _ if matches!(
                self.state,
                FirmwareDeviceState::Idle
                    | FirmwareDeviceState::LearnComponents
                    | FirmwareDeviceState::ReadyXfer
            ) =>
            {
                AuxState::IdleLearnComponentsReadXfer
            }
            _ => AuxState::OperationSuccessful,
        };
        GetStatusResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            self.state,
            self.prev_state,
            aux_state,
            AuxStateStatus::AuxStateInProgressOrSuccess as u8,
            ProgressPercent::new(progress_percent).unwrap_or(ProgressPercent::new(0).unwrap()),
            reason,
            if self.update_flags.request_force_update() {
                UpdateOptionResp::ForceUpdate
            } else {
                UpdateOptionResp::NoForceUpdate
            },
        )
    }

    pub fn handle_query_device_identifiers(
        &self,
        req: &QueryDeviceIdentifiersRequest,
    ) -> Result<QueryDeviceIdentifiersResponse, PldmError> {
        let descriptors = self.platform.device_identifiers();
        let (initial, additional) = descriptors
            .split_first()
            .ok_or(PldmError::InvalidDescriptorCount)?;
        QueryDeviceIdentifiersResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            initial,
            Some(additional),
        )
    }

    pub fn handle_get_firmware_parameters(
        &self,
        req: &GetFirmwareParametersRequest,
    ) -> GetFirmwareParametersResponse {
        GetFirmwareParametersResponse::new(
            req.hdr.instance_id(),
            PldmBaseCompletionCode::Success as u8,
            self.platform.firmware_parameters(),
        )
    }

    // ---- FD-driven progress -------------------------------------------

    /// Drives outbound requests (RequestFirmwareData / TransferComplete /
    /// VerifyComplete / ApplyComplete) and the T1 update-mode timeout.
    /// Call this periodically; it never blocks.
    pub fn progress(&mut self, now_ms: u64) -> Option<FdOutbound> {
        let outbound = match self.state {
            FirmwareDeviceState::Download => self.progress_download(now_ms),
            FirmwareDeviceState::Verify => self.progress_verify(now_ms),
            FirmwareDeviceState::Apply => self.progress_apply(now_ms),
            _ => None,
        };

        let timeout_applies = match self.state {
            FirmwareDeviceState::Idle => false,
            FirmwareDeviceState::Download | FirmwareDeviceState::Verify | FirmwareDeviceState::Apply => {
                self.req.state == ReqState::Sent
            }
            _ => true,
        };
        if timeout_applies
            && now_ms.saturating_sub(self.last_ua_activity_ms) > self.t1_timeout_ms
        {
            self.maybe_cancel_component();
            self.set_idle(GetStatusReasonCode::ReadyXferTimeout);
            return None;
        }

        outbound
    }

    fn progress_download(&mut self, now_ms: u64) -> Option<FdOutbound> {
        if !self.req.should_send(now_ms, self.t2_retry_ms) {
            return None;
        }
        // A resend of an already-`Sent` request (T2 elapsed, no reply
        // yet) reuses its instance ID; only a fresh `Ready` request
        // allocates a new one.
        let is_retry = self.req.state == ReqState::Sent;
        let instance_id = if is_retry {
            self.req.instance_id
        } else {
            self.req.next_instance_id()
        };
        let out = if self.req.complete {
            self.req.command = FwUpdateCmd::TransferComplete;
            FdOutbound::TransferComplete(TransferCompleteRequest::new(
                instance_id,
                PldmMsgType::Request,
                TransferResult::try_from(self.req.result).unwrap_or(TransferResult::FdAbortedTransfer),
            ))
        } else {
            self.req.command = FwUpdateCmd::RequestFirmwareData;
            let length = self.fwdata_size();
            FdOutbound::RequestFirmwareData(RequestFirmwareDataRequest::new(
                instance_id,
                PldmMsgType::Request,
                self.download.offset,
                length,
            ))
        };
        self.req.state = ReqState::Sent;
        self.req.sent_time_ms = now_ms;
        Some(out)
    }

    fn progress_verify(&mut self, now_ms: u64) -> Option<FdOutbound> {
        if !self.req.should_send(now_ms, self.t2_retry_ms) {
            return None;
        }
        if !self.req.complete {
            let comp = self.update_comp.clone()?;
            match self.platform.verify(&comp) {
                PhaseOutcome::Pending => return None,
                PhaseOutcome::Complete(result) => {
                    self.req.result = result as u8;
                    self.req.complete = true;
                }
            }
        }
        let is_retry = self.req.state == ReqState::Sent;
        let instance_id = if is_retry {
            self.req.instance_id
        } else {
            self.req.next_instance_id()
        };
        self.req.command = FwUpdateCmd::VerifyComplete;
        let out = FdOutbound::VerifyComplete(VerifyCompleteRequest::new(
            instance_id,
            PldmMsgType::Request,
            VerifyResult::try_from(self.req.result).unwrap_or(VerifyResult::VerifyGenericError),
        ));
        self.req.state = ReqState::Sent;
        self.req.sent_time_ms = now_ms;
        Some(out)
    }

    fn progress_apply(&mut self, now_ms: u64) -> Option<FdOutbound> {
        if !self.req.should_send(now_ms, self.t2_retry_ms) {
            return None;
        }
        if !self.req.complete {
            let comp = self.update_comp.clone()?;
            match self.platform.apply(&comp) {
                PhaseOutcome::Pending => return None,
                PhaseOutcome::Complete(result) => {
                    self.req.result = result as u8;
                    self.req.complete = true;
                }
            }
        }
        let is_retry = self.req.state == ReqState::Sent;
        let instance_id = if is_retry {
            self.req.instance_id
        } else {
            self.req.next_instance_id()
        };
        self.req.command = FwUpdateCmd::ApplyComplete;
        let out = FdOutbound::ApplyComplete(ApplyCompleteRequest::new(
            instance_id,
            PldmMsgType::Request,
            ApplyResult::try_from(self.req.result).unwrap_or(ApplyResult::ApplyFailureMemoryIssue),
            crate::protocol::firmware_update::ComponentActivationMethods(0),
        ));
        self.req.state = ReqState::Sent;
        self.req.sent_time_ms = now_ms;
        Some(out)
    }
}

fn component_response_to_compatibility_code(
    code: ComponentResponseCode,
) -> ComponentCompatibilityResponseCode {
    match code {
        ComponentResponseCode::CompComparisonStampIdentical => {
            ComponentCompatibilityResponseCode::CompComparisonStampIdentical
        }
        ComponentResponseCode::CompComparisonStampLower => {
            ComponentCompatibilityResponseCode::CompComparisonStampLower
        }
        ComponentResponseCode::InvalidCompComparisonStamp => {
            ComponentCompatibilityResponseCode::InvalidCompComparisonStamp
        }
        ComponentResponseCode::CompConflict => ComponentCompatibilityResponseCode::CompConflict,
        ComponentResponseCode::CompPrerequisitesNotMet => {
            ComponentCompatibilityResponseCode::CompPrerequisitesNotMet
        }
        ComponentResponseCode::CompNotSupported => {
            ComponentCompatibilityResponseCode::CompNotSupported
        }
        ComponentResponseCode::CompSecurityRestrictions => {
            ComponentCompatibilityResponseCode::CompSecurityRestrictions
        }
        ComponentResponseCode::IncompleteCompImageSet => {
            ComponentCompatibilityResponseCode::IncompleteCompImageSet
        }
        ComponentResponseCode::CompVerStrIdentical => {
            ComponentCompatibilityResponseCode::CompVerStrIdentical
        }
        ComponentResponseCode::CompVerStrLower => {
            ComponentCompatibilityResponseCode::CompVerStrLower
        }
        _ => ComponentCompatibilityResponseCode::NoResponseCode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use crate::protocol::firmware_update::{
        ComponentActivationMethods, ComponentClassification, ComponentParameterEntry,
        FirmwareDeviceCapability, PldmFirmwareString, PldmFirmwareVersion,
    };

    struct TestPlatform {
        descriptors: Vec<Descriptor>,
        params: FirmwareParameters,
        data_calls: Vec<(u32, usize)>,
        verify_pending_once: bool,
        apply_pending_once: bool,
    }

    impl TestPlatform {
        fn new() -> Self {
            let uuid = [0xAAu8; 16];
            let descriptors = alloc::vec![Descriptor::new(
                crate::protocol::firmware_update::DescriptorType::Uuid,
                &uuid
            )
            .unwrap()];

            let active = PldmFirmwareString::new("UTF-8", "mcu-1.0").unwrap();
            let active_ver = PldmFirmwareVersion::new(1, &active, None);
            let pending = PldmFirmwareString::new("UTF-8", "mcu-1.0").unwrap();
            let pending_ver = PldmFirmwareVersion::new(1, &pending, None);
            let entry = ComponentParameterEntry::new(
                ComponentClassification::Firmware,
                1,
                0,
                &active_ver,
                &pending_ver,
                ComponentActivationMethods(0),
                FirmwareDeviceCapability(0),
            );
            const COUNT: usize = 8;
            let table: [ComponentParameterEntry; COUNT] = core::array::from_fn(|_| entry.clone());
            let params = FirmwareParameters::new(
                FirmwareDeviceCapability(0),
                COUNT as u16,
                &active,
                &pending,
                &table,
            );

            TestPlatform {
                descriptors,
                params,
                data_calls: Vec::new(),
                verify_pending_once: false,
                apply_pending_once: false,
            }
        }
    }

    impl FdPlatform for TestPlatform {
        fn device_identifiers(&self) -> &[Descriptor] {
            &self.descriptors
        }

        fn firmware_parameters(&self) -> &FirmwareParameters {
            &self.params
        }

        fn firmware_data(
            &mut self,
            offset: u32,
            data: &[u8],
            _comp: &FirmwareComponent,
        ) -> TransferResult {
            self.data_calls.push((offset, data.len()));
            TransferResult::TransferSuccess
        }

        fn verify(&mut self, _comp: &FirmwareComponent) -> PhaseOutcome<VerifyResult> {
            if !self.verify_pending_once {
                self.verify_pending_once = true;
                return PhaseOutcome::Pending;
            }
            PhaseOutcome::Complete(VerifyResult::VerifySuccess)
        }

        fn apply(&mut self, _comp: &FirmwareComponent) -> PhaseOutcome<ApplyResult> {
            if !self.apply_pending_once {
                self.apply_pending_once = true;
                return PhaseOutcome::Pending;
            }
            PhaseOutcome::Complete(ApplyResult::ApplySuccess)
        }

        fn activate(&mut self, _self_contained: bool) -> Result<u16, FwUpdateCompletionCode> {
            Ok(0)
        }

        fn cancel_update_component(&mut self, _comp: &FirmwareComponent) {}
    }

    fn responder() -> FdResponder<TestPlatform, u8> {
        FdResponder::new(TestPlatform::new())
    }

    fn drive_to_download(fd: &mut FdResponder<TestPlatform, u8>, image_size: u32) {
        let ver = PldmFirmwareString::new("UTF-8", "mcu-1.1").unwrap();
        let req = RequestUpdateRequest::new(1, PldmMsgType::Request, 64, 1, 1, 0, &ver);
        fd.handle_request_update(0, 7u8, &req).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::LearnComponents);

        let pass = PassComponentTableRequest::new(
            2,
            PldmMsgType::Request,
            TransferRespFlag::StartAndEnd,
            ComponentClassification::Firmware,
            1,
            0,
            1,
            &ver,
        );
        let resp = fd.handle_pass_component_table(1, &pass).unwrap();
        assert_eq!(resp.comp_resp, ComponentResponse::CompCanBeUpdated as u8);
        assert_eq!(fd.state(), FirmwareDeviceState::ReadyXfer);

        let update = UpdateComponentRequest::new(
            3,
            PldmMsgType::Request,
            ComponentClassification::Firmware,
            1,
            0,
            1,
            image_size,
            UpdateOptionFlags(0),
            &ver,
        );
        let resp = fd.handle_update_component(2, &update).unwrap();
        assert_eq!(
            resp.comp_compatibility_resp,
            ComponentCompatibilityResponse::CompCanBeUpdated as u8
        );
        assert_eq!(fd.state(), FirmwareDeviceState::Download);
    }

    #[test]
    fn request_update_rejects_short_transfer_size() {
        let mut fd = responder();
        let ver = PldmFirmwareString::new("UTF-8", "mcu-1.1").unwrap();
        let req = RequestUpdateRequest::new(1, PldmMsgType::Request, 8, 1, 1, 0, &ver);
        let err = fd.handle_request_update(0, 1u8, &req).unwrap_err();
        assert_eq!(err, FwUpdateCompletionCode::InvalidTransferLength);
    }

    #[test]
    fn request_update_twice_rejected() {
        let mut fd = responder();
        let ver = PldmFirmwareString::new("UTF-8", "mcu-1.1").unwrap();
        let req = RequestUpdateRequest::new(1, PldmMsgType::Request, 64, 1, 1, 0, &ver);
        fd.handle_request_update(0, 1u8, &req).unwrap();
        let err = fd.handle_request_update(1, 1u8, &req).unwrap_err();
        assert_eq!(err, FwUpdateCompletionCode::AlreadyInUpdateMode);
    }

    #[test]
    fn happy_path_download_verify_apply_activate() {
        let mut fd = responder();
        drive_to_download(&mut fd, 40);

        // offset 0 -> 32
        let iid = match fd.progress(10).unwrap() {
            FdOutbound::RequestFirmwareData(req) => {
                assert_eq!(req.offset, 0);
                assert_eq!(req.length, 32);
                req.hdr.instance_id()
            }
            _ => panic!("expected RequestFirmwareData"),
        };
        let data = [0u8; 32];
        fd.handle_request_firmware_data_reply(
            11,
            7u8,
            iid,
            PldmBaseCompletionCode::Success as u8,
            &data,
        )
        .unwrap();

        // offset 32 -> 40
        let iid = match fd.progress(12).unwrap() {
            FdOutbound::RequestFirmwareData(req) => {
                assert_eq!(req.offset, 32);
                assert_eq!(req.length, 8);
                req.hdr.instance_id()
            }
            _ => panic!("expected RequestFirmwareData"),
        };
        let data = [0u8; 8];
        fd.handle_request_firmware_data_reply(
            13,
            7u8,
            iid,
            PldmBaseCompletionCode::Success as u8,
            &data,
        )
        .unwrap();

        let iid = match fd.progress(14).unwrap() {
            FdOutbound::TransferComplete(req) => {
                assert_eq!(req.tranfer_result, TransferResult::TransferSuccess as u8);
                req.hdr.instance_id()
            }
            _ => panic!("expected TransferComplete"),
        };
        fd.handle_transfer_complete_reply(15, 7u8, iid).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::Verify);

        assert!(fd.progress(16).is_none()); // verify() pending
        let iid = match fd.progress(17).unwrap() {
            FdOutbound::VerifyComplete(req) => {
                assert_eq!(req.verify_result, VerifyResult::VerifySuccess as u8);
                req.hdr.instance_id()
            }
            _ => panic!("expected VerifyComplete"),
        };
        fd.handle_verify_complete_reply(18, 7u8, iid).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::Apply);

        assert!(fd.progress(19).is_none()); // apply() pending
        let iid = match fd.progress(20).unwrap() {
            FdOutbound::ApplyComplete(req) => {
                assert_eq!(req.apply_result, ApplyResult::ApplySuccess as u8);
                req.hdr.instance_id()
            }
            _ => panic!("expected ApplyComplete"),
        };
        fd.handle_apply_complete_reply(21, 7u8, iid).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::ReadyXfer);

        let activate = ActivateFirmwareRequest::new(
            4,
            PldmMsgType::Request,
            crate::message::firmware_update::activate_fw::SelfContainedActivationRequest::NotActivateSelfContainedComponents,
        );
        fd.handle_activate_firmware(22, &activate).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::Idle);
    }

    #[test]
    fn retry_keeps_same_instance_id_on_t2_elapsed() {
        let mut fd = FdResponder::with_timeouts(TestPlatform::new(), DEFAULT_FD_T1_TIMEOUT_MS, 50);
        drive_to_download(&mut fd, 32);

        let first = match fd.progress(0).unwrap() {
            FdOutbound::RequestFirmwareData(req) => req.hdr.instance_id(),
            _ => panic!("expected RequestFirmwareData"),
        };
        // No reply arrives; before T2 elapses nothing is sent.
        assert!(fd.progress(10).is_none());
        // After T2 elapses, the retry reuses the same instance id.
        let retry = match fd.progress(51).unwrap() {
            FdOutbound::RequestFirmwareData(req) => req.hdr.instance_id(),
            _ => panic!("expected RequestFirmwareData"),
        };
        assert_eq!(first, retry);
    }

    #[test]
    fn t1_timeout_returns_to_idle() {
        let mut fd = FdResponder::with_timeouts(TestPlatform::new(), 100, DEFAULT_FD_T2_RETRY_MS);
        drive_to_download(&mut fd, 32);
        assert!(fd.progress(50).is_some());
        assert!(fd.progress(500).is_none());
        assert_eq!(fd.state(), FirmwareDeviceState::Idle);
    }

    #[test]
    fn cancel_update_component_returns_to_ready_xfer() {
        let mut fd = responder();
        drive_to_download(&mut fd, 32);
        let req = CancelUpdateComponentRequest::new(9, PldmMsgType::Request);
        fd.handle_cancel_update_component(30, &req).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::ReadyXfer);
    }

    #[test]
    fn cancel_update_returns_to_idle() {
        let mut fd = responder();
        drive_to_download(&mut fd, 32);
        let req = CancelUpdateRequest::new(9, PldmMsgType::Request);
        fd.handle_cancel_update(30, &req).unwrap();
        assert_eq!(fd.state(), FirmwareDeviceState::Idle);
    }

    #[test]
    fn get_status_reports_download_progress() {
        let mut fd = responder();
        drive_to_download(&mut fd, 100);
        let iid = match fd.progress(0).unwrap() {
            FdOutbound::RequestFirmwareData(req) => req.hdr.instance_id(),
            _ => panic!("expected RequestFirmwareData"),
        };
        fd.handle_request_firmware_data_reply(
            1,
            7u8,
            iid,
            PldmBaseCompletionCode::Success as u8,
            &[0u8; 32],
        )
        .unwrap();
        let req = GetStatusRequest::new(5, PldmMsgType::Request);
        let resp = fd.handle_get_status(&req);
        assert_eq!(resp.current_state, FirmwareDeviceState::Download as u8);
        assert_eq!(resp.progress_percent, 32);
    }

    #[test]
    fn query_device_identifiers_and_firmware_parameters() {
        let fd = responder();
        let req = QueryDeviceIdentifiersRequest::new(1, PldmMsgType::Request);
        let resp = fd.handle_query_device_identifiers(&req).unwrap();
        assert_eq!(resp.descriptor_count, 1);

        let req = GetFirmwareParametersRequest::new(2, PldmMsgType::Request);
        let resp = fd.handle_get_firmware_parameters(&req);
        assert_eq!(resp.completion_code, PldmBaseCompletionCode::Success as u8);
    }
}
