//! Driver operations, each a thin caller of the [`CallInvoker`].
//!
//! Every operation fails with [`ClientError::Connection`] before sending
//! anything when no session is active.
//!
//! [`CallInvoker`]: crate::invoker::CallInvoker

use crate::client::InputEmulatorClient;
use crate::domain::correlation::nonce;
use crate::domain::error::{ClientError, ClientResult};
use crate::invoker::CallMode;
use inputemu_protocol::{
    DeviceInfo, MotionCompensationProperties, MotionCompensationVelAccMode, ReplyPayload,
    RequestPayload, EVENT_DATA_LEN,
};

impl InputEmulatorClient {
    /// Ping the driver.
    pub fn ping(&self, mode: CallMode) -> ClientResult<()> {
        let session = self.session()?;
        session
            .invoker()
            .invoke(RequestPayload::Ping { nonce: nonce() }, mode)?;
        Ok(())
    }

    /// Look up a tracked device. Always blocking.
    pub fn get_device_info(&self, device_id: u32) -> ClientResult<DeviceInfo> {
        let session = self.session()?;
        let reply = session
            .invoker()
            .call(RequestPayload::GetDeviceInfo { device_id })?;
        match reply.payload {
            ReplyPayload::DeviceInfo(info) => Ok(info),
            other => Err(ClientError::unexpected_reply("get_device_info", &other)),
        }
    }

    /// Forward a vendor-specific event to a device. Always fire-and-forget.
    pub fn vendor_specific_event(
        &self,
        device_id: u32,
        event_type: u32,
        event_data: [u8; EVENT_DATA_LEN],
        time_offset: f64,
    ) -> ClientResult<()> {
        let session = self.session()?;
        session
            .invoker()
            .fire_and_forget(RequestPayload::VendorSpecificEvent {
                device_id,
                event_type,
                event_data,
                time_offset,
            })
    }

    /// Return a device to normal (unmanipulated) operation.
    pub fn set_device_normal_mode(&self, device_id: u32, mode: CallMode) -> ClientResult<()> {
        let session = self.session()?;
        session
            .invoker()
            .invoke(RequestPayload::SetDeviceNormalMode { device_id }, mode)?;
        Ok(())
    }

    /// Enable motion compensation with `device_id` as the reference device.
    pub fn set_device_motion_compensation_mode(
        &self,
        device_id: u32,
        vel_acc_mode: MotionCompensationVelAccMode,
        mode: CallMode,
    ) -> ClientResult<()> {
        let session = self.session()?;
        session.invoker().invoke(
            RequestPayload::SetMotionCompensationMode {
                device_id,
                vel_acc_mode,
            },
            mode,
        )?;
        Ok(())
    }

    /// Update the global motion compensation properties that are set in
    /// `props`.
    pub fn set_motion_compensation_properties(
        &self,
        props: MotionCompensationProperties,
        mode: CallMode,
    ) -> ClientResult<()> {
        let session = self.session()?;
        session
            .invoker()
            .invoke(RequestPayload::SetMotionCompensationProperties(props), mode)?;
        Ok(())
    }

    pub fn set_motion_vel_acc_compensation_mode(
        &self,
        vel_acc_mode: MotionCompensationVelAccMode,
        mode: CallMode,
    ) -> ClientResult<()> {
        self.set_motion_compensation_properties(
            MotionCompensationProperties::with_vel_acc_mode(vel_acc_mode),
            mode,
        )
    }

    pub fn set_motion_compensation_kalman_process_noise(
        &self,
        variance: f64,
        mode: CallMode,
    ) -> ClientResult<()> {
        self.set_motion_compensation_properties(
            MotionCompensationProperties::with_kalman_process_noise(variance),
            mode,
        )
    }

    pub fn set_motion_compensation_kalman_observation_noise(
        &self,
        variance: f64,
        mode: CallMode,
    ) -> ClientResult<()> {
        self.set_motion_compensation_properties(
            MotionCompensationProperties::with_kalman_observation_noise(variance),
            mode,
        )
    }

    pub fn set_motion_compensation_moving_average_window(
        &self,
        window: u32,
        mode: CallMode,
    ) -> ClientResult<()> {
        self.set_motion_compensation_properties(
            MotionCompensationProperties::with_moving_average_window(window),
            mode,
        )
    }
}
