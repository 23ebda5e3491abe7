// Licensed under the Apache-2.0 license

pub mod fw_component;
pub mod mctp_transport;
