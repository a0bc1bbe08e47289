//! Frame filter for pvvx advertisements.
//!
//! The Environmental Sensing UUID is shared by many unrelated sensor
//! firmwares, so the exact payload length is the only cheap discriminator.

use crate::frame::{BroadcastFrame, uuid_from_u16};
use crate::payload::PAYLOAD_LEN;
use uuid::Uuid;

/// Environmental Sensing service, `0000181a-0000-1000-8000-00805f9b34fb`.
pub const ENVIRONMENTAL_SENSING_UUID: Uuid = uuid_from_u16(0x181A);

/// Return the pvvx payload carried by `frame`, if it carries one.
pub fn candidate_payload(frame: &BroadcastFrame) -> Option<&[u8]> {
    frame
        .service_data
        .get(&ENVIRONMENTAL_SENSING_UUID)
        .map(Vec::as_slice)
        .filter(|data| data.len() == PAYLOAD_LEN)
}

/// Whether `frame` should be handed to the payload decoder.
pub fn is_candidate(frame: &BroadcastFrame) -> bool {
    candidate_payload(frame).is_some()
}
