//! Matroska/WebM element identities used by the muxer.

use dubmux_ebml::ElementId;

pub const EBML_HEADER: ElementId = ElementId::from_u32(0x1A45_DFA3);
pub const SEGMENT: ElementId = ElementId::from_u32(0x1853_8067);
pub const TRACKS: ElementId = ElementId::from_u32(0x1654_AE6B);
pub const TRACK_ENTRY: ElementId = ElementId::from_u32(0xAE);
pub const TRACK_NUMBER: ElementId = ElementId::from_u32(0xD7);
pub const TRACK_UID: ElementId = ElementId::from_u32(0x73C5);
pub const TRACK_TYPE: ElementId = ElementId::from_u32(0x83);
pub const CODEC_ID: ElementId = ElementId::from_u32(0x86);
pub const CODEC_PRIVATE: ElementId = ElementId::from_u32(0x63A2);
pub const LANGUAGE: ElementId = ElementId::from_u32(0x22B5_9C);
pub const AUDIO: ElementId = ElementId::from_u32(0xE1);
pub const SAMPLING_FREQUENCY: ElementId = ElementId::from_u32(0xB5);
pub const CHANNELS: ElementId = ElementId::from_u32(0x9F);
pub const CLUSTER: ElementId = ElementId::from_u32(0x1F43_B675);
pub const TIMECODE: ElementId = ElementId::from_u32(0xE7);
pub const SIMPLE_BLOCK: ElementId = ElementId::from_u32(0xA3);

/// Track type values for the `TrackType` element.
pub const TRACK_TYPE_VIDEO: u64 = 1;
pub const TRACK_TYPE_AUDIO: u64 = 2;
