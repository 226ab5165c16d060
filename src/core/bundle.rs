use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use rosc::{OscBundle, OscMessage, OscPacket, OscType};

use super::expression::HeadPose;

// characters OSC reserves for address patterns, plus whitespace
static OSC_RESERVED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s#*,/?\[\]{}!]").expect("valid regex"));

pub const MORPH_PREFIX: &str = "/puppet/morph/";
pub const VISIBLE_PREFIX: &str = "/puppet/visible/";
pub const SCALE_PREFIX: &str = "/puppet/scale/";
pub const POSITION_PREFIX: &str = "/puppet/position/";
pub const HEAD_ADDR: &str = "/puppet/head";
pub const GROUP_ADDR: &str = "/puppet/group";
pub const LOAD_ADDR: &str = "/puppet/load";
pub const FALLBACK_ADDR: &str = "/puppet/fallback";

/// Renderer-facing messages, batched into one bundle per tick.
pub trait PuppetBundle {
    fn new_bundle() -> Self;
    fn send_morph(&mut self, mesh: &str, target: &str, value: f32);
    fn send_head_rotation(&mut self, pose: HeadPose);
    fn send_visible(&mut self, mesh: &str, visible: bool);
    fn send_scale(&mut self, mesh: &str, scale: [f32; 3]);
    fn send_position(&mut self, mesh: &str, position: [f32; 3]);
    fn send_head_group(&mut self, meshes: Vec<String>);
    fn send_load(&mut self, model: &str);
    fn send_fallback(&mut self);
    fn serialize(self) -> Option<Vec<u8>>;
}

/// Makes a mesh or morph name usable as one OSC address part. Reserved
/// characters become `_`.
pub fn address_part(name: &str) -> Cow<'_, str> {
    OSC_RESERVED_REGEX.replace_all(name, "_")
}

fn message(addr: String, args: Vec<OscType>) -> OscPacket {
    OscPacket::Message(OscMessage { addr, args })
}

impl PuppetBundle for OscBundle {
    fn new_bundle() -> OscBundle {
        OscBundle {
            timetag: rosc::OscTime {
                seconds: 0,
                fractional: 0,
            },
            content: Vec::new(),
        }
    }
    fn send_morph(&mut self, mesh: &str, target: &str, value: f32) {
        log::trace!("Sending morph {}/{} = {:.3}", mesh, target, value);
        self.content.push(message(
            format!(
                "{}{}/{}",
                MORPH_PREFIX,
                address_part(mesh),
                address_part(target)
            ),
            vec![OscType::Float(value)],
        ));
    }
    fn send_head_rotation(&mut self, pose: HeadPose) {
        log::trace!("Sending head rotation {:?}", pose);
        self.content.push(message(
            HEAD_ADDR.to_string(),
            vec![
                OscType::Float(pose.yaw),
                OscType::Float(pose.pitch),
                OscType::Float(pose.roll),
            ],
        ));
    }
    fn send_visible(&mut self, mesh: &str, visible: bool) {
        log::trace!("Sending visible {} = {}", mesh, visible);
        self.content.push(message(
            format!("{}{}", VISIBLE_PREFIX, address_part(mesh)),
            vec![OscType::Bool(visible)],
        ));
    }
    fn send_scale(&mut self, mesh: &str, scale: [f32; 3]) {
        log::trace!("Sending scale {} = {:?}", mesh, scale);
        self.content.push(message(
            format!("{}{}", SCALE_PREFIX, address_part(mesh)),
            scale.into_iter().map(OscType::Float).collect(),
        ));
    }
    fn send_position(&mut self, mesh: &str, position: [f32; 3]) {
        log::trace!("Sending position {} = {:?}", mesh, position);
        self.content.push(message(
            format!("{}{}", POSITION_PREFIX, address_part(mesh)),
            position.into_iter().map(OscType::Float).collect(),
        ));
    }
    fn send_head_group(&mut self, meshes: Vec<String>) {
        log::trace!("Sending head group {:?}", meshes);
        self.content.push(message(
            GROUP_ADDR.to_string(),
            meshes.into_iter().map(OscType::String).collect(),
        ));
    }
    fn send_load(&mut self, model: &str) {
        log::trace!("Sending load {}", model);
        // the renderer swaps scenes on this, so it goes ahead of any writes
        self.content.insert(
            0,
            message(LOAD_ADDR.to_string(), vec![OscType::String(model.to_string())]),
        );
    }
    fn send_fallback(&mut self) {
        log::trace!("Sending fallback avatar request");
        self.content
            .insert(0, message(FALLBACK_ADDR.to_string(), Vec::new()));
    }
    fn serialize(self) -> Option<Vec<u8>> {
        if !self.content.is_empty() {
            rosc::encoder::encode(&OscPacket::Bundle(self)).ok()
        } else {
            None
        }
    }
}
