use std::{collections::HashMap, net::UdpSocket};

use rosc::OscBundle;

use super::{
    manifest::{fallback_meshes, find_avatar},
    AvatarEngine, ChannelHandle, MeshHandle, MeshInfo,
};
use crate::core::{bundle::PuppetBundle, expression::HeadPose};

/// Influence changes smaller than this are not resent.
const MORPH_DIRTY_THRESHOLD: f32 = 0.001;

/// Drives a remote renderer over OSC. Writes accumulate in a bundle
/// that [`OscEngine::flush`] sends once per tick.
pub struct OscEngine {
    upstream: UdpSocket,
    bundle: OscBundle,
    meshes: Vec<MeshInfo>,
    last_sent: HashMap<ChannelHandle, f32>,
}

impl OscEngine {
    pub fn new(upstream: UdpSocket) -> Self {
        Self {
            upstream,
            bundle: OscBundle::new_bundle(),
            meshes: Vec::new(),
            last_sent: HashMap::new(),
        }
    }

    fn mesh_name(&self, handle: MeshHandle) -> Option<&str> {
        self.meshes.get(handle.0 as usize).map(|m| m.name.as_ref())
    }

    fn adopt(&mut self, meshes: &[MeshInfo]) {
        self.meshes = meshes.to_vec();
        self.last_sent.clear();
    }

    /// Sends everything queued since the last flush. Returns how many
    /// messages actually left the socket.
    pub fn flush(&mut self) -> usize {
        let bundle = std::mem::replace(&mut self.bundle, OscBundle::new_bundle());
        let count = bundle.content.len();
        if count == 0 {
            return 0;
        }
        let Some(buf) = bundle.serialize() else {
            log::warn!("Failed to encode {} renderer messages", count);
            return 0;
        };
        if let Err(e) = self.upstream.send(&buf) {
            log::debug!("Renderer unreachable: {}", e);
            return 0;
        }
        count
    }
}

impl AvatarEngine for OscEngine {
    fn load_avatar(&mut self, source: &str) -> anyhow::Result<Vec<MeshInfo>> {
        let manifest = find_avatar(source)?;
        let model = if manifest.model.is_empty() {
            source
        } else {
            manifest.model.as_str()
        };
        log::info!("Loading avatar {} ({} meshes)", model, manifest.meshes.len());
        self.bundle.send_load(model);

        let meshes = manifest.meshes();
        self.adopt(&meshes);
        Ok(meshes)
    }

    fn build_fallback_avatar(&mut self) -> Vec<MeshInfo> {
        log::info!("Using geometric fallback avatar");
        self.bundle.send_fallback();

        let meshes = fallback_meshes();
        self.adopt(&meshes);
        meshes
    }

    fn set_morph_influence(&mut self, channel: ChannelHandle, value: f32) {
        if let Some(last) = self.last_sent.get(&channel) {
            if (last - value).abs() < MORPH_DIRTY_THRESHOLD {
                return;
            }
        }
        let Some(mesh) = self.meshes.get(channel.mesh.0 as usize) else {
            return;
        };
        let Some(target) = mesh.morph_targets.get(channel.index as usize) else {
            return;
        };
        self.bundle.send_morph(&mesh.name, &target.name, value);
        self.last_sent.insert(channel, value);
    }

    fn set_head_rotation(&mut self, pose: HeadPose) {
        self.bundle.send_head_rotation(pose);
    }

    fn set_mesh_visible(&mut self, mesh: MeshHandle, visible: bool) {
        if let Some(name) = self.mesh_name(mesh).map(str::to_string) {
            self.bundle.send_visible(&name, visible);
        }
    }

    fn set_mesh_scale(&mut self, mesh: MeshHandle, scale: mint::Vector3<f32>) {
        if let Some(name) = self.mesh_name(mesh).map(str::to_string) {
            self.bundle.send_scale(&name, scale.into());
        }
    }

    fn set_mesh_position(&mut self, mesh: MeshHandle, position: mint::Vector3<f32>) {
        if let Some(name) = self.mesh_name(mesh).map(str::to_string) {
            self.bundle.send_position(&name, position.into());
        }
    }

    fn group_head_parts(&mut self, parts: &[MeshHandle]) {
        let names = parts
            .iter()
            .filter_map(|&h| self.mesh_name(h).map(str::to_string))
            .collect();
        self.bundle.send_head_group(names);
    }
}
