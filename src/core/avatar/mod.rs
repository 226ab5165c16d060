use std::sync::Arc;

use crate::core::expression::HeadPose;

pub mod aliases;
pub mod capability;
pub mod manifest;
pub mod osc_engine;
pub mod retarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

/// One morph target on one mesh. Only the engine can dereference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub mesh: MeshHandle,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct MorphTarget {
    pub name: Arc<str>,
    pub handle: ChannelHandle,
}

/// What the engine reports about a mesh after loading an avatar.
#[derive(Debug, Clone)]
pub struct MeshInfo {
    pub handle: MeshHandle,
    pub name: Arc<str>,
    pub parent: Option<Arc<str>>,
    pub morph_targets: Vec<MorphTarget>,
}

/// Scene operations the pipeline needs from a rendering engine.
///
/// Writes are fire-and-forget; callers have already clamped every value.
pub trait AvatarEngine {
    /// Loads an avatar asset and reports its meshes.
    fn load_avatar(&mut self, source: &str) -> anyhow::Result<Vec<MeshInfo>>;
    /// Builds the geometric stand-in avatar and reports its meshes.
    fn build_fallback_avatar(&mut self) -> Vec<MeshInfo>;
    fn set_morph_influence(&mut self, channel: ChannelHandle, value: f32);
    /// Rotates the node that groups all head parts.
    fn set_head_rotation(&mut self, pose: HeadPose);
    fn set_mesh_visible(&mut self, mesh: MeshHandle, visible: bool);
    fn set_mesh_scale(&mut self, mesh: MeshHandle, scale: mint::Vector3<f32>);
    fn set_mesh_position(&mut self, mesh: MeshHandle, position: mint::Vector3<f32>);
    /// Parents the given meshes under one transform node.
    fn group_head_parts(&mut self, parts: &[MeshHandle]);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use anyhow::bail;
    use glam::Vec3;

    use super::*;
    use crate::core::avatar::manifest::{fallback_meshes, AvatarManifest};

    /// Engine double that remembers the latest write of every kind.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub avatars: HashMap<String, AvatarManifest>,
        pub loaded: Option<String>,
        pub fallback_built: usize,
        pub morphs: HashMap<ChannelHandle, f32>,
        pub morph_writes: usize,
        pub rotation: Option<HeadPose>,
        pub visible: HashMap<MeshHandle, bool>,
        pub scales: HashMap<MeshHandle, Vec3>,
        pub positions: HashMap<MeshHandle, Vec3>,
        pub head_group: Vec<MeshHandle>,
    }

    impl RecordingEngine {
        pub fn with_avatar(name: &str, manifest: AvatarManifest) -> Self {
            let mut me = Self::default();
            me.avatars.insert(name.to_string(), manifest);
            me
        }
    }

    impl AvatarEngine for RecordingEngine {
        fn load_avatar(&mut self, source: &str) -> anyhow::Result<Vec<MeshInfo>> {
            let Some(manifest) = self.avatars.get(source) else {
                bail!("no such avatar: {}", source);
            };
            self.loaded = Some(source.to_string());
            Ok(manifest.meshes())
        }

        fn build_fallback_avatar(&mut self) -> Vec<MeshInfo> {
            self.fallback_built += 1;
            self.loaded = None;
            fallback_meshes()
        }

        fn set_morph_influence(&mut self, channel: ChannelHandle, value: f32) {
            assert!(
                (0.0..=1.0).contains(&value),
                "morph write out of range: {}",
                value
            );
            self.morph_writes += 1;
            self.morphs.insert(channel, value);
        }

        fn set_head_rotation(&mut self, pose: HeadPose) {
            self.rotation = Some(pose);
        }

        fn set_mesh_visible(&mut self, mesh: MeshHandle, visible: bool) {
            self.visible.insert(mesh, visible);
        }

        fn set_mesh_scale(&mut self, mesh: MeshHandle, scale: mint::Vector3<f32>) {
            self.scales.insert(mesh, scale.into());
        }

        fn set_mesh_position(&mut self, mesh: MeshHandle, position: mint::Vector3<f32>) {
            self.positions.insert(mesh, position.into());
        }

        fn group_head_parts(&mut self, parts: &[MeshHandle]) {
            self.head_group = parts.to_vec();
        }
    }
}
