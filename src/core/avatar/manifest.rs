use std::{fs::File, io::BufReader, sync::Arc};

use anyhow::Context;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{ChannelHandle, MeshHandle, MeshInfo, MorphTarget};
use crate::core::folders::AVATAR_DIR;

/// Mesh inventory of an avatar asset, as exported next to the model file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvatarManifest {
    #[serde(default)]
    pub name: String,
    /// Asset path handed to the renderer.
    #[serde(default)]
    pub model: String,
    pub meshes: Vec<ManifestMesh>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMesh {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub morph_targets: Vec<String>,
}

impl AvatarManifest {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("open avatar manifest {}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse avatar manifest {}", path))
    }

    /// Hands out mesh handles in manifest order.
    pub fn meshes(&self) -> Vec<MeshInfo> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| {
                let handle = MeshHandle(i as u32);
                MeshInfo {
                    handle,
                    name: mesh.name.as_str().into(),
                    parent: mesh.parent.as_deref().map(Arc::from),
                    morph_targets: mesh
                        .morph_targets
                        .iter()
                        .enumerate()
                        .map(|(index, name)| MorphTarget {
                            name: name.as_str().into(),
                            handle: ChannelHandle {
                                mesh: handle,
                                index: index as u32,
                            },
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

/// Avatars available in the avatar directory, by file stem.
pub fn list_avatars() -> Vec<(String, String)> {
    let pattern = format!("{}/*.json", AVATAR_DIR.as_ref());
    let Ok(paths) = glob::glob(&pattern) else {
        log::warn!("Bad avatar search pattern {}", pattern);
        return Vec::new();
    };
    paths
        .filter_map(Result::ok)
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            Some((stem, path.to_str()?.to_string()))
        })
        .collect()
}

/// Accepts either a manifest path or the name of a manifest in the avatar directory.
pub fn find_avatar(source: &str) -> anyhow::Result<AvatarManifest> {
    if source.ends_with(".json") {
        return AvatarManifest::load(source);
    }
    let Some((_, path)) = list_avatars().into_iter().find(|(name, _)| name == source) else {
        anyhow::bail!("no avatar named {} in {}", source, AVATAR_DIR.as_ref());
    };
    AvatarManifest::load(&path)
}

pub const FALLBACK_HEAD: &str = "head";
pub const FALLBACK_LEFT_EYE: &str = "leftEye";
pub const FALLBACK_RIGHT_EYE: &str = "rightEye";
pub const FALLBACK_MOUTH: &str = "mouth";

/// Rest transform of a fallback part.
pub struct FallbackRest {
    pub name: &'static str,
    pub position: Vec3,
    pub scale: Vec3,
}

pub const FALLBACK_PARTS: [FallbackRest; 4] = [
    FallbackRest {
        name: FALLBACK_HEAD,
        position: Vec3::ZERO,
        scale: Vec3::ONE,
    },
    FallbackRest {
        name: FALLBACK_LEFT_EYE,
        position: Vec3::new(-0.15, 0.1, 0.4),
        scale: Vec3::ONE,
    },
    FallbackRest {
        name: FALLBACK_RIGHT_EYE,
        position: Vec3::new(0.15, 0.1, 0.4),
        scale: Vec3::ONE,
    },
    FallbackRest {
        name: FALLBACK_MOUTH,
        position: Vec3::new(0., -0.15, 0.4),
        scale: Vec3::new(1.5, 0.5, 0.5),
    },
];

/// Inventory of the geometric stand-in: a head sphere with eyes and a mouth.
pub fn fallback_meshes() -> Vec<MeshInfo> {
    FALLBACK_PARTS
        .iter()
        .enumerate()
        .map(|(i, part)| MeshInfo {
            handle: MeshHandle(i as u32),
            name: part.name.into(),
            parent: (i > 0).then(|| FALLBACK_HEAD.into()),
            morph_targets: Vec::new(),
        })
        .collect()
}
