#![allow(unknown_lints)]
#![allow(clippy::suboptimal_flops)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::multiple_crate_versions)]

pub mod collisions;
pub mod config;
pub mod constants;
pub mod error;
pub mod mesh;
pub mod nav;
pub mod position;
pub mod provider;
pub mod smoothing;
pub mod utils;

pub use collisions::{CollisionChecker, RayCaster, RayHit, Triangle};
pub use config::{NavConfig, OcclusionMode, PortalMode, SimplifyStrategy, SmoothingConfig};
pub use error::{NavError, Result};
pub use mesh::PolygonMeshData;
pub use nav::{Nav, NavNode, NodeFlags, OffMeshLink, PathResult, SharedEdge, Transition};
pub use position::Position;
pub use provider::{NavigationPath, NavigationProvider, plan_path};
pub use smoothing::{PathPoint, SmoothedPath, smooth_path};
