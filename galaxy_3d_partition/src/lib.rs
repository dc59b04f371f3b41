/*!
# Galaxy 3D Partition

Broad-phase spatial partition for the Galaxy 3D engine.

Indexes world objects by their axis-aligned bounds and answers picking-ray
and frustum queries. Objects are referenced by generational handles; the
partition never owns them and asks a `SceneObjects` collaborator for their
current bounds and for precise ray hits.

## Architecture

- **Bound**: axis-aligned box with ray, frustum and box tests
- **SpatialIndex**: common trait of the spatial structures
- **Octree**: loose octree over a fixed world bound
- **Bvh**: dynamic bounding volume hierarchy with batch rebuilds
- **PartitionManager**: owns one index, drains dirty objects under a
  per-frame budget, forwards queries
*/

// Internal modules
mod error;
pub mod log;
mod bound;
mod ray;
mod frustum;
mod config;
mod scene_objects;
mod debug_draw;
mod spatial_index;
mod octree;
mod bvh;
mod partition_manager;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Partition entry point
    pub use crate::partition_manager::{PartitionManager, PartitionStats};
    pub use crate::config::{BvhConfig, IndexStrategy, OctreeConfig, PartitionConfig, MAX_TREE_DEPTH};

    // Logging sub-module (types and global logger control)
    pub mod log {
        pub use crate::log::{
            DefaultLogger, LogEntry, LogSeverity, Logger,
            min_severity, reset_logger, set_logger, set_min_severity,
        };
    }

    // Geometry sub-module
    pub mod geometry {
        pub use crate::bound::{Bound, RAY_PARALLEL_EPSILON};
        pub use crate::frustum::{
            Frustum, FrustumTest,
            PLANE_BOTTOM, PLANE_FAR, PLANE_LEFT, PLANE_NEAR, PLANE_RIGHT, PLANE_TOP,
        };
        pub use crate::ray::Ray;
    }

    // Spatial structures sub-module
    pub mod spatial {
        pub use crate::bvh::Bvh;
        pub use crate::octree::Octree;
        pub use crate::spatial_index::{RayHit, SpatialIndex, RAY_QUERY_EPSILON};
        pub use crate::scene_objects::{BoundTable, ObjectHandle, SceneObjects, TableEntry};
    }

    // Debug visualization sub-module
    pub mod debug {
        pub use crate::debug_draw::{
            box_edges, depth_color, DebugDrawFlags, DebugLine, LineBatch, LineSink,
            DEPTH_PALETTE, MEMBER_COLOR,
        };
    }
}

// Re-export math library at crate root
pub use glam;
