//! ARFlow ingestion engine.
//!
//! Mobile XR clients stream augmented-reality telemetry (camera frames,
//! depth maps, IMU samples, planes, point clouds, meshes, audio, pose
//! transforms) over gRPC; the engine routes each device's data into a
//! per-session, time-indexed recording that can be viewed live or archived
//! to disk.
//!
//! The moving parts, leaves first: pure frame [`decode`]rs, the per-session
//! [`session_stream::SessionStream`] with its grouping and dual-timeline
//! column discipline, the process-wide [`registry::SessionRegistry`], and
//! the [`servicer::ArFlowServicer`] that implements the RPC surface and
//! drives the server lifecycle in [`serve`].

pub mod decode;
pub mod error;
pub mod hooks;
pub mod paths;
pub mod registry;
pub mod serve;
pub mod servicer;
pub mod session_stream;

pub use error::SessionError;
pub use hooks::{NoopHooks, SessionHooks};
pub use registry::SessionRegistry;
pub use serve::{DEFAULT_PORT, run_server};
pub use servicer::ArFlowServicer;
pub use session_stream::SessionStream;
