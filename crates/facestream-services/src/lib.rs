//! facestream-services: session tracking, frame reassembly, chunked sends
//! and the detection pipeline, independent of any concrete transport.

pub mod pipeline;
pub mod reassembly;
pub mod sender;
pub mod service;
pub mod session;

pub use pipeline::{detection_params, FrameError, FramePipeline, StatsSnapshot};
pub use reassembly::{CompletedFrame, FrameReassembler, ReassemblyError};
pub use sender::{send_frame, ChunkSender, SendError, SendReport};
pub use service::{FrameService, ServiceStatus};
pub use session::{
    drive_outbox, OutboundMessage, PeerId, SessionHandle, SessionInfo, SessionRegistry,
    TransportError,
};
