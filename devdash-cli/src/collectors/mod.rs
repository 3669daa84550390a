//! Collection sources for the OS process table and the container runtime

mod docker;
mod fake;
mod process;
pub mod sockets;

#[cfg(feature = "docker")]
mod bollard;

pub use docker::DockerCliSource;
pub use fake::{DemoContainerSource, DemoManifestReader, DemoProcessSource, DemoWorld};
pub use process::SysinfoProcessSource;

#[cfg(feature = "docker")]
pub use bollard::DockerApiSource;
