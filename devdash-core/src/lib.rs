pub mod config;
pub mod format;
pub mod model;

// Collection: parsing of OS and runtime output
pub mod container;
pub mod process;
pub mod sockets;
pub mod source;

// Poll → correlate → diff
pub mod correlate;
pub mod cycle;
pub mod diff;
pub mod pipeline;
pub mod resolver;

// What the user sees
pub mod export;
pub mod host;
pub mod logs;
pub mod notify;
pub mod view;
